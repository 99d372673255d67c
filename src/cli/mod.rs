pub mod orchestration;

pub use orchestration::{
    run_bump_workflow, run_query, Backend, BumpWorkflowArgs, Query, QueryOutput, SourceArgs,
    WorkflowResult,
};
