//! Analysis engine for determining version bumps from commits

pub mod classifier;

pub use classifier::{ClassifiedCommit, CommitClassifier};
