//! Domain logic - pure business rules independent of git operations

pub mod commit;
pub mod tag;
pub mod version;

pub use commit::{subject_line, ParsedCommit};
pub use tag::ModuleNamespace;
pub use version::{Version, VersionBump};
