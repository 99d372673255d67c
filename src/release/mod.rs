//! Release engine
//!
//! Resolves the current version of a namespace, computes the next one from
//! the commits since, and records it as manifest edits, an annotated tag
//! and (optionally) a push.

pub mod locks;
pub mod orchestrator;
pub mod resolver;

pub use locks::NamespaceLocks;
pub use orchestrator::ReleaseEngine;
pub use resolver::{resolve_current_version, CurrentVersion};

use std::fmt;
use std::path::PathBuf;

use crate::analyzer::ClassifiedCommit;
use crate::boundary::BoundaryWarning;
use crate::config::ReleaseConfig;
use crate::domain::{ModuleNamespace, Version, VersionBump};

/// How a `bump_version` call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseStatus {
    /// A new tag was created
    Created,
    /// The namespace had nothing new since its latest tag
    AlreadyReleased,
    /// The computed tag already existed and was left alone
    TagExisted,
}

impl fmt::Display for ReleaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ReleaseStatus::Created => "created",
            ReleaseStatus::AlreadyReleased => "already released",
            ReleaseStatus::TagExisted => "tag existed",
        };
        f.write_str(label)
    }
}

/// Per-call switches for `bump_version`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BumpOptions {
    /// Push the tag (and release commit) to the configured remote
    pub push: bool,
    /// Fail instead of reusing an existing tag
    pub strict: bool,
    /// Move an existing tag and force-push it
    pub overwrite: bool,
}

impl BumpOptions {
    pub fn from_config(config: &ReleaseConfig) -> Self {
        BumpOptions {
            push: config.push,
            strict: config.strict,
            overwrite: false,
        }
    }
}

impl Default for BumpOptions {
    fn default() -> Self {
        Self::from_config(&ReleaseConfig::default())
    }
}

/// Result of releasing one namespace
#[derive(Debug, Clone, PartialEq)]
pub struct Release {
    pub namespace: ModuleNamespace,
    pub version: Version,
    pub tag: String,
    pub status: ReleaseStatus,
    /// Increment applied; `None` for a bootstrap release or a replay
    pub bump: VersionBump,
    /// Commits analyzed for this release
    pub commit_count: usize,
    /// Files rewritten, relative to the repository root
    pub updated_files: Vec<PathBuf>,
    pub pushed: bool,
    pub warnings: Vec<BoundaryWarning>,
}

/// What a release of a namespace would do, computed without side effects
#[derive(Debug, Clone, PartialEq)]
pub struct ReleasePlan {
    pub namespace: ModuleNamespace,
    pub current: CurrentVersion,
    /// HEAD at planning time
    pub head: String,
    /// Nothing new since `current.tag`; `next_version` equals the current one
    pub already_released: bool,
    pub bump: VersionBump,
    pub next_version: Version,
    pub tag: String,
    pub commits: Vec<ClassifiedCommit>,
    /// Commit an existing tag named `tag` points at
    pub existing_tag: Option<String>,
    pub warnings: Vec<BoundaryWarning>,
}
