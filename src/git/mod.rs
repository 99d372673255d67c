//! Git operations abstraction layer
//!
//! This module provides a trait-based abstraction over the repository the
//! release engine works against. The concrete implementations include:
//!
//! - [repository::Git2Repository]: in-process access through the `git2` crate
//! - [sandbox::SandboxRepository]: git commands run through a [sandbox::Sandbox]
//! - [mock::MockRepository]: an in-memory history for tests
//!
//! Code in [crate::release] depends only on the [Repository] trait.
//!
//! ```rust
//! # use versioner::git::Repository;
//! # fn example<R: Repository>(repo: &R) -> versioner::Result<()> {
//! let tags = repo.list_tags("api/v*")?;
//! let commits = repo.commits_since(tags.first().map(String::as_str), None)?;
//! # Ok(())
//! # }
//! ```

pub mod mock;
pub mod repository;
pub mod sandbox;

pub use mock::MockRepository;
pub use repository::Git2Repository;
pub use sandbox::{CommandOutput, ProcessSandbox, Sandbox, SandboxRepository};

use std::path::{Path, PathBuf};

use crate::config::AuthorConfig;
use crate::error::Result;

/// Commit information for analysis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    /// The full commit hash
    pub hash: String,
    /// The full commit message (subject, body and footers)
    pub message: String,
    /// Paths touched by the commit, when the backend records them
    pub paths: Vec<String>,
}

/// Repository operations the release engine needs.
///
/// ## Thread Safety
///
/// Implementors must be `Send + Sync` so one engine can release several
/// namespaces in parallel.
///
/// ## Error Handling
///
/// Failures to read history map to [crate::error::VersionerError::Repository]
/// (or `Git`). Push failures distinguish a refused update
/// ([crate::error::VersionerError::PushRejected]) from transient trouble
/// ([crate::error::VersionerError::Remote]).
pub trait Repository: Send + Sync {
    /// Root of the working tree
    fn workdir(&self) -> PathBuf;

    /// Hash of the commit HEAD points at
    fn head_commit(&self) -> Result<String>;

    /// Short name of the checked-out branch, `None` on a detached HEAD
    fn current_branch(&self) -> Result<Option<String>>;

    /// Tags matching a glob such as `api/v*` that are reachable from HEAD
    fn list_tags(&self, pattern: &str) -> Result<Vec<String>>;

    /// Commit a tag points at, `None` if the tag does not exist
    fn tag_target(&self, tag_name: &str) -> Result<Option<String>>;

    /// Commits reachable from HEAD but not from `since_tag`, oldest first.
    ///
    /// With `path`, only commits touching that directory are returned.
    fn commits_since(&self, since_tag: Option<&str>, path: Option<&Path>)
        -> Result<Vec<CommitInfo>>;

    /// Create an annotated tag at `target`.
    ///
    /// Fails with `TagAlreadyExists` unless `force` is set.
    fn create_annotated_tag(
        &self,
        name: &str,
        message: &str,
        target: &str,
        author: &AuthorConfig,
        force: bool,
    ) -> Result<()>;

    /// Stage `paths` (relative to the working tree) and commit them on HEAD.
    ///
    /// Returns the new commit hash.
    fn commit_paths(&self, paths: &[PathBuf], message: &str, author: &AuthorConfig)
        -> Result<String>;

    /// Push refspecs such as `refs/tags/v1.0.0` to a remote
    fn push(&self, remote: &str, refspecs: &[String], force: bool) -> Result<()>;

    /// Replace local tags with the remote's
    fn fetch_tags(&self, remote: &str) -> Result<()>;
}
