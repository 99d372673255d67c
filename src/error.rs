use std::path::PathBuf;

use thiserror::Error;

/// Unified error type for versioner operations
#[derive(Error, Debug)]
pub enum VersionerError {
    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Git operation failed: {0}")]
    Git(#[from] git2::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Version parsing error: {0}")]
    Version(String),

    #[error("Tag already exists: {tag}")]
    TagAlreadyExists { tag: String },

    #[error("Remote operation failed: {0}")]
    Remote(String),

    #[error("Push rejected by remote: {0}")]
    PushRejected(String),

    #[error("Publish failed after {attempts} attempt(s): {message}")]
    Publish { attempts: u32, message: String },

    #[error("Manifest update failed for {}: {message}", path.display())]
    Manifest { path: PathBuf, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for Results in versioner
pub type Result<T> = std::result::Result<T, VersionerError>;

impl VersionerError {
    pub fn repository(msg: impl Into<String>) -> Self {
        VersionerError::Repository(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        VersionerError::Config(msg.into())
    }

    pub fn version(msg: impl Into<String>) -> Self {
        VersionerError::Version(msg.into())
    }

    pub fn remote(msg: impl Into<String>) -> Self {
        VersionerError::Remote(msg.into())
    }

    pub fn manifest(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        VersionerError::Manifest {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Whether a failed push is worth repeating as-is.
    ///
    /// Rejections are not: the remote state has to be re-read first.
    pub fn is_transient(&self) -> bool {
        matches!(self, VersionerError::Remote(_) | VersionerError::Io(_))
    }
}
