use std::fmt;

/// Non-fatal conditions met while releasing a namespace.
/// They are logged as they happen and carried on the release result.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundaryWarning {
    /// Tag in the namespace that does not parse as a semantic version
    MalformedTag { tag: String, reason: String },
    /// No commits in scope since the latest tag; the namespace counts as already released
    NoNewCommits {
        latest_tag: String,
        current_commit_hash: String,
    },
    /// The computed tag already exists and is returned as-is
    TagAlreadyExists { tag: String },
    /// A manifest could not be rewritten
    ManifestUpdateFailed { path: String, reason: String },
    /// HEAD is detached, so the release commit cannot be pushed
    DetachedHead { tag: String },
    /// The remote refused the tag and a new version was resolved
    PushRejected { tag: String, reason: String },
}

fn short_hash(hash: &str) -> &str {
    hash.get(..7).unwrap_or(hash)
}

impl fmt::Display for BoundaryWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundaryWarning::MalformedTag { tag, reason } => {
                write!(f, "Ignoring tag '{}': {}", tag, reason)
            }
            BoundaryWarning::NoNewCommits {
                latest_tag,
                current_commit_hash,
            } => write!(
                f,
                "No new commits since tag '{}' (current: {})",
                latest_tag,
                short_hash(current_commit_hash)
            ),
            BoundaryWarning::TagAlreadyExists { tag } => {
                write!(f, "Tag '{}' already exists, reusing it", tag)
            }
            BoundaryWarning::ManifestUpdateFailed { path, reason } => {
                write!(f, "Could not update {}: {}", path, reason)
            }
            BoundaryWarning::DetachedHead { tag } => write!(
                f,
                "HEAD is detached; pushing '{}' without the release commit's branch",
                tag
            ),
            BoundaryWarning::PushRejected { tag, reason } => {
                write!(f, "Remote rejected tag '{}': {}", tag, reason)
            }
        }
    }
}
