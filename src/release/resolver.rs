use crate::boundary::BoundaryWarning;
use crate::domain::{ModuleNamespace, Version};
use crate::error::Result;
use crate::git::Repository;

/// Released version of a namespace at HEAD
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentVersion {
    pub version: Version,
    /// Tag carrying `version`; `None` when nothing has been released yet
    pub tag: Option<String>,
    /// Commit the tag points at
    pub commit: Option<String>,
    pub warnings: Vec<BoundaryWarning>,
}

impl CurrentVersion {
    /// No release exists and `version` is the bootstrap version
    pub fn is_bootstrap(&self) -> bool {
        self.tag.is_none()
    }
}

/// Find the highest tagged version of `namespace` reachable from HEAD.
///
/// Tags that fail to parse are skipped with a `MalformedTag` warning. Tags
/// belonging to a nested namespace (`v*` also matches `vendor/v1.0.0`) are
/// skipped silently.
///
/// # Arguments
/// * `repo` - Repository to inspect
/// * `namespace` - Module whose version line is resolved
/// * `bootstrap` - Version reported when the namespace has no tags
///
/// # Returns
/// * `Ok(CurrentVersion)` - The latest version, or `bootstrap` with `tag: None`
/// * `Err` - If tags cannot be listed
pub fn resolve_current_version<R: Repository + ?Sized>(
    repo: &R,
    namespace: &ModuleNamespace,
    bootstrap: &Version,
) -> Result<CurrentVersion> {
    let prefix = namespace.tag_prefix();
    let tags = repo.list_tags(&namespace.tag_glob())?;
    tracing::debug!(%namespace, count = tags.len(), "listed namespace tags");

    let mut warnings = Vec::new();
    let mut latest: Option<(Version, String)> = None;

    for tag in tags {
        let Some(rest) = tag.strip_prefix(&prefix) else {
            continue;
        };
        if rest.contains('/') {
            continue;
        }

        match Version::parse(rest) {
            Ok(version) => {
                if latest.as_ref().map_or(true, |(best, _)| version > *best) {
                    latest = Some((version, tag));
                }
            }
            Err(e) => {
                let warning = BoundaryWarning::MalformedTag {
                    tag,
                    reason: e.to_string(),
                };
                tracing::warn!(%namespace, "{}", warning);
                warnings.push(warning);
            }
        }
    }

    match latest {
        Some((version, tag)) => {
            let commit = repo.tag_target(&tag)?;
            Ok(CurrentVersion {
                version,
                tag: Some(tag),
                commit,
                warnings,
            })
        }
        None => Ok(CurrentVersion {
            version: bootstrap.clone(),
            tag: None,
            commit: None,
            warnings,
        }),
    }
}
