use std::fmt;
use std::path::Path;

use crate::domain::Version;
use crate::error::{Result, VersionerError};

const ROOT: &str = ".";

/// Characters git refuses inside a ref name
const FORBIDDEN_REF_CHARS: &[char] = &[' ', '~', '^', ':', '?', '*', '[', '\\', '\t'];

/// Tag-name prefix scoping one module's version line.
///
/// The repository root is `.` and tags as `v<version>`; any other namespace is a
/// relative path and tags as `<path>/v<version>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleNamespace {
    path: String,
}

impl ModuleNamespace {
    /// Normalize and validate a module path such as `./services/api/`
    pub fn new(raw: &str) -> Result<Self> {
        let unified = raw.trim().replace('\\', "/");

        if unified.starts_with('/') {
            return Err(VersionerError::config(format!(
                "Module namespace must be a relative path: '{}'",
                raw
            )));
        }

        let mut components = Vec::new();
        for component in unified.split('/') {
            match component {
                "" | "." => continue,
                ".." => {
                    return Err(VersionerError::config(format!(
                        "Module namespace may not leave the repository: '{}'",
                        raw
                    )))
                }
                other => {
                    if other.contains(FORBIDDEN_REF_CHARS)
                        || other.starts_with('-')
                        || other.ends_with(".lock")
                        || other.chars().any(char::is_control)
                    {
                        return Err(VersionerError::config(format!(
                            "Module namespace '{}' is not usable in a tag name",
                            raw
                        )));
                    }
                    components.push(other);
                }
            }
        }

        if components.is_empty() {
            return Ok(Self::root());
        }

        let namespace = ModuleNamespace {
            path: components.join("/"),
        };

        // Leading dots, `..` and `@{` are only caught by git's own rules
        let full_ref = format!("refs/tags/{}", namespace.tag_name(&Version::new(0, 0, 0)));
        if !git2::Reference::is_valid_name(&full_ref) {
            return Err(VersionerError::config(format!(
                "Module namespace '{}' is not usable in a tag name",
                raw
            )));
        }

        Ok(namespace)
    }

    pub fn root() -> Self {
        ModuleNamespace {
            path: ROOT.to_string(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.path == ROOT
    }

    pub fn as_str(&self) -> &str {
        &self.path
    }

    /// Directory of the module relative to the repository root, `None` for the root
    pub fn subdir(&self) -> Option<&Path> {
        if self.is_root() {
            None
        } else {
            Some(Path::new(&self.path))
        }
    }

    /// Everything in a tag name before the version digits (`api/v`, `v`)
    pub fn tag_prefix(&self) -> String {
        if self.is_root() {
            "v".to_string()
        } else {
            format!("{}/v", self.path)
        }
    }

    /// Format a version as a tag of this namespace: `api/v1.2.3`
    pub fn tag_name(&self, version: &Version) -> String {
        format!("{}{}", self.tag_prefix(), version)
    }

    /// Glob handed to `git tag -l`
    pub fn tag_glob(&self) -> String {
        format!("{}*", self.tag_prefix())
    }

    /// Extract the version from a tag of this namespace.
    ///
    /// Tags of other namespaces or with a malformed version give `None`.
    pub fn parse_tag(&self, tag: &str) -> Option<Version> {
        let rest = tag.strip_prefix(&self.tag_prefix())?;
        Version::parse(rest).ok()
    }
}

impl Default for ModuleNamespace {
    fn default() -> Self {
        Self::root()
    }
}

impl fmt::Display for ModuleNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_namespace() {
        let ns = ModuleNamespace::new(".").unwrap();
        assert!(ns.is_root());
        assert_eq!(ns.tag_name(&Version::new(1, 2, 3)), "v1.2.3");
        assert_eq!(ns.tag_glob(), "v*");
        assert_eq!(ns.subdir(), None);
    }

    #[test]
    fn test_empty_is_root() {
        assert!(ModuleNamespace::new("").unwrap().is_root());
        assert!(ModuleNamespace::new("./").unwrap().is_root());
    }

    #[test]
    fn test_nested_namespace() {
        let ns = ModuleNamespace::new("./services/api/").unwrap();
        assert_eq!(ns.as_str(), "services/api");
        assert_eq!(
            ns.tag_name(&Version::new(0, 3, 0)),
            "services/api/v0.3.0"
        );
        assert_eq!(ns.tag_glob(), "services/api/v*");
        assert_eq!(ns.subdir(), Some(Path::new("services/api")));
    }

    #[test]
    fn test_backslashes_are_normalized() {
        let ns = ModuleNamespace::new("tools\\lint").unwrap();
        assert_eq!(ns.as_str(), "tools/lint");
    }

    #[test]
    fn test_invalid_namespaces() {
        assert!(ModuleNamespace::new("/abs/path").is_err());
        assert!(ModuleNamespace::new("../outside").is_err());
        assert!(ModuleNamespace::new("has space").is_err());
        assert!(ModuleNamespace::new("a:b").is_err());
        assert!(ModuleNamespace::new("x.lock").is_err());
        assert!(ModuleNamespace::new(".dagger/release").is_err());
        assert!(ModuleNamespace::new("a..b").is_err());
        assert!(ModuleNamespace::new("svc/.hidden").is_err());
        assert!(ModuleNamespace::new("x@{y").is_err());
    }

    #[test]
    fn test_invalid_namespace_is_config_error() {
        let err = ModuleNamespace::new(".dagger/release").unwrap_err();
        assert!(matches!(err, VersionerError::Config(_)));
        assert!(ModuleNamespace::new("dagger/release.v2").is_ok());
    }

    #[test]
    fn test_parse_tag() {
        let ns = ModuleNamespace::new("api").unwrap();
        assert_eq!(ns.parse_tag("api/v1.2.3"), Some(Version::new(1, 2, 3)));
        assert_eq!(ns.parse_tag("api/v1.x.y"), None);
        assert_eq!(ns.parse_tag("web/v1.2.3"), None);
        assert_eq!(ns.parse_tag("v1.2.3"), None);
    }

    #[test]
    fn test_root_does_not_claim_module_tags() {
        let root = ModuleNamespace::root();
        assert_eq!(root.parse_tag("v2.0.0"), Some(Version::new(2, 0, 0)));
        // matches the `v*` glob but belongs to the `vendor` module
        assert_eq!(root.parse_tag("vendor/v1.0.0"), None);
    }

    #[test]
    fn test_parse_tag_keeps_prerelease() {
        let ns = ModuleNamespace::root();
        let v = ns.parse_tag("v2.0.0-rc.1").unwrap();
        assert!(v.is_prerelease());
    }
}
