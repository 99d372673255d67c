use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use semver::{BuildMetadata, Prerelease};
use serde::{Deserialize, Serialize};

use crate::error::{Result, VersionerError};

/// Semantic version representation
///
/// Ordered by semver precedence. Build metadata only breaks ties so that the
/// ordering agrees with equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre: Prerelease,
    pub build: BuildMetadata,
}

impl Version {
    /// Create a new release version without pre-release or build metadata
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Version {
            major,
            minor,
            patch,
            pre: Prerelease::EMPTY,
            build: BuildMetadata::EMPTY,
        }
    }

    /// Parse a bare version string such as `1.2.3` or `1.2.3-rc.1+build.5`
    pub fn parse(input: &str) -> Result<Self> {
        let parsed = semver::Version::parse(input.trim()).map_err(|e| {
            VersionerError::version(format!("Invalid version '{}': {}", input, e))
        })?;

        Ok(Version {
            major: parsed.major,
            minor: parsed.minor,
            patch: parsed.patch,
            pre: parsed.pre,
            build: parsed.build,
        })
    }

    pub fn is_prerelease(&self) -> bool {
        !self.pre.is_empty()
    }

    /// Bump version according to bump type
    ///
    /// Lower components reset to zero; pre-release and build metadata are
    /// always dropped. `VersionBump::None` keeps the numeric triple. Fails
    /// when the incremented component is already `u64::MAX`.
    pub fn bump(&self, bump_type: VersionBump) -> Result<Self> {
        let overflow = || VersionerError::version(format!("Cannot bump {} ({})", self, bump_type));
        Ok(match bump_type {
            VersionBump::Major => {
                Version::new(self.major.checked_add(1).ok_or_else(overflow)?, 0, 0)
            }
            VersionBump::Minor => Version::new(
                self.major,
                self.minor.checked_add(1).ok_or_else(overflow)?,
                0,
            ),
            VersionBump::Patch => Version::new(
                self.major,
                self.minor,
                self.patch.checked_add(1).ok_or_else(overflow)?,
            ),
            VersionBump::None => Version::new(self.major, self.minor, self.patch),
        })
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
            .then_with(|| self.pre.cmp(&other.pre))
            .then_with(|| self.build.cmp(&other.build))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.pre.is_empty() {
            write!(f, "-{}", self.pre)?;
        }
        if !self.build.is_empty() {
            write!(f, "+{}", self.build)?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = VersionerError;

    fn from_str(s: &str) -> Result<Self> {
        Version::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = VersionerError;

    fn try_from(value: String) -> Result<Self> {
        Version::parse(&value)
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.to_string()
    }
}

/// Version increment implied by a commit, or by a whole range of commits.
///
/// Variants are declared in increasing order so `max` folds a range.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum VersionBump {
    #[default]
    None,
    Patch,
    Minor,
    Major,
}

impl fmt::Display for VersionBump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VersionBump::None => "none",
            VersionBump::Patch => "patch",
            VersionBump::Minor => "minor",
            VersionBump::Major => "major",
        };
        f.write_str(name)
    }
}
