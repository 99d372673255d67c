use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::{Version, VersionBump};
use crate::error::{Result, VersionerError};
use crate::manifest::ManifestFormat;

/// File name looked up in the working directory and the user config directory.
pub const CONFIG_FILE_NAME: &str = "versioner.toml";

/// Represents the complete configuration for versioner.
///
/// Every section and field has a default, so an empty file (or no file at all)
/// is a valid configuration.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub release: ReleaseConfig,

    #[serde(default)]
    pub conventional_commits: ConventionalCommitsConfig,

    #[serde(default)]
    pub changelog: ChangelogConfig,

    #[serde(default)]
    pub manifests: ManifestsConfig,
}

/// Identity recorded on release commits and annotated tags.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AuthorConfig {
    #[serde(default = "default_author_name")]
    pub name: String,

    #[serde(default = "default_author_email")]
    pub email: String,
}

fn default_author_name() -> String {
    "versioner".to_string()
}

fn default_author_email() -> String {
    "versioner@users.noreply.localhost".to_string()
}

impl Default for AuthorConfig {
    fn default() -> Self {
        AuthorConfig {
            name: default_author_name(),
            email: default_author_email(),
        }
    }
}

/// Tagging and publication policy.
///
/// `bootstrap_version` and `default_bump` are policy choices: a module with no
/// tags is first released as `bootstrap_version`, and a range whose commits
/// imply no increment still advances by `default_bump`.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ReleaseConfig {
    #[serde(default = "default_remote")]
    pub remote: String,

    #[serde(default = "default_true")]
    pub push: bool,

    #[serde(default)]
    pub strict: bool,

    #[serde(default = "default_max_push_attempts")]
    pub max_push_attempts: u32,

    #[serde(default = "default_bootstrap_version")]
    pub bootstrap_version: Version,

    #[serde(default = "default_bump")]
    pub default_bump: VersionBump,

    /// `{tag}`, `{version}` and `{module}` are substituted
    #[serde(default = "default_tag_message")]
    pub tag_message: String,

    #[serde(default = "default_true")]
    pub scope_commits_to_module: bool,

    /// Name of the environment variable holding a push token
    #[serde(default = "default_token_env")]
    pub token_env: String,

    #[serde(default)]
    pub author: AuthorConfig,
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_push_attempts() -> u32 {
    3
}

fn default_bootstrap_version() -> Version {
    Version::new(0, 1, 0)
}

fn default_bump() -> VersionBump {
    VersionBump::Patch
}

fn default_tag_message() -> String {
    "Release {tag}".to_string()
}

fn default_token_env() -> String {
    "VERSIONER_GIT_TOKEN".to_string()
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        ReleaseConfig {
            remote: default_remote(),
            push: true,
            strict: false,
            max_push_attempts: default_max_push_attempts(),
            bootstrap_version: default_bootstrap_version(),
            default_bump: default_bump(),
            tag_message: default_tag_message(),
            scope_commits_to_module: true,
            token_env: default_token_env(),
            author: AuthorConfig::default(),
        }
    }
}

impl ReleaseConfig {
    /// Render the annotated tag message for a release
    pub fn render_tag_message(&self, tag: &str, version: &Version, module: &str) -> String {
        self.tag_message
            .replace("{tag}", tag)
            .replace("{version}", &version.to_string())
            .replace("{module}", module)
    }
}

/// Returns the default commit type to increment table.
fn default_types() -> BTreeMap<String, VersionBump> {
    let mut types = BTreeMap::new();
    types.insert("feat".to_string(), VersionBump::Minor);
    types.insert("fix".to_string(), VersionBump::Patch);
    types.insert("perf".to_string(), VersionBump::Patch);
    types
}

/// Returns the default list of breaking change indicators.
fn default_breaking_change_indicators() -> Vec<String> {
    vec![
        "BREAKING CHANGE:".to_string(),
        "BREAKING-CHANGE:".to_string(),
    ]
}

/// Read the type table with lowercased keys, matching how commit types are parsed
fn lowercase_types<'de, D>(
    deserializer: D,
) -> std::result::Result<BTreeMap<String, VersionBump>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, VersionBump>::deserialize(deserializer)?;
    let mut types = BTreeMap::new();
    for (key, bump) in raw {
        let normalized = key.to_lowercase();
        if let Some(previous) = types.insert(normalized.clone(), bump) {
            if previous != bump {
                return Err(serde::de::Error::custom(format!(
                    "commit type '{}' is configured twice with different increments",
                    normalized
                )));
            }
        }
    }
    Ok(types)
}

/// Configuration for conventional commit analysis.
///
/// Type names are case-insensitive. Types missing from `types` classify as
/// `none`. A `!` before the header
/// colon is always breaking, independent of `breaking_change_indicators`.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ConventionalCommitsConfig {
    #[serde(default = "default_types", deserialize_with = "lowercase_types")]
    pub types: BTreeMap<String, VersionBump>,

    #[serde(default = "default_breaking_change_indicators")]
    pub breaking_change_indicators: Vec<String>,
}

impl Default for ConventionalCommitsConfig {
    fn default() -> Self {
        ConventionalCommitsConfig {
            types: default_types(),
            breaking_change_indicators: default_breaking_change_indicators(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ChangelogConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Relative to the module directory
    #[serde(default = "default_changelog_file")]
    pub file: String,
}

fn default_changelog_file() -> String {
    "CHANGELOG.md".to_string()
}

impl Default for ChangelogConfig {
    fn default() -> Self {
        ChangelogConfig {
            enabled: false,
            file: default_changelog_file(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ManifestsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Commit rewritten manifests (and changelog) before tagging
    #[serde(default = "default_true")]
    pub commit: bool,

    #[serde(default = "default_manifest_formats")]
    pub formats: Vec<ManifestFormat>,
}

fn default_manifest_formats() -> Vec<ManifestFormat> {
    ManifestFormat::ALL.to_vec()
}

impl Default for ManifestsConfig {
    fn default() -> Self {
        ManifestsConfig {
            enabled: true,
            commit: true,
            formats: default_manifest_formats(),
        }
    }
}

impl Config {
    /// Check cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let release = &self.release;

        if release.default_bump == VersionBump::None {
            return Err(VersionerError::config(
                "release.default_bump must be patch, minor or major",
            ));
        }
        if release.max_push_attempts == 0 {
            return Err(VersionerError::config(
                "release.max_push_attempts must be at least 1",
            ));
        }
        if release.remote.trim().is_empty() {
            return Err(VersionerError::config("release.remote must not be empty"));
        }
        if release.tag_message.trim().is_empty() {
            return Err(VersionerError::config(
                "release.tag_message must not be empty",
            ));
        }
        if release.author.name.trim().is_empty() || release.author.email.trim().is_empty() {
            return Err(VersionerError::config(
                "release.author name and email must not be empty",
            ));
        }
        if self
            .conventional_commits
            .breaking_change_indicators
            .iter()
            .any(|indicator| indicator.is_empty())
        {
            return Err(VersionerError::config(
                "conventional_commits.breaking_change_indicators may not contain empty strings",
            ));
        }
        if let Some(key) = self
            .conventional_commits
            .types
            .keys()
            .find(|key| key.chars().any(char::is_uppercase))
        {
            return Err(VersionerError::config(format!(
                "conventional_commits.types key '{}' must be lowercase",
                key
            )));
        }
        if self.changelog.file.trim().is_empty() {
            return Err(VersionerError::config("changelog.file must not be empty"));
        }

        Ok(())
    }
}

/// Parse and validate configuration text.
pub fn parse_config(text: &str) -> Result<Config> {
    let config: Config =
        toml::from_str(text).map_err(|e| VersionerError::config(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

/// Loads configuration from file or returns defaults.
///
/// Attempts to load configuration in the following order:
/// 1. Custom path provided as parameter
/// 2. `versioner.toml` in current directory
/// 3. `versioner/versioner.toml` in the user config directory
/// 4. Default configuration if no file found
///
/// # Returns
/// * `Ok(Config)` - Loaded and validated or default configuration
/// * `Err` - If file exists but cannot be read, parsed or validated
pub fn load_config(config_path: Option<&Path>) -> Result<Config> {
    let path = match config_path {
        Some(path) => Some(path.to_path_buf()),
        None => discover_config(),
    };

    let Some(path) = path else {
        tracing::debug!("no configuration file found, using defaults");
        return Ok(Config::default());
    };

    tracing::debug!(path = %path.display(), "loading configuration");
    let text = fs::read_to_string(&path).map_err(|e| {
        VersionerError::config(format!("Cannot read {}: {}", path.display(), e))
    })?;

    parse_config(&text)
        .map_err(|e| VersionerError::config(format!("{}: {}", path.display(), e)))
}

fn discover_config() -> Option<PathBuf> {
    let local = Path::new(".").join(CONFIG_FILE_NAME);
    if local.exists() {
        return Some(local);
    }

    let user = dirs::config_dir()?.join("versioner").join(CONFIG_FILE_NAME);
    user.exists().then_some(user)
}
