//! Writing a release version into package manifests
//!
//! TOML manifests are edited line by line inside the section that owns the
//! `version` key, so comments and formatting survive. The file must parse
//! before it is touched.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::Version;
use crate::error::VersionerError;

/// Manifest kinds the updater recognizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ManifestFormat {
    CargoToml,
    PyprojectToml,
    PackageJson,
    VersionFile,
}

impl ManifestFormat {
    pub const ALL: [ManifestFormat; 4] = [
        ManifestFormat::CargoToml,
        ManifestFormat::PyprojectToml,
        ManifestFormat::PackageJson,
        ManifestFormat::VersionFile,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            ManifestFormat::CargoToml => "Cargo.toml",
            ManifestFormat::PyprojectToml => "pyproject.toml",
            ManifestFormat::PackageJson => "package.json",
            ManifestFormat::VersionFile => "VERSION",
        }
    }

    /// TOML tables whose `version` key is rewritten
    fn toml_sections(self) -> &'static [&'static str] {
        match self {
            ManifestFormat::CargoToml => &["package", "workspace.package"],
            ManifestFormat::PyprojectToml => &["project", "tool.poetry"],
            _ => &[],
        }
    }

    /// New file contents, or `None` when there is nothing to change
    pub fn rewrite(self, content: &str, version: &Version) -> Result<Option<String>, String> {
        match self {
            ManifestFormat::CargoToml | ManifestFormat::PyprojectToml => {
                rewrite_toml(content, self.toml_sections(), version)
            }
            ManifestFormat::PackageJson => rewrite_package_json(content, version),
            ManifestFormat::VersionFile => {
                let updated = format!("{}\n", version);
                Ok((content != updated).then_some(updated))
            }
        }
    }
}

impl fmt::Display for ManifestFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// Outcome of one manifest pass
#[derive(Debug, Default)]
pub struct ManifestReport {
    /// Rewritten files, relative to the repository root
    pub updated: Vec<PathBuf>,
    /// Files that exist but could not be updated
    pub failures: Vec<VersionerError>,
}

/// Write `version` into every recognized manifest in the module directory.
///
/// Missing files are skipped. A file that cannot be parsed or written is
/// reported in [ManifestReport::failures] and left untouched.
///
/// # Arguments
/// * `repo_root` - Working tree root
/// * `module_dir` - Module directory relative to the root, `None` for the root
/// * `formats` - Formats to look for
/// * `version` - Version to write
pub fn update_manifests(
    repo_root: &Path,
    module_dir: Option<&Path>,
    formats: &[ManifestFormat],
    version: &Version,
) -> ManifestReport {
    let mut report = ManifestReport::default();

    for format in formats {
        let relative = match module_dir {
            Some(dir) => dir.join(format.file_name()),
            None => PathBuf::from(format.file_name()),
        };
        let path = repo_root.join(&relative);
        if !path.is_file() {
            continue;
        }

        match update_file(&path, *format, version) {
            Ok(true) => {
                tracing::debug!(path = %relative.display(), %version, "manifest updated");
                report.updated.push(relative);
            }
            Ok(false) => {
                tracing::debug!(path = %relative.display(), "manifest already current");
            }
            Err(message) => report
                .failures
                .push(VersionerError::manifest(relative, message)),
        }
    }

    report
}

fn update_file(path: &Path, format: ManifestFormat, version: &Version) -> Result<bool, String> {
    let content = fs::read_to_string(path).map_err(|e| e.to_string())?;
    match format.rewrite(&content, version)? {
        Some(updated) => {
            fs::write(path, updated).map_err(|e| e.to_string())?;
            Ok(true)
        }
        None => Ok(false),
    }
}

fn version_line_regex() -> Option<&'static Regex> {
    static LINE: OnceLock<Option<Regex>> = OnceLock::new();
    LINE.get_or_init(|| {
        Regex::new(r#"^(\s*version\s*=\s*)("[^"]*"|'[^']*')(.*)$"#).ok()
    })
    .as_ref()
}

fn has_string_version(table: &toml::Table, section: &str) -> bool {
    let mut current = table;
    for key in section.split('.') {
        match current.get(key).and_then(toml::Value::as_table) {
            Some(next) => current = next,
            None => return false,
        }
    }
    matches!(current.get("version"), Some(toml::Value::String(_)))
}

/// Section named by a `[header]` line, `None` for anything else
fn section_header(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.starts_with("[[") {
        return Some(trimmed.to_string());
    }
    let inner = trimmed.strip_prefix('[')?;
    let end = inner.find(']')?;
    Some(
        inner[..end]
            .split('.')
            .map(|part| part.trim().trim_matches('"'))
            .collect::<Vec<_>>()
            .join("."),
    )
}

fn rewrite_toml(
    content: &str,
    sections: &[&str],
    version: &Version,
) -> Result<Option<String>, String> {
    let table: toml::Table = toml::from_str(content).map_err(|e| format!("invalid TOML: {}", e))?;

    let targets: Vec<&str> = sections
        .iter()
        .copied()
        .filter(|section| has_string_version(&table, section))
        .collect();
    if targets.is_empty() {
        // Inherited (`version.workspace = true`) or dynamic versions
        return Ok(None);
    }

    let line_regex =
        version_line_regex().ok_or_else(|| "version pattern unavailable".to_string())?;

    let mut current: Option<String> = None;
    let mut rewritten = String::with_capacity(content.len());
    for line in content.split_inclusive('\n') {
        if let Some(header) = section_header(line) {
            current = Some(header);
            rewritten.push_str(line);
            continue;
        }

        let in_target = current
            .as_deref()
            .is_some_and(|section| targets.contains(&section));
        let (body, ending) = split_line_ending(line);

        match line_regex.captures(body).filter(|_| in_target) {
            Some(captures) => {
                let quote = if captures[2].starts_with('\'') { '\'' } else { '"' };
                rewritten.push_str(&captures[1]);
                rewritten.push(quote);
                rewritten.push_str(&version.to_string());
                rewritten.push(quote);
                rewritten.push_str(&captures[3]);
                rewritten.push_str(ending);
            }
            None => rewritten.push_str(line),
        }
    }

    Ok((rewritten != content).then_some(rewritten))
}

fn split_line_ending(line: &str) -> (&str, &str) {
    let body = line.trim_end_matches(['\n', '\r']);
    (body, &line[body.len()..])
}

fn rewrite_package_json(content: &str, version: &Version) -> Result<Option<String>, String> {
    let mut document: serde_json::Value =
        serde_json::from_str(content).map_err(|e| format!("invalid JSON: {}", e))?;

    let object = document
        .as_object_mut()
        .ok_or_else(|| "top level is not an object".to_string())?;

    let rendered = version.to_string();
    match object.get("version") {
        Some(serde_json::Value::String(existing)) if *existing == rendered => return Ok(None),
        Some(serde_json::Value::String(_)) => {}
        Some(_) => return Err("\"version\" is not a string".to_string()),
        None => return Ok(None),
    }
    object.insert("version".to_string(), serde_json::Value::String(rendered));

    let mut updated =
        serde_json::to_string_pretty(&document).map_err(|e| e.to_string())?;
    updated.push('\n');
    Ok(Some(updated))
}
