//! Markdown changelog entries built from classified commits

use std::fs;
use std::path::Path;

use crate::analyzer::ClassifiedCommit;
use crate::error::Result;

/// Commit types with a changelog section, in display order
const SECTIONS: &[(&str, &str)] = &[
    ("feat", "Features"),
    ("fix", "Bug Fixes"),
    ("perf", "Performance Improvements"),
    ("refactor", "Code Refactoring"),
    ("docs", "Documentation"),
    ("style", "Styles"),
    ("test", "Tests"),
    ("build", "Build System"),
    ("ci", "Continuous Integration"),
    ("chore", "Chores"),
];

fn bullet(commit: &ClassifiedCommit) -> Option<String> {
    let parsed = commit.parsed.as_ref()?;
    Some(match &parsed.scope {
        Some(scope) => format!("* **{}**: {}", scope, parsed.description),
        None => format!("* {}", parsed.description),
    })
}

fn push_section(out: &mut String, title: &str, bullets: &[String]) {
    out.push_str("\n### ");
    out.push_str(title);
    out.push_str("\n\n");
    for line in bullets {
        out.push_str(line);
        out.push('\n');
    }
}

/// Render the entry for one release.
///
/// Non-conventional commits and types without a section are left out.
/// Breaking commits appear under `BREAKING CHANGES` and again in their
/// type's section.
pub fn render(tag: &str, commits: &[ClassifiedCommit]) -> String {
    let mut out = format!("## {}\n", tag);

    let breaking: Vec<String> = commits
        .iter()
        .filter(|c| c.is_breaking)
        .filter_map(bullet)
        .collect();
    if !breaking.is_empty() {
        push_section(&mut out, "BREAKING CHANGES", &breaking);
    }

    for (kind, title) in SECTIONS {
        let bullets: Vec<String> = commits
            .iter()
            .filter(|c| c.parsed.as_ref().is_some_and(|p| p.r#type == *kind))
            .filter_map(bullet)
            .collect();
        if !bullets.is_empty() {
            push_section(&mut out, title, &bullets);
        }
    }

    out
}

fn has_heading(content: &str, tag: &str) -> bool {
    let heading = format!("## {}", tag);
    content.lines().any(|line| line.trim_end() == heading)
}

/// Insert `entry` into the changelog at `path`.
///
/// The entry goes below a leading `# ` title, or at the top when there is
/// none. Missing files are created. Returns `false` without touching the file
/// when a `## <tag>` heading is already present.
pub fn prepend_entry(path: &Path, tag: &str, entry: &str) -> Result<bool> {
    let existing = if path.exists() {
        fs::read_to_string(path)?
    } else {
        String::new()
    };

    if has_heading(&existing, tag) {
        tracing::debug!(path = %path.display(), tag, "changelog already has entry");
        return Ok(false);
    }

    let entry = entry.trim_end();
    let updated = if existing.starts_with("# ") {
        let (title, rest) = existing.split_once('\n').unwrap_or((existing.as_str(), ""));
        let rest = rest.trim_start_matches(['\n', '\r']);
        if rest.is_empty() {
            format!("{}\n\n{}\n", title, entry)
        } else {
            format!("{}\n\n{}\n\n{}", title, entry, rest)
        }
    } else if existing.trim().is_empty() {
        format!("{}\n", entry)
    } else {
        format!("{}\n\n{}", entry, existing)
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, updated)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::CommitClassifier;
    use crate::git::CommitInfo;
    use tempfile::TempDir;

    fn classified(messages: &[&str]) -> Vec<ClassifiedCommit> {
        let classifier = CommitClassifier::default();
        messages
            .iter()
            .enumerate()
            .map(|(i, m)| {
                classifier.classify_commit(CommitInfo {
                    hash: format!("{:040}", i),
                    message: m.to_string(),
                    paths: Vec::new(),
                })
            })
            .collect()
    }

    #[test]
    fn test_render_sections_in_fixed_order() {
        let commits = classified(&[
            "chore: bump deps",
            "fix(api): handle empty body",
            "feat: add export",
            "Merge branch 'main'",
            "wip: experiment",
        ]);

        assert_eq!(
            render("v1.2.0", &commits),
            "## v1.2.0\n\n### Features\n\n* add export\n\n### Bug Fixes\n\n* **api**: handle empty body\n\n### Chores\n\n* bump deps\n"
        );
    }

    #[test]
    fn test_render_breaking_section_first() {
        let commits = classified(&["feat(core)!: new engine", "refactor: x\n\nBREAKING CHANGE: y"]);
        let rendered = render("core/v2.0.0", &commits);

        let breaking = rendered.find("### BREAKING CHANGES").unwrap();
        let features = rendered.find("### Features").unwrap();
        assert!(breaking < features);
        assert!(rendered.contains("### BREAKING CHANGES\n\n* **core**: new engine\n* x\n"));
        assert!(rendered.contains("### Code Refactoring\n\n* x\n"));
    }

    #[test]
    fn test_render_without_commits() {
        assert_eq!(render("v0.1.0", &[]), "## v0.1.0\n");
    }

    #[test]
    fn test_prepend_below_title() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("CHANGELOG.md");
        fs::write(&path, "# Changelog\n\n## v1.0.0\n\n* first\n").unwrap();

        assert!(prepend_entry(&path, "v1.1.0", "## v1.1.0\n\n* second\n").unwrap());
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "# Changelog\n\n## v1.1.0\n\n* second\n\n## v1.0.0\n\n* first\n"
        );
    }

    #[test]
    fn test_prepend_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("api").join("CHANGELOG.md");

        assert!(prepend_entry(&path, "api/v0.1.0", "## api/v0.1.0\n").unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "## api/v0.1.0\n");
    }

    #[test]
    fn test_prepend_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("CHANGELOG.md");
        let entry = "## v1.0.0\n\n* thing\n";

        assert!(prepend_entry(&path, "v1.0.0", entry).unwrap());
        let first = fs::read_to_string(&path).unwrap();
        assert!(!prepend_entry(&path, "v1.0.0", entry).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), first);
    }

    #[test]
    fn test_prepend_without_title() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("CHANGELOG.md");
        fs::write(&path, "## v1.0.0\n").unwrap();

        prepend_entry(&path, "v1.0.1", "## v1.0.1\n\n* fix\n").unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "## v1.0.1\n\n* fix\n\n## v1.0.0\n"
        );
    }
}
