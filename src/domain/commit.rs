use std::sync::OnceLock;

use regex::Regex;

/// Header of a conventional commit: `type(scope)!: description`
const HEADER_PATTERN: &str = r"^(\w+)(\([^)]+\))?(!)?:\s*(.+)$";

fn header_regex() -> Option<&'static Regex> {
    static HEADER: OnceLock<Option<Regex>> = OnceLock::new();
    HEADER.get_or_init(|| Regex::new(HEADER_PATTERN).ok()).as_ref()
}

/// Parsed representation of a conventional commit message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommit {
    pub r#type: String,
    pub scope: Option<String>,
    pub description: String,
    /// `!` directly before the header colon
    pub has_breaking_marker: bool,
}

impl ParsedCommit {
    /// Parse the subject line of a commit message.
    ///
    /// Supports formats:
    /// - type(scope)!: description
    /// - type(scope): description
    /// - type!: description
    /// - type: description
    ///
    /// Anything else (including an empty message) yields `None`.
    pub fn parse(message: &str) -> Option<Self> {
        let subject = subject_line(message);
        let captures = header_regex()?.captures(subject)?;

        let r#type = captures.get(1)?.as_str().to_lowercase();
        let scope = captures.get(2).map(|m| {
            m.as_str()
                .trim_start_matches('(')
                .trim_end_matches(')')
                .to_string()
        });
        let has_breaking_marker = captures.get(3).is_some();
        let description = captures.get(4)?.as_str().trim().to_string();

        Some(ParsedCommit {
            r#type,
            scope,
            description,
            has_breaking_marker,
        })
    }
}

/// First line of a commit message with surrounding whitespace removed
pub fn subject_line(message: &str) -> &str {
    message.lines().next().unwrap_or("").trim()
}
