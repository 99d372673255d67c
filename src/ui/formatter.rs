//! Pure formatting functions for UI output.
//!
//! Human-readable output goes to stderr so stdout can carry a bare version
//! for scripts. The `format_*` functions build strings and are testable; the
//! `display_*` functions print them.

use console::style;

use crate::analyzer::ClassifiedCommit;
use crate::boundary::BoundaryWarning;
use crate::domain::subject_line;
use crate::release::{Release, ReleasePlan, ReleaseStatus};

/// Format and print an error message in red.
pub fn display_error(message: &str) {
    eprintln!("{} {}", style("ERROR:").red().bold(), message);
}

/// Format and print a success message with green checkmark.
pub fn display_success(message: &str) {
    eprintln!("{} {}", style("✓").green(), message);
}

/// Format and print a status message with yellow arrow.
pub fn display_status(message: &str) {
    eprintln!("{} {}", style("→").yellow(), message);
}

/// Display a boundary warning to the user.
pub fn display_boundary_warning(warning: &BoundaryWarning) {
    eprintln!("{} {}", style("⚠ WARNING:").yellow(), warning);
}

/// Display the commits a release is computed from.
///
/// Shows up to 10 subjects with the increment each implies, and the count of
/// the rest.
///
/// # Arguments
/// * `commits` - Classified commits since the latest tag
/// * `namespace` - The module being released
pub fn display_commit_analysis(commits: &[ClassifiedCommit], namespace: &str) {
    eprintln!(
        "\n{}",
        style(format!("Analyzing commits for '{}'", namespace)).bold()
    );
    eprintln!("{}", style(format!("{} commit(s):", commits.len())).underlined());

    for (i, commit) in commits.iter().take(10).enumerate() {
        eprintln!("  {}. {}", i + 1, format_commit_line(commit));
    }

    if commits.len() > 10 {
        eprintln!("  ... and {} more commits", commits.len() - 10);
    }
}

/// One commit as `subject [bump]`, the subject cut to 60 characters
pub fn format_commit_line(commit: &ClassifiedCommit) -> String {
    let subject = subject_line(&commit.info.message);
    let short: String = subject.chars().take(60).collect();
    format!("{} [{}]", short, commit.bump)
}

/// Display the proposed tag change (or initial tag).
pub fn display_proposed_tag(old_tag: Option<&str>, new_tag: &str) {
    match old_tag {
        Some(old) => {
            eprintln!("\n{}", style("Proposed Tag Change:").bold());
            eprintln!("  From: {}", style(old).red());
            eprintln!("  To:   {}", style(new_tag).green());
        }
        None => {
            eprintln!("\n{}", style("Initial Tag:").bold());
            eprintln!("  New tag: {}", style(new_tag).green());
        }
    }
}

/// Summary line for a finished release
pub fn format_release(release: &Release) -> String {
    let mut details = vec![release.status.to_string()];
    if release.status == ReleaseStatus::Created {
        details.push(format!("{} bump", release.bump));
        details.push(format!("{} commit(s)", release.commit_count));
        if !release.updated_files.is_empty() {
            details.push(format!("{} file(s) updated", release.updated_files.len()));
        }
    }
    if release.pushed {
        details.push("pushed".to_string());
    }

    format!("{} {} ({})", release.namespace, release.tag, details.join(", "))
}

/// Summary line for a release that has not happened yet
pub fn format_plan(plan: &ReleasePlan) -> String {
    if plan.already_released {
        return format!("{} is released as {}", plan.namespace, plan.tag);
    }
    match &plan.current.tag {
        Some(current) => format!(
            "{} {} -> {} ({} bump, {} commit(s))",
            plan.namespace,
            current,
            plan.tag,
            plan.bump,
            plan.commits.len()
        ),
        None => format!(
            "{} first release {} ({} commit(s))",
            plan.namespace,
            plan.tag,
            plan.commits.len()
        ),
    }
}

/// Display manual push instruction for a tag.
pub fn display_manual_push_instruction(tag: &str, remote: &str) {
    eprintln!(
        "\n{} To push this tag later, run:\n  {}",
        style("→").yellow(),
        style(format!("git push {} refs/tags/{}", remote, tag)).cyan()
    );
}
