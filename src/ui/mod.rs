//! User interface module - terminal output for the CLI.
//!
//! The CLI never prompts: it runs unattended in CI, so every decision comes
//! from flags and configuration.

pub mod formatter;

pub use formatter::{
    display_boundary_warning, display_commit_analysis, display_error,
    display_manual_push_instruction, display_proposed_tag, display_status, display_success,
    format_commit_line, format_plan, format_release,
};

use crate::release::Release;

/// Print every warning a release collected
pub fn display_release_warnings(release: &Release) {
    for warning in &release.warnings {
        display_boundary_warning(warning);
    }
}
