//! Pure formatting functions for UI output.
//!
//! This module contains all display/formatting logic separated from user interaction.
//! `format_*` functions build strings and are unit tested; `display_*`
//! functions print them.

use std::path::Path;

use console::style;

use crate::boundary::BoundaryWarning;
use crate::domain::TagPattern;
use crate::git::FileChange;
use crate::release::plan::ReleasePlan;
use crate::release::{PackageOutcome, ReleaseState};

/// Format and print an error message in red.
pub fn display_error(message: &str) {
    eprintln!("{} {}", style("ERROR:").red().bold(), message);
}

/// Format and print a success message with green checkmark.
pub fn display_success(message: &str) {
    println!("{} {}", style("✓").green(), message);
}

/// Format and print a status message with yellow arrow.
pub fn display_status(message: &str) {
    println!("{} {}", style("→").yellow(), message);
}

/// Display a boundary warning to the user.
pub fn display_boundary_warning(warning: &BoundaryWarning) {
    eprintln!("{} {}", style("⚠ WARNING:").yellow(), warning);
}

/// One status line per change, numbered for selection.
///
/// The index letter is green and the worktree letter red, like `git status -s`.
pub fn format_file_changes(changes: &[FileChange]) -> Vec<String> {
    changes
        .iter()
        .enumerate()
        .map(|(i, change)| {
            format!(
                "{}{} {} ({})",
                style(change.index).green(),
                style(change.worktree).red(),
                change.path,
                i
            )
        })
        .collect()
}

/// Display the working-tree status of a repository before file selection.
pub fn display_file_changes(package: &str, workdir: &Path, changes: &[FileChange]) {
    println!(
        "\n{} {} ({})",
        style("Repository:").bold(),
        style(package).cyan(),
        workdir.display()
    );
    for line in format_file_changes(changes) {
        println!("  {}", line);
    }
}

/// One line per planned package: tag change, or why it is skipped
pub fn format_plan(plan: &ReleasePlan, tag_format: &TagPattern) -> Vec<String> {
    plan.packages
        .iter()
        .map(|pkg| {
            let from = pkg.latest_tag.as_deref().unwrap_or("(untagged)");
            if pkg.release {
                let mut line = format!(
                    "{}: {} -> {}",
                    pkg.spec.name,
                    from,
                    pkg.new_tag(tag_format)
                );
                if !pkg.pins.is_empty() {
                    let pins: Vec<String> = pkg
                        .pins
                        .iter()
                        .map(|(dep, version)| format!("{}>={}", dep, version))
                        .collect();
                    line.push_str(&format!(" [pins {}]", pins.join(", ")));
                }
                line
            } else {
                format!("{}: {} (no changes)", pkg.spec.name, from)
            }
        })
        .collect()
}

/// Display the release plan before any repository is modified.
pub fn display_plan(plan: &ReleasePlan, tag_format: &TagPattern) {
    println!(
        "\n{} ({} bump)",
        style("Release plan:").bold(),
        plan.policy
    );
    for (pkg, line) in plan.packages.iter().zip(format_plan(plan, tag_format)) {
        if pkg.release {
            println!("  {}", style(line).green());
        } else {
            println!("  {}", style(line).dim());
        }
    }
}

/// Summary line for one package after the run
pub fn format_outcome(outcome: &PackageOutcome) -> String {
    match (&outcome.state, &outcome.result) {
        (ReleaseState::Done, Some(result)) => format!(
            "{}: tagged {} at {}",
            outcome.package,
            result.new_tag,
            &result.commit_sha[..result.commit_sha.len().min(7)]
        ),
        (state, _) => format!("{}: {}", outcome.package, state),
    }
}

/// Display what happened to every processed package.
pub fn display_release_summary(outcomes: &[PackageOutcome]) {
    if outcomes.is_empty() {
        return;
    }
    println!("\n{}", style("Summary:").bold());
    for outcome in outcomes {
        let line = format_outcome(outcome);
        match outcome.state {
            ReleaseState::Done => println!("  {} {}", style("✓").green(), line),
            ReleaseState::Cancelled => println!("  {} {}", style("✗").red(), line),
            _ => println!("  {} {}", style("-").dim(), line),
        }
    }
}

/// Display manual push instruction for released tags.
pub fn display_publish_instruction(pkgtags_path: &Path) {
    println!(
        "\n{} To push the release and trigger the workflow, run:\n  {}",
        style("→").yellow(),
        style(format!("conductor publish --pkgtags {}", pkgtags_path.display())).cyan()
    );
}
