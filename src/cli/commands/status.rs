//! status command - Show the current branch, a pending fuse and the working
//! copy

use anyhow::Result;

use super::{verbosity, Repo};
use crate::core::state::FuseState;
use crate::engine::{Context, StatusReport};
use crate::ui::output;

/// Show the status of the repository.
pub fn status(ctx: &Context) -> Result<()> {
    let repo = Repo::open(ctx)?;
    let report = repo.engine().status()?;
    let verbosity = verbosity(ctx);
    for line in render(&report) {
        output::print(line, verbosity);
    }
    Ok(())
}

fn render(report: &StatusReport) -> Vec<String> {
    let mut lines = Vec::new();

    let mut head = format!("On branch {}", report.branch);
    if let Some(upstream) = &report.upstream {
        head.push_str(&format!(" (upstream {})", upstream));
    }
    if report.tip.is_none() {
        head.push_str(", no commits yet");
    }
    lines.push(head);

    if let Some(fuse) = &report.fuse {
        lines.push(String::new());
        lines.push(format!(
            "{} of {} in progress, {} step{} left",
            capitalize(&fuse.merge_type.to_string()),
            fuse.source,
            fuse.remaining,
            if fuse.remaining == 1 { "" } else { "s" }
        ));
        if let Some(commit) = &fuse.awaiting {
            lines.push(format!("  stopped at {}", output::format_oid(commit)));
        }
        let next = match fuse.state {
            FuseState::Conflicted => {
                "fix the conflicts, mark files with `tbd resolve`, then `tbd commit`"
            }
            FuseState::Finalizing => "all conflicts resolved, `tbd commit` to continue",
            FuseState::Replaying => "interrupted, `tbd fuse --continue` to resume",
            FuseState::Idle => "",
        };
        if !next.is_empty() {
            lines.push(format!("  ({}, or `tbd {} --abort`)", next, fuse.merge_type));
        }
    }

    lines.push(String::new());
    if report.tracked.is_empty() {
        lines.push("No tracked files with modifications".to_string());
    } else {
        lines.push("Tracked files with modifications:".to_string());
        for file in &report.tracked {
            match (file.conflict, file.change) {
                (Some(mark), _) => lines.push(output::format_conflict(&file.path, mark)),
                (None, Some(change)) => lines.push(output::format_change(&file.path, change)),
                (None, None) => {}
            }
        }
    }

    lines.push(String::new());
    if report.untracked.is_empty() {
        lines.push("No untracked files".to_string());
    } else {
        lines.push("Untracked files:".to_string());
        for file in &report.untracked {
            if file.in_reference {
                lines.push(format!("  {} (exists in last commit)", file.path));
            } else {
                lines.push(format!("  {}", file.path));
            }
        }
    }
    lines
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
