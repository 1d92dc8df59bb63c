//! branch command - List, create, delete or configure branches

use anyhow::Result;

use super::{verbosity, Repo};
use crate::engine::{BranchInfo, Context, Engine, EngineError};
use crate::git::Git;
use crate::ui::output;
use crate::ui::prompts;

/// What `tbd branch` was asked to do.
#[derive(Debug)]
pub enum BranchAction {
    /// List branches.
    List { verbose: bool },
    /// Create a branch at `divergent_point` (HEAD by default).
    Create {
        name: String,
        divergent_point: Option<String>,
    },
    /// Delete branches.
    Delete { names: Vec<String>, force: bool },
    /// Set or unset the upstream of the current branch.
    SetUpstream(Option<String>),
}

/// Run a branch action.
pub fn branch(ctx: &Context, action: BranchAction) -> Result<()> {
    let repo = Repo::open(ctx)?;
    let engine = repo.engine();
    let verbosity = verbosity(ctx);

    match action {
        BranchAction::List { verbose } => {
            let branches = engine.branch_list()?;
            if branches.is_empty() {
                output::print("No branches", verbosity);
            }
            for info in &branches {
                output::print(format_branch(info, verbose), verbosity);
            }
        }
        BranchAction::Create {
            name,
            divergent_point,
        } => {
            let _lock = repo.lock()?;
            let tip = engine.branch_create(&name, divergent_point.as_deref())?;
            output::print(
                format!("Created branch {} at {}", name, output::format_oid(&tip)),
                verbosity,
            );
        }
        BranchAction::Delete { names, force } => {
            let _lock = repo.lock()?;
            let interactive = repo.interactive(ctx);
            let mut failed = 0;
            for name in &names {
                match delete_one(&engine, name, force, interactive) {
                    Ok(true) => output::print(format!("Deleted branch {}", name), verbosity),
                    Ok(false) => output::print(format!("Kept branch {}", name), verbosity),
                    Err(err) => {
                        failed += 1;
                        output::error(err);
                    }
                }
            }
            if failed > 0 {
                return Err(super::PathFailures {
                    failed,
                    total: names.len(),
                }
                .into());
            }
        }
        BranchAction::SetUpstream(upstream) => {
            let _lock = repo.lock()?;
            let branch = engine.current_branch()?;
            let message = match engine.set_upstream(upstream.as_deref())? {
                Some(up) => format!("Upstream of {} set to {}", branch, up),
                None => format!("Upstream of {} unset", branch),
            };
            output::print(message, verbosity);
        }
    }
    Ok(())
}

/// Delete `name`, asking before losing commits when interactive.
fn delete_one(
    engine: &Engine<'_, Git>,
    name: &str,
    force: bool,
    interactive: bool,
) -> Result<bool, EngineError> {
    match engine.branch_delete(name, force) {
        Ok(()) => Ok(true),
        Err(err @ EngineError::UnmergedBranch { .. }) if interactive => {
            let question = format!("{}. Delete anyway?", err);
            match prompts::confirm(&question, false, true) {
                Ok(true) => engine.branch_delete(name, true).map(|()| true),
                Ok(false) | Err(prompts::PromptError::Cancelled) => Ok(false),
                Err(e) => Err(EngineError::Internal(e.to_string())),
            }
        }
        Err(err) => Err(err),
    }
}

fn format_branch(info: &BranchInfo, verbose: bool) -> String {
    let marker = if info.is_current { "*" } else { " " };
    let mut line = format!("{} {}", marker, info.name);
    if verbose {
        match &info.tip {
            Some(tip) => line.push_str(&format!(" {}", output::format_oid(tip))),
            None => line.push_str(" (no commits)"),
        }
        if let Some(upstream) = &info.upstream {
            line.push_str(&format!(" [upstream {}]", upstream));
        }
    }
    if let Some(kind) = info.pending {
        line.push_str(&format!(" ({} in progress)", kind));
    }
    line
}
