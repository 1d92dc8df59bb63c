//! tag command - List, create or delete tags

use anyhow::Result;

use super::{verbosity, Repo};
use crate::engine::{Context, EngineError};
use crate::ui::output;
use crate::ui::prompts;

/// What `tbd tag` was asked to do.
#[derive(Debug)]
pub enum TagAction {
    /// List tags.
    List,
    /// Create a tag at `commit` (HEAD by default).
    Create { name: String, commit: Option<String> },
    /// Delete tags.
    Delete { names: Vec<String> },
}

/// Run a tag action.
pub fn tag(ctx: &Context, action: TagAction) -> Result<()> {
    let repo = Repo::open(ctx)?;
    let engine = repo.engine();
    let verbosity = verbosity(ctx);

    match action {
        TagAction::List => {
            let tags = engine.tag_list()?;
            if tags.is_empty() {
                output::print("No tags", verbosity);
            }
            for tag in &tags {
                output::print(
                    format!("  {} {}", tag.name, output::format_oid(&tag.target)),
                    verbosity,
                );
            }
        }
        TagAction::Create { name, commit } => {
            let _lock = repo.lock()?;
            let target = engine.tag_create(&name, commit.as_deref())?;
            output::print(
                format!("Created tag {} at {}", name, output::format_oid(&target)),
                verbosity,
            );
        }
        TagAction::Delete { names } => {
            let _lock = repo.lock()?;
            let interactive = repo.interactive(ctx);
            let mut failed = 0;
            for name in &names {
                if interactive && !confirm_delete(name)? {
                    output::print(format!("Kept tag {}", name), verbosity);
                    continue;
                }
                match engine.tag_delete(name) {
                    Ok(()) => output::print(format!("Deleted tag {}", name), verbosity),
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
    }
    Ok(())
}

fn confirm_delete(name: &str) -> Result<bool, EngineError> {
    let question = format!("Tag {} will be removed. Continue?", name);
    match prompts::confirm(&question, false, true) {
        Ok(answer) => Ok(answer),
        Err(prompts::PromptError::Cancelled) => Ok(false),
        Err(e) => Err(EngineError::Internal(e.to_string())),
    }
}
