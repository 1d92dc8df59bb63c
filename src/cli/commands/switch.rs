//! switch command - Switch branches

use anyhow::Result;

use super::{verbosity, Repo};
use crate::engine::Context;
use crate::ui::output;

/// Switch to `target`, parking or moving uncommitted changes.
pub fn switch(ctx: &Context, target: &str, move_over: bool) -> Result<()> {
    let repo = Repo::open(ctx)?;
    let _lock = repo.lock()?;
    let outcome = repo.engine().switch(target, move_over)?;
    let verbosity = verbosity(ctx);

    output::print(format!("Switched to branch {}", outcome.to), verbosity);
    if outcome.moved_changes {
        output::print(
            format!("Uncommitted changes moved over from {}", outcome.from),
            verbosity,
        );
    }
    if outcome.restored_changes {
        output::print(
            format!("Restored uncommitted changes of {}", outcome.to),
            verbosity,
        );
    }
    if let Some(kind) = outcome.restored_fuse {
        output::print(
            format!(
                "A {} is in progress on {}; see `tbd status`",
                kind, outcome.to
            ),
            verbosity,
        );
    }
    Ok(())
}
