//! commit command - Record changes on the current branch

use std::path::PathBuf;

use anyhow::Result;

use super::fuse::print_outcome;
use super::{verbosity, Repo};
use crate::engine::{CommitRequest, Context};
use crate::ui::output;

/// Commit tracked changes, or the selected paths.
///
/// # Arguments
///
/// * `ctx` - Execution context
/// * `message` - Commit message
/// * `only` - Commit exactly these paths
/// * `include` - Also commit these paths
/// * `exclude` - Leave these paths out
pub fn commit(
    ctx: &Context,
    message: &str,
    only: &[PathBuf],
    include: &[PathBuf],
    exclude: &[PathBuf],
) -> Result<()> {
    let repo = Repo::open(ctx)?;
    let _lock = repo.lock()?;
    let engine = repo.engine();
    let verbosity = verbosity(ctx);

    let request = CommitRequest {
        message: message.to_string(),
        only: repo.repo_paths(only)?,
        include: repo.repo_paths(include)?,
        exclude: repo.repo_paths(exclude)?,
    };
    let branch = engine.current_branch()?;
    let outcome = engine.commit(&request)?;

    output::print(
        format!(
            "Committed {} on branch {}",
            output::format_oid(&outcome.commit),
            branch
        ),
        verbosity,
    );
    for (path, change) in &outcome.paths {
        output::print(output::format_change(path, *change), verbosity);
    }
    if let Some(fuse) = &outcome.fuse {
        print_outcome(&branch, fuse, verbosity);
    }
    Ok(())
}
