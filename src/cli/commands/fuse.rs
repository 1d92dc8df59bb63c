//! fuse command - Replay commits of another branch, or abort or continue a
//! pending fuse

use anyhow::Result;

use super::{verbosity, Repo};
use crate::core::types::BranchName;
use crate::engine::{Context, FuseOutcome, FuseRequest, InsertionPoint};
use crate::ui::output::{self, Verbosity};

/// Fuse commits of `source` (the upstream by default) into the current
/// branch.
///
/// # Arguments
///
/// * `ctx` - Execution context
/// * `source` - Source branch
/// * `only` - Commits to take
/// * `exclude` - Commits to leave out
/// * `insertion_point` - `HEAD`, `dp` or a revision
pub fn fuse(
    ctx: &Context,
    source: Option<String>,
    only: Vec<String>,
    exclude: Vec<String>,
    insertion_point: Option<&str>,
) -> Result<()> {
    let repo = Repo::open(ctx)?;
    let _lock = repo.lock()?;
    let engine = repo.engine();

    let request = FuseRequest {
        source,
        only,
        exclude,
        insertion_point: insertion_point.map(InsertionPoint::parse),
    };
    let branch = engine.current_branch()?;
    let outcome = engine.fuse(&request)?;
    print_outcome(&branch, &outcome, verbosity(ctx));
    Ok(())
}

/// Abort the fuse or merge pending on the current branch.
pub fn abort(ctx: &Context) -> Result<()> {
    let repo = Repo::open(ctx)?;
    let _lock = repo.lock()?;
    let outcome = repo.engine().abort_fuse()?;
    output::print(
        format!("Aborted {} of {}", outcome.merge_type, outcome.source),
        verbosity(ctx),
    );
    Ok(())
}

/// Resume a fuse or merge that stopped between steps.
pub fn continue_op(ctx: &Context) -> Result<()> {
    let repo = Repo::open(ctx)?;
    let _lock = repo.lock()?;
    let engine = repo.engine();
    let branch = engine.current_branch()?;
    let outcome = engine.continue_fuse()?;
    print_outcome(&branch, &outcome, verbosity(ctx));
    Ok(())
}

pub(super) fn print_outcome(branch: &BranchName, outcome: &FuseOutcome, verbosity: Verbosity) {
    let message = match outcome {
        FuseOutcome::FastForward { tip, commits } => format!(
            "Fast-forwarded {} to {} ({} commit{})",
            branch,
            output::format_oid(tip),
            commits,
            if *commits == 1 { "" } else { "s" }
        ),
        FuseOutcome::Finalized {
            tip,
            merge_type,
            source,
        } => format!(
            "Finished {} of {} into {}, now at {}",
            merge_type,
            source,
            branch,
            output::format_oid(tip)
        ),
    };
    output::print(message, verbosity);
}
