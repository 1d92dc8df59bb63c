//! merge command - Merge another branch into the current one

use anyhow::Result;

use super::fuse::print_outcome;
use super::{verbosity, Repo};
use crate::engine::Context;

/// Merge `source` (the upstream by default) into the current branch.
pub fn merge(ctx: &Context, source: Option<&str>) -> Result<()> {
    let repo = Repo::open(ctx)?;
    let _lock = repo.lock()?;
    let engine = repo.engine();
    let branch = engine.current_branch()?;
    let outcome = engine.merge(source)?;
    print_outcome(&branch, &outcome, verbosity(ctx));
    Ok(())
}
