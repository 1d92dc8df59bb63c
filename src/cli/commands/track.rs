//! track and untrack commands - Choose the files commits pick up

use std::path::PathBuf;

use anyhow::Result;

use super::{report_paths, verbosity, Repo};
use crate::engine::Context;

/// Start tracking files.
pub fn track(ctx: &Context, paths: &[PathBuf]) -> Result<()> {
    let repo = Repo::open(ctx)?;
    let _lock = repo.lock()?;
    let paths = repo.repo_paths(paths)?;
    let outcomes = repo.engine().track(&paths)?;
    report_paths(outcomes, verbosity(ctx), |p| {
        format!("The file {} is now a tracked file", p)
    })
}

/// Stop tracking files.
pub fn untrack(ctx: &Context, paths: &[PathBuf]) -> Result<()> {
    let repo = Repo::open(ctx)?;
    let _lock = repo.lock()?;
    let paths = repo.repo_paths(paths)?;
    let outcomes = repo.engine().untrack(&paths)?;
    report_paths(outcomes, verbosity(ctx), |p| {
        format!("The file {} is now an untracked file", p)
    })
}
