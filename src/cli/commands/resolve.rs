//! resolve command - Mark conflicted files as resolved

use std::path::PathBuf;

use anyhow::Result;

use super::{report_paths, verbosity, Repo};
use crate::engine::Context;

/// Mark files of the pending fuse or merge step as resolved.
pub fn resolve(ctx: &Context, paths: &[PathBuf]) -> Result<()> {
    let repo = Repo::open(ctx)?;
    let _lock = repo.lock()?;
    let paths = repo.repo_paths(paths)?;
    let outcomes = repo.engine().resolve(&paths)?;
    report_paths(outcomes, verbosity(ctx), |p| {
        format!("File {} marked as resolved", p)
    })
}
