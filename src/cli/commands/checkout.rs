//! checkout command - Restore files from a commit

use std::path::PathBuf;

use anyhow::Result;

use super::{report_paths, verbosity, Repo};
use crate::engine::Context;

/// Restore files from `commit_point` (HEAD by default).
pub fn checkout(ctx: &Context, paths: &[PathBuf], commit_point: Option<&str>) -> Result<()> {
    let repo = Repo::open(ctx)?;
    let _lock = repo.lock()?;
    let paths = repo.repo_paths(paths)?;
    let outcomes = repo.engine().checkout_paths(&paths, commit_point)?;
    let from = commit_point.unwrap_or("HEAD");
    report_paths(outcomes, verbosity(ctx), |p| {
        format!("File {} checked out from {}", p, from)
    })
}
