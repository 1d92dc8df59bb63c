//! init command - Create an empty repository

use std::path::Path;

use anyhow::{Context as _, Result};

use super::verbosity;
use crate::core::config::{Config, RepoConfig};
use crate::core::paths::TbdPaths;
use crate::core::types::BranchName;
use crate::engine::{Context, EngineError};
use crate::git::Git;
use crate::ui::output;

/// Name of the branch a new repository starts on.
pub const INITIAL_BRANCH: &str = "main";

/// Create a repository at `path`, or in the working directory.
///
/// # Errors
///
/// [`EngineError::AlreadyARepo`] if the directory is inside a repository.
pub fn init(ctx: &Context, path: Option<&Path>) -> Result<()> {
    let base = match &ctx.cwd {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("failed to read the current directory")?,
    };
    let target = match path {
        Some(p) => base.join(p),
        None => base,
    };

    if Git::open(&target).is_ok() {
        return Err(EngineError::AlreadyARepo { path: target }.into());
    }

    let branch = BranchName::new(INITIAL_BRANCH).map_err(EngineError::from)?;
    let git = Git::init(&target, &branch).map_err(EngineError::from)?;
    let info = git.info().map_err(EngineError::from)?;
    let paths = TbdPaths::from_repo_info(&info);
    let config_path = Config::write_repo(&paths, &RepoConfig::default())?;
    tracing::debug!(config = %config_path.display(), "wrote repository config");

    output::print(
        format!("Initialized empty tbd repository in {}", info.work_dir.display()),
        verbosity(ctx),
    );
    Ok(())
}
