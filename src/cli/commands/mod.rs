//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Architecture
//!
//! Each command handler:
//! 1. Opens the repository through [`Repo::open`]
//! 2. Takes the repository lock if it mutates anything
//! 3. Calls the engine and prints the outcome
//!
//! Handlers return `anyhow::Result`; engine failures travel as
//! [`EngineError`] inside it so `main` can pick the exit code.

mod branch;
mod checkout;
mod commit;
mod completion;
mod diff;
mod fuse;
mod history;
mod init;
mod merge;
mod resolve;
mod status;
mod switch;
mod tag;
mod track;

pub use branch::{branch, BranchAction};
pub use checkout::checkout;
pub use commit::commit;
pub use completion::completion;
pub use diff::diff;
pub use fuse::{abort, continue_op, fuse};
pub use history::history;
pub use init::init;
pub use merge::merge;
pub use resolve::resolve;
pub use status::status;
pub use switch::switch;
pub use tag::{tag, TagAction};
pub use track::{track, untrack};

use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use thiserror::Error;

use crate::cli::args::Command;
use crate::core::config::Config;
use crate::core::ops::lock::RepoLock;
use crate::core::paths::TbdPaths;
use crate::core::types::RepoPath;
use crate::engine::{Context, Engine, EngineError, PathOutcome};
use crate::git::Git;
use crate::ui::output::{self, Verbosity};

/// Some paths of a multi-path command failed; each was reported already.
#[derive(Debug, Error)]
#[error("{failed} of {total} paths failed")]
pub struct PathFailures {
    /// Failed paths.
    pub failed: usize,
    /// Paths handled.
    pub total: usize,
}

/// An opened repository with its configuration.
pub(crate) struct Repo {
    git: Git,
    paths: TbdPaths,
    work_dir: PathBuf,
    cwd: PathBuf,
    config: Config,
}

impl Repo {
    /// Open the repository containing the context's working directory.
    pub(crate) fn open(ctx: &Context) -> Result<Self> {
        let cwd = working_dir(ctx)?;
        let git = Git::open(&cwd).map_err(EngineError::from)?;
        let info = git.info().map_err(EngineError::from)?;
        let paths = TbdPaths::from_repo_info(&info);

        let loaded = Config::load(Some(&paths))?;
        let verbosity = verbosity(ctx);
        for warning in &loaded.warnings {
            output::warn(
                format!("{} ({})", warning.message, warning.path.display()),
                verbosity,
            );
        }
        let config = loaded.config;
        let git = git.with_fallback_identity(config.user_name(), config.user_email());

        Ok(Self {
            git,
            paths,
            work_dir: info.work_dir,
            cwd,
            config,
        })
    }

    /// Engine over this repository with the configured defaults.
    pub(crate) fn engine(&self) -> Engine<'_, Git> {
        Engine::new(&self.git).with_insertion_point(self.config.fuse_insertion_point())
    }

    /// Take the repository lock for a mutating command.
    pub(crate) fn lock(&self) -> Result<RepoLock, EngineError> {
        Ok(RepoLock::acquire(&self.paths)?)
    }

    /// Normalize user paths against the working directory.
    pub(crate) fn repo_paths(&self, paths: &[PathBuf]) -> Result<Vec<RepoPath>, EngineError> {
        paths
            .iter()
            .map(|p| RepoPath::from_user_path(&self.work_dir, &self.cwd, p).map_err(EngineError::from))
            .collect()
    }

    /// Whether prompts may be shown.
    pub(crate) fn interactive(&self, ctx: &Context) -> bool {
        ctx.interactive
            .unwrap_or_else(|| self.config.interactive() && std::io::stdin().is_terminal())
    }
}

/// The directory commands run in, canonicalized so it compares with the
/// repository's working directory.
fn working_dir(ctx: &Context) -> Result<PathBuf> {
    let dir = match &ctx.cwd {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("failed to read the current directory")?,
    };
    dir.canonicalize()
        .with_context(|| format!("failed to access {}", dir.display()))
}

pub(crate) fn verbosity(ctx: &Context) -> Verbosity {
    Verbosity::from_flags(ctx.quiet, ctx.debug)
}

/// Print per-path outcomes; fails with [`PathFailures`] if any path failed.
pub(crate) fn report_paths(
    outcomes: Vec<PathOutcome>,
    verbosity: Verbosity,
    done: impl Fn(&RepoPath) -> String,
) -> Result<()> {
    let total = outcomes.len();
    let mut failed = 0;
    for outcome in outcomes {
        match outcome.result {
            Ok(()) => output::print(done(&outcome.path), verbosity),
            Err(err) => {
                failed += 1;
                output::error(err);
            }
        }
    }
    if failed > 0 {
        return Err(PathFailures { failed, total }.into());
    }
    Ok(())
}

/// Dispatch a command to its handler.
pub fn dispatch(command: Command, ctx: &Context) -> Result<()> {
    match command {
        Command::Init { path } => init::init(ctx, path.as_deref()),
        Command::Track { paths } => track::track(ctx, &paths),
        Command::Untrack { paths } => track::untrack(ctx, &paths),
        Command::Status => status::status(ctx),
        Command::Diff { paths } => diff::diff(ctx, &paths),
        Command::Checkout {
            paths,
            commit_point,
        } => checkout::checkout(ctx, &paths, commit_point.as_deref()),
        Command::Commit {
            message,
            only,
            include,
            exclude,
        } => commit::commit(ctx, &message, &only, &include, &exclude),
        Command::Branch {
            create,
            divergent_point,
            delete,
            force,
            set_upstream,
            unset_upstream,
            verbose,
        } => {
            let action = if let Some(name) = create {
                BranchAction::Create {
                    name,
                    divergent_point,
                }
            } else if !delete.is_empty() {
                BranchAction::Delete {
                    names: delete,
                    force,
                }
            } else if let Some(upstream) = set_upstream {
                BranchAction::SetUpstream(Some(upstream))
            } else if unset_upstream {
                BranchAction::SetUpstream(None)
            } else {
                BranchAction::List { verbose }
            };
            branch::branch(ctx, action)
        }
        Command::Tag {
            create,
            commit,
            delete,
        } => {
            let action = if let Some(name) = create {
                TagAction::Create { name, commit }
            } else if !delete.is_empty() {
                TagAction::Delete { names: delete }
            } else {
                TagAction::List
            };
            tag::tag(ctx, action)
        }
        Command::Switch { branch, move_over } => switch::switch(ctx, &branch, move_over),
        Command::Fuse {
            src,
            only,
            exclude,
            insertion_point,
            abort,
            continue_op,
        } => {
            if abort {
                fuse::abort(ctx)
            } else if continue_op {
                fuse::continue_op(ctx)
            } else {
                fuse::fuse(ctx, src, only, exclude, insertion_point.as_deref())
            }
        }
        Command::Merge { src, abort } => {
            if abort {
                fuse::abort(ctx)
            } else {
                merge::merge(ctx, src.as_deref())
            }
        }
        Command::Resolve { paths } => resolve::resolve(ctx, &paths),
        Command::History { limit, verbose } => history::history(ctx, limit, verbose),
        Command::Completion { shell } => completion::completion(shell),
    }
}
