//! engine::error
//!
//! The flat error taxonomy of engine operations.
//!
//! Lower layers have their own `thiserror` enums; they are folded into
//! [`EngineError`] here so the CLI can map every failure to an exit code.
//! User-facing conditions exit with 1, repository discovery failures with 4
//! and everything else (engine or storage failures) with 3.

use std::path::PathBuf;

use thiserror::Error;

use crate::core::conflicts::ConflictError;
use crate::core::ops::lock::LockError;
use crate::core::range::RangeError;
use crate::core::state::{MergeType, StoreError};
use crate::core::tracking::TrackingError;
use crate::core::types::{BranchName, Oid, RepoPath, TypeError};
use crate::git::GitError;

/// Exit code for success.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for user-facing errors.
pub const EXIT_ERRORS_FOUND: i32 = 1;
/// Exit code for internal errors.
pub const EXIT_INTERNAL_ERROR: i32 = 3;
/// Exit code when not inside a repository.
pub const EXIT_NOT_IN_REPO: i32 = 4;

fn join_paths(paths: &[RepoPath]) -> String {
    paths
        .iter()
        .map(RepoPath::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors from engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No repository at or above the given directory.
    #[error("not in a tbd repository: {}", path.display())]
    NotInRepo { path: PathBuf },

    /// `tbd init` in a directory that already is a repository.
    #[error("{} is already a repository", path.display())]
    AlreadyARepo { path: PathBuf },

    /// The path is already tracked.
    #[error("{0} is already tracked")]
    AlreadyTracked(RepoPath),

    /// The path is not tracked.
    #[error("{0} is not tracked")]
    NotTracked(RepoPath),

    /// The path exists neither in the working copy nor in the reference tree.
    #[error("{0} doesn't exist")]
    FileNotFound(String),

    /// A path that can't name a file of the repository.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// No source given and the branch has no upstream.
    #[error("no source branch given and {0} has no upstream set")]
    NoUpstream(BranchName),

    /// A revision does not name a usable commit.
    #[error("invalid commit: {0}")]
    InvalidCommit(String),

    /// The selection of commits is empty.
    #[error("No commits to fuse")]
    NothingToFuse,

    /// A replay step stopped on conflicts.
    #[error("conflicts while applying {}: {}", commit.short(7), join_paths(paths))]
    Conflict { commit: Oid, paths: Vec<RepoPath> },

    /// Commit attempted while conflicts are unresolved.
    #[error("unresolved conflicts in {}", join_paths(.0))]
    UnresolvedConflicts(Vec<RepoPath>),

    /// `resolve` on a path with no pending conflict.
    #[error("{0} has no conflicts")]
    NotConflicted(RepoPath),

    /// Saved uncommitted changes could not be re-applied cleanly.
    #[error(
        "failed to apply uncommitted changes: conflicts in {}; the changes are kept at {stash_ref}",
        join_paths(paths)
    )]
    ApplyFailed {
        paths: Vec<RepoPath>,
        stash_ref: String,
    },

    /// A commit would not change anything.
    #[error("nothing to commit")]
    NothingToCommit,

    /// A commit needs a message.
    #[error("commit message cannot be empty")]
    EmptyMessage,

    /// Path selection flags given while a step awaits its commit.
    #[error("path selection is not supported while a {0} step is being committed")]
    PathSelectionDuringFuse(MergeType),

    /// Another fuse or merge is pending on the branch.
    #[error("a {merge_type} is already in progress on {branch}; commit it or abort it first")]
    FuseInProgress {
        branch: BranchName,
        merge_type: MergeType,
    },

    /// Nothing to abort or commit.
    #[error("no fuse or merge in progress on {0}")]
    NoFuseInProgress(BranchName),

    /// The branch has no commits and cannot be replayed onto.
    #[error("{0} has no commits yet; fuse all of the source or commit first")]
    NoCommits(BranchName),

    /// Branch already exists.
    #[error("branch {0} already exists")]
    BranchExists(BranchName),

    /// Branch does not exist.
    #[error("branch {0} doesn't exist")]
    BranchNotFound(String),

    /// Invalid branch name.
    #[error("invalid branch name: {0}")]
    InvalidBranchName(String),

    /// Cannot delete the checked-out branch.
    #[error("can't remove the current branch {0}")]
    CannotDeleteCurrent(BranchName),

    /// Deleting would lose commits.
    #[error("branch {branch} has commits not contained in {target}")]
    UnmergedBranch { branch: BranchName, target: String },

    /// Tag already exists.
    #[error("tag {0} already exists")]
    TagExists(String),

    /// Tag does not exist.
    #[error("tag {0} doesn't exist")]
    TagNotFound(String),

    /// Invalid tag name.
    #[error("invalid tag name: {0}")]
    InvalidTagName(String),

    /// Switch to the current branch.
    #[error("you are already on branch {0}")]
    AlreadyOnBranch(BranchName),

    /// HEAD does not point at a branch.
    #[error("HEAD is detached; switch to a branch first")]
    DetachedHead,

    /// Another tbd process holds the repository lock.
    #[error("repository is locked by another tbd process")]
    Locked,

    /// Engine failure.
    #[error("git error: {0}")]
    Git(GitError),

    /// Branch state storage failure.
    #[error("state error: {0}")]
    Store(#[from] StoreError),

    /// Anything else unexpected.
    #[error("{0}")]
    Internal(String),
}

impl EngineError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            EngineError::NotInRepo { .. } => EXIT_NOT_IN_REPO,
            EngineError::Git(_) | EngineError::Store(_) | EngineError::Internal(_) => {
                EXIT_INTERNAL_ERROR
            }
            _ => EXIT_ERRORS_FOUND,
        }
    }

    /// Whether this is an internal failure rather than a user error.
    pub fn is_internal(&self) -> bool {
        self.exit_code() == EXIT_INTERNAL_ERROR
    }
}

impl From<GitError> for EngineError {
    fn from(err: GitError) -> Self {
        match err {
            GitError::NotARepo { path } => EngineError::NotInRepo { path },
            other => EngineError::Git(other),
        }
    }
}

impl From<TrackingError> for EngineError {
    fn from(err: TrackingError) -> Self {
        match err {
            TrackingError::FileNotFound(path) => EngineError::FileNotFound(path),
            TrackingError::AlreadyTracked(path) => EngineError::AlreadyTracked(path),
            TrackingError::NotTracked(path) => EngineError::NotTracked(path),
            TrackingError::GitError(e) => e.into(),
            other => EngineError::Internal(other.to_string()),
        }
    }
}

impl From<RangeError> for EngineError {
    fn from(err: RangeError) -> Self {
        match err {
            RangeError::InvalidCommit(id) => EngineError::InvalidCommit(id),
            RangeError::NothingToFuse => EngineError::NothingToFuse,
        }
    }
}

impl From<ConflictError> for EngineError {
    fn from(err: ConflictError) -> Self {
        match err {
            ConflictError::NotConflicted(path) => EngineError::NotConflicted(path),
        }
    }
}

impl From<TypeError> for EngineError {
    fn from(err: TypeError) -> Self {
        match err {
            TypeError::InvalidBranchName(msg) => EngineError::InvalidBranchName(msg),
            TypeError::InvalidPath(msg) => EngineError::InvalidPath(msg),
            other => EngineError::Internal(other.to_string()),
        }
    }
}

impl From<LockError> for EngineError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::AlreadyLocked => EngineError::Locked,
            other => EngineError::Internal(other.to_string()),
        }
    }
}
