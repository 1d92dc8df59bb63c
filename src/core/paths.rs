//! core::paths
//!
//! Centralized path routing for tbd's on-disk storage.
//!
//! Branch state, stashes and the tracking record live in Git refs. The few
//! things that must be plain files (the repository lock and the repo-level
//! config) live under `<git_dir>/tbd/`, and every such path is computed
//! here.
//!
//! # Storage Layout
//!
//! - `<git_dir>/tbd/config.toml` - Repository configuration
//! - `<git_dir>/tbd/lock` - Exclusive lock file
//!
//! # Example
//!
//! ```
//! use tbd::core::paths::TbdPaths;
//! use std::path::PathBuf;
//!
//! let paths = TbdPaths::new(PathBuf::from("/repo/.git"));
//! assert_eq!(
//!     paths.repo_config_path(),
//!     PathBuf::from("/repo/.git/tbd/config.toml")
//! );
//! ```

use std::path::{Path, PathBuf};

use crate::git::RepoInfo;

/// Path router for tbd storage.
///
/// No code outside this module should compute `*.join("tbd")` paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TbdPaths {
    /// Path to the .git directory.
    pub git_dir: PathBuf,
}

impl TbdPaths {
    /// Create paths rooted at a git directory.
    pub fn new(git_dir: PathBuf) -> Self {
        Self { git_dir }
    }

    /// Create paths from a repository's info.
    pub fn from_repo_info(info: &RepoInfo) -> Self {
        Self::new(info.git_dir.clone())
    }

    /// Root of tbd's file storage: `<git_dir>/tbd`.
    pub fn repo_tbd_dir(&self) -> PathBuf {
        self.git_dir.join("tbd")
    }

    /// Repository configuration: `<git_dir>/tbd/config.toml`.
    pub fn repo_config_path(&self) -> PathBuf {
        self.repo_tbd_dir().join("config.toml")
    }

    /// Repository lock: `<git_dir>/tbd/lock`.
    pub fn repo_lock_path(&self) -> PathBuf {
        self.repo_tbd_dir().join("lock")
    }

    /// Get the git_dir as a Path reference.
    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }
}
