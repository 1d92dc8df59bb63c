//! git
//!
//! Single interface for all version-control operations.
//!
//! # Architecture
//!
//! This module is the **ONLY doorway** to Git. The rest of the crate talks to
//! the [`Vcs`] trait; [`Git`] implements it with `git2`, and
//! [`mock::MockVcs`] implements it in memory for tests. No other module
//! imports `git2`.
//!
//! # Responsibilities
//!
//! - Repository discovery, opening and creation
//! - Ref operations (read, CAS update, delete, enumerate)
//! - Object operations (blobs, flattened trees, commits)
//! - Ancestry queries (merge-base, is-ancestor, ancestry difference)
//! - Whole-tree three-way merges with rendered conflict markers
//! - Working-copy file I/O
//!
//! # Invariants
//!
//! - Ref updates that race with other writers use CAS semantics
//! - All operations return strong types (Oid, BranchName, RefName, RepoPath)
//!
//! # Example
//!
//! ```ignore
//! use tbd::git::{Git, Vcs};
//! use std::path::Path;
//!
//! let git = Git::open(Path::new("."))?;
//! git.update_ref_cas(
//!     &RefName::tracking(),
//!     &new_blob,
//!     Some(&old_blob),
//!     "tbd: track file",
//! )?;
//! ```

mod interface;
pub mod merge;
pub mod mock;
pub mod traits;

pub use interface::{Git, GitError, RepoInfo};
pub use traits::{
    CommitInfo, MergeLabels, TreeEntries, TreeEntry, TreeMerge, Vcs, MODE_EXECUTABLE, MODE_FILE,
};
