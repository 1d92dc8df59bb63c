//! git::traits
//!
//! The `Vcs` trait: everything tbd needs from the underlying
//! version-control engine.
//!
//! # Design
//!
//! The engine layer never sees git2. It works against this trait, which has
//! two implementations:
//!
//! - [`crate::git::Git`] - the real repository, through git2
//! - [`crate::git::mock::MockVcs`] - an in-memory engine for tests
//!
//! Methods are synchronous and take `&self`; implementations that need
//! mutation use interior mutability.
//!
//! Object identity is opaque. Commits are addressed by [`Oid`] and carry
//! their parent list, so ancestry questions are answered by the engine
//! rather than by an in-memory commit graph.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use super::GitError;
use crate::core::types::{BranchName, Oid, RefName, RepoPath};

/// File mode of a regular file.
pub const MODE_FILE: u32 = 0o100644;

/// File mode of an executable file.
pub const MODE_EXECUTABLE: u32 = 0o100755;

/// A file in a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Blob id of the content.
    pub oid: Oid,
    /// Git file mode.
    pub mode: u32,
}

/// All files of a tree, flattened, keyed by root-relative path.
pub type TreeEntries = BTreeMap<RepoPath, TreeEntry>;

/// Information about a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    /// The commit OID
    pub oid: Oid,
    /// First line of the commit message
    pub summary: String,
    /// Full commit message
    pub message: String,
    /// Parent commits, first parent first
    pub parents: Vec<Oid>,
    /// Root tree
    pub tree: Oid,
}

/// Labels written into conflict markers.
#[derive(Debug, Clone, Copy)]
pub struct MergeLabels<'a> {
    /// Label after `<<<<<<<`
    pub ours: &'a str,
    /// Label after `>>>>>>>`
    pub theirs: &'a str,
}

/// Outcome of a tree-level three-way merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeMerge {
    /// Every path merged cleanly.
    Clean(Oid),
    /// Some paths conflicted. `tree` holds the merged result with conflict
    /// markers rendered into the conflicting files.
    Conflicted {
        tree: Oid,
        paths: BTreeSet<RepoPath>,
    },
}

impl TreeMerge {
    /// The resulting tree, with or without conflict markers.
    pub fn tree(&self) -> &Oid {
        match self {
            TreeMerge::Clean(tree) => tree,
            TreeMerge::Conflicted { tree, .. } => tree,
        }
    }
}

/// Operations tbd consumes from the version-control engine.
pub trait Vcs {
    /// Root of the working copy.
    fn work_dir(&self) -> &Path;

    // ---------------------------------------------------------------------
    // References
    // ---------------------------------------------------------------------

    /// Read the object a ref points to, without peeling.
    fn read_ref(&self, name: &RefName) -> Result<Option<Oid>, GitError>;

    /// Move a ref only if it currently points at `expected_old`
    /// (`None` means the ref must not exist).
    fn update_ref_cas(
        &self,
        name: &RefName,
        new: &Oid,
        expected_old: Option<&Oid>,
        message: &str,
    ) -> Result<(), GitError>;

    /// Delete a ref only if it currently points at `expected_old`.
    fn delete_ref_cas(&self, name: &RefName, expected_old: &Oid) -> Result<(), GitError>;

    /// Point a ref at `target` unconditionally.
    fn set_ref(&self, name: &RefName, target: &Oid, message: &str) -> Result<(), GitError>;

    /// Delete a ref if it exists.
    fn delete_ref(&self, name: &RefName) -> Result<(), GitError>;

    /// List refs whose name starts with `prefix`.
    fn list_refs(&self, prefix: &str) -> Result<Vec<(RefName, Oid)>, GitError>;

    /// Branch HEAD points to (`None` when detached).
    fn current_branch(&self) -> Result<Option<BranchName>, GitError>;

    /// Point HEAD at a branch. Does not touch the working copy.
    fn set_head(&self, branch: &BranchName) -> Result<(), GitError>;

    /// Upstream branch configured for `branch`.
    fn upstream(&self, branch: &BranchName) -> Result<Option<BranchName>, GitError>;

    /// Set or unset the upstream of `branch`.
    fn set_upstream(
        &self,
        branch: &BranchName,
        upstream: Option<&BranchName>,
    ) -> Result<(), GitError>;

    // ---------------------------------------------------------------------
    // History
    // ---------------------------------------------------------------------

    /// Look up a commit.
    fn commit_info(&self, oid: &Oid) -> Result<CommitInfo, GitError>;

    /// Resolve a revision expression (branch name, `HEAD~2`, abbreviated id)
    /// to a commit. `Ok(None)` when it names nothing.
    fn resolve_revision(&self, spec: &str) -> Result<Option<Oid>, GitError>;

    /// Commits reachable from `to` but not from `from`, oldest first.
    fn ancestry_diff(&self, from: Option<&Oid>, to: &Oid) -> Result<Vec<Oid>, GitError>;

    /// Best common ancestor of two commits.
    fn merge_base(&self, a: &Oid, b: &Oid) -> Result<Option<Oid>, GitError>;

    /// Whether `ancestor` is reachable from `descendant` (a commit is its
    /// own ancestor).
    fn is_ancestor(&self, ancestor: &Oid, descendant: &Oid) -> Result<bool, GitError> {
        if ancestor == descendant {
            return Ok(true);
        }
        Ok(self.merge_base(ancestor, descendant)?.as_ref() == Some(ancestor))
    }

    // ---------------------------------------------------------------------
    // Objects
    // ---------------------------------------------------------------------

    /// Read a blob.
    fn read_blob(&self, oid: &Oid) -> Result<Vec<u8>, GitError>;

    /// Store a blob.
    fn write_blob(&self, content: &[u8]) -> Result<Oid, GitError>;

    /// All files of a tree.
    fn tree_entries(&self, tree: &Oid) -> Result<TreeEntries, GitError>;

    /// Build a tree from a flat list of files.
    fn write_tree(&self, entries: &TreeEntries) -> Result<Oid, GitError>;

    /// Create a commit object. No ref is moved.
    fn create_commit(&self, tree: &Oid, parents: &[Oid], message: &str)
        -> Result<Oid, GitError>;

    // ---------------------------------------------------------------------
    // Merges
    // ---------------------------------------------------------------------

    /// Three-way merge of whole trees. `base` of `None` is the empty tree.
    fn three_way_merge_trees(
        &self,
        base: Option<&Oid>,
        ours: &Oid,
        theirs: &Oid,
        labels: &MergeLabels<'_>,
    ) -> Result<TreeMerge, GitError>;

    /// Apply the changes `commit` introduced (relative to its first parent)
    /// onto `base_tree`.
    fn apply_commit_onto_tree(&self, commit: &Oid, base_tree: &Oid) -> Result<TreeMerge, GitError> {
        let info = self.commit_info(commit)?;
        let parent_tree = match info.parents.first() {
            Some(parent) => Some(self.commit_info(parent)?.tree),
            None => None,
        };
        let theirs = format!("{} {}", info.oid.short(7), info.summary);
        self.three_way_merge_trees(
            parent_tree.as_ref(),
            base_tree,
            &info.tree,
            &MergeLabels {
                ours: "HEAD",
                theirs: &theirs,
            },
        )
    }

    // ---------------------------------------------------------------------
    // Working copy
    // ---------------------------------------------------------------------

    /// Content of a working-copy file, `None` if absent.
    fn read_work_file(&self, path: &RepoPath) -> Result<Option<Vec<u8>>, GitError>;

    /// Git mode of a working-copy file: [`MODE_EXECUTABLE`] or
    /// [`MODE_FILE`]. `None` if the file is absent or the platform keeps no
    /// executable bit.
    fn work_file_mode(&self, path: &RepoPath) -> Result<Option<u32>, GitError>;

    /// Write a working-copy file with the given git mode, creating parent
    /// directories.
    fn write_work_file(&self, path: &RepoPath, content: &[u8], mode: u32)
        -> Result<(), GitError>;

    /// Remove a working-copy file if present.
    fn remove_work_file(&self, path: &RepoPath) -> Result<(), GitError>;

    /// Every file in the working copy, ignored files excluded.
    fn work_files(&self) -> Result<BTreeSet<RepoPath>, GitError>;

    /// Make the staging area match `tree` (empty for `None`), so the
    /// engine's own status agrees with tbd after the branch tip moves.
    fn reset_index(&self, tree: Option<&Oid>) -> Result<(), GitError>;
}
