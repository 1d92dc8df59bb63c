//! engine::worktree
//!
//! Working-copy snapshots, checkouts and stashes, built on [`Vcs`]
//! primitives.
//!
//! # Stashes
//!
//! A stash is an ordinary commit. Its tree is the base tree overlaid with
//! the stashed working-copy content, and its single parent is a commit of
//! the base tree. Re-applying it is a three-way merge of the base tree, the
//! tree the working copy currently reflects and the stash tree.
//!
//! # Checkouts
//!
//! [`checkout`] moves the working copy from one tree to another. Files of
//! the target are written when their content or mode differs; files only
//! present in the source tree are removed. Everything else in the working
//! copy is left alone. The index is not touched here: callers that move a
//! branch tip reset it with [`Vcs::reset_index`].

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::core::types::{Oid, RepoPath};
use crate::git::{GitError, MergeLabels, TreeEntries, TreeEntry, TreeMerge, Vcs, MODE_FILE};

/// Labels of conflict markers written when a stash is re-applied.
pub const STASH_LABELS: MergeLabels<'static> = MergeLabels {
    ours: "Updated upstream",
    theirs: "Stashed changes",
};

/// Files of a commit's tree; empty for `None` (an unborn branch).
pub fn commit_entries<V: Vcs + ?Sized>(
    vcs: &V,
    commit: Option<&Oid>,
) -> Result<TreeEntries, GitError> {
    match commit {
        Some(commit) => {
            let tree = vcs.commit_info(commit)?.tree;
            vcs.tree_entries(&tree)
        }
        None => Ok(TreeEntries::new()),
    }
}

/// Whether the working-copy content or mode of `path` differs from
/// `reference`.
pub fn is_modified<V: Vcs + ?Sized>(
    vcs: &V,
    path: &RepoPath,
    reference: &TreeEntries,
) -> Result<bool, GitError> {
    let work = vcs.read_work_file(path)?;
    match (reference.get(path), work) {
        (None, None) => Ok(false),
        (Some(_), None) | (None, Some(_)) => Ok(true),
        (Some(entry), Some(content)) => {
            if vcs.read_blob(&entry.oid)? != content {
                return Ok(true);
            }
            Ok(vcs.work_file_mode(path)?.is_some_and(|mode| mode != entry.mode))
        }
    }
}

/// The subset of `paths` whose working-copy content differs from
/// `reference`.
pub fn dirty_paths<'p, V: Vcs + ?Sized>(
    vcs: &V,
    paths: impl IntoIterator<Item = &'p RepoPath>,
    reference: &TreeEntries,
) -> Result<BTreeSet<RepoPath>, GitError> {
    let mut dirty = BTreeSet::new();
    for path in paths {
        if is_modified(vcs, path, reference)? {
            dirty.insert(path.clone());
        }
    }
    Ok(dirty)
}

/// `base` with the working-copy content of `paths` laid over it. A path
/// missing from the working copy is removed. Modes come from the working
/// copy where the platform records them, else from `base`.
pub fn overlay<'p, V: Vcs + ?Sized>(
    vcs: &V,
    base: &TreeEntries,
    paths: impl IntoIterator<Item = &'p RepoPath>,
) -> Result<TreeEntries, GitError> {
    let mut entries = base.clone();
    for path in paths {
        match vcs.read_work_file(path)? {
            Some(content) => {
                let oid = vcs.write_blob(&content)?;
                let mode = match vcs.work_file_mode(path)? {
                    Some(mode) => mode,
                    None => base.get(path).map_or(MODE_FILE, |e| e.mode),
                };
                entries.insert(path.clone(), TreeEntry { oid, mode });
            }
            None => {
                entries.remove(path);
            }
        }
    }
    Ok(entries)
}

/// Move the working copy from `from` to `to`.
pub fn checkout<V: Vcs + ?Sized>(
    vcs: &V,
    from: &TreeEntries,
    to: &TreeEntries,
) -> Result<(), GitError> {
    let mut written = 0usize;
    for (path, entry) in to {
        let want = vcs.read_blob(&entry.oid)?;
        let have = vcs.read_work_file(path)?;
        if have.as_deref() == Some(want.as_slice())
            && vcs.work_file_mode(path)?.map_or(true, |mode| mode == entry.mode)
        {
            continue;
        }
        if have.is_some() && !from.contains_key(path) {
            warn!(path = %path, "overwriting a file tbd does not manage");
        }
        vcs.write_work_file(path, &want, entry.mode)?;
        written += 1;
    }

    let mut removed = 0usize;
    for path in from.keys().filter(|p| !to.contains_key(*p)) {
        vcs.remove_work_file(path)?;
        removed += 1;
    }

    debug!(written, removed, "checked out tree");
    Ok(())
}

/// A saved stash.
#[derive(Debug, Clone)]
pub struct Stash {
    /// The stash commit.
    pub commit: Oid,
    /// Files of the stash tree: what the working copy held.
    pub entries: TreeEntries,
}

/// Save the working-copy content of `paths` on top of `base`.
///
/// `base_commit` is used as the stash parent when its tree is `base`;
/// otherwise a parentless commit of `base` is created. Returns `None` when
/// nothing differs from `base`.
pub fn stash_save<'p, V: Vcs + ?Sized>(
    vcs: &V,
    base_commit: Option<&Oid>,
    base: &TreeEntries,
    paths: impl IntoIterator<Item = &'p RepoPath>,
    message: &str,
) -> Result<Option<Stash>, GitError> {
    let entries = overlay(vcs, base, paths)?;
    if &entries == base {
        return Ok(None);
    }

    let base_tree = vcs.write_tree(base)?;
    let parent = match base_commit {
        Some(commit) if vcs.commit_info(commit)?.tree == base_tree => commit.clone(),
        _ => vcs.create_commit(&base_tree, &[], "tbd: stash base")?,
    };

    let tree = vcs.write_tree(&entries)?;
    let commit = vcs.create_commit(&tree, &[parent], message)?;
    debug!(stash = %commit.short(7), "saved stash");
    Ok(Some(Stash { commit, entries }))
}

/// Result of re-applying a stash.
#[derive(Debug, Clone)]
pub struct AppliedStash {
    /// Files the working copy now reflects.
    pub entries: TreeEntries,
    /// Paths left with conflict markers.
    pub conflicts: BTreeSet<RepoPath>,
}

impl AppliedStash {
    /// True when the stash applied without conflicts.
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }
}

/// Re-apply `stash` to a working copy that reflects `onto`.
///
/// Conflicting files are written with markers labelled
/// [`STASH_LABELS`].
pub fn stash_apply<V: Vcs + ?Sized>(
    vcs: &V,
    stash: &Oid,
    onto: &TreeEntries,
) -> Result<AppliedStash, GitError> {
    let info = vcs.commit_info(stash)?;
    let base = match info.parents.first() {
        Some(parent) => Some(vcs.commit_info(parent)?.tree),
        None => None,
    };
    let ours = vcs.write_tree(onto)?;

    let merge = vcs.three_way_merge_trees(base.as_ref(), &ours, &info.tree, &STASH_LABELS)?;
    let entries = vcs.tree_entries(merge.tree())?;
    checkout(vcs, onto, &entries)?;

    let conflicts = match merge {
        TreeMerge::Clean(_) => BTreeSet::new(),
        TreeMerge::Conflicted { paths, .. } => paths,
    };
    debug!(stash = %stash.short(7), conflicts = conflicts.len(), "applied stash");
    Ok(AppliedStash { entries, conflicts })
}
