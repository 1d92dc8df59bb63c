//! engine::status
//!
//! Read-only views of the repository: the status report and history.
//! Nothing here writes state, and an interrupted operation is reported as
//! found rather than resumed.

use tracing::debug;

use super::{Engine, EngineError};
use crate::core::state::{FuseState, MergeType};
use crate::core::types::{BranchName, Oid, RepoPath};
use crate::git::{CommitInfo, TreeEntry, Vcs};

/// How a file differs from the reference tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChange {
    /// Content or mode changed.
    Modified,
    /// Not in the reference tree.
    Added,
    /// In the reference tree, gone from the working copy.
    Deleted,
}

impl FileChange {
    /// Change from `before` to `after`; `None` when they are the same.
    pub fn between(before: Option<&TreeEntry>, after: Option<&TreeEntry>) -> Option<Self> {
        match (before, after) {
            (None, None) => None,
            (None, Some(_)) => Some(FileChange::Added),
            (Some(_), None) => Some(FileChange::Deleted),
            (Some(b), Some(a)) if b == a => None,
            (Some(_), Some(_)) => Some(FileChange::Modified),
        }
    }

    /// Short label for listings.
    pub fn label(&self) -> &'static str {
        match self {
            FileChange::Modified => "modified",
            FileChange::Added => "new file",
            FileChange::Deleted => "deleted",
        }
    }
}

/// Conflict state of a file in the awaiting step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictMark {
    /// Still has conflicts.
    Unresolved,
    /// Marked resolved.
    Resolved,
}

/// A tracked file worth reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedFile {
    /// Path.
    pub path: RepoPath,
    /// Uncommitted change, if any.
    pub change: Option<FileChange>,
    /// Conflict state, if the file conflicted.
    pub conflict: Option<ConflictMark>,
}

/// An untracked working-copy file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UntrackedFile {
    /// Path.
    pub path: RepoPath,
    /// The file exists in the reference tree (it was untracked after being
    /// committed).
    pub in_reference: bool,
}

/// Summary of a pending fuse or merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuseStatus {
    /// Fuse or merge.
    pub merge_type: MergeType,
    /// Source branch.
    pub source: BranchName,
    /// Where the operation stands.
    pub state: FuseState,
    /// Steps not applied yet, the awaiting one included.
    pub remaining: usize,
    /// Commit whose step awaits a commit.
    pub awaiting: Option<Oid>,
    /// Paths still conflicted.
    pub unresolved: Vec<RepoPath>,
    /// Paths marked resolved.
    pub resolved: Vec<RepoPath>,
}

/// Everything `status` reports.
#[derive(Debug, Clone)]
pub struct StatusReport {
    /// Current branch.
    pub branch: BranchName,
    /// Its tip; `None` before the first commit.
    pub tip: Option<Oid>,
    /// Its upstream.
    pub upstream: Option<BranchName>,
    /// Pending fuse or merge of the current branch.
    pub fuse: Option<FuseStatus>,
    /// Tracked files with changes or conflicts.
    pub tracked: Vec<TrackedFile>,
    /// Untracked files.
    pub untracked: Vec<UntrackedFile>,
}

impl<'a, V: Vcs + ?Sized> Engine<'a, V> {
    /// Report the current branch, its pending operation and the working
    /// copy.
    pub fn status(&self) -> Result<StatusReport, EngineError> {
        let branch = self.current_branch()?;
        let state = self.states().load(&branch)?.state;
        let tip = self.branch_tip(&branch)?;
        let upstream = self.vcs.upstream(&branch)?;
        let reference = self.reference_entries(&state, tip.as_ref())?;
        let record = self.tracking().load()?.record;
        let work = self.vcs.work_files()?;

        let pending = state.pending_fuse.as_ref();
        let mark = |path: &RepoPath| {
            let conflicts = &pending?.conflicts;
            if conflicts.unresolved.contains(path) {
                Some(ConflictMark::Unresolved)
            } else if conflicts.resolved.contains(path) {
                Some(ConflictMark::Resolved)
            } else {
                None
            }
        };

        let mut tracked = Vec::new();
        for path in record.tracked_paths(&reference, &work) {
            let change = if super::worktree::is_modified(self.vcs, &path, &reference)? {
                Some(match (reference.contains_key(&path), work.contains(&path)) {
                    (false, _) => FileChange::Added,
                    (true, false) => FileChange::Deleted,
                    (true, true) => FileChange::Modified,
                })
            } else {
                None
            };
            let conflict = mark(&path);
            if change.is_some() || conflict.is_some() {
                tracked.push(TrackedFile {
                    path,
                    change,
                    conflict,
                });
            }
        }

        let untracked: Vec<UntrackedFile> = work
            .iter()
            .filter(|p| !record.is_tracked(p, &reference))
            .map(|p| UntrackedFile {
                path: p.clone(),
                in_reference: reference.contains_key(p),
            })
            .collect();

        let fuse = pending.map(|p| FuseStatus {
            merge_type: p.merge_type,
            source: p.source.clone(),
            state: p.state(),
            remaining: p.remaining_commits.len(),
            awaiting: p.awaiting.as_ref().map(|a| a.commit.clone()),
            unresolved: p.conflicts.unresolved.iter().cloned().collect(),
            resolved: p.conflicts.resolved.iter().cloned().collect(),
        });

        debug!(
            branch = %branch,
            tracked = tracked.len(),
            untracked = untracked.len(),
            "status"
        );
        Ok(StatusReport {
            branch,
            tip,
            upstream,
            fuse,
            tracked,
            untracked,
        })
    }

    /// First-parent history of the current branch, newest first.
    pub fn history(&self, limit: Option<usize>) -> Result<Vec<CommitInfo>, EngineError> {
        let branch = self.current_branch()?;
        let mut next = self.branch_tip(&branch)?;
        let mut commits = Vec::new();
        while let Some(oid) = next {
            if limit.is_some_and(|n| commits.len() >= n) {
                break;
            }
            let info = self.vcs.commit_info(&oid)?;
            next = info.parents.first().cloned();
            commits.push(info);
        }
        Ok(commits)
    }
}
