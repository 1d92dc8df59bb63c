//! engine::commit
//!
//! Recording commits on the current branch.
//!
//! Without path arguments every modified tracked file is committed. `only`
//! replaces that set with the named paths (which may be untracked);
//! `include` adds paths and `exclude` removes them. A directory argument
//! stands for the tracked files below it.
//!
//! While a fuse or merge step awaits its commit, the commit seals that step
//! instead: it takes the resolved files, gets the step's parents and lets
//! the operation continue.

use std::collections::BTreeSet;

use tracing::info;

use super::fuse::FuseOutcome;
use super::status::FileChange;
use super::worktree::{self, commit_entries};
use super::{expand_path, Engine, EngineError, Expansion};
use crate::core::state::{FuseState, MergeType, StateEntry};
use crate::core::types::{BranchName, Oid, RefName, RepoPath};
use crate::git::{TreeEntries, Vcs};

/// Arguments of [`Engine::commit`].
#[derive(Debug, Clone, Default)]
pub struct CommitRequest {
    /// Commit message.
    pub message: String,
    /// Commit exactly these paths.
    pub only: Vec<RepoPath>,
    /// Also commit these paths.
    pub include: Vec<RepoPath>,
    /// Leave these paths out.
    pub exclude: Vec<RepoPath>,
}

impl CommitRequest {
    fn selects_paths(&self) -> bool {
        !(self.only.is_empty() && self.include.is_empty() && self.exclude.is_empty())
    }
}

/// A recorded commit.
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    /// The new commit.
    pub commit: Oid,
    /// Files the commit changed.
    pub paths: Vec<(RepoPath, FileChange)>,
    /// Set when the commit sealed a fuse or merge step and the operation
    /// then ran to completion.
    pub fuse: Option<FuseOutcome>,
}

fn changes<'p>(
    before: &TreeEntries,
    after: &TreeEntries,
    paths: impl IntoIterator<Item = &'p RepoPath>,
) -> Vec<(RepoPath, FileChange)> {
    paths
        .into_iter()
        .filter_map(|path| {
            FileChange::between(before.get(path), after.get(path)).map(|c| (path.clone(), c))
        })
        .collect()
}

fn summary(message: &str) -> &str {
    message.lines().next().unwrap_or_default()
}

impl<'a, V: Vcs + ?Sized> Engine<'a, V> {
    /// Record a commit on the current branch.
    ///
    /// # Errors
    ///
    /// - [`EngineError::EmptyMessage`] for a blank message
    /// - [`EngineError::UnresolvedConflicts`] while a step has unresolved paths
    /// - [`EngineError::PathSelectionDuringFuse`] when sealing a step with
    ///   path arguments
    /// - [`EngineError::FileNotFound`] for paths that name nothing
    /// - [`EngineError::NothingToCommit`] when the selection changes nothing
    pub fn commit(&self, request: &CommitRequest) -> Result<CommitOutcome, EngineError> {
        if request.message.trim().is_empty() {
            return Err(EngineError::EmptyMessage);
        }
        let branch = self.current_branch()?;
        let mut entry = self.recover(&branch)?;

        match entry.state.fuse_state() {
            FuseState::Conflicted => {
                let unresolved = entry
                    .state
                    .pending_fuse
                    .as_ref()
                    .map(|p| p.conflicts.unresolved.iter().cloned().collect())
                    .unwrap_or_default();
                Err(EngineError::UnresolvedConflicts(unresolved))
            }
            FuseState::Finalizing => self.seal_step(&branch, &mut entry, request),
            FuseState::Idle | FuseState::Replaying => self.commit_on_tip(&branch, request),
        }
    }

    fn commit_on_tip(
        &self,
        branch: &BranchName,
        request: &CommitRequest,
    ) -> Result<CommitOutcome, EngineError> {
        let tip = self.branch_tip(branch)?;
        let reference = commit_entries(self.vcs, tip.as_ref())?;
        let selected = self.select_paths(request, &reference)?;

        let entries = worktree::overlay(self.vcs, &reference, &selected)?;
        let paths = changes(&reference, &entries, &selected);
        if paths.is_empty() {
            return Err(EngineError::NothingToCommit);
        }

        let tree = self.vcs.write_tree(&entries)?;
        let parents: Vec<Oid> = tip.iter().cloned().collect();
        let commit = self.vcs.create_commit(&tree, &parents, &request.message)?;
        self.vcs.update_ref_cas(
            &RefName::for_branch(branch),
            &commit,
            tip.as_ref(),
            &format!("tbd: commit: {}", summary(&request.message)),
        )?;
        self.sync_index(Some(&commit))?;
        self.note_committed(&selected, &entries)?;

        info!(branch = %branch, commit = %commit.short(7), files = paths.len(), "committed");
        Ok(CommitOutcome {
            commit,
            paths,
            fuse: None,
        })
    }

    /// The files a commit takes, measured against `reference`.
    fn select_paths(
        &self,
        request: &CommitRequest,
        reference: &TreeEntries,
    ) -> Result<BTreeSet<RepoPath>, EngineError> {
        let record = self.tracking().load()?.record;
        let work = self.vcs.work_files()?;

        let expand = |path: &RepoPath| -> Result<Vec<RepoPath>, EngineError> {
            match expand_path(path, reference, &work) {
                Expansion::File(file) => Ok(vec![file]),
                Expansion::Dir(files) => Ok(files
                    .into_iter()
                    .filter(|f| record.is_tracked(f, reference))
                    .collect()),
                Expansion::Missing => Err(EngineError::FileNotFound(path.to_string())),
            }
        };

        let mut selected = BTreeSet::new();
        if request.only.is_empty() {
            let tracked = record.tracked_paths(reference, &work);
            selected = worktree::dirty_paths(self.vcs, &tracked, reference)?;
        } else {
            for path in &request.only {
                selected.extend(expand(path)?);
            }
        }
        for path in &request.include {
            selected.extend(expand(path)?);
        }
        for path in &request.exclude {
            for file in expand(path)? {
                selected.remove(&file);
            }
        }
        Ok(selected)
    }

    fn note_committed(
        &self,
        paths: &BTreeSet<RepoPath>,
        entries: &TreeEntries,
    ) -> Result<(), EngineError> {
        let store = self.tracking();
        let mut tracking = store.load()?;
        tracking.record.note_committed(paths, entries);
        store.save(&mut tracking)?;
        Ok(())
    }

    /// Commit the resolved step of a pending operation, then resume it.
    fn seal_step(
        &self,
        branch: &BranchName,
        entry: &mut StateEntry,
        request: &CommitRequest,
    ) -> Result<CommitOutcome, EngineError> {
        let pending = entry
            .state
            .pending_fuse
            .clone()
            .ok_or_else(|| EngineError::NoFuseInProgress(branch.clone()))?;
        if request.selects_paths() {
            return Err(EngineError::PathSelectionDuringFuse(pending.merge_type));
        }
        let awaiting = pending
            .awaiting
            .clone()
            .ok_or_else(|| EngineError::Internal("no step awaits a commit".into()))?;

        let reference = self.vcs.tree_entries(&awaiting.tree)?;
        let mut selected = self.uncommitted_paths(&reference)?;
        selected.extend(pending.conflicts.all_paths().cloned());
        let entries = worktree::overlay(self.vcs, &reference, &selected)?;
        let paths = changes(&reference, &entries, &selected);

        let tree = self.vcs.write_tree(&entries)?;
        let mut parents = vec![pending.insertion_point.clone()];
        if pending.merge_type == MergeType::Merge {
            parents.push(awaiting.commit.clone());
        }
        let commit = self.vcs.create_commit(&tree, &parents, &request.message)?;

        if let Some(pending) = entry.state.pending_fuse.as_mut() {
            if pending.remaining_commits.first() == Some(&awaiting.commit) {
                pending.remaining_commits.remove(0);
            }
            pending.insertion_point = commit.clone();
            pending.awaiting = None;
            pending.conflicts.clear();
            pending.worktree = tree;
        }
        self.states().save(branch, entry)?;
        self.note_committed(&selected, &entries)?;
        info!(
            branch = %branch,
            commit = %commit.short(7),
            step = %awaiting.commit.short(7),
            "sealed {} step",
            pending.merge_type
        );

        let fuse = self.replay(branch, entry)?;
        Ok(CommitOutcome {
            commit,
            paths,
            fuse: Some(fuse),
        })
    }
}
