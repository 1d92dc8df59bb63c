//! engine::branch
//!
//! Branch management and switching.
//!
//! Each branch owns its uncommitted changes. Switching away stashes them
//! and pins the stash under the branch; switching back re-applies it. A
//! pending fuse or merge stays with its branch too: the working copy of a
//! branch with a pending operation is the tree that operation left, so
//! switching back shows the same conflicts.

use tracing::{info, warn};

use super::worktree::{self, AppliedStash};
use super::{Engine, EngineError};
use crate::core::state::MergeType;
use crate::core::types::{BranchName, Oid, RefName, StashSlot};
use crate::git::Vcs;

/// A branch as listed by [`Engine::branch_list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchInfo {
    /// Name.
    pub name: BranchName,
    /// Tip; `None` for an unborn branch.
    pub tip: Option<Oid>,
    /// Upstream branch.
    pub upstream: Option<BranchName>,
    /// Checked out.
    pub is_current: bool,
    /// Kind of pending operation, if any.
    pub pending: Option<MergeType>,
}

/// What a switch did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchOutcome {
    /// Branch switched away from.
    pub from: BranchName,
    /// Branch now checked out.
    pub to: BranchName,
    /// The target has a pending operation.
    pub restored_fuse: Option<MergeType>,
    /// Changes left on the target earlier were re-applied.
    pub restored_changes: bool,
    /// Changes were carried over from the previous branch.
    pub moved_changes: bool,
}

impl<'a, V: Vcs + ?Sized> Engine<'a, V> {
    /// Every local branch, by name. An unborn current branch is included.
    pub fn branch_list(&self) -> Result<Vec<BranchInfo>, EngineError> {
        let current = self.vcs.current_branch()?;
        let mut names: Vec<(BranchName, Option<Oid>)> = self
            .vcs
            .list_refs(RefName::BRANCH_PREFIX)?
            .into_iter()
            .filter_map(|(refname, oid)| {
                let name = refname.strip_prefix(RefName::BRANCH_PREFIX)?;
                Some((BranchName::new(name).ok()?, Some(oid)))
            })
            .collect();
        if let Some(current) = &current {
            if !names.iter().any(|(name, _)| name == current) {
                names.push((current.clone(), None));
            }
        }
        names.sort_by(|a, b| a.0.cmp(&b.0));

        let store = self.states();
        let mut branches = Vec::with_capacity(names.len());
        for (name, tip) in names {
            let pending = store
                .load(&name)?
                .state
                .pending_fuse
                .map(|p| p.merge_type);
            branches.push(BranchInfo {
                upstream: self.vcs.upstream(&name)?,
                is_current: current.as_ref() == Some(&name),
                name,
                tip,
                pending,
            });
        }
        Ok(branches)
    }

    /// Create a branch at `divergent_point` (the current tip by default).
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidBranchName`] for bad names
    /// - [`EngineError::BranchExists`] if the branch exists
    /// - [`EngineError::InvalidCommit`] if the divergent point names no commit
    pub fn branch_create(
        &self,
        name: &str,
        divergent_point: Option<&str>,
    ) -> Result<Oid, EngineError> {
        let branch = BranchName::new(name)?;
        if self.branch_tip(&branch)?.is_some() {
            return Err(EngineError::BranchExists(branch));
        }
        let point = divergent_point.unwrap_or("HEAD");
        let target = self
            .vcs
            .resolve_revision(point)?
            .ok_or_else(|| EngineError::InvalidCommit(point.to_string()))?;

        self.vcs.update_ref_cas(
            &RefName::for_branch(&branch),
            &target,
            None,
            &format!("tbd: branch {} at {}", branch, point),
        )?;
        info!(branch = %branch, at = %target.short(7), "created branch");
        Ok(target)
    }

    /// Delete a branch with its state and stashes.
    ///
    /// Without `force` the branch must be contained in its upstream, or in
    /// the current branch when it has none.
    pub fn branch_delete(&self, name: &str, force: bool) -> Result<(), EngineError> {
        let branch =
            BranchName::new(name).map_err(|_| EngineError::BranchNotFound(name.to_string()))?;
        if self.vcs.current_branch()?.as_ref() == Some(&branch) {
            return Err(EngineError::CannotDeleteCurrent(branch));
        }
        let tip = self
            .branch_tip(&branch)?
            .ok_or_else(|| EngineError::BranchNotFound(name.to_string()))?;

        if !force {
            let target = match self.vcs.upstream(&branch)? {
                Some(upstream) => upstream,
                None => self.current_branch()?,
            };
            let contained = match self.branch_tip(&target)? {
                Some(target_tip) => self.vcs.is_ancestor(&tip, &target_tip)?,
                None => false,
            };
            if !contained {
                return Err(EngineError::UnmergedBranch {
                    branch,
                    target: target.to_string(),
                });
            }
        }

        self.vcs.delete_ref_cas(&RefName::for_branch(&branch), &tip)?;
        self.states().clear(&branch)?;
        self.vcs.set_upstream(&branch, None)?;
        info!(branch = %branch, tip = %tip.short(7), force, "deleted branch");
        Ok(())
    }

    /// Set (or with `None`, unset) the upstream of the current branch.
    pub fn set_upstream(&self, upstream: Option<&str>) -> Result<Option<BranchName>, EngineError> {
        let branch = self.current_branch()?;
        let upstream = match upstream {
            Some(name) => {
                let upstream = BranchName::new(name)
                    .map_err(|_| EngineError::BranchNotFound(name.to_string()))?;
                if self.branch_tip(&upstream)?.is_none() {
                    return Err(EngineError::BranchNotFound(name.to_string()));
                }
                Some(upstream)
            }
            None => None,
        };
        self.vcs.set_upstream(&branch, upstream.as_ref())?;
        info!(branch = %branch, upstream = ?upstream.as_ref().map(BranchName::as_str), "set upstream");
        Ok(upstream)
    }

    /// Check out another branch.
    ///
    /// Uncommitted changes stay with the branch they were made on, unless
    /// `move_over` carries them to the target.
    ///
    /// # Errors
    ///
    /// - [`EngineError::AlreadyOnBranch`], [`EngineError::BranchNotFound`]
    /// - [`EngineError::FuseInProgress`] when moving changes off a branch
    ///   with a pending operation
    /// - [`EngineError::ApplyFailed`] when restored changes conflict; the
    ///   switch itself has happened
    pub fn switch(&self, target: &str, move_over: bool) -> Result<SwitchOutcome, EngineError> {
        let from = self.current_branch()?;
        let to =
            BranchName::new(target).map_err(|_| EngineError::BranchNotFound(target.to_string()))?;
        if from == to {
            return Err(EngineError::AlreadyOnBranch(to));
        }
        let to_tip = self
            .branch_tip(&to)?
            .ok_or_else(|| EngineError::BranchNotFound(target.to_string()))?;

        let store = self.states();
        let mut from_entry = store.load(&from)?;
        if move_over {
            if let Some(pending) = &from_entry.state.pending_fuse {
                return Err(EngineError::FuseInProgress {
                    branch: from,
                    merge_type: pending.merge_type,
                });
            }
        }

        // Put away what the current branch has in the working copy.
        let from_tip = self.branch_tip(&from)?;
        let from_reference = self.reference_entries(&from_entry.state, from_tip.as_ref())?;
        let mut paths = self.uncommitted_paths(&from_reference)?;
        let base_commit = match &from_entry.state.pending_fuse {
            Some(pending) => {
                paths.extend(pending.conflicts.all_paths().cloned());
                None
            }
            None => from_tip.as_ref(),
        };
        let message = format!("tbd: uncommitted changes on {}", from);
        let stash = worktree::stash_save(self.vcs, base_commit, &from_reference, &paths, &message)?;
        if let Some(stash) = &stash {
            store.pin_stash(&from, StashSlot::Switch, &stash.commit)?;
            if !move_over {
                from_entry.state.switch_stash = Some(stash.commit.clone());
                store.save(&from, &mut from_entry)?;
            }
        }

        // Bring in the target.
        let mut to_entry = store.load(&to)?;
        let to_reference = self.reference_entries(&to_entry.state, Some(&to_tip))?;
        let current = stash.as_ref().map_or(&from_reference, |s| &s.entries);
        worktree::checkout(self.vcs, current, &to_reference)?;
        self.vcs.set_head(&to)?;
        self.sync_index(Some(&to_tip))?;
        info!(from = %from, to = %to, "switched branch");

        let mut failures: Vec<EngineError> = Vec::new();
        let mut onto = to_reference;

        let restored_changes = match to_entry.state.switch_stash.take() {
            Some(own) => {
                store.save(&to, &mut to_entry)?;
                let applied = self.reapply_stash(&to, StashSlot::Switch, &own, &onto)?;
                if !applied.is_clean() {
                    failures.push(Self::apply_failed(&to, StashSlot::Switch, &applied));
                }
                onto = applied.entries;
                true
            }
            None => false,
        };

        let moved_changes = match (&stash, move_over) {
            (Some(moved), true) => {
                let applied: AppliedStash = worktree::stash_apply(self.vcs, &moved.commit, &onto)?;
                if applied.is_clean() {
                    store.unpin_stash(&from, StashSlot::Switch)?;
                } else {
                    failures.push(Self::apply_failed(&from, StashSlot::Switch, &applied));
                }
                true
            }
            _ => false,
        };

        if let Some(first) = failures.into_iter().next() {
            warn!(branch = %to, "restored changes left conflicts");
            return Err(first);
        }

        Ok(SwitchOutcome {
            from,
            to,
            restored_fuse: to_entry.state.pending_fuse.as_ref().map(|p| p.merge_type),
            restored_changes,
            moved_changes,
        })
    }
}
