//! engine::fuse
//!
//! The fuse and merge state machine.
//!
//! # Lifecycle
//!
//! ```text
//! Idle --fuse/merge--> Replaying --step conflicts--> Conflicted
//!                         |   ^                          |
//!                         |   +----commit (seal step)----+ (all resolved: Finalizing)
//!                         v
//!                     finalize --> Idle
//! ```
//!
//! While an operation is pending the branch ref stays at the tip recorded
//! when it started. Replayed commits are grafted after the insertion point,
//! which advances one step at a time; the record is saved after every step.
//! Finalization moves the ref with CAS against the original tip, checks out
//! the result and re-applies the stashed uncommitted changes.
//!
//! A pure fast-forward creates no record at all.

use tracing::{debug, info};

use super::worktree::{self, commit_entries};
use super::{Engine, EngineError};
use crate::core::config::InsertionPointDefault;
use crate::core::range::{resolve_range, Selector};
use crate::core::state::{AwaitingStep, FuseState, MergeType, PendingFuse, StateEntry};
use crate::core::types::{BranchName, Oid, RefName, StashSlot};
use crate::git::{MergeLabels, TreeMerge, Vcs};

/// Where fused commits go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertionPoint {
    /// After the current tip.
    Head,
    /// At the divergence point of the current tip and the source.
    DivergencePoint,
    /// After a given commit, which must be an ancestor of the tip.
    Commit(String),
}

impl InsertionPoint {
    /// Parse a command-line value: `HEAD`, `dp` or a revision.
    pub fn parse(value: &str) -> Self {
        match value {
            "HEAD" | "head" | "@" => InsertionPoint::Head,
            "dp" => InsertionPoint::DivergencePoint,
            rev => InsertionPoint::Commit(rev.to_string()),
        }
    }
}

impl From<InsertionPointDefault> for InsertionPoint {
    fn from(default: InsertionPointDefault) -> Self {
        match default {
            InsertionPointDefault::Head => InsertionPoint::Head,
            InsertionPointDefault::Dp => InsertionPoint::DivergencePoint,
        }
    }
}

/// Arguments of [`Engine::fuse`].
#[derive(Debug, Clone, Default)]
pub struct FuseRequest {
    /// Source branch; the upstream when `None`.
    pub source: Option<String>,
    /// Take only these commits.
    pub only: Vec<String>,
    /// Take every divergent commit but these.
    pub exclude: Vec<String>,
    /// Insertion point; the configured default when `None`.
    pub insertion_point: Option<InsertionPoint>,
}

/// A fuse or merge that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FuseOutcome {
    /// The tip moved forward over existing commits.
    FastForward {
        /// New tip.
        tip: Oid,
        /// Commits the tip moved over.
        commits: usize,
    },
    /// Every step applied and the branch now points at the result.
    Finalized {
        /// New tip.
        tip: Oid,
        /// Fuse or merge.
        merge_type: MergeType,
        /// Source branch.
        source: BranchName,
    },
}

impl FuseOutcome {
    /// The branch tip after the operation.
    pub fn tip(&self) -> &Oid {
        match self {
            FuseOutcome::FastForward { tip, .. } | FuseOutcome::Finalized { tip, .. } => tip,
        }
    }
}

/// What an abort undid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbortOutcome {
    /// Fuse or merge.
    pub merge_type: MergeType,
    /// Source branch.
    pub source: BranchName,
}

enum Step {
    /// The commit already sits on the insertion point.
    Reuse(Oid),
    /// A new commit was created for the step.
    Created(Oid),
    /// The changes are already present.
    Skip,
    /// The step stopped on conflicts.
    Conflict(TreeMerge),
}

impl<'a, V: Vcs + ?Sized> Engine<'a, V> {
    /// Replay commits of another branch onto the current one.
    ///
    /// # Errors
    ///
    /// - [`EngineError::FuseInProgress`] if the branch already has one
    /// - [`EngineError::NoUpstream`] without source and upstream
    /// - [`EngineError::InvalidCommit`] for bad selectors or insertion points
    /// - [`EngineError::NothingToFuse`] if the selection is empty
    /// - [`EngineError::Conflict`] when a step stops on conflicts; the
    ///   operation stays pending
    /// - [`EngineError::ApplyFailed`] when the fuse finished but the
    ///   uncommitted changes did not re-apply cleanly
    pub fn fuse(&self, request: &FuseRequest) -> Result<FuseOutcome, EngineError> {
        let branch = self.current_branch()?;
        let entry = self.recover(&branch)?;
        Self::ensure_idle(&branch, &entry)?;

        let (source, source_tip) = self.resolve_source(&branch, request.source.as_deref())?;
        let tip = self.branch_tip(&branch)?;
        let divergent = self.vcs.ancestry_diff(tip.as_ref(), &source_tip)?;

        let selector = if !request.only.is_empty() {
            Selector::Only(self.resolve_commits(&request.only)?)
        } else if !request.exclude.is_empty() {
            Selector::Exclude(self.resolve_commits(&request.exclude)?)
        } else {
            Selector::All
        };
        let selected = resolve_range(&divergent, &selector)?;
        info!(
            branch = %branch,
            source = %source,
            selected = selected.len(),
            divergent = divergent.len(),
            "fusing"
        );

        let Some(tip) = tip else {
            if selected.len() != divergent.len() {
                return Err(EngineError::NoCommits(branch));
            }
            return self.fast_forward(&branch, None, &source_tip, selected.len());
        };

        let insertion = request
            .insertion_point
            .clone()
            .unwrap_or_else(|| self.insertion_point.into());
        let insertion_point = match insertion {
            InsertionPoint::Head => tip.clone(),
            InsertionPoint::DivergencePoint => {
                self.vcs.merge_base(&tip, &source_tip)?.ok_or_else(|| {
                    EngineError::InvalidCommit(format!("{} and {} share no history", branch, source))
                })?
            }
            InsertionPoint::Commit(rev) => {
                let oid = self
                    .vcs
                    .resolve_revision(&rev)?
                    .ok_or_else(|| EngineError::InvalidCommit(rev.clone()))?;
                if !self.vcs.is_ancestor(&oid, &tip)? {
                    return Err(EngineError::InvalidCommit(format!(
                        "{} is not an ancestor of {}",
                        rev, branch
                    )));
                }
                oid
            }
        };

        let mut queue = selected;
        if insertion_point != tip {
            queue.extend(self.vcs.ancestry_diff(Some(&insertion_point), &tip)?);
        }

        if self.is_first_parent_chain(&tip, &queue)? {
            if let Some(last) = queue.last() {
                return self.fast_forward(&branch, Some(&tip), last, queue.len());
            }
        }

        self.start(
            &branch,
            entry,
            MergeType::Fuse,
            source,
            tip,
            insertion_point,
            queue,
        )
    }

    /// Merge another branch's tip into the current branch.
    ///
    /// Fast-forwards when possible; otherwise a single step producing a
    /// two-parent commit, with the same conflict lifecycle as a fuse.
    pub fn merge(&self, source: Option<&str>) -> Result<FuseOutcome, EngineError> {
        let branch = self.current_branch()?;
        let entry = self.recover(&branch)?;
        Self::ensure_idle(&branch, &entry)?;

        let (source, source_tip) = self.resolve_source(&branch, source)?;
        let Some(tip) = self.branch_tip(&branch)? else {
            let commits = self.vcs.ancestry_diff(None, &source_tip)?.len();
            return self.fast_forward(&branch, None, &source_tip, commits);
        };

        if self.vcs.is_ancestor(&source_tip, &tip)? {
            return Err(EngineError::NothingToFuse);
        }
        if self.vcs.is_ancestor(&tip, &source_tip)? {
            let commits = self.vcs.ancestry_diff(Some(&tip), &source_tip)?.len();
            return self.fast_forward(&branch, Some(&tip), &source_tip, commits);
        }

        info!(branch = %branch, source = %source, "merging");
        self.start(
            &branch,
            entry,
            MergeType::Merge,
            source,
            tip.clone(),
            tip,
            vec![source_tip],
        )
    }

    /// Abandon the pending fuse or merge of the current branch.
    ///
    /// The working copy goes back to the original tip, then the changes
    /// stashed at the start are re-applied. History is untouched.
    pub fn abort_fuse(&self) -> Result<AbortOutcome, EngineError> {
        let branch = self.current_branch()?;
        let store = self.states();
        let mut entry = store.load(&branch)?;
        let pending = entry
            .state
            .pending_fuse
            .take()
            .ok_or_else(|| EngineError::NoFuseInProgress(branch.clone()))?;

        let original = commit_entries(self.vcs, Some(&pending.original_tip))?;
        let current = self.vcs.tree_entries(&pending.worktree)?;
        worktree::checkout(self.vcs, &current, &original)?;
        store.save(&branch, &mut entry)?;
        info!(branch = %branch, merge_type = %pending.merge_type, "aborted");

        if let Some(stash) = &pending.stash {
            let applied = self.reapply_stash(&branch, StashSlot::Fuse, stash, &original)?;
            if !applied.is_clean() {
                return Err(Self::apply_failed(&branch, StashSlot::Fuse, &applied));
            }
        }

        Ok(AbortOutcome {
            merge_type: pending.merge_type,
            source: pending.source,
        })
    }

    /// Resume an interrupted fuse or merge of the current branch.
    pub fn continue_fuse(&self) -> Result<FuseOutcome, EngineError> {
        let branch = self.current_branch()?;
        let mut entry = self.states().load(&branch)?;
        let (state, merge_type, unresolved) = match &entry.state.pending_fuse {
            None => return Err(EngineError::NoFuseInProgress(branch)),
            Some(pending) => (
                pending.state(),
                pending.merge_type,
                pending.conflicts.unresolved.iter().cloned().collect::<Vec<_>>(),
            ),
        };
        match state {
            FuseState::Conflicted => Err(EngineError::UnresolvedConflicts(unresolved)),
            // The resolved step is sealed by the next commit.
            FuseState::Finalizing => Err(EngineError::FuseInProgress { branch, merge_type }),
            FuseState::Replaying | FuseState::Idle => self.replay(&branch, &mut entry),
        }
    }

    /// Load a branch's record, first completing an interrupted replay.
    pub(crate) fn recover(&self, branch: &BranchName) -> Result<StateEntry, EngineError> {
        let mut entry = self.states().load(branch)?;
        if entry.state.fuse_state() == FuseState::Replaying {
            info!(branch = %branch, "resuming interrupted operation");
            self.replay(branch, &mut entry)?;
            entry = self.states().load(branch)?;
        }
        Ok(entry)
    }

    fn ensure_idle(branch: &BranchName, entry: &StateEntry) -> Result<(), EngineError> {
        match &entry.state.pending_fuse {
            Some(pending) => Err(EngineError::FuseInProgress {
                branch: branch.clone(),
                merge_type: pending.merge_type,
            }),
            None => Ok(()),
        }
    }

    fn resolve_source(
        &self,
        branch: &BranchName,
        source: Option<&str>,
    ) -> Result<(BranchName, Oid), EngineError> {
        let source = match source {
            Some(name) => BranchName::new(name)
                .map_err(|_| EngineError::BranchNotFound(name.to_string()))?,
            None => self
                .vcs
                .upstream(branch)?
                .ok_or_else(|| EngineError::NoUpstream(branch.clone()))?,
        };
        let tip = match self.vcs.read_ref(&RefName::for_branch(&source))? {
            Some(tip) => tip,
            None => self
                .vcs
                .resolve_revision(source.as_str())?
                .ok_or_else(|| EngineError::BranchNotFound(source.to_string()))?,
        };
        Ok((source, tip))
    }

    fn resolve_commits(&self, revs: &[String]) -> Result<Vec<Oid>, EngineError> {
        revs.iter()
            .map(|rev| {
                self.vcs
                    .resolve_revision(rev)?
                    .ok_or_else(|| EngineError::InvalidCommit(rev.clone()))
            })
            .collect()
    }

    /// Whether `queue` extends `tip` commit by commit along single parents.
    fn is_first_parent_chain(&self, tip: &Oid, queue: &[Oid]) -> Result<bool, EngineError> {
        let mut previous = tip.clone();
        for commit in queue {
            if self.vcs.commit_info(commit)?.parents.as_slice() != std::slice::from_ref(&previous) {
                return Ok(false);
            }
            previous = commit.clone();
        }
        Ok(true)
    }

    fn fast_forward(
        &self,
        branch: &BranchName,
        tip: Option<&Oid>,
        target: &Oid,
        commits: usize,
    ) -> Result<FuseOutcome, EngineError> {
        let from = commit_entries(self.vcs, tip)?;
        let dirty = self.uncommitted_paths(&from)?;
        let stash = self.stash_and_reset(branch, StashSlot::Fuse, tip, &from, &dirty)?;

        let to = commit_entries(self.vcs, Some(target))?;
        worktree::checkout(self.vcs, &from, &to)?;
        self.vcs.update_ref_cas(
            &RefName::for_branch(branch),
            target,
            tip,
            &format!("tbd: fast-forward {}", branch),
        )?;
        self.sync_index(Some(target))?;
        info!(branch = %branch, tip = %target.short(7), commits, "fast-forwarded");

        if let Some(stash) = stash {
            let applied = self.reapply_stash(branch, StashSlot::Fuse, &stash.commit, &to)?;
            if !applied.is_clean() {
                return Err(Self::apply_failed(branch, StashSlot::Fuse, &applied));
            }
        }

        Ok(FuseOutcome::FastForward {
            tip: target.clone(),
            commits,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn start(
        &self,
        branch: &BranchName,
        mut entry: StateEntry,
        merge_type: MergeType,
        source: BranchName,
        tip: Oid,
        insertion_point: Oid,
        queue: Vec<Oid>,
    ) -> Result<FuseOutcome, EngineError> {
        let tip_tree = self.vcs.commit_info(&tip)?.tree;
        let reference = self.vcs.tree_entries(&tip_tree)?;
        let dirty = self.uncommitted_paths(&reference)?;
        let stash = self.stash_and_reset(branch, StashSlot::Fuse, Some(&tip), &reference, &dirty)?;

        let pending = PendingFuse::new(
            merge_type,
            source,
            tip,
            insertion_point,
            queue,
            tip_tree,
            stash.map(|s| s.commit),
        );
        debug!(id = %pending.id, steps = pending.remaining_commits.len(), "starting {}", merge_type);
        entry.state.pending_fuse = Some(pending);
        self.states().save(branch, &mut entry)?;

        self.replay(branch, &mut entry)
    }

    /// Apply remaining steps until one conflicts or none is left.
    pub(crate) fn replay(
        &self,
        branch: &BranchName,
        entry: &mut StateEntry,
    ) -> Result<FuseOutcome, EngineError> {
        loop {
            let (next, insertion_point, merge_type, source) = {
                let pending = entry
                    .state
                    .pending_fuse
                    .as_ref()
                    .ok_or_else(|| EngineError::NoFuseInProgress(branch.clone()))?;
                if let Some(awaiting) = &pending.awaiting {
                    return Err(EngineError::Conflict {
                        commit: awaiting.commit.clone(),
                        paths: pending.conflicts.unresolved.iter().cloned().collect(),
                    });
                }
                (
                    pending.remaining_commits.first().cloned(),
                    pending.insertion_point.clone(),
                    pending.merge_type,
                    pending.source.clone(),
                )
            };
            let Some(next) = next else {
                return self.finalize(branch, entry);
            };

            let step = match merge_type {
                MergeType::Merge => self.merge_step(branch, &source, &insertion_point, &next)?,
                MergeType::Fuse => self.fuse_step(&insertion_point, &next)?,
            };

            let pending = entry
                .state
                .pending_fuse
                .as_mut()
                .ok_or_else(|| EngineError::NoFuseInProgress(branch.clone()))?;
            match step {
                Step::Reuse(commit) | Step::Created(commit) => {
                    debug!(from = %next.short(7), to = %commit.short(7), "applied step");
                    pending.insertion_point = commit;
                    pending.remaining_commits.remove(0);
                }
                Step::Skip => {
                    info!(commit = %next.short(7), "changes already present, skipping");
                    pending.remaining_commits.remove(0);
                }
                Step::Conflict(merge) => {
                    let TreeMerge::Conflicted { tree, paths } = merge else {
                        return Err(EngineError::Internal("conflict step without conflicts".into()));
                    };
                    let from = self.vcs.tree_entries(&pending.worktree)?;
                    let to = self.vcs.tree_entries(&tree)?;
                    worktree::checkout(self.vcs, &from, &to)?;

                    pending.awaiting = Some(AwaitingStep {
                        commit: next.clone(),
                        tree: tree.clone(),
                    });
                    pending.conflicts.mark_conflicted(paths.iter().cloned());
                    pending.worktree = tree;
                    self.states().save(branch, entry)?;

                    info!(commit = %next.short(7), conflicts = paths.len(), "step conflicted");
                    return Err(EngineError::Conflict {
                        commit: next,
                        paths: paths.into_iter().collect(),
                    });
                }
            }
            self.states().save(branch, entry)?;
        }
    }

    fn fuse_step(&self, insertion_point: &Oid, commit: &Oid) -> Result<Step, EngineError> {
        let info = self.vcs.commit_info(commit)?;
        if info.parents.as_slice() == std::slice::from_ref(insertion_point) {
            return Ok(Step::Reuse(commit.clone()));
        }

        let base_tree = self.vcs.commit_info(insertion_point)?.tree;
        match self.vcs.apply_commit_onto_tree(commit, &base_tree)? {
            TreeMerge::Clean(tree) if tree == base_tree => Ok(Step::Skip),
            TreeMerge::Clean(tree) => {
                let created =
                    self.vcs
                        .create_commit(&tree, std::slice::from_ref(insertion_point), &info.message)?;
                Ok(Step::Created(created))
            }
            conflicted @ TreeMerge::Conflicted { .. } => Ok(Step::Conflict(conflicted)),
        }
    }

    fn merge_step(
        &self,
        branch: &BranchName,
        source: &BranchName,
        insertion_point: &Oid,
        source_tip: &Oid,
    ) -> Result<Step, EngineError> {
        let base = match self.vcs.merge_base(insertion_point, source_tip)? {
            Some(base) => Some(self.vcs.commit_info(&base)?.tree),
            None => None,
        };
        let ours = self.vcs.commit_info(insertion_point)?.tree;
        let theirs = self.vcs.commit_info(source_tip)?.tree;
        let labels = MergeLabels {
            ours: branch.as_str(),
            theirs: source.as_str(),
        };

        match self
            .vcs
            .three_way_merge_trees(base.as_ref(), &ours, &theirs, &labels)?
        {
            TreeMerge::Clean(tree) => {
                let parents = [insertion_point.clone(), source_tip.clone()];
                let message = format!("Merge branch '{}'", source);
                Ok(Step::Created(self.vcs.create_commit(&tree, &parents, &message)?))
            }
            conflicted => Ok(Step::Conflict(conflicted)),
        }
    }

    /// Move the branch to the result and restore uncommitted changes.
    ///
    /// Safe to run again after an interruption: a ref that already points
    /// at the result is left alone.
    fn finalize(
        &self,
        branch: &BranchName,
        entry: &mut StateEntry,
    ) -> Result<FuseOutcome, EngineError> {
        let pending = entry
            .state
            .pending_fuse
            .clone()
            .ok_or_else(|| EngineError::NoFuseInProgress(branch.clone()))?;
        let result = pending.insertion_point.clone();

        let refname = RefName::for_branch(branch);
        if self.vcs.read_ref(&refname)?.as_ref() != Some(&result) {
            self.vcs.update_ref_cas(
                &refname,
                &result,
                Some(&pending.original_tip),
                &format!("tbd: {} {}", pending.merge_type, pending.source),
            )?;
        }
        self.sync_index(Some(&result))?;

        let from = self.vcs.tree_entries(&pending.worktree)?;
        let to = commit_entries(self.vcs, Some(&result))?;
        worktree::checkout(self.vcs, &from, &to)?;

        entry.state.pending_fuse = None;
        self.states().save(branch, entry)?;
        info!(
            branch = %branch,
            tip = %result.short(7),
            "{} of {} finished",
            pending.merge_type,
            pending.source
        );

        if let Some(stash) = &pending.stash {
            let applied = self.reapply_stash(branch, StashSlot::Fuse, stash, &to)?;
            if !applied.is_clean() {
                return Err(Self::apply_failed(branch, StashSlot::Fuse, &applied));
            }
        }

        Ok(FuseOutcome::Finalized {
            tip: result,
            merge_type: pending.merge_type,
            source: pending.source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::RepoPath;
    use crate::engine::{CommitRequest, FileChange};
    use crate::git::mock::{FailOn, MockVcs};

    fn b(name: &str) -> BranchName {
        BranchName::new(name).unwrap()
    }

    fn tip(vcs: &MockVcs, branch: &str) -> Oid {
        vcs.read_ref(&RefName::for_branch(&b(branch))).unwrap().unwrap()
    }

    fn from(source: &str) -> FuseRequest {
        FuseRequest {
            source: Some(source.into()),
            ..FuseRequest::default()
        }
    }

    /// main: base -> m1, topic: base -> t1 -> t2. The working copy is at m1.
    fn diverged() -> (MockVcs, Oid, Oid, Oid, Oid) {
        let vcs = MockVcs::new();
        let base = vcs.commit_files("main", &[("a.txt", Some("a\n"))], "base");
        vcs.create_branch_at("topic", &base);
        let m1 = vcs.commit_files("main", &[("m.txt", Some("m\n"))], "m1");
        let t1 = vcs.commit_files("topic", &[("t1.txt", Some("t1\n"))], "t1");
        let t2 = vcs.commit_files("topic", &[("t2.txt", Some("t2\n"))], "t2");
        vcs.checkout_commit_files(&m1);
        (vcs, base, m1, t1, t2)
    }

    /// main and topic both change a.txt after base.
    fn conflicting() -> (MockVcs, Oid) {
        let vcs = MockVcs::new();
        let base = vcs.commit_files("main", &[("a.txt", Some("a\n"))], "base");
        vcs.create_branch_at("topic", &base);
        let m1 = vcs.commit_files("main", &[("a.txt", Some("main\n"))], "m1");
        vcs.commit_files("topic", &[("a.txt", Some("topic\n"))], "t1");
        vcs.checkout_commit_files(&m1);
        (vcs, m1)
    }

    #[test]
    fn parses_insertion_points() {
        assert_eq!(InsertionPoint::parse("HEAD"), InsertionPoint::Head);
        assert_eq!(InsertionPoint::parse("dp"), InsertionPoint::DivergencePoint);
        assert_eq!(
            InsertionPoint::parse("abc123"),
            InsertionPoint::Commit("abc123".into())
        );
        assert_eq!(
            InsertionPoint::from(InsertionPointDefault::Dp),
            InsertionPoint::DivergencePoint
        );
    }

    #[test]
    fn fast_forwards_when_contained() {
        let vcs = MockVcs::new();
        let base = vcs.commit_files("main", &[("a.txt", Some("a\n"))], "base");
        vcs.checkout_commit_files(&base);
        vcs.create_branch_at("topic", &base);
        let t1 = vcs.commit_files("topic", &[("b.txt", Some("b\n"))], "add b");

        let outcome = Engine::new(&vcs).fuse(&from("topic")).unwrap();
        assert_eq!(outcome, FuseOutcome::FastForward { tip: t1.clone(), commits: 1 });
        assert_eq!(tip(&vcs, "main"), t1);
        assert_eq!(vcs.work_file("b.txt").as_deref(), Some("b\n"));
        assert!(Engine::new(&vcs).states().load(&b("main")).unwrap().ref_oid.is_none());
    }

    #[test]
    fn fuses_divergent_commits_after_head() {
        let (vcs, _, m1, _, _) = diverged();
        let outcome = Engine::new(&vcs).fuse(&from("topic")).unwrap();

        let new_tip = tip(&vcs, "main");
        assert_eq!(outcome.tip(), &new_tip);
        let top = vcs.commit_info(&new_tip).unwrap();
        assert_eq!(top.summary, "t2");
        let below = vcs.commit_info(&top.parents[0]).unwrap();
        assert_eq!(below.summary, "t1");
        assert_eq!(below.parents, vec![m1]);

        assert_eq!(vcs.work_file("t1.txt").as_deref(), Some("t1\n"));
        assert_eq!(vcs.work_file("t2.txt").as_deref(), Some("t2\n"));
        assert_eq!(vcs.work_file("m.txt").as_deref(), Some("m\n"));
    }

    #[test]
    fn only_and_exclude_narrow_the_selection() {
        let (vcs, _, _, _, t2) = diverged();
        let request = FuseRequest {
            only: vec![t2.as_str().to_string()],
            ..from("topic")
        };
        let outcome = Engine::new(&vcs).fuse(&request).unwrap();
        assert_eq!(vcs.file_at(outcome.tip(), "t2.txt").as_deref(), Some("t2\n"));
        assert_eq!(vcs.file_at(outcome.tip(), "t1.txt"), None);

        let (vcs, _, _, t1, _) = diverged();
        let request = FuseRequest {
            exclude: vec![t1.short(10).to_string()],
            ..from("topic")
        };
        let outcome = Engine::new(&vcs).fuse(&request).unwrap();
        assert_eq!(vcs.file_at(outcome.tip(), "t1.txt"), None);
        assert_eq!(vcs.file_at(outcome.tip(), "t2.txt").as_deref(), Some("t2\n"));
    }

    #[test]
    fn empty_selection_is_rejected() {
        let (vcs, _, _, t1, t2) = diverged();
        let request = FuseRequest {
            exclude: vec![t1.as_str().to_string(), t2.as_str().to_string()],
            ..from("topic")
        };
        let err = Engine::new(&vcs).fuse(&request).unwrap_err();
        assert_eq!(err.to_string(), "No commits to fuse");

        let vcs = MockVcs::new();
        let base = vcs.commit_files("main", &[("a.txt", Some("a\n"))], "base");
        vcs.checkout_commit_files(&base);
        vcs.create_branch_at("topic", &base);
        let err = Engine::new(&vcs).fuse(&from("topic")).unwrap_err();
        assert!(matches!(err, EngineError::NothingToFuse));
    }

    #[test]
    fn unknown_selected_commit_is_invalid() {
        let (vcs, base, _, _, _) = diverged();
        let request = FuseRequest {
            only: vec![base.as_str().to_string()],
            ..from("topic")
        };
        let err = Engine::new(&vcs).fuse(&request).unwrap_err();
        assert!(matches!(err, EngineError::InvalidCommit(_)));

        let request = FuseRequest {
            only: vec!["nonsense".into()],
            ..from("topic")
        };
        let err = Engine::new(&vcs).fuse(&request).unwrap_err();
        assert!(matches!(err, EngineError::InvalidCommit(id) if id == "nonsense"));
    }

    #[test]
    fn source_defaults_to_upstream() {
        let (vcs, _, _, _, _) = diverged();
        let engine = Engine::new(&vcs);
        assert!(matches!(
            engine.fuse(&FuseRequest::default()),
            Err(EngineError::NoUpstream(_))
        ));

        vcs.set_upstream(&b("main"), Some(&b("topic"))).unwrap();
        let outcome = engine.fuse(&FuseRequest::default()).unwrap();
        assert!(matches!(outcome, FuseOutcome::Finalized { source, .. } if source == b("topic")));
    }

    #[test]
    fn divergence_point_puts_source_commits_first() {
        let (vcs, base, _, t1, _) = diverged();
        let request = FuseRequest {
            only: vec![t1.as_str().to_string()],
            insertion_point: Some(InsertionPoint::DivergencePoint),
            ..from("topic")
        };
        let outcome = Engine::new(&vcs).fuse(&request).unwrap();

        let top = vcs.commit_info(outcome.tip()).unwrap();
        assert_eq!(top.summary, "m1");
        assert_eq!(top.parents, vec![t1.clone()]);
        assert_eq!(vcs.commit_info(&t1).unwrap().parents, vec![base]);
        assert_eq!(vcs.work_file("t1.txt").as_deref(), Some("t1\n"));
    }

    #[test]
    fn explicit_insertion_point_must_be_an_ancestor() {
        let (vcs, _, _, t1, _) = diverged();
        let request = FuseRequest {
            insertion_point: Some(InsertionPoint::Commit(t1.as_str().to_string())),
            ..from("topic")
        };
        let err = Engine::new(&vcs).fuse(&request).unwrap_err();
        assert!(matches!(err, EngineError::InvalidCommit(_)));
    }

    #[test]
    fn uncommitted_changes_survive_a_fuse() {
        let (vcs, _, _, _, _) = diverged();
        vcs.set_work_file("m.txt", "edited\n");

        Engine::new(&vcs).fuse(&from("topic")).unwrap();
        assert_eq!(vcs.work_file("m.txt").as_deref(), Some("edited\n"));
        assert_eq!(vcs.work_file("t2.txt").as_deref(), Some("t2\n"));
        let pin = RefName::for_stash(&b("main"), StashSlot::Fuse);
        assert_eq!(vcs.read_ref(&pin).unwrap(), None);
    }

    #[test]
    fn conflicting_uncommitted_changes_are_kept_in_a_stash() {
        let vcs = MockVcs::new();
        let base = vcs.commit_files("main", &[("a.txt", Some("a\n"))], "base");
        vcs.checkout_commit_files(&base);
        vcs.create_branch_at("topic", &base);
        let t1 = vcs.commit_files("topic", &[("a.txt", Some("topic\n"))], "t1");
        vcs.set_work_file("a.txt", "mine\n");

        let err = Engine::new(&vcs).fuse(&from("topic")).unwrap_err();
        assert!(err.to_string().contains("failed to apply"));
        assert!(matches!(&err, EngineError::ApplyFailed { stash_ref, .. }
            if stash_ref == "refs/tbd/stash/main/fuse"));
        assert_eq!(tip(&vcs, "main"), t1);
        let content = vcs.work_file("a.txt").unwrap();
        assert!(content.contains("<<<<<<< Updated upstream"));
        assert!(content.contains("mine"));
        let pin = RefName::for_stash(&b("main"), StashSlot::Fuse);
        assert!(vcs.read_ref(&pin).unwrap().is_some());
    }

    #[test]
    fn fused_files_keep_their_mode_and_the_index_follows() {
        let (vcs, _, _, _, _) = diverged();
        vcs.commit_files_with_mode(
            "topic",
            &[("run.sh", Some("#!/bin/sh\n"))],
            crate::git::MODE_EXECUTABLE,
            "add script",
        );

        let outcome = Engine::new(&vcs).fuse(&from("topic")).unwrap();
        let run = RepoPath::new("run.sh").unwrap();
        assert_eq!(
            vcs.work_file_mode(&run).unwrap(),
            Some(crate::git::MODE_EXECUTABLE)
        );
        let tree = vcs.commit_info(outcome.tip()).unwrap().tree;
        assert_eq!(vcs.tree_entries(&tree).unwrap()[&run].mode, crate::git::MODE_EXECUTABLE);
        assert_eq!(vcs.index_tree(), Some(tree));
    }

    #[test]
    fn stash_conflict_surfaces_when_the_last_step_is_committed() {
        let vcs = MockVcs::new();
        let base = vcs.commit_files(
            "main",
            &[("a.txt", Some("a\n")), ("b.txt", Some("b\n"))],
            "base",
        );
        vcs.create_branch_at("topic", &base);
        let m1 = vcs.commit_files("main", &[("b.txt", Some("main\n"))], "m1");
        vcs.commit_files("topic", &[("b.txt", Some("t1\n"))], "t1");
        vcs.commit_files("topic", &[("b.txt", Some("t2\n")), ("a.txt", Some("topic\n"))], "t2");
        vcs.checkout_commit_files(&m1);
        vcs.set_work_file("a.txt", "uncommitted\n");
        let engine = Engine::new(&vcs);
        let b_txt = RepoPath::new("b.txt").unwrap();
        let commit = |message: &str| {
            engine.commit(&CommitRequest {
                message: message.into(),
                ..CommitRequest::default()
            })
        };

        assert!(matches!(engine.fuse(&from("topic")), Err(EngineError::Conflict { .. })));
        assert_eq!(vcs.work_file("a.txt").as_deref(), Some("a\n"));
        vcs.set_work_file("b.txt", "first\n");
        engine.resolve(std::slice::from_ref(&b_txt)).unwrap();
        assert!(matches!(commit("ci 0"), Err(EngineError::Conflict { .. })));

        vcs.set_work_file("b.txt", "second\n");
        engine.resolve(std::slice::from_ref(&b_txt)).unwrap();
        let err = commit("ci 1").unwrap_err();
        assert!(err.to_string().contains("failed to apply"));
        assert!(matches!(&err, EngineError::ApplyFailed { paths, stash_ref }
            if paths == &vec![RepoPath::new("a.txt").unwrap()]
                && stash_ref == "refs/tbd/stash/main/fuse"));

        let new_tip = tip(&vcs, "main");
        let top = vcs.commit_info(&new_tip).unwrap();
        assert_eq!(top.summary, "ci 1");
        assert_eq!(vcs.commit_info(&top.parents[0]).unwrap().summary, "ci 0");
        assert_eq!(vcs.file_at(&new_tip, "a.txt").as_deref(), Some("topic\n"));

        let content = vcs.work_file("a.txt").unwrap();
        assert!(content.contains("<<<<<<< Updated upstream"));
        assert!(content.contains("topic"));
        assert!(content.contains("uncommitted"));
        assert!(content.contains(">>>>>>> Stashed changes"));
        assert!(engine.states().load(&b("main")).unwrap().state.pending_fuse.is_none());
        let pin = RefName::for_stash(&b("main"), StashSlot::Fuse);
        assert!(vcs.read_ref(&pin).unwrap().is_some());
    }

    #[test]
    fn merge_reports_conflicting_uncommitted_changes() {
        let vcs = MockVcs::new();
        let base = vcs.commit_files("main", &[("a.txt", Some("a\n"))], "base");
        vcs.create_branch_at("topic", &base);
        let m1 = vcs.commit_files("main", &[("m.txt", Some("m\n"))], "m1");
        let t1 = vcs.commit_files("topic", &[("a.txt", Some("contents 2\n"))], "t1");
        vcs.checkout_commit_files(&m1);
        vcs.set_work_file("a.txt", "uncommitted\n");

        let err = Engine::new(&vcs).merge(Some("topic")).unwrap_err();
        assert!(matches!(&err, EngineError::ApplyFailed { stash_ref, .. }
            if stash_ref == "refs/tbd/stash/main/fuse"));

        let info = vcs.commit_info(&tip(&vcs, "main")).unwrap();
        assert_eq!(info.parents, vec![m1, t1]);
        let content = vcs.work_file("a.txt").unwrap();
        assert!(content.contains("uncommitted"));
        assert!(content.contains("contents 2"));
    }

    #[test]
    fn conflict_leaves_markers_and_keeps_the_branch() {
        let (vcs, m1) = conflicting();
        let engine = Engine::new(&vcs);

        let err = engine.fuse(&from("topic")).unwrap_err();
        assert!(err.to_string().contains("conflicts"));
        assert!(matches!(&err, EngineError::Conflict { paths, .. } if paths.len() == 1));
        assert_eq!(tip(&vcs, "main"), m1);

        let content = vcs.work_file("a.txt").unwrap();
        assert!(content.contains("<<<<<<< HEAD"));
        assert!(content.contains(">>>>>>> "));
        assert!(content.contains(" t1"));

        let state = engine.states().load(&b("main")).unwrap().state;
        assert_eq!(state.fuse_state(), FuseState::Conflicted);

        assert!(matches!(
            engine.fuse(&from("topic")),
            Err(EngineError::FuseInProgress { merge_type: MergeType::Fuse, .. })
        ));
        assert!(matches!(
            engine.continue_fuse(),
            Err(EngineError::UnresolvedConflicts(_))
        ));
    }

    #[test]
    fn resolved_conflict_is_committed_and_finalizes() {
        let (vcs, m1) = conflicting();
        let engine = Engine::new(&vcs);
        engine.fuse(&from("topic")).unwrap_err();

        let a = RepoPath::new("a.txt").unwrap();
        vcs.set_work_file("a.txt", "both\n");
        let resolved = engine.resolve(std::slice::from_ref(&a)).unwrap();
        assert!(resolved[0].result.is_ok());

        let outcome = engine
            .commit(&CommitRequest {
                message: "resolve".into(),
                ..CommitRequest::default()
            })
            .unwrap();
        assert_eq!(outcome.paths, vec![(a, FileChange::Modified)]);
        assert!(matches!(outcome.fuse, Some(FuseOutcome::Finalized { .. })));

        let new_tip = tip(&vcs, "main");
        let info = vcs.commit_info(&new_tip).unwrap();
        assert_eq!(info.parents, vec![m1]);
        assert_eq!(info.summary, "resolve");
        assert_eq!(vcs.file_at(&new_tip, "a.txt").as_deref(), Some("both\n"));
        assert!(engine.states().load(&b("main")).unwrap().ref_oid.is_none());
    }

    #[test]
    fn abort_restores_the_original_tip() {
        let (vcs, m1) = conflicting();
        vcs.set_work_file("extra.txt", "untracked\n");
        let engine = Engine::new(&vcs);
        engine.fuse(&from("topic")).unwrap_err();

        let outcome = engine.abort_fuse().unwrap();
        assert_eq!(outcome.merge_type, MergeType::Fuse);
        assert_eq!(outcome.source, b("topic"));
        assert_eq!(tip(&vcs, "main"), m1);
        assert_eq!(vcs.work_file("a.txt").as_deref(), Some("main\n"));
        assert_eq!(vcs.work_file("extra.txt").as_deref(), Some("untracked\n"));
        assert!(matches!(
            engine.abort_fuse(),
            Err(EngineError::NoFuseInProgress(_))
        ));
    }

    #[test]
    fn interrupted_replay_can_be_continued() {
        let (vcs, _, m1, _, _) = diverged();
        let engine = Engine::new(&vcs);

        vcs.fail_on(FailOn::CreateCommitAfter(1));
        let err = engine.fuse(&from("topic")).unwrap_err();
        assert!(err.is_internal());
        assert_eq!(tip(&vcs, "main"), m1);
        let state = engine.states().load(&b("main")).unwrap().state;
        assert_eq!(state.fuse_state(), FuseState::Replaying);
        assert_eq!(state.pending_fuse.unwrap().remaining_commits.len(), 1);

        vcs.clear_fail_on();
        let outcome = engine.continue_fuse().unwrap();
        assert_eq!(vcs.commit_info(outcome.tip()).unwrap().summary, "t2");
        assert_eq!(vcs.work_file("t2.txt").as_deref(), Some("t2\n"));
    }

    #[test]
    fn interrupted_replay_can_be_aborted() {
        let (vcs, _, m1, _, _) = diverged();
        let engine = Engine::new(&vcs);

        vcs.fail_on(FailOn::CreateCommitAfter(1));
        engine.fuse(&from("topic")).unwrap_err();
        vcs.clear_fail_on();

        engine.abort_fuse().unwrap();
        assert_eq!(tip(&vcs, "main"), m1);
        assert_eq!(vcs.work_file("t1.txt"), None);
        assert_eq!(vcs.work_file("m.txt").as_deref(), Some("m\n"));
    }

    #[test]
    fn merge_creates_a_two_parent_commit() {
        let (vcs, _, m1, _, t2) = diverged();
        let outcome = Engine::new(&vcs).merge(Some("topic")).unwrap();

        let info = vcs.commit_info(outcome.tip()).unwrap();
        assert_eq!(info.parents, vec![m1, t2]);
        assert_eq!(info.summary, "Merge branch 'topic'");
        assert_eq!(vcs.work_file("t1.txt").as_deref(), Some("t1\n"));

        assert!(matches!(
            Engine::new(&vcs).merge(Some("topic")),
            Err(EngineError::NothingToFuse)
        ));
    }

    #[test]
    fn merge_conflicts_wait_for_a_commit() {
        let (vcs, m1) = conflicting();
        let engine = Engine::new(&vcs);
        let err = engine.merge(Some("topic")).unwrap_err();
        assert!(matches!(err, EngineError::Conflict { .. }));

        let a = RepoPath::new("a.txt").unwrap();
        vcs.set_work_file("a.txt", "merged\n");
        engine.resolve(&[a]).unwrap();
        let outcome = engine
            .commit(&CommitRequest {
                message: "merge topic".into(),
                ..CommitRequest::default()
            })
            .unwrap();

        let tip = outcome.fuse.unwrap().tip().clone();
        let info = vcs.commit_info(&tip).unwrap();
        assert_eq!(info.parents.len(), 2);
        assert_eq!(info.parents[0], m1);
    }

    #[test]
    fn unborn_branch_takes_the_whole_source() {
        let vcs = MockVcs::new();
        let t1 = vcs.commit_files("topic", &[("a.txt", Some("a\n"))], "t1");
        let engine = Engine::new(&vcs);

        let request = FuseRequest {
            only: vec![t1.as_str().to_string()],
            ..from("topic")
        };
        let t2 = vcs.commit_files("topic", &[("b.txt", Some("b\n"))], "t2");
        assert!(matches!(engine.fuse(&request), Err(EngineError::NoCommits(_))));

        let outcome = engine.fuse(&from("topic")).unwrap();
        assert_eq!(outcome, FuseOutcome::FastForward { tip: t2, commits: 2 });
        assert_eq!(vcs.work_file("a.txt").as_deref(), Some("a\n"));
    }
}
