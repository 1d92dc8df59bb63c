//! engine
//!
//! Repository operations with tbd semantics, on top of the [`Vcs`] seam.
//!
//! # Architecture
//!
//! [`Engine`] borrows an engine implementation and exposes one method per
//! user-level operation:
//!
//! - tracking: [`Engine::track`], [`Engine::untrack`]
//! - fuse and merge: [`Engine::fuse`], [`Engine::merge`],
//!   [`Engine::resolve`], [`Engine::abort_fuse`], [`Engine::continue_fuse`]
//! - commits: [`Engine::commit`]
//! - branches: [`Engine::switch`], [`Engine::branch_create`],
//!   [`Engine::branch_delete`], [`Engine::branch_list`],
//!   [`Engine::set_upstream`]
//! - tags: [`Engine::tag_create`], [`Engine::tag_delete`], [`Engine::tag_list`]
//! - files: [`Engine::checkout_paths`]
//! - inspection: [`Engine::status`], [`Engine::history`], [`Engine::diff`]
//!
//! Persistent state lives in refs owned by tbd: the tracking record and one
//! branch state record per branch. Every transition of a pending fuse is a
//! single compare-and-swap ref update, so an interrupted run leaves a record
//! the next run can pick up.
//!
//! # Invariants
//!
//! - A branch ref only moves at the end of a fuse or merge, checked against
//!   the tip recorded when the operation started
//! - Uncommitted tracked changes are stashed before the working copy is
//!   rewritten and re-applied afterwards
//! - The engine never takes the repository lock; callers do
//!
//! # Example
//!
//! ```
//! use tbd::engine::{Engine, FuseRequest};
//! use tbd::git::mock::MockVcs;
//!
//! let vcs = MockVcs::new();
//! let base = vcs.commit_files("main", &[("a.txt", Some("a\n"))], "base");
//! vcs.checkout_commit_files(&base);
//! vcs.create_branch_at("topic", &base);
//! vcs.commit_files("topic", &[("b.txt", Some("b\n"))], "add b");
//!
//! let engine = Engine::new(&vcs);
//! let request = FuseRequest {
//!     source: Some("topic".into()),
//!     ..FuseRequest::default()
//! };
//! engine.fuse(&request).unwrap();
//! assert_eq!(vcs.work_file("b.txt").as_deref(), Some("b\n"));
//! ```

mod branch;
mod commit;
pub mod error;
mod files;
mod fuse;
mod status;
mod tag;
pub mod worktree;

pub use branch::{BranchInfo, SwitchOutcome};
pub use commit::{CommitOutcome, CommitRequest};
pub use error::EngineError;
pub use files::{DiffBody, FileDiff};
pub use fuse::{AbortOutcome, FuseOutcome, FuseRequest, InsertionPoint};
pub use status::{ConflictMark, FileChange, FuseStatus, StatusReport, TrackedFile, UntrackedFile};
pub use tag::TagInfo;

use std::collections::BTreeSet;
use std::path::PathBuf;

use tracing::debug;

use crate::core::config::InsertionPointDefault;
use crate::core::state::{BranchStateStore, BranchStateV1, StateEntry};
use crate::core::tracking::TrackingStore;
use crate::core::types::{BranchName, Oid, RefName, RepoPath, StashSlot};
use crate::git::{TreeEntries, Vcs};

use worktree::{AppliedStash, Stash};

/// Execution context for commands.
///
/// Contains global settings derived from CLI flags that affect command behavior.
#[derive(Debug, Clone)]
pub struct Context {
    /// Working directory override.
    pub cwd: Option<PathBuf>,
    /// Debug logging enabled.
    pub debug: bool,
    /// Quiet mode (minimal output).
    pub quiet: bool,
    /// Interactive mode override from the command line; `None` defers to
    /// configuration.
    pub interactive: Option<bool>,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            cwd: None,
            debug: false,
            quiet: false,
            interactive: None,
        }
    }
}

/// Outcome for one path of a multi-path command.
#[derive(Debug)]
pub struct PathOutcome {
    /// The path as resolved against the repository root.
    pub path: RepoPath,
    /// What happened to it.
    pub result: Result<(), EngineError>,
}

impl PathOutcome {
    fn ok(path: RepoPath) -> Self {
        Self {
            path,
            result: Ok(()),
        }
    }

    fn failed(path: RepoPath, err: impl Into<EngineError>) -> Self {
        Self {
            path,
            result: Err(err.into()),
        }
    }
}

/// A user path matched against the working copy and the reference tree.
pub(crate) enum Expansion {
    /// A file.
    File(RepoPath),
    /// A directory and the files below it.
    Dir(Vec<RepoPath>),
    /// Nothing by that name.
    Missing,
}

/// Expand `path` to the files it names.
pub(crate) fn expand_path(
    path: &RepoPath,
    reference: &TreeEntries,
    work_files: &BTreeSet<RepoPath>,
) -> Expansion {
    if reference.contains_key(path) || work_files.contains(path) {
        return Expansion::File(path.clone());
    }
    let below: BTreeSet<RepoPath> = reference
        .keys()
        .chain(work_files.iter())
        .filter(|p| p.is_within(path))
        .cloned()
        .collect();
    if below.is_empty() {
        Expansion::Missing
    } else {
        Expansion::Dir(below.into_iter().collect())
    }
}

/// tbd operations over a version-control engine.
pub struct Engine<'a, V: Vcs + ?Sized> {
    vcs: &'a V,
    insertion_point: InsertionPointDefault,
}

impl<'a, V: Vcs + ?Sized> Engine<'a, V> {
    /// Create an engine with default settings.
    pub fn new(vcs: &'a V) -> Self {
        Self {
            vcs,
            insertion_point: InsertionPointDefault::default(),
        }
    }

    /// Set where `fuse` inserts commits when the request does not say.
    pub fn with_insertion_point(mut self, default: InsertionPointDefault) -> Self {
        self.insertion_point = default;
        self
    }

    /// The underlying engine.
    pub fn vcs(&self) -> &'a V {
        self.vcs
    }

    pub(crate) fn states(&self) -> BranchStateStore<'a, V> {
        BranchStateStore::new(self.vcs)
    }

    pub(crate) fn tracking(&self) -> TrackingStore<'a, V> {
        TrackingStore::new(self.vcs)
    }

    /// The checked-out branch.
    ///
    /// # Errors
    ///
    /// [`EngineError::DetachedHead`] when HEAD is not on a branch.
    pub fn current_branch(&self) -> Result<BranchName, EngineError> {
        self.vcs.current_branch()?.ok_or(EngineError::DetachedHead)
    }

    /// Tip of a local branch; `None` for an unborn branch.
    pub(crate) fn branch_tip(&self, branch: &BranchName) -> Result<Option<Oid>, EngineError> {
        Ok(self.vcs.read_ref(&RefName::for_branch(branch))?)
    }

    /// Reset the engine's index to `tip`'s tree after the current branch
    /// moved.
    pub(crate) fn sync_index(&self, tip: Option<&Oid>) -> Result<(), EngineError> {
        let tree = match tip {
            Some(commit) => Some(self.vcs.commit_info(commit)?.tree),
            None => None,
        };
        self.vcs.reset_index(tree.as_ref())?;
        Ok(())
    }

    /// The tree tracked modifications are measured against: the tree a
    /// pending operation left in the working copy, or the tip's tree.
    pub(crate) fn reference_entries(
        &self,
        state: &BranchStateV1,
        tip: Option<&Oid>,
    ) -> Result<TreeEntries, EngineError> {
        match &state.pending_fuse {
            Some(pending) => Ok(self.vcs.tree_entries(&pending.worktree)?),
            None => Ok(worktree::commit_entries(self.vcs, tip)?),
        }
    }

    /// Tracked paths whose working-copy content differs from `reference`.
    pub(crate) fn uncommitted_paths(
        &self,
        reference: &TreeEntries,
    ) -> Result<BTreeSet<RepoPath>, EngineError> {
        let record = self.tracking().load()?.record;
        let work = self.vcs.work_files()?;
        let tracked = record.tracked_paths(reference, &work);
        Ok(worktree::dirty_paths(self.vcs, &tracked, reference)?)
    }

    /// Stash `paths` for `branch`, pin the stash in `slot` and reset the
    /// working copy to `reference`.
    pub(crate) fn stash_and_reset(
        &self,
        branch: &BranchName,
        slot: StashSlot,
        base_commit: Option<&Oid>,
        reference: &TreeEntries,
        paths: &BTreeSet<RepoPath>,
    ) -> Result<Option<Stash>, EngineError> {
        let message = format!("tbd: uncommitted changes on {}", branch);
        let stash = worktree::stash_save(self.vcs, base_commit, reference, paths, &message)?;
        if let Some(stash) = &stash {
            self.states().pin_stash(branch, slot, &stash.commit)?;
            worktree::checkout(self.vcs, &stash.entries, reference)?;
            debug!(branch = %branch, paths = paths.len(), "stashed uncommitted changes");
        }
        Ok(stash)
    }

    /// Re-apply a pinned stash onto a working copy reflecting `onto`. The
    /// pin is released only when the stash applied cleanly.
    pub(crate) fn reapply_stash(
        &self,
        branch: &BranchName,
        slot: StashSlot,
        stash: &Oid,
        onto: &TreeEntries,
    ) -> Result<AppliedStash, EngineError> {
        let applied = worktree::stash_apply(self.vcs, stash, onto)?;
        if applied.is_clean() {
            self.states().unpin_stash(branch, slot)?;
        }
        Ok(applied)
    }

    /// Error describing a stash that left conflicts.
    pub(crate) fn apply_failed(
        branch: &BranchName,
        slot: StashSlot,
        applied: &AppliedStash,
    ) -> EngineError {
        EngineError::ApplyFailed {
            paths: applied.conflicts.iter().cloned().collect(),
            stash_ref: RefName::for_stash(branch, slot).to_string(),
        }
    }

    // =========================================================================
    // Tracking
    // =========================================================================

    /// Start tracking paths. Directories expand to the untracked files
    /// below them.
    ///
    /// Each path is handled on its own; the returned outcomes say which
    /// failed. The call itself only fails when state cannot be read or
    /// written.
    pub fn track(&self, paths: &[RepoPath]) -> Result<Vec<PathOutcome>, EngineError> {
        self.update_tracking(paths, true)
    }

    /// Stop tracking paths. Directories expand to the tracked files below
    /// them.
    pub fn untrack(&self, paths: &[RepoPath]) -> Result<Vec<PathOutcome>, EngineError> {
        self.update_tracking(paths, false)
    }

    fn update_tracking(
        &self,
        paths: &[RepoPath],
        track: bool,
    ) -> Result<Vec<PathOutcome>, EngineError> {
        let branch = self.current_branch()?;
        let state = self.states().load(&branch)?.state;
        let tip = self.branch_tip(&branch)?;
        let reference = self.reference_entries(&state, tip.as_ref())?;
        let work = self.vcs.work_files()?;

        let store = self.tracking();
        let mut entry = store.load()?;
        let mut outcomes = Vec::new();

        for path in paths {
            let files = match expand_path(path, &reference, &work) {
                Expansion::File(file) => vec![file],
                Expansion::Dir(files) => {
                    let applicable: Vec<RepoPath> = files
                        .into_iter()
                        .filter(|f| entry.record.is_tracked(f, &reference) != track)
                        .collect();
                    if applicable.is_empty() {
                        let err = if track {
                            EngineError::AlreadyTracked(path.clone())
                        } else {
                            EngineError::NotTracked(path.clone())
                        };
                        outcomes.push(PathOutcome::failed(path.clone(), err));
                        continue;
                    }
                    applicable
                }
                Expansion::Missing => {
                    outcomes.push(PathOutcome::failed(
                        path.clone(),
                        EngineError::FileNotFound(path.to_string()),
                    ));
                    continue;
                }
            };

            for file in files {
                let in_work_copy = work.contains(&file);
                let result = if track {
                    entry.record.track(&file, in_work_copy, &reference)
                } else {
                    entry.record.untrack(&file, in_work_copy, &reference)
                };
                outcomes.push(match result {
                    Ok(()) => PathOutcome::ok(file),
                    Err(e) => PathOutcome::failed(file, e),
                });
            }
        }

        store.save(&mut entry)?;
        Ok(outcomes)
    }

    // =========================================================================
    // Conflict resolution
    // =========================================================================

    /// Mark conflicted paths of the pending step as resolved.
    ///
    /// Working-copy content is not inspected; resolving is the user's call.
    pub fn resolve(&self, paths: &[RepoPath]) -> Result<Vec<PathOutcome>, EngineError> {
        let branch = self.current_branch()?;
        let store = self.states();
        let mut entry: StateEntry = store.load(&branch)?;

        let Some(pending) = entry.state.pending_fuse.as_mut() else {
            return Ok(paths
                .iter()
                .map(|p| PathOutcome::failed(p.clone(), EngineError::NotConflicted(p.clone())))
                .collect());
        };

        let mut outcomes = Vec::new();
        let mut changed = false;
        for path in paths {
            match pending.conflicts.resolve(path) {
                Ok(()) => {
                    changed = true;
                    outcomes.push(PathOutcome::ok(path.clone()));
                }
                Err(e) => outcomes.push(PathOutcome::failed(path.clone(), e)),
            }
        }

        if changed {
            store.save(&branch, &mut entry)?;
        }
        Ok(outcomes)
    }
}
