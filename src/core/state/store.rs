//! core::state::store
//!
//! Branch state storage in Git refs.
//!
//! # Architecture
//!
//! Each branch's record is a JSON blob pointed to by
//! `refs/tbd/state/<branch>`. Stash commits are pinned separately by
//! `refs/tbd/stash/<branch>/{fuse,switch}` so that garbage collection keeps
//! them while a record refers to them.
//!
//! # CAS Semantics
//!
//! [`BranchStateStore::save`] writes the new blob first and then moves the
//! ref with compare-and-swap against the blob id seen at load time. Each
//! transition is therefore a single atomic ref update: a crash leaves
//! either the previous or the next record, never a torn one.
//!
//! # Example
//!
//! ```ignore
//! let store = BranchStateStore::new(&vcs);
//! let mut entry = store.load(&branch)?;
//! entry.state.switch_stash = Some(stash);
//! store.save(&branch, &mut entry)?;
//! ```

use thiserror::Error;
use tracing::debug;

use super::schema::{parse_branch_state, BranchStateV1, SchemaError};
use crate::core::types::{BranchName, Oid, RefName, StashSlot};
use crate::git::{GitError, Vcs};

/// Errors from branch state storage.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The record changed since it was loaded.
    #[error("branch state for {branch} changed concurrently: expected {expected}, found {actual}")]
    CasFailed {
        /// Branch whose record moved
        branch: String,
        /// The expected blob id
        expected: String,
        /// The blob id found
        actual: String,
    },

    /// Record content is not valid UTF-8.
    #[error("branch state for {0} is not valid UTF-8")]
    InvalidUtf8(String),

    /// Failed to serialize the record.
    #[error("failed to serialize branch state: {0}")]
    SerializeError(String),

    /// Git operation failed.
    #[error("git error: {0}")]
    GitError(#[from] GitError),

    /// Record failed validation.
    #[error("schema error: {0}")]
    SchemaError(#[from] SchemaError),
}

fn map_cas(branch: &BranchName, err: GitError) -> StoreError {
    match err {
        GitError::CasFailed {
            expected, actual, ..
        } => StoreError::CasFailed {
            branch: branch.to_string(),
            expected,
            actual,
        },
        other => StoreError::GitError(other),
    }
}

/// A loaded record and the blob id its ref pointed at.
#[derive(Debug, Clone)]
pub struct StateEntry {
    /// Blob id the ref pointed at when loaded; `None` if no record existed.
    ///
    /// Pass the entry back to [`BranchStateStore::save`] unchanged so the
    /// update is checked against it.
    pub ref_oid: Option<Oid>,

    /// The record. A fresh empty record when none was stored.
    pub state: BranchStateV1,
}

/// Branch state store backed by refs.
///
/// The store does not use `git2`; it goes through the [`Vcs`] seam, which
/// keeps it usable against the in-memory engine.
pub struct BranchStateStore<'a, V: Vcs + ?Sized> {
    vcs: &'a V,
}

impl<'a, V: Vcs + ?Sized> BranchStateStore<'a, V> {
    /// Create a new store over the given engine.
    pub fn new(vcs: &'a V) -> Self {
        Self { vcs }
    }

    /// Get the ref name for a branch's record.
    ///
    /// # Example
    ///
    /// ```
    /// use tbd::core::state::store::BranchStateStore;
    /// use tbd::core::types::BranchName;
    /// use tbd::git::mock::MockVcs;
    ///
    /// let branch = BranchName::new("feature-a").unwrap();
    /// let refname = BranchStateStore::<MockVcs>::ref_name(&branch);
    /// assert_eq!(refname.as_str(), "refs/tbd/state/feature-a");
    /// ```
    pub fn ref_name(branch: &BranchName) -> RefName {
        RefName::for_branch_state(branch)
    }

    /// Load the record of a branch, or a fresh empty one.
    ///
    /// # Errors
    ///
    /// - [`StoreError::SchemaError`] if the stored record is malformed
    /// - [`StoreError::GitError`] for engine failures
    pub fn load(&self, branch: &BranchName) -> Result<StateEntry, StoreError> {
        let refname = Self::ref_name(branch);
        let Some(ref_oid) = self.vcs.read_ref(&refname)? else {
            return Ok(StateEntry {
                ref_oid: None,
                state: BranchStateV1::new(branch.clone()),
            });
        };

        let bytes = self.vcs.read_blob(&ref_oid)?;
        let json =
            String::from_utf8(bytes).map_err(|_| StoreError::InvalidUtf8(branch.to_string()))?;
        let state = parse_branch_state(&json)?;
        if &state.branch != branch {
            return Err(StoreError::SchemaError(SchemaError::InvalidValue(format!(
                "record at {} describes branch {}",
                refname, state.branch
            ))));
        }

        Ok(StateEntry {
            ref_oid: Some(ref_oid),
            state,
        })
    }

    /// Persist `entry`, checked against the blob id it was loaded from.
    ///
    /// An empty record deletes the ref. On success `entry.ref_oid` reflects
    /// the new ref value, so the entry can be saved again.
    ///
    /// # Errors
    ///
    /// - [`StoreError::CasFailed`] if the ref moved since `entry` was loaded
    /// - [`StoreError::GitError`] for engine failures
    pub fn save(&self, branch: &BranchName, entry: &mut StateEntry) -> Result<(), StoreError> {
        let refname = Self::ref_name(branch);

        if entry.state.is_empty() {
            if let Some(old) = &entry.ref_oid {
                self.vcs
                    .delete_ref_cas(&refname, old)
                    .map_err(|e| map_cas(branch, e))?;
                debug!(branch = %branch, "cleared branch state");
            }
            entry.ref_oid = None;
            return Ok(());
        }

        entry.state.touch();
        let json = entry
            .state
            .to_canonical_json()
            .map_err(|e| StoreError::SerializeError(e.to_string()))?;
        let blob = self.vcs.write_blob(json.as_bytes())?;

        self.vcs
            .update_ref_cas(
                &refname,
                &blob,
                entry.ref_oid.as_ref(),
                &format!("tbd: update state of {}", branch),
            )
            .map_err(|e| map_cas(branch, e))?;

        debug!(branch = %branch, blob = %blob.short(7), "saved branch state");
        entry.ref_oid = Some(blob);
        Ok(())
    }

    /// Drop a branch's record and stash pins, whatever they contain.
    pub fn clear(&self, branch: &BranchName) -> Result<(), StoreError> {
        self.vcs.delete_ref(&Self::ref_name(branch))?;
        for slot in [StashSlot::Fuse, StashSlot::Switch] {
            self.unpin_stash(branch, slot)?;
        }
        Ok(())
    }

    /// Keep a stash commit reachable.
    pub fn pin_stash(&self, branch: &BranchName, slot: StashSlot, stash: &Oid) -> Result<(), StoreError> {
        self.vcs.set_ref(
            &RefName::for_stash(branch, slot),
            stash,
            &format!("tbd: pin stash of {}", branch),
        )?;
        Ok(())
    }

    /// Release a stash pin.
    pub fn unpin_stash(&self, branch: &BranchName, slot: StashSlot) -> Result<(), StoreError> {
        self.vcs.delete_ref(&RefName::for_stash(branch, slot))?;
        Ok(())
    }

    /// Branches that currently have a record.
    pub fn list(&self) -> Result<Vec<BranchName>, StoreError> {
        let refs = self.vcs.list_refs(RefName::STATE_PREFIX)?;
        Ok(refs
            .into_iter()
            .filter_map(|(name, _)| {
                name.strip_prefix(RefName::STATE_PREFIX)
                    .and_then(|b| BranchName::new(b).ok())
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::schema::{MergeType, PendingFuse};
    use crate::git::mock::MockVcs;

    fn branch(name: &str) -> BranchName {
        BranchName::new(name).unwrap()
    }

    fn oid(n: u8) -> Oid {
        Oid::new(format!("{:040x}", n)).unwrap()
    }

    #[test]
    fn missing_record_loads_empty() {
        let vcs = MockVcs::new();
        let store = BranchStateStore::new(&vcs);
        let entry = store.load(&branch("main")).unwrap();
        assert!(entry.ref_oid.is_none());
        assert!(entry.state.is_empty());
    }

    #[test]
    fn save_load_and_empty_deletes() {
        let vcs = MockVcs::new();
        let store = BranchStateStore::new(&vcs);
        let b = branch("main");

        let mut entry = store.load(&b).unwrap();
        entry.state.switch_stash = Some(oid(3));
        store.save(&b, &mut entry).unwrap();
        assert!(entry.ref_oid.is_some());

        let loaded = store.load(&b).unwrap();
        assert_eq!(loaded.state.switch_stash, Some(oid(3)));
        assert_eq!(store.list().unwrap(), vec![b.clone()]);

        let mut entry = loaded;
        entry.state.switch_stash = None;
        store.save(&b, &mut entry).unwrap();
        assert!(entry.ref_oid.is_none());
        assert!(vcs.read_ref(&RefName::for_branch_state(&b)).unwrap().is_none());
    }

    #[test]
    fn stale_entry_fails_cas() {
        let vcs = MockVcs::new();
        let store = BranchStateStore::new(&vcs);
        let b = branch("main");

        let mut first = store.load(&b).unwrap();
        let mut second = store.load(&b).unwrap();
        first.state.pending_fuse = Some(PendingFuse::new(
            MergeType::Merge,
            branch("topic"),
            oid(1),
            oid(1),
            vec![oid(2)],
            oid(6),
            None,
        ));
        store.save(&b, &mut first).unwrap();

        second.state.switch_stash = Some(oid(4));
        let err = store.save(&b, &mut second).unwrap_err();
        assert!(matches!(err, StoreError::CasFailed { .. }));
    }

    #[test]
    fn corrupt_record_is_an_error() {
        let vcs = MockVcs::new();
        let b = branch("main");
        let blob = vcs.write_blob(br#"{"kind":"tbd.branch-state","schema_version":1,"branch":"main","updated_at":"2024-01-01T00:00:00Z","bogus":1}"#).unwrap();
        vcs.set_ref(&RefName::for_branch_state(&b), &blob, "corrupt").unwrap();

        let store = BranchStateStore::new(&vcs);
        assert!(matches!(
            store.load(&b),
            Err(StoreError::SchemaError(SchemaError::ParseError(_)))
        ));
    }

    #[test]
    fn clear_removes_record_and_pins() {
        let vcs = MockVcs::new();
        let store = BranchStateStore::new(&vcs);
        let b = branch("main");
        let mut entry = store.load(&b).unwrap();
        entry.state.switch_stash = Some(oid(5));
        store.save(&b, &mut entry).unwrap();
        store.pin_stash(&b, StashSlot::Switch, &oid(5)).unwrap();

        store.clear(&b).unwrap();
        assert!(vcs.list_refs("refs/tbd/").unwrap().is_empty());
    }
}
