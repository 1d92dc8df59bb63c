//! core::tracking
//!
//! Explicit per-file tracking.
//!
//! # Model
//!
//! There is no staging area. A path is *effectively tracked* when it is in
//! the record's `tracked` set, or when it exists in the reference tree (the
//! tip's tree) and is not in the record's `untracked` set. Committing a path
//! makes it tracked for good: it leaves `untracked`, and `tracked` entries
//! that reached the tip are pruned.
//!
//! # Storage
//!
//! The record is a JSON blob at `refs/tbd/tracking`, updated with CAS like
//! the branch state records.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::types::{Oid, RefName, RepoPath};
use crate::git::{GitError, TreeEntries, Vcs};

/// The kind identifier for the tracking record.
pub const TRACKING_KIND: &str = "tbd.tracking";

/// Current schema version.
pub const TRACKING_SCHEMA_VERSION: u32 = 1;

/// Errors from tracking operations.
#[derive(Debug, Error)]
pub enum TrackingError {
    /// The path exists neither in the working copy nor in the reference tree.
    #[error("{0} doesn't exist")]
    FileNotFound(String),

    /// The path is already tracked.
    #[error("{0} is already tracked")]
    AlreadyTracked(RepoPath),

    /// The path is not tracked.
    #[error("{0} is not tracked")]
    NotTracked(RepoPath),

    /// Malformed record.
    #[error("failed to parse tracking record: {0}")]
    ParseError(String),

    /// The record changed since it was loaded.
    #[error("tracking record changed concurrently")]
    CasFailed,

    /// Git operation failed.
    #[error("git error: {0}")]
    GitError(#[from] GitError),
}

#[derive(Debug, Deserialize)]
struct TrackingEnvelope {
    kind: String,
    schema_version: u32,
}

/// The tracking record (v1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrackingRecordV1 {
    /// Kind identifier (always "tbd.tracking")
    pub kind: String,

    /// Schema version (always 1 for this struct)
    pub schema_version: u32,

    /// Explicitly tracked paths not yet in the tip
    #[serde(default)]
    pub tracked: BTreeSet<RepoPath>,

    /// Paths in the tip the user stopped tracking
    #[serde(default)]
    pub untracked: BTreeSet<RepoPath>,
}

impl Default for TrackingRecordV1 {
    fn default() -> Self {
        Self {
            kind: TRACKING_KIND.to_string(),
            schema_version: TRACKING_SCHEMA_VERSION,
            tracked: BTreeSet::new(),
            untracked: BTreeSet::new(),
        }
    }
}

impl TrackingRecordV1 {
    /// Parse a record with envelope dispatch.
    pub fn parse(json: &str) -> Result<Self, TrackingError> {
        let envelope: TrackingEnvelope =
            serde_json::from_str(json).map_err(|e| TrackingError::ParseError(e.to_string()))?;
        if envelope.kind != TRACKING_KIND {
            return Err(TrackingError::ParseError(format!(
                "invalid kind '{}', expected '{}'",
                envelope.kind, TRACKING_KIND
            )));
        }
        if envelope.schema_version != TRACKING_SCHEMA_VERSION {
            return Err(TrackingError::ParseError(format!(
                "unsupported schema version {}",
                envelope.schema_version
            )));
        }
        serde_json::from_str(json).map_err(|e| TrackingError::ParseError(e.to_string()))
    }

    /// Whether `path` is effectively tracked against `reference`.
    pub fn is_tracked(&self, path: &RepoPath, reference: &TreeEntries) -> bool {
        self.tracked.contains(path)
            || (reference.contains_key(path) && !self.untracked.contains(path))
    }

    /// Start tracking `path`.
    ///
    /// `in_work_copy` tells whether the file exists in the working copy.
    pub fn track(
        &mut self,
        path: &RepoPath,
        in_work_copy: bool,
        reference: &TreeEntries,
    ) -> Result<(), TrackingError> {
        if !in_work_copy && !reference.contains_key(path) {
            return Err(TrackingError::FileNotFound(path.to_string()));
        }
        if self.is_tracked(path, reference) {
            return Err(TrackingError::AlreadyTracked(path.clone()));
        }
        if reference.contains_key(path) {
            self.untracked.remove(path);
        } else {
            self.tracked.insert(path.clone());
        }
        Ok(())
    }

    /// Stop tracking `path`.
    pub fn untrack(
        &mut self,
        path: &RepoPath,
        in_work_copy: bool,
        reference: &TreeEntries,
    ) -> Result<(), TrackingError> {
        if !in_work_copy && !reference.contains_key(path) {
            return Err(TrackingError::FileNotFound(path.to_string()));
        }
        if !self.is_tracked(path, reference) {
            return Err(TrackingError::NotTracked(path.clone()));
        }
        self.tracked.remove(path);
        if reference.contains_key(path) {
            self.untracked.insert(path.clone());
        }
        Ok(())
    }

    /// Every effectively tracked path, given the reference tree and the
    /// working-copy files.
    pub fn tracked_paths(
        &self,
        reference: &TreeEntries,
        work_files: &BTreeSet<RepoPath>,
    ) -> BTreeSet<RepoPath> {
        reference
            .keys()
            .chain(work_files.iter())
            .filter(|p| self.is_tracked(p, reference))
            .cloned()
            .collect()
    }

    /// Record that `paths` were committed, producing `new_reference`.
    pub fn note_committed<'p>(
        &mut self,
        paths: impl IntoIterator<Item = &'p RepoPath>,
        new_reference: &TreeEntries,
    ) {
        for path in paths {
            self.untracked.remove(path);
        }
        self.tracked.retain(|p| !new_reference.contains_key(p));
    }
}

/// A loaded record and the blob id its ref pointed at.
#[derive(Debug, Clone, Default)]
pub struct TrackingEntry {
    /// Blob id at load time
    pub ref_oid: Option<Oid>,
    /// The record
    pub record: TrackingRecordV1,
}

/// Tracking store backed by `refs/tbd/tracking`.
pub struct TrackingStore<'a, V: Vcs + ?Sized> {
    vcs: &'a V,
}

impl<'a, V: Vcs + ?Sized> TrackingStore<'a, V> {
    /// Create a new store over the given engine.
    pub fn new(vcs: &'a V) -> Self {
        Self { vcs }
    }

    /// Load the record, or an empty one.
    pub fn load(&self) -> Result<TrackingEntry, TrackingError> {
        let Some(ref_oid) = self.vcs.read_ref(&RefName::tracking())? else {
            return Ok(TrackingEntry::default());
        };
        let bytes = self.vcs.read_blob(&ref_oid)?;
        let json = String::from_utf8(bytes)
            .map_err(|_| TrackingError::ParseError("record is not valid UTF-8".into()))?;
        Ok(TrackingEntry {
            ref_oid: Some(ref_oid),
            record: TrackingRecordV1::parse(&json)?,
        })
    }

    /// Persist the record with CAS against the loaded blob id.
    pub fn save(&self, entry: &mut TrackingEntry) -> Result<(), TrackingError> {
        let json = serde_json::to_string(&entry.record)
            .map_err(|e| TrackingError::ParseError(e.to_string()))?;
        let blob = self.vcs.write_blob(json.as_bytes())?;
        if entry.ref_oid.as_ref() == Some(&blob) {
            return Ok(());
        }
        self.vcs
            .update_ref_cas(
                &RefName::tracking(),
                &blob,
                entry.ref_oid.as_ref(),
                "tbd: update tracking",
            )
            .map_err(|e| match e {
                GitError::CasFailed { .. } => TrackingError::CasFailed,
                other => TrackingError::GitError(other),
            })?;
        debug!(blob = %blob.short(7), "saved tracking record");
        entry.ref_oid = Some(blob);
        Ok(())
    }

    /// Track one path and persist.
    pub fn track(&self, path: &RepoPath, reference: &TreeEntries) -> Result<(), TrackingError> {
        let mut entry = self.load()?;
        let in_work_copy = self.vcs.read_work_file(path)?.is_some();
        entry.record.track(path, in_work_copy, reference)?;
        self.save(&mut entry)
    }

    /// Untrack one path and persist.
    pub fn untrack(&self, path: &RepoPath, reference: &TreeEntries) -> Result<(), TrackingError> {
        let mut entry = self.load()?;
        let in_work_copy = self.vcs.read_work_file(path)?.is_some();
        entry.record.untrack(path, in_work_copy, reference)?;
        self.save(&mut entry)
    }
}
