//! core::state::schema
//!
//! Branch state schema (v1).
//!
//! # Schema Design
//!
//! A branch state record is:
//! - Self-describing with `kind` and `schema_version`
//! - Strictly parsed (unknown fields rejected)
//! - Only stored while it carries something: a pending fuse or merge, or a
//!   switch stash. An empty record is deleted instead.
//!
//! # Example
//!
//! ```
//! use tbd::core::state::schema::{parse_branch_state, BranchStateV1, STATE_KIND};
//! use tbd::core::types::BranchName;
//!
//! let state = BranchStateV1::new(BranchName::new("main").unwrap());
//! assert_eq!(state.kind, STATE_KIND);
//! assert!(state.is_empty());
//!
//! let json = state.to_canonical_json().unwrap();
//! let parsed = parse_branch_state(&json).unwrap();
//! assert_eq!(parsed.branch.as_str(), "main");
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::conflicts::ConflictSet;
use crate::core::types::{BranchName, Oid, UtcTimestamp};

/// The kind identifier for branch state records.
pub const STATE_KIND: &str = "tbd.branch-state";

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Errors from schema parsing and validation.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to parse branch state: {0}")]
    ParseError(String),

    #[error("invalid kind '{found}', expected '{}'", STATE_KIND)]
    InvalidKind { found: String },

    #[error("unsupported schema version {0}, supported: {SCHEMA_VERSION}")]
    UnsupportedVersion(u32),

    #[error("invalid branch state: {0}")]
    InvalidValue(String),
}

/// Envelope for version dispatch before full parsing.
#[derive(Debug, Deserialize)]
struct StateEnvelope {
    kind: String,
    schema_version: u32,
}

/// Parse a branch state record with version dispatch.
///
/// # Errors
///
/// - [`SchemaError::ParseError`] for malformed JSON or unknown fields
/// - [`SchemaError::InvalidKind`] if `kind` is not [`STATE_KIND`]
/// - [`SchemaError::UnsupportedVersion`] for unknown schema versions
pub fn parse_branch_state(json: &str) -> Result<BranchStateV1, SchemaError> {
    let envelope: StateEnvelope =
        serde_json::from_str(json).map_err(|e| SchemaError::ParseError(e.to_string()))?;

    if envelope.kind != STATE_KIND {
        return Err(SchemaError::InvalidKind {
            found: envelope.kind,
        });
    }

    match envelope.schema_version {
        1 => {
            let state: BranchStateV1 =
                serde_json::from_str(json).map_err(|e| SchemaError::ParseError(e.to_string()))?;
            state.validate()?;
            Ok(state)
        }
        v => Err(SchemaError::UnsupportedVersion(v)),
    }
}

/// Per-branch state (v1).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BranchStateV1 {
    /// Kind identifier (always "tbd.branch-state")
    pub kind: String,

    /// Schema version (always 1 for this struct)
    pub schema_version: u32,

    /// The branch this record describes
    pub branch: BranchName,

    /// In-progress fuse or merge
    #[serde(default)]
    pub pending_fuse: Option<PendingFuse>,

    /// Uncommitted changes left behind when switching away
    #[serde(default)]
    pub switch_stash: Option<Oid>,

    /// Last modification
    pub updated_at: UtcTimestamp,
}

impl BranchStateV1 {
    /// Create an empty record for a branch.
    pub fn new(branch: BranchName) -> Self {
        Self {
            kind: STATE_KIND.to_string(),
            schema_version: SCHEMA_VERSION,
            branch,
            pending_fuse: None,
            switch_stash: None,
            updated_at: UtcTimestamp::now(),
        }
    }

    /// True when there is nothing worth storing.
    pub fn is_empty(&self) -> bool {
        self.pending_fuse.is_none() && self.switch_stash.is_none()
    }

    /// Update the modification timestamp.
    pub fn touch(&mut self) {
        self.updated_at = UtcTimestamp::now();
    }

    /// Derived state of the pending operation.
    pub fn fuse_state(&self) -> FuseState {
        FuseState::of(self.pending_fuse.as_ref())
    }

    /// Check the envelope and the pending operation's invariants.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.kind != STATE_KIND {
            return Err(SchemaError::InvalidKind {
                found: self.kind.clone(),
            });
        }
        if self.schema_version != SCHEMA_VERSION {
            return Err(SchemaError::UnsupportedVersion(self.schema_version));
        }
        if let Some(pending) = &self.pending_fuse {
            pending.validate()?;
        }
        Ok(())
    }

    /// Serialize to the JSON stored in the record blob.
    pub fn to_canonical_json(&self) -> Result<String, SchemaError> {
        serde_json::to_string(self).map_err(|e| SchemaError::ParseError(e.to_string()))
    }
}

/// Kind of pending operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeType {
    /// Commit-by-commit replay.
    Fuse,
    /// Single whole-tree merge producing a two-parent commit.
    Merge,
}

impl std::fmt::Display for MergeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MergeType::Fuse => write!(f, "fuse"),
            MergeType::Merge => write!(f, "merge"),
        }
    }
}

/// A replay step that stopped on conflicts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AwaitingStep {
    /// The commit being applied.
    pub commit: Oid,
    /// Merged tree with conflict markers in the conflicting files.
    pub tree: Oid,
}

/// Persisted, resumable state of an in-progress fuse or merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PendingFuse {
    /// Operation id (uuid v4)
    pub id: String,

    /// When the operation started
    pub started_at: UtcTimestamp,

    /// Fuse or merge
    pub merge_type: MergeType,

    /// Branch the commits come from
    pub source: BranchName,

    /// Branch tip when the operation started. The branch ref stays here
    /// until finalization.
    pub original_tip: Oid,

    /// Commit after which the next step is grafted
    pub insertion_point: Oid,

    /// Commits still to replay, in order
    #[serde(default)]
    pub remaining_commits: Vec<Oid>,

    /// Tree the working copy currently reflects for tracked paths
    pub worktree: Oid,

    /// Step waiting on conflict resolution
    #[serde(default)]
    pub awaiting: Option<AwaitingStep>,

    /// Uncommitted tracked changes from before the operation
    #[serde(default)]
    pub stash: Option<Oid>,

    /// Conflicts of the awaiting step
    #[serde(default)]
    pub conflicts: ConflictSet,
}

impl PendingFuse {
    /// Start a new operation.
    pub fn new(
        merge_type: MergeType,
        source: BranchName,
        original_tip: Oid,
        insertion_point: Oid,
        remaining_commits: Vec<Oid>,
        worktree: Oid,
        stash: Option<Oid>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            started_at: UtcTimestamp::now(),
            merge_type,
            source,
            original_tip,
            insertion_point,
            remaining_commits,
            worktree,
            awaiting: None,
            stash,
            conflicts: ConflictSet::new(),
        }
    }

    /// Derived state.
    pub fn state(&self) -> FuseState {
        FuseState::of(Some(self))
    }

    fn validate(&self) -> Result<(), SchemaError> {
        if uuid::Uuid::parse_str(&self.id).is_err() {
            return Err(SchemaError::InvalidValue(format!(
                "pending fuse id '{}' is not a uuid",
                self.id
            )));
        }
        if let Some(overlap) = self
            .conflicts
            .unresolved
            .intersection(&self.conflicts.resolved)
            .next()
        {
            return Err(SchemaError::InvalidValue(format!(
                "{} is both resolved and unresolved",
                overlap
            )));
        }
        if self.awaiting.is_none() && !self.conflicts.is_empty() {
            return Err(SchemaError::InvalidValue(
                "conflicts recorded without an awaiting step".into(),
            ));
        }
        Ok(())
    }
}

/// Where an operation stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuseState {
    /// No operation in progress.
    Idle,
    /// Steps remain and none is waiting (an interrupted run).
    Replaying,
    /// A step is waiting and some of its paths are unresolved.
    Conflicted,
    /// A step is waiting and every path is resolved; the next commit seals it.
    Finalizing,
}

impl FuseState {
    /// Derive the state of an optional pending operation.
    pub fn of(pending: Option<&PendingFuse>) -> Self {
        match pending {
            None => FuseState::Idle,
            Some(p) => match (&p.awaiting, p.conflicts.all_resolved()) {
                (None, _) => FuseState::Replaying,
                (Some(_), false) => FuseState::Conflicted,
                (Some(_), true) => FuseState::Finalizing,
            },
        }
    }
}
