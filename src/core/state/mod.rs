//! core::state
//!
//! Per-branch state: pending fuse/merge operations and switch stashes.
//!
//! # Modules
//!
//! - [`schema`] - Record schema types (v1) and the derived [`FuseState`]
//! - [`store`] - CAS storage in `refs/tbd/state/<branch>`

pub mod schema;
pub mod store;

pub use schema::{
    parse_branch_state, AwaitingStep, BranchStateV1, FuseState, MergeType, PendingFuse,
    SchemaError, SCHEMA_VERSION, STATE_KIND,
};
pub use store::{BranchStateStore, StateEntry, StoreError};
