//! core
//!
//! Core domain types, schemas, and stores for tbd.
//!
//! # Modules
//!
//! - [`types`] - Strong types: BranchName, Oid, RefName, RepoPath
//! - [`tracking`] - Which paths go into the next commit
//! - [`range`] - Selecting the commits a fuse replays
//! - [`conflicts`] - Unresolved and resolved paths of a pending fuse
//! - [`state`] - Per-branch state records (pending fuse, stashes)
//! - [`ops`] - Repository locking
//! - [`config`] - Configuration schema and loading
//! - [`paths`] - Centralized path routing for tbd storage
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid states at compile time
//! - Persisted records are strict and self-describing
//! - Nothing in here talks to git2; stores go through [`crate::git::Vcs`]

pub mod config;
pub mod conflicts;
pub mod ops;
pub mod paths;
pub mod range;
pub mod state;
pub mod tracking;
pub mod types;
