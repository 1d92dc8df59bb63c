//! tbd - version control with explicit tracking, built on Git
//!
//! tbd keeps Git's object model but changes how work is recorded: files are
//! tracked or untracked instead of staged, uncommitted changes stay with the
//! branch they were made on, and commits from another branch are brought in
//! with a `fuse` that can stop on a conflict, survive a branch switch or a
//! crash, and be finished or aborted later.
//!
//! # Architecture
//!
//! The codebase follows a strict layered architecture:
//!
//! - [`cli`] - Command-line interface layer (parses args, delegates to engine)
//! - [`engine`] - tbd operations: tracking, fuse and merge, commit, branches
//! - [`core`] - Domain types, persisted records and configuration
//! - [`git`] - The [`git::Vcs`] seam, its git2 implementation and a mock
//! - [`ui`] - User interaction utilities
//!
//! # Correctness Invariants
//!
//! 1. A branch ref moves only when a fuse or merge finalizes, and only from
//!    the tip recorded when it started
//! 2. Every persisted state transition is a single atomic ref update
//! 3. Uncommitted tracked changes are never dropped; if they can't be
//!    re-applied cleanly they stay reachable from a stash ref

pub mod cli;
pub mod core;
pub mod engine;
pub mod git;
pub mod ui;
