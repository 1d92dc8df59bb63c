//! core::ops
//!
//! Operation support for mutating commands.
//!
//! # Modules
//!
//! - [`lock`] - Exclusive repository lock
//!
//! Every state transition of a fuse or merge is a single atomic ref update (see
//! [`crate::core::state`]). The lock only keeps two tbd processes from
//! interleaving those transitions.

pub mod lock;
