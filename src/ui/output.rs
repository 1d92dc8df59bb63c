//! ui::output
//!
//! Output formatting and display.
//!
//! # Design
//!
//! Output is formatted consistently and respects the quiet flag. Results go
//! to stdout, warnings and errors to stderr.

use std::fmt::Display;

use crate::core::types::{Oid, RepoPath};
use crate::engine::{ConflictMark, FileChange};

/// Output verbosity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// Quiet mode - minimal output
    Quiet,
    /// Normal mode - standard output
    Normal,
    /// Debug mode - verbose output
    Debug,
}

impl Verbosity {
    /// Create verbosity from flags.
    pub fn from_flags(quiet: bool, debug: bool) -> Self {
        if quiet {
            Verbosity::Quiet
        } else if debug {
            Verbosity::Debug
        } else {
            Verbosity::Normal
        }
    }
}

/// Print a message (respects quiet mode).
pub fn print(message: impl Display, verbosity: Verbosity) {
    if verbosity != Verbosity::Quiet {
        println!("{}", message);
    }
}

/// Print an error message (always shown).
pub fn error(message: impl Display) {
    eprintln!("error: {}", message);
}

/// Print a warning message (respects quiet mode).
pub fn warn(message: impl Display, verbosity: Verbosity) {
    if verbosity != Verbosity::Quiet {
        eprintln!("warning: {}", message);
    }
}

/// Abbreviated commit id for listings.
pub fn format_oid(oid: &Oid) -> &str {
    oid.short(7)
}

/// One line of a file listing: `  <label>: <path>`.
pub fn format_change(path: &RepoPath, change: FileChange) -> String {
    format!("  {:<10}{}", format!("{}:", change.label()), path)
}

/// One line of a conflicted-file listing.
pub fn format_conflict(path: &RepoPath, mark: ConflictMark) -> String {
    let label = match mark {
        ConflictMark::Unresolved => "conflicted:",
        ConflictMark::Resolved => "resolved:",
    };
    format!("  {:<12}{}", label, path)
}
