//! core::conflicts
//!
//! Per-step conflict bookkeeping for an in-progress fuse or merge.
//!
//! A [`ConflictSet`] holds two disjoint sets of paths. Paths enter
//! `unresolved` when a replay step conflicts; the user moves them to
//! `resolved` with `tbd resolve`. Nothing here looks at file content: a
//! path is resolved when the user says so.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::RepoPath;

/// Errors from conflict tracking.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConflictError {
    /// The path has no unresolved conflict.
    #[error("{0} has no conflicts")]
    NotConflicted(RepoPath),
}

/// Conflicted paths of the current step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConflictSet {
    /// Paths still carrying conflicts.
    #[serde(default)]
    pub unresolved: BTreeSet<RepoPath>,
    /// Paths the user marked as resolved.
    #[serde(default)]
    pub resolved: BTreeSet<RepoPath>,
}

impl ConflictSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record paths as conflicted.
    pub fn mark_conflicted<I>(&mut self, paths: I)
    where
        I: IntoIterator<Item = RepoPath>,
    {
        for path in paths {
            self.resolved.remove(&path);
            self.unresolved.insert(path);
        }
    }

    /// Mark a conflicted path as resolved.
    ///
    /// # Errors
    ///
    /// [`ConflictError::NotConflicted`] if `path` has no unresolved conflict,
    /// including when it was already resolved.
    pub fn resolve(&mut self, path: &RepoPath) -> Result<(), ConflictError> {
        if !self.unresolved.remove(path) {
            return Err(ConflictError::NotConflicted(path.clone()));
        }
        self.resolved.insert(path.clone());
        Ok(())
    }

    /// True iff no path is awaiting resolution.
    pub fn all_resolved(&self) -> bool {
        self.unresolved.is_empty()
    }

    /// Whether `path` is part of the current step's conflicts.
    pub fn contains(&self, path: &RepoPath) -> bool {
        self.unresolved.contains(path) || self.resolved.contains(path)
    }

    /// Every path of the current step, resolved or not.
    pub fn all_paths(&self) -> impl Iterator<Item = &RepoPath> {
        self.unresolved.iter().chain(self.resolved.iter())
    }

    /// Forget everything, once a step is sealed.
    pub fn clear(&mut self) {
        self.unresolved.clear();
        self.resolved.clear();
    }

    /// True when no path was ever recorded.
    pub fn is_empty(&self) -> bool {
        self.unresolved.is_empty() && self.resolved.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> RepoPath {
        RepoPath::new(s).unwrap()
    }

    #[test]
    fn resolve_moves_between_sets() {
        let mut set = ConflictSet::new();
        set.mark_conflicted([p("a"), p("b")]);
        assert!(!set.all_resolved());

        set.resolve(&p("a")).unwrap();
        assert!(set.resolved.contains(&p("a")));
        assert!(!set.unresolved.contains(&p("a")));
        assert!(!set.all_resolved());

        set.resolve(&p("b")).unwrap();
        assert!(set.all_resolved());
        assert!(set.contains(&p("b")));
    }

    #[test]
    fn resolving_unknown_or_twice_fails() {
        let mut set = ConflictSet::new();
        set.mark_conflicted([p("a")]);
        assert_eq!(
            set.resolve(&p("zzz")),
            Err(ConflictError::NotConflicted(p("zzz")))
        );
        set.resolve(&p("a")).unwrap();
        assert!(set.resolve(&p("a")).is_err());
    }

    #[test]
    fn remarking_reopens_a_resolved_path() {
        let mut set = ConflictSet::new();
        set.mark_conflicted([p("a")]);
        set.resolve(&p("a")).unwrap();
        set.mark_conflicted([p("a")]);
        assert!(set.unresolved.contains(&p("a")));
        assert!(set.resolved.is_empty());
    }

    #[test]
    fn clear_empties_both_sets() {
        let mut set = ConflictSet::new();
        set.mark_conflicted([p("a"), p("b")]);
        set.resolve(&p("a")).unwrap();
        set.clear();
        assert!(set.is_empty());
        assert!(set.all_resolved());
    }

    #[test]
    fn serde_rejects_unknown_fields() {
        let err = serde_json::from_str::<ConflictSet>(r#"{"unresolved":[],"extra":1}"#);
        assert!(err.is_err());
        let ok: ConflictSet = serde_json::from_str(r#"{"unresolved":["x/y"]}"#).unwrap();
        assert!(ok.unresolved.contains(&p("x/y")));
    }
}
