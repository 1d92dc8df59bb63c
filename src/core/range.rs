//! core::range
//!
//! Selection of the commits a fuse replays.
//!
//! The divergent commits of a source branch (reachable from its tip but
//! not from the current tip, oldest first) are computed by the engine. This
//! module narrows them with a [`Selector`]. It is pure: no history is read
//! or written here.

use std::collections::HashSet;

use thiserror::Error;

use super::types::Oid;

/// Errors from range resolution.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RangeError {
    /// A selected commit is not among the divergent commits.
    #[error("commit {0} is not in the list of commits to fuse")]
    InvalidCommit(String),

    /// The selection is empty.
    #[error("no commits to fuse")]
    NothingToFuse,
}

/// Which divergent commits to take.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Selector {
    /// Every divergent commit.
    #[default]
    All,
    /// Exactly these commits.
    Only(Vec<Oid>),
    /// Every divergent commit but these.
    Exclude(Vec<Oid>),
}

/// Narrow `divergent` (oldest first) with `selector`.
///
/// The result keeps the divergent order regardless of the order ids were
/// given in.
///
/// # Errors
///
/// - [`RangeError::InvalidCommit`] if a selected id is not divergent
/// - [`RangeError::NothingToFuse`] if nothing is left
pub fn resolve_range(divergent: &[Oid], selector: &Selector) -> Result<Vec<Oid>, RangeError> {
    let check = |ids: &[Oid]| -> Result<HashSet<Oid>, RangeError> {
        let known: HashSet<&Oid> = divergent.iter().collect();
        for id in ids {
            if !known.contains(id) {
                return Err(RangeError::InvalidCommit(id.short(7).to_string()));
            }
        }
        Ok(ids.iter().cloned().collect())
    };

    let selected: Vec<Oid> = match selector {
        Selector::All => divergent.to_vec(),
        Selector::Only(ids) => {
            let keep = check(ids)?;
            divergent.iter().filter(|c| keep.contains(*c)).cloned().collect()
        }
        Selector::Exclude(ids) => {
            let drop = check(ids)?;
            divergent.iter().filter(|c| !drop.contains(*c)).cloned().collect()
        }
    };

    if selected.is_empty() {
        return Err(RangeError::NothingToFuse);
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(n: u8) -> Oid {
        Oid::new(format!("{:040x}", n)).unwrap()
    }

    fn chain(n: u8) -> Vec<Oid> {
        (1..=n).map(oid).collect()
    }

    #[test]
    fn all_keeps_everything() {
        assert_eq!(resolve_range(&chain(3), &Selector::All).unwrap(), chain(3));
    }

    #[test]
    fn only_keeps_divergent_order() {
        let result = resolve_range(&chain(4), &Selector::Only(vec![oid(3), oid(1)])).unwrap();
        assert_eq!(result, vec![oid(1), oid(3)]);
    }

    #[test]
    fn exclude_removes() {
        let result = resolve_range(&chain(3), &Selector::Exclude(vec![oid(2)])).unwrap();
        assert_eq!(result, vec![oid(1), oid(3)]);
    }

    #[test]
    fn foreign_commit_is_invalid() {
        assert!(matches!(
            resolve_range(&chain(2), &Selector::Only(vec![oid(9)])),
            Err(RangeError::InvalidCommit(_))
        ));
        assert!(matches!(
            resolve_range(&chain(2), &Selector::Exclude(vec![oid(9)])),
            Err(RangeError::InvalidCommit(_))
        ));
    }

    #[test]
    fn empty_selection_is_nothing_to_fuse() {
        assert_eq!(
            resolve_range(&[], &Selector::All),
            Err(RangeError::NothingToFuse)
        );
        assert_eq!(
            resolve_range(&chain(2), &Selector::Exclude(chain(2))),
            Err(RangeError::NothingToFuse)
        );
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn only_and_exclude_partition_the_divergent_set(
                n in 1u8..12,
                mask in prop::collection::vec(any::<bool>(), 12),
            ) {
                let divergent = chain(n);
                let picked: Vec<Oid> = divergent
                    .iter()
                    .zip(&mask)
                    .filter(|(_, keep)| **keep)
                    .map(|(c, _)| c.clone())
                    .collect();

                let only = resolve_range(&divergent, &Selector::Only(picked.clone()));
                let exclude = resolve_range(&divergent, &Selector::Exclude(picked.clone()));

                let mut combined = only.clone().unwrap_or_default();
                combined.extend(exclude.clone().unwrap_or_default());
                combined.sort();
                prop_assert_eq!(combined, divergent.clone());

                prop_assert_eq!(only.is_err(), picked.is_empty());
                prop_assert_eq!(exclude.is_err(), picked.len() == divergent.len());
            }

            #[test]
            fn selection_is_a_subsequence(
                n in 1u8..12,
                picks in prop::collection::vec(0u8..12, 0..12),
            ) {
                let divergent = chain(n);
                let ids: Vec<Oid> = picks.into_iter().filter(|i| *i < n).map(|i| oid(i + 1)).collect();
                if let Ok(result) = resolve_range(&divergent, &Selector::Only(ids)) {
                    let positions: Vec<usize> = result
                        .iter()
                        .map(|c| divergent.iter().position(|d| d == c).unwrap())
                        .collect();
                    prop_assert!(positions.windows(2).all(|w| w[0] < w[1]));
                }
            }
        }
    }
}
