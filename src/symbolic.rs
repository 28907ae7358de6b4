//! Structure-only factors and elimination.
//!
//! Symbolic elimination tracks variable scopes without any numeric payload:
//! eliminating a factor set over an order yields a conditional whose
//! separator is every involved variable outside the order, and a separator
//! factor over exactly that set. This is enough to analyze fill-in and tree
//! shape before committing to a numeric factorization, and it powers the
//! crate's own test-suite.

use std::sync::Arc;

use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::errors::TreeError;
use crate::factor::{Conditional, Factor, Key};

/// A factor carrying nothing but its variable scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolicFactor {
    keys: SmallVec<[Key; 4]>,
}

impl SymbolicFactor {
    /// Creates a factor over the given variables.
    pub fn new(keys: impl IntoIterator<Item = Key>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
        }
    }
}

impl Factor for SymbolicFactor {
    fn keys(&self) -> &[Key] {
        &self.keys
    }
}

/// A structure-only conditional: frontal variables given separator
/// variables, with no numeric content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolicConditional {
    frontals: Vec<Key>,
    parents: Vec<Key>,
}

impl SymbolicConditional {
    /// Creates a conditional with explicit frontal and separator variables.
    pub fn new(
        frontals: impl IntoIterator<Item = Key>,
        parents: impl IntoIterator<Item = Key>,
    ) -> Self {
        Self {
            frontals: frontals.into_iter().collect(),
            parents: parents.into_iter().collect(),
        }
    }
}

impl Conditional for SymbolicConditional {
    fn frontals(&self) -> &[Key] {
        &self.frontals
    }

    fn parents(&self) -> &[Key] {
        &self.parents
    }
}

/// Structure-only elimination function, matching the [`Eliminate`] contract.
///
/// The separator is the union of all involved variables minus the eliminated
/// order, sorted for determinism. Returns no separator factor when the
/// gathered factors involve nothing outside the order.
///
/// [`Eliminate`]: crate::factor::Eliminate
pub fn symbolic_eliminate(
    factors: &[Arc<SymbolicFactor>],
    order: &[Key],
) -> Result<(SymbolicConditional, Option<SymbolicFactor>), TreeError> {
    let eliminated: FxHashSet<Key> = order.iter().copied().collect();

    let mut separator: Vec<Key> = factors
        .iter()
        .flat_map(|factor| factor.keys())
        .copied()
        .filter(|key| !eliminated.contains(key))
        .collect();
    separator.sort_unstable();
    separator.dedup();

    let conditional = SymbolicConditional::new(order.iter().copied(), separator.iter().copied());
    let separator_factor = if separator.is_empty() {
        None
    } else {
        Some(SymbolicFactor::new(separator))
    };
    Ok((conditional, separator_factor))
}
