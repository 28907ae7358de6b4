//! Variable keys, the factor abstraction, and factor collections.
//!
//! The engine never looks inside a factor's numeric payload; it only needs
//! the factor's variable scope (its [`keys`](Factor::keys)) and the ability
//! to share factors cheaply between the input forest, gathered per-clique
//! factor sets, and the remaining-factor output. Factors are therefore held
//! behind `Arc` everywhere and never cloned by value.

use std::fmt;
use std::sync::Arc;

use crate::errors::TreeError;

/// A unique identifier for a variable in the factor graph.
///
/// Key implements Ord/PartialOrd for stable, deterministic iteration.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct Key(pub u64);

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An injected key-formatting function, used by the diagnostic printers.
///
/// Callers that encode semantic information in keys (e.g. symbol-plus-index
/// schemes) supply their own formatter; everything in this crate defaults to
/// [`default_key_formatter`].
pub type KeyFormatter = dyn Fn(Key) -> String + Sync;

/// Formats a key as its raw integer value.
pub fn default_key_formatter(key: Key) -> String {
    key.0.to_string()
}

/// A factor over a set of variables.
///
/// This is the engine's entire view of a factor: the variables it touches.
/// Dense or sparse numeric contents live in the implementing type and are
/// only ever interpreted by the caller-supplied elimination function.
pub trait Factor: Send + Sync {
    /// The variables this factor involves.
    fn keys(&self) -> &[Key];
}

/// A conditional distribution over frontal variables given separator
/// variables, produced by the elimination function and stored in a clique.
pub trait Conditional: Send + Sync {
    /// The frontal variables, i.e. the variables eliminated at this clique.
    fn frontals(&self) -> &[Key];

    /// The separator variables (the conditioning set).
    fn parents(&self) -> &[Key];
}

/// The pluggable elimination function.
///
/// Given a gathered factor subset and an elimination order, produces a
/// conditional over the ordered variables and, if the factors involve
/// variables outside the order, a remaining factor over that separator.
/// The function is assumed deterministic and free of side effects on its
/// inputs; any error it returns aborts the whole elimination call unchanged.
pub type Eliminate<'a, F, C> =
    dyn Fn(&[Arc<F>], &[Key]) -> Result<(C, Option<F>), TreeError> + Sync + 'a;

/// An ordered collection of shared factors.
///
/// Used both for the unassigned factors carried by a cluster forest and for
/// the remaining-factor output of elimination. Pushing and extending share
/// the underlying factors; contents are never duplicated.
pub struct FactorGraph<F> {
    factors: Vec<Arc<F>>,
}

impl<F> FactorGraph<F> {
    /// Creates an empty factor graph.
    pub fn new() -> Self {
        Self {
            factors: Vec::new(),
        }
    }

    /// Creates an empty factor graph with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            factors: Vec::with_capacity(capacity),
        }
    }

    /// Reserves capacity for at least `additional` more factors.
    pub fn reserve(&mut self, additional: usize) {
        self.factors.reserve(additional);
    }

    /// Appends a shared factor.
    pub fn push(&mut self, factor: Arc<F>) {
        self.factors.push(factor);
    }

    /// Appends every factor from the iterator.
    pub fn extend(&mut self, factors: impl IntoIterator<Item = Arc<F>>) {
        self.factors.extend(factors);
    }

    /// Number of factors.
    pub fn len(&self) -> usize {
        self.factors.len()
    }

    /// Whether the graph holds no factors.
    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    /// Iterates over the shared factors in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Arc<F>> {
        self.factors.iter()
    }

    /// The factors as a slice.
    pub fn as_slice(&self) -> &[Arc<F>] {
        &self.factors
    }
}

impl<F> Default for FactorGraph<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F> Clone for FactorGraph<F> {
    fn clone(&self) -> Self {
        Self {
            factors: self.factors.clone(),
        }
    }
}

impl<F> From<Vec<Arc<F>>> for FactorGraph<F> {
    fn from(factors: Vec<Arc<F>>) -> Self {
        Self { factors }
    }
}

impl<F> FromIterator<Arc<F>> for FactorGraph<F> {
    fn from_iter<I: IntoIterator<Item = Arc<F>>>(iter: I) -> Self {
        Self {
            factors: iter.into_iter().collect(),
        }
    }
}

impl<'a, F> IntoIterator for &'a FactorGraph<F> {
    type Item = &'a Arc<F>;
    type IntoIter = std::slice::Iter<'a, Arc<F>>;

    fn into_iter(self) -> Self::IntoIter {
        self.factors.iter()
    }
}

impl<F> IntoIterator for FactorGraph<F> {
    type Item = Arc<F>;
    type IntoIter = std::vec::IntoIter<Arc<F>>;

    fn into_iter(self) -> Self::IntoIter {
        self.factors.into_iter()
    }
}

impl<F: Factor> fmt::Debug for FactorGraph<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scopes: Vec<&[Key]> = self.factors.iter().map(|factor| factor.keys()).collect();
        f.debug_struct("FactorGraph")
            .field("factors", &scopes)
            .finish()
    }
}
