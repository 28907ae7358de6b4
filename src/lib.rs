//! # bayestree
//!
//! Clique-tree (Bayes tree) elimination engine for sparse factor graphs.
//!
//! Given a forest of variable clusters produced by an upstream ordering and
//! partitioning step, this crate performs recursive variable elimination to
//! produce a tree of conditional distributions — the central computational
//! step of factor-graph-based estimation back-ends. The actual numeric
//! factorization is a pluggable function; the engine owns the structural
//! side: the parallel depth-first traversal, clique allocation and wiring,
//! orphan-subtree grafting for incremental re-solves, and in-place reuse of
//! an existing tree.
//!
//! ## Entry points
//!
//! - [`ClusterTree::eliminate`] — build a new [`BayesTree`] from a forest.
//! - [`ClusterTree::eliminate_in_place`] — overwrite the conditionals of an
//!   existing tree whose topology matches the forest.
//!
//! ## Example
//!
//! ```rust,ignore
//! use bayestree::{Cluster, ClusterTree, EliminationConfig, Key};
//! use bayestree::symbolic::{symbolic_eliminate, SymbolicFactor};
//! use std::sync::Arc;
//!
//! let mut root = Cluster::new([Key(1), Key(2)]);
//! root.add_factor(Arc::new(SymbolicFactor::new([Key(1), Key(2)])));
//! let mut forest = ClusterTree::new();
//! forest.add_root(root);
//!
//! let (tree, remaining) =
//!     forest.eliminate(&symbolic_eliminate, &EliminationConfig::default())?;
//! ```

pub mod bayes;
pub mod cluster;
pub mod eliminate;
pub mod errors;
pub mod factor;
pub mod symbolic;
mod traversal;

pub use bayes::{BayesTree, Clique};
pub use cluster::{Cluster, ClusterTree, TreeFactor};
pub use eliminate::{
    EliminationConfig, EliminationObserver, EliminationStats, NullObserver, ParallelPolicy,
    DEFAULT_SPLIT_THRESHOLD,
};
pub use errors::TreeError;
pub use factor::{
    default_key_formatter, Conditional, Eliminate, Factor, FactorGraph, Key, KeyFormatter,
};
