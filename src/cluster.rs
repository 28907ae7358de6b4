//! The input cluster forest consumed by elimination.
//!
//! A [`ClusterTree`] is an ordered forest of [`Cluster`] nodes, each grouping
//! the variables eliminated together at that node, plus the input factors
//! touching those variables. Factors not assigned to any cluster ride along
//! as the forest's remaining factors and are passed through to the
//! remaining-factor output of elimination.
//!
//! The forest is built once upstream (ordering and partitioning are not this
//! crate's concern) and consumed read-only here; [`ClusterTree::eliminate`]
//! and [`ClusterTree::eliminate_in_place`] are the two entry points of the
//! engine.

use std::fmt;
use std::sync::{Arc, OnceLock};

use smallvec::SmallVec;

use crate::bayes::{BayesTree, Clique};
use crate::eliminate::{run_build, run_in_place, EliminationConfig};
use crate::errors::TreeError;
use crate::factor::{
    default_key_formatter, Conditional, Eliminate, Factor, FactorGraph, Key, KeyFormatter,
};
use crate::traversal::{clone_forest, format_forest};

/// A factor assigned to a cluster: either an ordinary input factor or a
/// placeholder carrying a previously-built clique subtree forward.
///
/// Orphan placeholders make incremental re-elimination cheap: regions of a
/// prior solve untouched by new measurements are grafted into the new tree
/// as-is instead of being recomputed. They are meaningful to build-mode
/// elimination only; in-place elimination rejects them as a contract
/// violation.
pub enum TreeFactor<F, C> {
    /// An ordinary factor from the input graph, shared with the caller.
    Graph(Arc<F>),
    /// A previously-built clique subtree to graft at zero elimination cost.
    Orphan(Arc<Clique<C>>),
}

impl<F, C> Clone for TreeFactor<F, C> {
    fn clone(&self) -> Self {
        match self {
            TreeFactor::Graph(factor) => TreeFactor::Graph(Arc::clone(factor)),
            TreeFactor::Orphan(clique) => TreeFactor::Orphan(Arc::clone(clique)),
        }
    }
}

/// A group of variables eliminated together, with the factors touching them
/// and exclusively-owned child clusters.
pub struct Cluster<F, C> {
    /// The frontal variables eliminated at this node, in elimination order.
    keys: SmallVec<[Key; 4]>,
    /// Factors assigned to this cluster.
    factors: Vec<TreeFactor<F, C>>,
    /// Child clusters, eliminated before this one.
    children: Vec<Cluster<F, C>>,
    /// Cached cost metric; computed on first use unless set explicitly.
    problem_size: OnceLock<usize>,
}

impl<F, C> Cluster<F, C> {
    /// Creates a cluster eliminating the given variables.
    pub fn new(keys: impl IntoIterator<Item = Key>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
            factors: Vec::new(),
            children: Vec::new(),
            problem_size: OnceLock::new(),
        }
    }

    /// Assigns an input factor to this cluster.
    pub fn add_factor(&mut self, factor: Arc<F>) {
        self.factors.push(TreeFactor::Graph(factor));
    }

    /// Assigns a previously-built clique subtree to be grafted under this
    /// cluster's clique during build-mode elimination.
    pub fn add_orphan(&mut self, clique: Arc<Clique<C>>) {
        self.factors.push(TreeFactor::Orphan(clique));
    }

    /// Adds an exclusively-owned child cluster.
    pub fn add_child(&mut self, child: Cluster<F, C>) {
        self.children.push(child);
    }

    /// The frontal variables of this cluster.
    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    /// The factors assigned to this cluster.
    pub fn factors(&self) -> &[TreeFactor<F, C>] {
        &self.factors
    }

    /// The child clusters.
    pub fn children(&self) -> &[Cluster<F, C>] {
        &self.children
    }

    /// The cost metric used by the parallel/sequential split policy.
    ///
    /// Unless overridden with [`set_problem_size`](Self::set_problem_size),
    /// this defaults to the larger of this node's own size (keys plus
    /// factors) and the largest child metric, so the value at a subtree root
    /// reflects the heaviest elimination problem below it. Computed once and
    /// cached.
    pub fn problem_size(&self) -> usize {
        *self.problem_size.get_or_init(|| {
            let own = self.keys.len() + self.factors.len();
            let child_max = self
                .children
                .iter()
                .map(|child| child.problem_size())
                .max()
                .unwrap_or(0);
            own.max(child_max)
        })
    }

    /// Overrides the cached cost metric, e.g. with a dimension-aware value
    /// computed by the upstream partitioning step.
    pub fn set_problem_size(&mut self, problem_size: usize) {
        self.problem_size = OnceLock::from(problem_size);
    }

    pub(crate) fn clone_structure(&self) -> Self {
        Self {
            keys: self.keys.clone(),
            factors: self.factors.clone(),
            children: clone_forest(&self.children),
            problem_size: match self.problem_size.get() {
                Some(size) => OnceLock::from(*size),
                None => OnceLock::new(),
            },
        }
    }
}

/// An ordered forest of clusters plus the input factors not assigned to any
/// cluster.
pub struct ClusterTree<F, C> {
    roots: Vec<Cluster<F, C>>,
    remaining_factors: FactorGraph<F>,
}

impl<F, C> ClusterTree<F, C> {
    /// Creates an empty forest.
    pub fn new() -> Self {
        Self {
            roots: Vec::new(),
            remaining_factors: FactorGraph::new(),
        }
    }

    /// Adds a root cluster to the forest.
    pub fn add_root(&mut self, root: Cluster<F, C>) {
        self.roots.push(root);
    }

    /// Records an input factor not assigned to any cluster; it is passed
    /// through to the remaining-factor output untouched.
    pub fn add_remaining_factor(&mut self, factor: Arc<F>) {
        self.remaining_factors.push(factor);
    }

    /// The root clusters.
    pub fn roots(&self) -> &[Cluster<F, C>] {
        &self.roots
    }

    /// The factors not assigned to any cluster.
    pub fn remaining_factors(&self) -> &FactorGraph<F> {
        &self.remaining_factors
    }
}

impl<F: Factor, C: Conditional> ClusterTree<F, C> {
    /// Eliminates the forest into a brand-new clique tree.
    ///
    /// Children are always eliminated before their parent; each node gathers
    /// its own factors plus the separator factors its children produced,
    /// invokes `function` with the node's keys as the elimination order, and
    /// stores the resulting conditional in a freshly allocated clique.
    /// Orphan placeholders among the node's factors are grafted under the
    /// new clique without invoking `function` on them.
    ///
    /// Returns the clique tree together with the remaining-factor graph:
    /// separator factors surfacing past the forest roots plus the forest's
    /// originally unassigned factors.
    pub fn eliminate(
        &self,
        function: &Eliminate<F, C>,
        config: &EliminationConfig,
    ) -> Result<(BayesTree<C>, FactorGraph<F>), TreeError> {
        run_build(self, function, config)
    }

    /// Re-runs elimination over an existing clique tree, overwriting stored
    /// conditionals while preserving the tree's topology.
    ///
    /// `tree` must have the same shape as this forest (it normally is the
    /// result of a prior [`eliminate`](Self::eliminate) call on it);
    /// cliques are matched to clusters by traversal position. Encountering
    /// an orphan placeholder is a fatal contract violation, since grafting
    /// is impossible when the topology is fixed.
    ///
    /// Returns the remaining-factor graph, computed as in build mode.
    pub fn eliminate_in_place(
        &self,
        tree: &BayesTree<C>,
        function: &Eliminate<F, C>,
        config: &EliminationConfig,
    ) -> Result<FactorGraph<F>, TreeError> {
        run_in_place(self, tree, function, config)
    }

    /// Formats the forest for diagnostics with an injected key formatter.
    pub fn format(&self, title: &str, fmt_key: &KeyFormatter) -> String {
        format_forest(&self.roots, title, fmt_key)
    }
}

impl<F, C> Default for ClusterTree<F, C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Deep-copies the forest structure while sharing, not duplicating, the
/// underlying factors. Used to branch a forest for editing without
/// recomputation.
impl<F, C> Clone for ClusterTree<F, C> {
    fn clone(&self) -> Self {
        Self {
            roots: clone_forest(&self.roots),
            remaining_factors: self.remaining_factors.clone(),
        }
    }
}

impl<F: Factor, C: Conditional> fmt::Display for ClusterTree<F, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format("", &default_key_formatter))
    }
}
