//! Build-mode and in-place elimination over a cluster forest.
//!
//! Both modes instantiate the same generic traversal
//! ([`crate::traversal`]) with a small visitor:
//!
//! - **Build** ([`BuildVisitor`]): constructs a brand-new clique tree,
//!   grafting orphan subtrees carried forward from a prior solve under the
//!   cliques that absorb them.
//! - **In-place** ([`ReuseVisitor`]): matches existing cliques to clusters
//!   by traversal position and overwrites their stored conditionals,
//!   leaving the topology untouched. Orphans are a fatal contract
//!   violation here.
//!
//! The sequential/parallel split is an injected [`ParallelPolicy`], and
//! instrumentation goes through an injected [`EliminationObserver`] rather
//! than any process-global handle.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::bayes::{BayesTree, Clique};
use crate::cluster::{Cluster, ClusterTree, TreeFactor};
use crate::errors::TreeError;
use crate::factor::{Conditional, Eliminate, Factor, FactorGraph, Key};
use crate::traversal::{depth_first_forest, Visitor};

/// Default problem-size threshold at or above which a subtree is descended
/// as its own task. A heuristic starting point, not a derived constant;
/// callers with a dimension-aware cost metric should tune it.
pub const DEFAULT_SPLIT_THRESHOLD: usize = 16;

/// The sequential/parallel split policy for the traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParallelPolicy {
    /// Never split; the whole traversal runs inline on the calling thread.
    Sequential,
    /// Descend subtrees whose cached problem size is at least the given
    /// value as independent tasks.
    Threshold(usize),
}

impl ParallelPolicy {
    pub(crate) fn should_split(&self, problem_size: usize) -> bool {
        match self {
            ParallelPolicy::Sequential => false,
            ParallelPolicy::Threshold(threshold) => problem_size >= *threshold,
        }
    }
}

impl Default for ParallelPolicy {
    fn default() -> Self {
        ParallelPolicy::Threshold(DEFAULT_SPLIT_THRESHOLD)
    }
}

/// Configuration for one elimination call.
#[derive(Clone)]
pub struct EliminationConfig {
    /// Sequential/parallel split policy.
    pub policy: ParallelPolicy,
    /// Dedicated thread pool to run the traversal in. Supply a small pool
    /// when elimination is invoked from an already-parallel outer context
    /// (e.g. an optimizer iterating re-solves) to cap nested parallelism;
    /// `None` uses the global rayon pool.
    pub pool: Option<Arc<rayon::ThreadPool>>,
    /// Instrumentation callbacks; defaults to the no-op observer.
    pub observer: Arc<dyn EliminationObserver>,
}

impl Default for EliminationConfig {
    fn default() -> Self {
        Self {
            policy: ParallelPolicy::default(),
            pool: None,
            observer: Arc::new(NullObserver),
        }
    }
}

impl fmt::Debug for EliminationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EliminationConfig")
            .field("policy", &self.policy)
            .field(
                "pool_threads",
                &self.pool.as_ref().map(|pool| pool.current_num_threads()),
            )
            .finish_non_exhaustive()
    }
}

/// Injected instrumentation for one elimination call.
///
/// Callbacks may fire concurrently from traversal tasks; implementations
/// must be thread-safe. The default methods discard everything.
pub trait EliminationObserver: Send + Sync {
    /// A clique's conditional was produced from `gathered_factors` factors.
    fn clique_eliminated(&self, frontals: &[Key], gathered_factors: usize) {
        let _ = (frontals, gathered_factors);
    }

    /// A previously-built subtree rooted at a clique with the given frontal
    /// variables was grafted without invoking the elimination function.
    fn orphan_grafted(&self, frontals: &[Key]) {
        let _ = frontals;
    }

    /// The traversal completed; final counters.
    fn finished(&self, stats: &EliminationStats) {
        let _ = stats;
    }
}

/// Observer that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl EliminationObserver for NullObserver {}

/// Counters for one elimination call, delivered through
/// [`EliminationObserver::finished`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EliminationStats {
    /// Cliques allocated by build-mode elimination.
    pub cliques_created: usize,
    /// Cliques whose conditional was overwritten by in-place elimination.
    pub cliques_updated: usize,
    /// Previously-built subtrees grafted at zero elimination cost.
    pub orphans_grafted: usize,
    /// Total factors handed to the elimination function across all nodes.
    pub factors_gathered: usize,
}

#[derive(Default)]
struct StatsCollector {
    cliques_created: AtomicUsize,
    cliques_updated: AtomicUsize,
    orphans_grafted: AtomicUsize,
    factors_gathered: AtomicUsize,
}

impl StatsCollector {
    fn snapshot(&self) -> EliminationStats {
        EliminationStats {
            cliques_created: self.cliques_created.load(Ordering::Relaxed),
            cliques_updated: self.cliques_updated.load(Ordering::Relaxed),
            orphans_grafted: self.orphans_grafted.load(Ordering::Relaxed),
            factors_gathered: self.factors_gathered.load(Ordering::Relaxed),
        }
    }
}

fn run_traversal<F, C, V>(
    roots: &[Cluster<F, C>],
    visitor: &V,
    config: &EliminationConfig,
) -> Result<Vec<V::Up>, TreeError>
where
    F: Factor,
    C: Conditional,
    V: Visitor<F, C>,
{
    match &config.pool {
        Some(pool) => pool.install(|| depth_first_forest(roots, visitor, &config.policy)),
        None => depth_first_forest(roots, visitor, &config.policy),
    }
}

/// The value a node passes into its parent's reserved slot in build mode.
struct BuildUp<F, C> {
    clique: Arc<Clique<C>>,
    separator: Option<Arc<F>>,
}

/// Allocating elimination: builds a fresh clique per cluster.
struct BuildVisitor<'a, F, C> {
    function: &'a Eliminate<'a, F, C>,
    /// Variable-to-clique index under construction. Each variable is frontal
    /// in exactly one clique, so entries never collide.
    nodes: Mutex<FxHashMap<Key, Arc<Clique<C>>>>,
    observer: &'a dyn EliminationObserver,
    stats: StatsCollector,
}

impl<'a, F: Factor, C: Conditional> Visitor<F, C> for BuildVisitor<'a, F, C> {
    type Ctx = ();
    type Up = BuildUp<F, C>;

    fn root_ctx(&self) -> Result<(), TreeError> {
        Ok(())
    }

    fn pre(&self, _node: &Cluster<F, C>, _parent: &(), _slot: usize) -> Result<(), TreeError> {
        Ok(())
    }

    fn post(
        &self,
        node: &Cluster<F, C>,
        _ctx: (),
        child_ups: Vec<BuildUp<F, C>>,
    ) -> Result<BuildUp<F, C>, TreeError> {
        // Gather this node's own factors, splitting out orphan placeholders:
        // those are grafted below instead of being eliminated.
        let mut gathered: Vec<Arc<F>> =
            Vec::with_capacity(node.factors().len() + child_ups.len());
        let mut grafts: Vec<Arc<Clique<C>>> = Vec::new();
        for tree_factor in node.factors() {
            match tree_factor {
                TreeFactor::Graph(factor) => gathered.push(Arc::clone(factor)),
                TreeFactor::Orphan(clique) => grafts.push(Arc::clone(clique)),
            }
        }

        // Child separator factors arrive in slot order.
        let mut children = Vec::with_capacity(child_ups.len() + grafts.len());
        for up in child_ups {
            if let Some(separator) = up.separator {
                gathered.push(separator);
            }
            children.push(up.clique);
        }

        self.stats
            .factors_gathered
            .fetch_add(gathered.len(), Ordering::Relaxed);
        let (conditional, separator) = (self.function)(&gathered, node.keys())?;
        self.observer.clique_eliminated(node.keys(), gathered.len());
        self.stats.cliques_created.fetch_add(1, Ordering::Relaxed);

        children.extend(grafts.iter().cloned());
        let clique = Clique::new_shared(conditional, children, node.problem_size());

        {
            let conditional = clique.conditional();
            let mut nodes = self.nodes.lock();
            for key in conditional.frontals() {
                nodes.insert(*key, Arc::clone(&clique));
            }
        }

        // Grafted subtrees keep their conditionals but re-enter the index so
        // the output tree's variable lookup stays complete.
        for graft in &grafts {
            self.observer.orphan_grafted(&graft.frontal_keys());
            self.stats.orphans_grafted.fetch_add(1, Ordering::Relaxed);
            let mut stack = vec![Arc::clone(graft)];
            let mut nodes = self.nodes.lock();
            while let Some(subclique) = stack.pop() {
                for key in subclique.conditional().frontals() {
                    nodes.insert(*key, Arc::clone(&subclique));
                }
                stack.extend(subclique.children().iter().cloned());
            }
        }

        Ok(BuildUp {
            clique,
            separator: separator.map(Arc::new),
        })
    }
}

pub(crate) fn run_build<F: Factor, C: Conditional>(
    forest: &ClusterTree<F, C>,
    function: &Eliminate<F, C>,
    config: &EliminationConfig,
) -> Result<(BayesTree<C>, FactorGraph<F>), TreeError> {
    let visitor = BuildVisitor {
        function,
        nodes: Mutex::new(FxHashMap::default()),
        observer: config.observer.as_ref(),
        stats: StatsCollector::default(),
    };
    let ups = run_traversal(forest.roots(), &visitor, config)?;

    // Root finalization: separator factors surfacing past the forest roots
    // join the originally unassigned factors.
    let mut roots = Vec::with_capacity(ups.len());
    let mut remaining =
        FactorGraph::with_capacity(forest.remaining_factors().len() + ups.len());
    remaining.extend(forest.remaining_factors().iter().cloned());
    for up in ups {
        if let Some(separator) = up.separator {
            remaining.push(separator);
        }
        roots.push(up.clique);
    }

    config.observer.finished(&visitor.stats.snapshot());
    let nodes = visitor.nodes.into_inner();
    Ok((BayesTree::from_parts(roots, nodes), remaining))
}

/// Per-node context in reuse mode: the existing clique matched to the
/// cluster by traversal position, or the dummy root aggregating the tree's
/// actual roots.
enum ReuseCtx<C> {
    Roots(Vec<Arc<Clique<C>>>),
    Node(Arc<Clique<C>>),
}

impl<C: Conditional> ReuseCtx<C> {
    fn child(&self, slot: usize) -> Result<Arc<Clique<C>>, TreeError> {
        let children = match self {
            ReuseCtx::Roots(roots) => roots.as_slice(),
            ReuseCtx::Node(clique) => clique.children(),
        };
        children.get(slot).cloned().ok_or_else(|| {
            TreeError::ShapeMismatch(format!(
                "no existing clique at child slot {} (tree has {} children here)",
                slot,
                children.len()
            ))
        })
    }
}

/// In-place elimination: overwrites conditionals of an existing tree.
struct ReuseVisitor<'a, F, C> {
    function: &'a Eliminate<'a, F, C>,
    roots: Vec<Arc<Clique<C>>>,
    observer: &'a dyn EliminationObserver,
    stats: StatsCollector,
}

impl<'a, F: Factor, C: Conditional> Visitor<F, C> for ReuseVisitor<'a, F, C> {
    type Ctx = ReuseCtx<C>;
    type Up = Option<Arc<F>>;

    fn root_ctx(&self) -> Result<ReuseCtx<C>, TreeError> {
        Ok(ReuseCtx::Roots(self.roots.clone()))
    }

    fn pre(
        &self,
        _node: &Cluster<F, C>,
        parent: &ReuseCtx<C>,
        slot: usize,
    ) -> Result<ReuseCtx<C>, TreeError> {
        Ok(ReuseCtx::Node(parent.child(slot)?))
    }

    fn post(
        &self,
        node: &Cluster<F, C>,
        ctx: ReuseCtx<C>,
        child_ups: Vec<Option<Arc<F>>>,
    ) -> Result<Option<Arc<F>>, TreeError> {
        // The topology is fixed in this mode, so a graft request is a
        // contract violation; reject it before doing any work.
        let mut gathered: Vec<Arc<F>> =
            Vec::with_capacity(node.factors().len() + child_ups.len());
        for tree_factor in node.factors() {
            match tree_factor {
                TreeFactor::Graph(factor) => gathered.push(Arc::clone(factor)),
                TreeFactor::Orphan(_) => {
                    return Err(TreeError::OrphanInReuse(format!(
                        "cluster eliminating {:?} carries an orphan placeholder; \
                         orphan wrappers are created internally by build-mode \
                         elimination and cannot be passed to in-place elimination",
                        node.keys()
                    )));
                }
            }
        }
        gathered.extend(child_ups.into_iter().flatten());

        self.stats
            .factors_gathered
            .fetch_add(gathered.len(), Ordering::Relaxed);
        let (conditional, separator) = (self.function)(&gathered, node.keys())?;
        self.observer.clique_eliminated(node.keys(), gathered.len());
        self.stats.cliques_updated.fetch_add(1, Ordering::Relaxed);

        let ReuseCtx::Node(clique) = ctx else {
            return Err(TreeError::Internal(
                "post-order visitor reached the dummy root".to_string(),
            ));
        };
        clique.set_conditional(conditional);

        Ok(separator.map(Arc::new))
    }
}

pub(crate) fn run_in_place<F: Factor, C: Conditional>(
    forest: &ClusterTree<F, C>,
    tree: &BayesTree<C>,
    function: &Eliminate<F, C>,
    config: &EliminationConfig,
) -> Result<FactorGraph<F>, TreeError> {
    let visitor = ReuseVisitor {
        function,
        roots: tree.roots().to_vec(),
        observer: config.observer.as_ref(),
        stats: StatsCollector::default(),
    };
    let ups = run_traversal(forest.roots(), &visitor, config)?;

    let mut remaining =
        FactorGraph::with_capacity(forest.remaining_factors().len() + ups.len());
    remaining.extend(forest.remaining_factors().iter().cloned());
    remaining.extend(ups.into_iter().flatten());

    config.observer.finished(&visitor.stats.snapshot());
    Ok(remaining)
}
