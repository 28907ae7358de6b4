//! Parallel depth-first traversal over a cluster forest.
//!
//! This is the only place in the crate where concurrency occurs. The walker
//! visits every cluster exactly once pre-order and exactly once post-order,
//! and a node's post-order step runs only after every child's post-order
//! step has completed: children are descended through fork-join, so the
//! join point is a true data dependency, not merely a scheduling order.
//!
//! Each child occupies a statically reserved slot (its position in the
//! parent's child list); the value its post-order step passes upward lands
//! in that slot of the `child_ups` vector handed to the parent. No two
//! tasks ever write the same location, so results are deterministic
//! independent of scheduling or thread count.
//!
//! Subtrees whose cached problem size meets the split policy's threshold
//! are descended as rayon tasks; everything below runs inline sequentially
//! to bound task-dispatch overhead.

use std::fmt::Write as _;

use rayon::prelude::*;

use crate::cluster::Cluster;
use crate::eliminate::ParallelPolicy;
use crate::errors::TreeError;
use crate::factor::{Conditional, Factor, KeyFormatter};

/// Per-node hooks threaded through one traversal call.
///
/// `pre` runs top-down and builds the node's transient context from its
/// parent's; `post` runs bottom-up once every child's `post` has finished
/// and produces the value passed into the parent's reserved slot. The
/// forest's actual roots hang off a single dummy root context so the whole
/// forest is processed through one call.
pub(crate) trait Visitor<F, C>: Sync {
    /// Transient per-node state; shared immutably with child tasks.
    type Ctx: Send + Sync;
    /// The value a node passes up into its parent's reserved slot.
    type Up: Send;

    /// Builds the dummy root context aggregating the forest roots.
    fn root_ctx(&self) -> Result<Self::Ctx, TreeError>;

    /// Pre-order hook: builds this node's context. `slot` is the node's
    /// reserved index in the parent's child array.
    fn pre(
        &self,
        node: &Cluster<F, C>,
        parent: &Self::Ctx,
        slot: usize,
    ) -> Result<Self::Ctx, TreeError>;

    /// Post-order hook: `child_ups[i]` is the value produced by the child
    /// in slot `i`.
    fn post(
        &self,
        node: &Cluster<F, C>,
        ctx: Self::Ctx,
        child_ups: Vec<Self::Up>,
    ) -> Result<Self::Up, TreeError>;
}

/// Walks the forest depth-first and returns the up-values of the forest
/// roots, in forest order. Aborts on the first hook error.
pub(crate) fn depth_first_forest<F, C, V>(
    roots: &[Cluster<F, C>],
    visitor: &V,
    policy: &ParallelPolicy,
) -> Result<Vec<V::Up>, TreeError>
where
    F: Factor,
    C: Conditional,
    V: Visitor<F, C>,
{
    let root_ctx = visitor.root_ctx()?;
    visit_children(roots, &root_ctx, visitor, policy)
}

fn visit_children<F, C, V>(
    children: &[Cluster<F, C>],
    parent_ctx: &V::Ctx,
    visitor: &V,
    policy: &ParallelPolicy,
) -> Result<Vec<V::Up>, TreeError>
where
    F: Factor,
    C: Conditional,
    V: Visitor<F, C>,
{
    // Splitting pays off only when at least two subtrees can proceed and at
    // least one of them is heavy enough.
    let split = children.len() > 1
        && children
            .iter()
            .any(|child| policy.should_split(child.problem_size()));

    if split {
        children
            .par_iter()
            .enumerate()
            .map(|(slot, child)| visit_node(child, parent_ctx, slot, visitor, policy))
            .collect()
    } else {
        children
            .iter()
            .enumerate()
            .map(|(slot, child)| visit_node(child, parent_ctx, slot, visitor, policy))
            .collect()
    }
}

fn visit_node<F, C, V>(
    node: &Cluster<F, C>,
    parent_ctx: &V::Ctx,
    slot: usize,
    visitor: &V,
    policy: &ParallelPolicy,
) -> Result<V::Up, TreeError>
where
    F: Factor,
    C: Conditional,
    V: Visitor<F, C>,
{
    let ctx = visitor.pre(node, parent_ctx, slot)?;
    let child_ups = visit_children(node.children(), &ctx, visitor, policy)?;
    visitor.post(node, ctx, child_ups)
}

/// Deep-copies a forest's node structure, sharing the underlying factor
/// references instead of duplicating their contents.
pub(crate) fn clone_forest<F, C>(roots: &[Cluster<F, C>]) -> Vec<Cluster<F, C>> {
    roots.iter().map(Cluster::clone_structure).collect()
}

/// Depth-first textual dump of a forest: each node's keys and problem size,
/// formatted through the injected key formatter.
pub(crate) fn format_forest<F, C>(
    roots: &[Cluster<F, C>],
    title: &str,
    fmt_key: &KeyFormatter,
) -> String {
    let mut out = String::new();
    if !title.is_empty() {
        out.push_str(title);
        out.push('\n');
    }
    for root in roots {
        format_node(root, &mut out, "", fmt_key);
    }
    out
}

fn format_node<F, C>(
    node: &Cluster<F, C>,
    out: &mut String,
    indent: &str,
    fmt_key: &KeyFormatter,
) {
    let _ = write!(out, "{}-", indent);
    for key in node.keys() {
        let _ = write!(out, " {}", fmt_key(*key));
    }
    let _ = writeln!(out, "  problemSize = {}", node.problem_size());

    let child_indent = format!("{}| ", indent);
    for child in node.children() {
        format_node(child, out, &child_indent, fmt_key);
    }
}
