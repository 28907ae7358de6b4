//! The clique tree (Bayes tree) produced by elimination.
//!
//! A [`BayesTree`] encodes a top-down factorization of the joint
//! distribution: each [`Clique`] stores a conditional over its frontal
//! variables given its separator, children own (or share, when grafted)
//! their subtrees, and parents are reachable through non-owning
//! back-references. A global variable-to-clique index gives O(1) lookup of
//! the clique in which any variable is frontal.
//!
//! Cliques use interior mutability for the stored conditional so that
//! in-place (reuse-mode) elimination can overwrite conditionals concurrently
//! without touching the tree's topology.

use std::fmt;
use std::fmt::Write as _;
use std::sync::{Arc, Weak};

use parking_lot::{RwLock, RwLockReadGuard};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::factor::{default_key_formatter, Conditional, Key, KeyFormatter};

/// A node of the clique tree, holding a conditional distribution over its
/// frontal variables given its separator variables.
pub struct Clique<C> {
    /// The stored conditional; overwritten by in-place elimination.
    conditional: RwLock<C>,
    /// Non-owning back-reference, absent for roots. Used only for upward
    /// traversal and diagnostics, never for ownership.
    parent: RwLock<Weak<Clique<C>>>,
    /// Owned or shared child cliques; shared when grafted from a reused
    /// subtree. Fixed at construction.
    children: Vec<Arc<Clique<C>>>,
    /// Cached cost metric inherited from the originating cluster.
    problem_size: usize,
}

impl<C: Conditional> Clique<C> {
    /// Creates a clique owning the given children and wires each child's
    /// parent back-reference to the new clique.
    pub(crate) fn new_shared(
        conditional: C,
        children: Vec<Arc<Clique<C>>>,
        problem_size: usize,
    ) -> Arc<Self> {
        let clique = Arc::new(Self {
            conditional: RwLock::new(conditional),
            parent: RwLock::new(Weak::new()),
            children,
            problem_size,
        });
        for child in &clique.children {
            *child.parent.write() = Arc::downgrade(&clique);
        }
        clique
    }

    /// Read access to the stored conditional.
    pub fn conditional(&self) -> RwLockReadGuard<'_, C> {
        self.conditional.read()
    }

    /// Overwrites the stored conditional, leaving the topology untouched.
    pub(crate) fn set_conditional(&self, conditional: C) {
        *self.conditional.write() = conditional;
    }

    /// The parent clique, if any.
    pub fn parent(&self) -> Option<Arc<Clique<C>>> {
        self.parent.read().upgrade()
    }

    /// Whether this clique has no parent.
    pub fn is_root(&self) -> bool {
        self.parent.read().upgrade().is_none()
    }

    /// The child cliques.
    pub fn children(&self) -> &[Arc<Clique<C>>] {
        &self.children
    }

    /// The cached cost metric for this clique's elimination problem.
    pub fn problem_size(&self) -> usize {
        self.problem_size
    }

    /// The frontal variables, copied out of the conditional.
    pub fn frontal_keys(&self) -> Vec<Key> {
        self.conditional.read().frontals().to_vec()
    }

    /// The separator variables, copied out of the conditional.
    pub fn separator_keys(&self) -> Vec<Key> {
        self.conditional.read().parents().to_vec()
    }

    fn format_into(
        &self,
        out: &mut String,
        indent: &str,
        fmt_key: &KeyFormatter,
    ) -> fmt::Result {
        let conditional = self.conditional.read();
        write!(out, "{}- P(", indent)?;
        for key in conditional.frontals() {
            write!(out, " {}", fmt_key(*key))?;
        }
        if !conditional.parents().is_empty() {
            write!(out, " |")?;
            for key in conditional.parents() {
                write!(out, " {}", fmt_key(*key))?;
            }
        }
        writeln!(out, " ) problemSize = {}", self.problem_size)?;
        drop(conditional);

        let child_indent = format!("{}| ", indent);
        for child in &self.children {
            child.format_into(out, &child_indent, fmt_key)?;
        }
        Ok(())
    }
}

/// The clique tree produced by eliminating a cluster forest.
pub struct BayesTree<C> {
    roots: Vec<Arc<Clique<C>>>,
    /// Variable -> owning clique, for every variable that is frontal in
    /// some clique of this tree.
    nodes: FxHashMap<Key, Arc<Clique<C>>>,
}

impl<C: Conditional> BayesTree<C> {
    pub(crate) fn from_parts(
        roots: Vec<Arc<Clique<C>>>,
        nodes: FxHashMap<Key, Arc<Clique<C>>>,
    ) -> Self {
        Self { roots, nodes }
    }

    /// The root cliques of the tree (one per input-forest root).
    pub fn roots(&self) -> &[Arc<Clique<C>>] {
        &self.roots
    }

    /// Looks up the clique in which `key` is a frontal variable.
    pub fn clique(&self, key: Key) -> Option<&Arc<Clique<C>>> {
        self.nodes.get(&key)
    }

    /// Iterates over every key in the variable-to-clique index.
    pub fn keys(&self) -> impl Iterator<Item = Key> + '_ {
        self.nodes.keys().copied()
    }

    /// Depth-first iterator over every clique in the tree.
    pub fn cliques(&self) -> Cliques<C> {
        Cliques {
            stack: self.roots.iter().rev().cloned().collect(),
        }
    }

    /// Total number of cliques in the tree.
    pub fn num_cliques(&self) -> usize {
        self.cliques().count()
    }

    /// Checks the running intersection property: every clique's separator is
    /// contained in its parent's frontal-plus-separator set.
    ///
    /// Intended for tests and debug assertions; elimination maintains this
    /// invariant by construction.
    pub fn running_intersection_holds(&self) -> bool {
        self.cliques().all(|clique| match clique.parent() {
            None => true,
            Some(parent) => {
                let parent_conditional = parent.conditional();
                let allowed: FxHashSet<Key> = parent_conditional
                    .frontals()
                    .iter()
                    .chain(parent_conditional.parents())
                    .copied()
                    .collect();
                clique
                    .conditional()
                    .parents()
                    .iter()
                    .all(|key| allowed.contains(key))
            }
        })
    }

    /// Formats the tree for diagnostics with an injected key formatter.
    ///
    /// This output is human-oriented and not a stable serialization format.
    pub fn format(&self, title: &str, fmt_key: &KeyFormatter) -> String {
        let mut out = String::new();
        if !title.is_empty() {
            out.push_str(title);
            out.push('\n');
        }
        for root in &self.roots {
            // String formatting cannot fail.
            let _ = root.format_into(&mut out, "", fmt_key);
        }
        out
    }
}

impl<C: Conditional> fmt::Debug for BayesTree<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format("", &default_key_formatter))
    }
}

impl<C: Conditional> fmt::Display for BayesTree<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format("", &default_key_formatter))
    }
}

/// Depth-first clique iterator, parents before children.
pub struct Cliques<C> {
    stack: Vec<Arc<Clique<C>>>,
}

impl<C: Conditional> Iterator for Cliques<C> {
    type Item = Arc<Clique<C>>;

    fn next(&mut self) -> Option<Self::Item> {
        let clique = self.stack.pop()?;
        self.stack.extend(clique.children().iter().rev().cloned());
        Some(clique)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct TestConditional {
        frontals: Vec<Key>,
        parents: Vec<Key>,
    }

    impl Conditional for TestConditional {
        fn frontals(&self) -> &[Key] {
            &self.frontals
        }

        fn parents(&self) -> &[Key] {
            &self.parents
        }
    }

    fn conditional(frontals: &[u64], parents: &[u64]) -> TestConditional {
        TestConditional {
            frontals: frontals.iter().copied().map(Key).collect(),
            parents: parents.iter().copied().map(Key).collect(),
        }
    }

    fn two_clique_tree() -> BayesTree<TestConditional> {
        let leaf = Clique::new_shared(conditional(&[3], &[1]), Vec::new(), 1);
        let root = Clique::new_shared(conditional(&[1, 2], &[]), vec![leaf.clone()], 2);

        let mut nodes = FxHashMap::default();
        nodes.insert(Key(3), leaf);
        nodes.insert(Key(1), root.clone());
        nodes.insert(Key(2), root.clone());
        BayesTree::from_parts(vec![root], nodes)
    }

    #[test]
    fn test_parent_child_wiring() {
        let tree = two_clique_tree();
        let root = &tree.roots()[0];
        assert!(root.is_root());
        assert_eq!(root.children().len(), 1);

        let leaf = &root.children()[0];
        let leaf_parent = leaf.parent().expect("leaf should have a parent");
        assert!(Arc::ptr_eq(&leaf_parent, root));
    }

    #[test]
    fn test_index_lookup() {
        let tree = two_clique_tree();
        let owner = tree.clique(Key(3)).expect("key 3 should be indexed");
        assert_eq!(owner.frontal_keys(), vec![Key(3)]);
        assert!(tree.clique(Key(9)).is_none());
    }

    #[test]
    fn test_running_intersection() {
        let tree = two_clique_tree();
        assert!(tree.running_intersection_holds());

        // A leaf whose separator mentions a variable unknown to its parent
        // violates the property.
        let bad_leaf = Clique::new_shared(conditional(&[3], &[9]), Vec::new(), 1);
        let bad_root = Clique::new_shared(conditional(&[1], &[]), vec![bad_leaf], 1);
        let bad_tree = BayesTree::from_parts(vec![bad_root], FxHashMap::default());
        assert!(!bad_tree.running_intersection_holds());
    }

    #[test]
    fn test_in_place_overwrite_keeps_topology() {
        let tree = two_clique_tree();
        let leaf = tree.clique(Key(3)).unwrap().clone();
        leaf.set_conditional(conditional(&[3], &[2]));

        assert_eq!(leaf.separator_keys(), vec![Key(2)]);
        assert_eq!(tree.num_cliques(), 2);
        assert!(Arc::ptr_eq(&leaf.parent().unwrap(), &tree.roots()[0]));
    }

    #[test]
    fn test_format_lists_frontals_and_separator() {
        let tree = two_clique_tree();
        let printed = tree.format("tree:", &default_key_formatter);
        assert!(printed.starts_with("tree:\n"));
        assert!(printed.contains("P( 1 2 )"));
        assert!(printed.contains("P( 3 | 1 )"));
    }
}
