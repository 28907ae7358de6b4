//! Benchmarks comparing sequential and parallel elimination.
//!
//! Run with: cargo bench --bench elimination

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use bayestree::symbolic::{symbolic_eliminate, SymbolicConditional, SymbolicFactor};
use bayestree::{Cluster, ClusterTree, EliminationConfig, Key, ParallelPolicy};

type Forest = ClusterTree<SymbolicFactor, SymbolicConditional>;

/// A balanced binary forest of the given depth: cluster at position `p`
/// owns key `p` and carries a binary factor to its parent.
fn balanced_forest(depth: u32) -> Forest {
    fn subtree(
        id: u64,
        parent: Option<u64>,
        depth: u32,
    ) -> Cluster<SymbolicFactor, SymbolicConditional> {
        let mut node = Cluster::new([Key(id)]);
        let scope: Vec<Key> = match parent {
            Some(p) => vec![Key(id), Key(p)],
            None => vec![Key(id)],
        };
        node.add_factor(Arc::new(SymbolicFactor::new(scope)));
        if depth > 0 {
            node.add_child(subtree(2 * id + 1, Some(id), depth - 1));
            node.add_child(subtree(2 * id + 2, Some(id), depth - 1));
        }
        // Subtree node count as the cost metric, so the default split
        // threshold kicks in on the upper levels.
        node.set_problem_size((1usize << (depth + 1)) - 1);
        node
    }

    let mut forest = Forest::new();
    forest.add_root(subtree(0, None, depth));
    forest
}

fn bench_elimination(c: &mut Criterion) {
    let mut group = c.benchmark_group("eliminate");

    for depth in [8u32, 12] {
        let forest = balanced_forest(depth);

        group.bench_with_input(
            BenchmarkId::new("sequential", depth),
            &forest,
            |b, forest| {
                let config = EliminationConfig {
                    policy: ParallelPolicy::Sequential,
                    ..EliminationConfig::default()
                };
                b.iter(|| {
                    black_box(forest.eliminate(&symbolic_eliminate, &config).unwrap())
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("parallel", depth),
            &forest,
            |b, forest| {
                let config = EliminationConfig::default();
                b.iter(|| {
                    black_box(forest.eliminate(&symbolic_eliminate, &config).unwrap())
                });
            },
        );
    }

    group.finish();
}

fn bench_in_place(c: &mut Criterion) {
    let forest = balanced_forest(10);
    let (tree, _) = forest
        .eliminate(&symbolic_eliminate, &EliminationConfig::default())
        .unwrap();

    c.bench_function("eliminate_in_place/depth_10", |b| {
        let config = EliminationConfig::default();
        b.iter(|| {
            black_box(
                forest
                    .eliminate_in_place(&tree, &symbolic_eliminate, &config)
                    .unwrap(),
            )
        });
    });
}

criterion_group!(benches, bench_elimination, bench_in_place);
criterion_main!(benches);
