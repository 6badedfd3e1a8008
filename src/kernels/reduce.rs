//! Reduction kernel: `sum(X)`.
//!
//! The floating-point sum depends on the association order, which differs
//! between variants and, for the parallel ones, between runs with a dynamic
//! partitioner. Callers compare against a reference within a tolerance.

use crate::numa::NumaArenas;
use crate::parallel::{reduce_chunks, ParallelConfig, Schedule};
use crate::simd::{self, LANES};
use crate::Element;

/// Explicit iterator loop.
#[expect(clippy::while_let_on_iterator, reason = "the explicit iterator loop is the measured variant")]
pub fn iterator<T: Element>(x: &[T]) -> T {
    let mut acc = T::ZERO;
    let mut it = x.iter();
    while let Some(&v) = it.next() {
        acc += v;
    }
    acc
}

/// Index range loop.
#[expect(clippy::needless_range_loop, reason = "the indexed loop is the measured variant")]
pub fn range<T: Element>(x: &[T]) -> T {
    let mut acc = T::ZERO;
    for i in 0..x.len() {
        acc += x[i];
    }
    acc
}

/// For-each over the slice.
pub fn range_for<T: Element>(x: &[T]) -> T {
    let mut acc = T::ZERO;
    for &v in x {
        acc += v;
    }
    acc
}

/// Library iterator adaptor.
pub fn stl<T: Element>(x: &[T]) -> T {
    x.iter().copied().sum()
}

/// Eight independent accumulators, leaving vectorization to the compiler.
pub fn lanes<T: Element>(x: &[T]) -> T {
    let blocks = x.chunks_exact(LANES);
    let tail = blocks.remainder();
    let mut acc = [T::ZERO; LANES];
    for block in blocks {
        for (a, &v) in acc.iter_mut().zip(block) {
            *a += v;
        }
    }
    tail.iter().fold(merge_lanes(acc), |s, &v| s + v)
}

/// Explicit SIMD, one horizontal add per 8-element block.
pub fn simd_h<T: Element>(x: &[T]) -> T {
    simd::sum_h(x)
}

/// Explicit SIMD, vertical accumulator and a single horizontal add.
pub fn simd_v<T: Element>(x: &[T]) -> T {
    simd::sum_v(x)
}

fn merge_lanes<T: Element>(acc: [T; LANES]) -> T {
    acc.iter().fold(T::ZERO, |s, &v| s + v)
}

/// Task-parallel reduction in the current pool.
pub fn par_sum<T: Element>(x: &[T], cfg: ParallelConfig) -> T {
    reduce_chunks(x, cfg, || T::ZERO, |acc, chunk| acc + simd::sum_v(chunk), |a, b| a + b)
}

/// Task-parallel reduction where every task keeps eight lane accumulators,
/// merged lanewise before the final horizontal add.
pub fn par_sum_lanes<T: Element>(x: &[T], cfg: ParallelConfig) -> T {
    let acc = reduce_chunks(
        x,
        cfg,
        || [T::ZERO; LANES],
        |mut acc, chunk| {
            let blocks = chunk.chunks_exact(LANES);
            let tail = blocks.remainder();
            for block in blocks {
                for (a, &v) in acc.iter_mut().zip(block) {
                    *a += v;
                }
            }
            for (a, &v) in acc.iter_mut().zip(tail) {
                *a += v;
            }
            acc
        },
        |mut a, b| {
            for (l, r) in a.iter_mut().zip(b) {
                *l += r;
            }
            a
        },
    );
    merge_lanes(acc)
}

/// Task-parallel reduction under an OpenMP-style schedule with chunk size
/// `chunk`.
pub fn par_sum_schedule<T: Element>(x: &[T], schedule: Schedule, chunk: usize) -> T {
    par_sum(x, ParallelConfig::new(schedule.partitioner(), chunk))
}

/// NUMA-partitioned reduction.
///
/// Node `n` reduces its own index range inside its arena; the per-node
/// partials are merged sequentially in node order. Nodes whose range is
/// empty contribute zero.
pub fn numa_sum<T: Element>(arenas: &NumaArenas, x: &[T], cfg: ParallelConfig) -> T {
    numa_sum_with(arenas, x, |part| par_sum(part, cfg))
}

/// [`numa_sum`] with lanewise per-task accumulators.
pub fn numa_sum_lanes<T: Element>(arenas: &NumaArenas, x: &[T], cfg: ParallelConfig) -> T {
    numa_sum_with(arenas, x, |part| par_sum_lanes(part, cfg))
}

fn numa_sum_with<T, F>(arenas: &NumaArenas, x: &[T], per_node: F) -> T
where
    T: Element,
    F: Fn(&[T]) -> T + Sync,
{
    let partials = arenas.run_on_nodes(|node, _| per_node(&x[arenas.index_range(node, x.len())]));
    partials.into_iter().fold(T::ZERO, |acc, p| acc + p)
}
