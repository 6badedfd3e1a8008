//! Transform kernel: `Y[i] = a * X[i] + Y[i]`.
//!
//! Every element is updated by [`Element::axpy`] or an operation-for-operation
//! equivalent, so all variants yield identical `Y`.
//!
//! All functions panic if `x` and `y` differ in length.

use crate::numa::NumaArenas;
use crate::parallel::{for_each_chunk_mut, ParallelConfig, Schedule};
use crate::simd::{self, LANES};
use crate::Element;

fn check_len<T>(x: &[T], y: &[T]) {
    assert_eq!(x.len(), y.len(), "axpy operands differ in length");
}

/// Explicit iterator loop.
#[expect(clippy::while_let_on_iterator, reason = "the explicit iterator loop is the measured variant")]
pub fn iterator<T: Element>(a: T, x: &[T], y: &mut [T]) {
    check_len(x, y);
    let mut it = x.iter().zip(y.iter_mut());
    while let Some((&xv, yv)) = it.next() {
        *yv = T::axpy(a, xv, *yv);
    }
}

/// Index range loop.
#[expect(clippy::needless_range_loop, reason = "the indexed loop is the measured variant")]
pub fn range<T: Element>(a: T, x: &[T], y: &mut [T]) {
    check_len(x, y);
    for i in 0..y.len() {
        y[i] = T::axpy(a, x[i], y[i]);
    }
}

/// For-each over the zipped slices.
pub fn range_for<T: Element>(a: T, x: &[T], y: &mut [T]) {
    check_len(x, y);
    for (&xv, yv) in x.iter().zip(y.iter_mut()) {
        *yv = T::axpy(a, xv, *yv);
    }
}

/// Library iterator adaptor.
pub fn stl<T: Element>(a: T, x: &[T], y: &mut [T]) {
    check_len(x, y);
    y.iter_mut()
        .zip(x)
        .for_each(|(yv, &xv)| *yv = T::axpy(a, xv, *yv));
}

/// Fixed 8-wide inner loop, leaving vectorization to the compiler.
#[expect(clippy::needless_range_loop, reason = "fixed 8-wide indexed body left for the auto-vectorizer")]
pub fn lanes<T: Element>(a: T, x: &[T], y: &mut [T]) {
    check_len(x, y);
    let mut xs = x.chunks_exact(LANES);
    let mut ys = y.chunks_exact_mut(LANES);
    for (xb, yb) in xs.by_ref().zip(ys.by_ref()) {
        for l in 0..LANES {
            yb[l] = T::axpy(a, xb[l], yb[l]);
        }
    }
    for (&xv, yv) in xs.remainder().iter().zip(ys.into_remainder()) {
        *yv = T::axpy(a, xv, *yv);
    }
}

/// Explicit SIMD.
pub fn simd<T: Element>(a: T, x: &[T], y: &mut [T]) {
    simd::axpy(a, x, y);
}

/// Task-parallel transform in the current pool.
pub fn par_axpy<T: Element>(a: T, x: &[T], y: &mut [T], cfg: ParallelConfig) {
    check_len(x, y);
    for_each_chunk_mut(y, cfg, |offset, chunk| {
        simd::axpy(a, &x[offset..offset + chunk.len()], chunk);
    });
}

/// Task-parallel transform under an OpenMP-style schedule with chunk size
/// `chunk`.
pub fn par_axpy_schedule<T: Element>(a: T, x: &[T], y: &mut [T], schedule: Schedule, chunk: usize) {
    par_axpy(a, x, y, ParallelConfig::new(schedule.partitioner(), chunk));
}

/// NUMA-partitioned transform: node `n` updates its own range of `y` inside
/// its arena, reading the same range of `x`.
///
/// # Panics
///
/// Panics if the lengths differ.
pub fn numa_axpy<T: Element>(arenas: &NumaArenas, a: T, x: &[T], y: &mut [T], cfg: ParallelConfig) {
    check_len(x, y);
    arenas.run_on_node_chunks(y, |_, range, part| par_axpy(a, &x[range], part, cfg));
}
