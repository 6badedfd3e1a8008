//! Two-level reductions: per-task accumulators merged after the parallel
//! loop, and column sums over `m` stacked rows of length `n`.
//!
//! Row `j` of a stacked array `b` is `b[j*n..(j+1)*n]`; the column sum is
//! `a[i] = sum over j of b[j*n + i]`.

use rayon::prelude::*;

use crate::simd;
use crate::Element;

/// Task granularity of the fixed-slice loops.
pub const SLICE: usize = 8;

/// `a = b + c`, sequential.
///
/// # Panics
///
/// Panics if the three slices differ in length.
pub fn add_array<T: Element>(a: &mut [T], b: &[T], c: &[T]) {
    assert!(a.len() == b.len() && a.len() == c.len(), "add_array operands differ in length");
    for ((av, &bv), &cv) in a.iter_mut().zip(b).zip(c) {
        *av = bv + cv;
    }
}

/// `a = b + c`, one task per `grain` elements.
///
/// # Panics
///
/// Panics if the three slices differ in length.
pub fn add_array_par<T: Element>(a: &mut [T], b: &[T], c: &[T], grain: usize) {
    assert!(a.len() == b.len() && a.len() == c.len(), "add_array operands differ in length");
    let grain = grain.max(1);
    a.par_chunks_mut(grain)
        .zip(b.par_chunks(grain))
        .zip(c.par_chunks(grain))
        .for_each(|((a, b), c)| add_array(a, b, c));
}

/// Reduction where every rayon task owns an accumulator, folded over its
/// `grain`-sized slices, and the accumulators are merged at the end.
pub fn sum_per_worker<T: Element>(x: &[T], grain: usize) -> T {
    x.par_chunks(grain.max(1))
        .fold(|| T::ZERO, |acc, slice| acc + simd::sum_h(slice))
        .reduce(|| T::ZERO, |a, b| a + b)
}

fn check_stacked<T>(a: &[T], m: usize, b: &[T]) {
    assert_eq!(
        b.len(),
        a.len() * m,
        "stacked array holds {} elements, expected {} rows of {}",
        b.len(),
        m,
        a.len()
    );
}

/// Column sums, parallel over columns: each task walks one column with
/// stride `n`.
///
/// # Panics
///
/// Panics if `b.len() != a.len() * m`.
pub fn add_arrays_vec_par<T: Element>(a: &mut [T], m: usize, b: &[T]) {
    check_stacked(a, m, b);
    if m == 0 {
        a.fill(T::ZERO);
        return;
    }
    let n = a.len();
    a.par_iter_mut().enumerate().for_each(|(i, av)| {
        *av = b[i..].iter().step_by(n).take(m).fold(T::ZERO, |s, &v| s + v);
    });
}

fn add_rows<T: Element>(mut acc: Vec<T>, other: Vec<T>) -> Vec<T> {
    for (l, r) in acc.iter_mut().zip(other) {
        *l += r;
    }
    acc
}

/// Column sums, parallel over rows: each task accumulates whole rows into its
/// own row buffer, and the buffers are added together.
///
/// # Panics
///
/// Panics if `b.len() != a.len() * m`.
pub fn add_arrays_par_vec<T: Element>(a: &mut [T], m: usize, b: &[T]) {
    check_stacked(a, m, b);
    let n = a.len();
    if n == 0 {
        return;
    }
    let sums = b
        .par_chunks(n)
        .fold(
            || vec![T::ZERO; n],
            |mut acc, row| {
                for (s, &v) in acc.iter_mut().zip(row) {
                    *s += v;
                }
                acc
            },
        )
        .reduce(|| vec![T::ZERO; n], add_rows);
    a.copy_from_slice(&sums);
}

/// Column sums over the flattened `m*n` index space, one parallel loop.
///
/// # Panics
///
/// Panics if `b.len() != a.len() * m`.
pub fn add_arrays_merged<T: Element>(a: &mut [T], m: usize, b: &[T]) {
    check_stacked(a, m, b);
    let n = a.len();
    if n == 0 {
        return;
    }
    let sums = b
        .par_iter()
        .enumerate()
        .fold(
            || vec![T::ZERO; n],
            |mut acc, (k, &v)| {
                acc[k % n] += v;
                acc
            },
        )
        .reduce(|| vec![T::ZERO; n], add_rows);
    a.copy_from_slice(&sums);
}
