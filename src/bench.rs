//! Driver-facing glue: size sweeps, throughput counters, reference results
//! and post-timing verification.
//!
//! Nothing here runs inside the timed region. A benchmark case builds its
//! inputs, times only the kernel, then calls [`verify_sum`] or
//! [`verify_transform`] once on the last result.

use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::Element;

/// Relative tolerance used for reductions of uniform data.
pub const SUM_REL_TOL: f64 = 1e-4;

/// Largest count of ones an `f32` accumulator adds up exactly.
///
/// A sequential `f32` sum of ones stops growing at `2^24`, since `2^24 + 1`
/// rounds back to `2^24`; lane and parallel variants stall a few powers of
/// two later. Uniform reductions above this length run on `f64`.
pub const F32_EXACT_SUM_LIMIT: usize = 1 << 24;

/// Whether a uniform-ones reduction over `elements` values stays exact in
/// `f32` for every kernel variant.
#[must_use]
pub fn f32_sums_exactly(elements: usize) -> bool {
    elements <= F32_EXACT_SUM_LIMIT
}

/// Failed post-timing check.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum VerifyError {
    #[error("sum mismatch: expected {expected}, got {actual} (relative error {rel_err:e} > {tol:e})")]
    SumMismatch {
        expected: f64,
        actual: f64,
        rel_err: f64,
        tol: f64,
    },

    #[error("transform mismatch at index {index}: expected {expected}, got {actual}")]
    TransformMismatch {
        index: usize,
        expected: f64,
        actual: f64,
    },

    #[error("length mismatch: expected {expected} elements, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Which kernel a counter describes; fixes the number of memory streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelKind {
    /// Reads X.
    Reduction,
    /// Reads X and Y, writes Y.
    Transform,
}

impl KernelKind {
    #[must_use]
    pub fn streams(self) -> usize {
        match self {
            KernelKind::Reduction => 1,
            KernelKind::Transform => 3,
        }
    }
}

/// Work done by one kernel invocation; the bench harness turns it into a
/// byte throughput and a benchmark id parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Counters {
    pub elements: usize,
    pub bytes: u64,
    pub label: String,
}

impl Counters {
    #[must_use]
    pub fn new<T: Element>(kind: KernelKind, elements: usize) -> Self {
        let bytes = elements * size_of::<T>() * kind.streams();
        Self {
            elements,
            bytes: bytes as u64,
            label: size_label(elements),
        }
    }

    #[must_use]
    pub fn reduction<T: Element>(elements: usize) -> Self {
        Self::new::<T>(KernelKind::Reduction, elements)
    }

    #[must_use]
    pub fn transform<T: Element>(elements: usize) -> Self {
        Self::new::<T>(KernelKind::Transform, elements)
    }
}

/// `2^e` for powers of two, the plain count otherwise.
#[must_use]
pub fn size_label(elements: usize) -> String {
    if elements.is_power_of_two() {
        format!("2^{}", elements.ilog2())
    } else {
        elements.to_string()
    }
}

/// Powers of two `1 << e` for an inclusive exponent range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeSweep {
    exponents: RangeInclusive<u32>,
}

impl SizeSweep {
    /// # Panics
    ///
    /// Panics if the upper exponent does not fit a `usize` shift.
    #[must_use]
    pub fn new(exponents: RangeInclusive<u32>) -> Self {
        assert!(
            *exponents.end() < usize::BITS,
            "size exponent {} overflows usize",
            exponents.end()
        );
        Self { exponents }
    }

    #[must_use]
    pub fn exponents(&self) -> RangeInclusive<u32> {
        self.exponents.clone()
    }

    /// Largest size of the sweep, zero when empty.
    #[must_use]
    pub fn max_size(&self) -> usize {
        self.sizes().last().unwrap_or(0)
    }

    pub fn sizes(&self) -> impl Iterator<Item = usize> + '_ {
        self.exponents.clone().map(|e| 1usize << e)
    }
}

/// Exact-as-possible sum, accumulated in `f64`.
pub fn reference_sum<T: Element>(x: &[T]) -> f64 {
    x.iter().map(|v| v.to_f64()).sum()
}

/// Expected `Y` after one transform, computed sequentially.
///
/// # Panics
///
/// Panics if the slices differ in length.
pub fn reference_axpy<T: Element>(a: T, x: &[T], y: &[T]) -> Vec<T> {
    assert_eq!(x.len(), y.len(), "axpy operands differ in length");
    x.iter().zip(y).map(|(&x, &y)| T::axpy(a, x, y)).collect()
}

/// Check a reduction result against the reference within a relative
/// tolerance.
///
/// # Errors
///
/// Returns [`VerifyError::SumMismatch`] if the relative error exceeds
/// `rel_tol`, or if `actual` is not finite.
pub fn verify_sum<T: Element>(expected: f64, actual: T, rel_tol: f64) -> Result<(), VerifyError> {
    let actual = actual.to_f64();
    let scale = expected.abs().max(f64::MIN_POSITIVE);
    let rel_err = (actual - expected).abs() / scale;
    if rel_err <= rel_tol {
        Ok(())
    } else {
        Err(VerifyError::SumMismatch {
            expected,
            actual,
            rel_err,
            tol: rel_tol,
        })
    }
}

/// Check a transformed array for exact equality.
///
/// # Errors
///
/// Returns the first mismatching index, or a length mismatch.
pub fn verify_transform<T: Element>(y: &[T], expected: &[T]) -> Result<(), VerifyError> {
    if y.len() != expected.len() {
        return Err(VerifyError::LengthMismatch {
            expected: expected.len(),
            actual: y.len(),
        });
    }
    match y.iter().zip(expected).position(|(a, e)| a != e) {
        None => Ok(()),
        Some(index) => Err(VerifyError::TransformMismatch {
            index,
            expected: expected[index].to_f64(),
            actual: y[index].to_f64(),
        }),
    }
}

/// Check that every element of `y` equals `value`.
///
/// # Errors
///
/// Returns the first mismatching index.
pub fn verify_uniform<T: Element>(y: &[T], value: T) -> Result<(), VerifyError> {
    match y.iter().position(|&v| v != value) {
        None => Ok(()),
        Some(index) => Err(VerifyError::TransformMismatch {
            index,
            expected: value.to_f64(),
            actual: y[index].to_f64(),
        }),
    }
}

/// Tally of the post-timing checks of a benchmark run.
///
/// A failed check is logged and counted; it never unwinds, so the remaining
/// cases still run. The harness inspects [`CheckLog::failures`] at the end.
#[derive(Debug, Default)]
pub struct CheckLog {
    checked: AtomicUsize,
    failed: AtomicUsize,
}

impl CheckLog {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            checked: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    /// Record the outcome of `case`'s check. Returns whether it passed.
    pub fn record(&self, case: &str, outcome: Result<(), VerifyError>) -> bool {
        self.checked.fetch_add(1, Ordering::Relaxed);
        match outcome {
            Ok(()) => true,
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(case, error = %e, "verification failed");
                false
            }
        }
    }

    #[must_use]
    pub fn checked(&self) -> usize {
        self.checked.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn failures(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }
}
