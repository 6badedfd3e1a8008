//! Explicit 8-lane SIMD kernels.
//!
//! Every function processes full 8-element blocks in a branch-free
//! `chunks_exact` loop and the `len % 8` tail in a scalar epilogue.
//!
//! On x86_64 the AVX path is selected at runtime; everywhere else, or when
//! the CPU lacks AVX, the portable [`Lane8`] register emulation is used. Both
//! backends perform the same operations in the same order, so their results
//! are bit-identical.

use std::ops::{Add, Mul};

use crate::Element;

/// Vector width in elements.
pub const LANES: usize = 8;

/// Backend actually used by the dispatched functions on this host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Avx,
    Portable,
}

impl Backend {
    #[must_use]
    pub fn detect() -> Self {
        #[cfg(target_arch = "x86_64")]
        if is_x86_feature_detected!("avx") {
            return Backend::Avx;
        }
        Backend::Portable
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Backend::Avx => "avx",
            Backend::Portable => "portable",
        }
    }
}

/// Eight-lane register emulated with an array.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lane8<T>(pub [T; LANES]);

impl<T: Element> Lane8<T> {
    #[inline(always)]
    #[must_use]
    pub fn splat(v: T) -> Self {
        Self([v; LANES])
    }

    /// # Panics
    ///
    /// Panics if `block.len() != LANES`.
    #[inline(always)]
    #[must_use]
    pub fn load(block: &[T]) -> Self {
        let mut lanes = [T::ZERO; LANES];
        lanes.copy_from_slice(block);
        Self(lanes)
    }

    #[inline(always)]
    pub fn store(self, block: &mut [T]) {
        block.copy_from_slice(&self.0);
    }

    /// Sum of the lanes, left to right.
    #[inline(always)]
    #[must_use]
    pub fn hsum(self) -> T {
        self.0.iter().fold(T::ZERO, |acc, &v| acc + v)
    }
}

impl<T: Element> Add for Lane8<T> {
    type Output = Self;

    #[inline(always)]
    fn add(mut self, rhs: Self) -> Self {
        for (d, s) in self.0.iter_mut().zip(rhs.0) {
            *d += s;
        }
        self
    }
}

impl<T: Element> Mul for Lane8<T> {
    type Output = Self;

    #[inline(always)]
    fn mul(mut self, rhs: Self) -> Self {
        for (d, s) in self.0.iter_mut().zip(rhs.0) {
            *d = *d * s;
        }
        self
    }
}

/// Portable implementations on [`Lane8`].
pub mod portable {
    use super::{Lane8, LANES};
    use crate::Element;

    /// Reduce every block horizontally and accumulate the block sums.
    pub fn sum_h<T: Element>(x: &[T]) -> T {
        let blocks = x.chunks_exact(LANES);
        let tail = blocks.remainder();
        let mut acc = T::ZERO;
        for block in blocks {
            acc += Lane8::load(block).hsum();
        }
        for &v in tail {
            acc += v;
        }
        acc
    }

    /// Accumulate lanewise, one horizontal reduction at the end.
    pub fn sum_v<T: Element>(x: &[T]) -> T {
        let blocks = x.chunks_exact(LANES);
        let tail = blocks.remainder();
        let mut acc = Lane8::splat(T::ZERO);
        for block in blocks {
            acc = acc + Lane8::load(block);
        }
        let mut sum = acc.hsum();
        for &v in tail {
            sum += v;
        }
        sum
    }

    /// `y = a*x + y`, unfused.
    ///
    /// # Panics
    ///
    /// Panics if the slices differ in length.
    pub fn axpy<T: Element>(a: T, x: &[T], y: &mut [T]) {
        assert_eq!(x.len(), y.len(), "axpy operands differ in length");
        let av = Lane8::splat(a);
        let mut xs = x.chunks_exact(LANES);
        let mut ys = y.chunks_exact_mut(LANES);
        for (xb, yb) in xs.by_ref().zip(ys.by_ref()) {
            (av * Lane8::load(xb) + Lane8::load(yb)).store(yb);
        }
        for (xv, yv) in xs.remainder().iter().zip(ys.into_remainder()) {
            *yv = T::axpy(a, *xv, *yv);
        }
    }
}

#[cfg(target_arch = "x86_64")]
mod avx {
    use std::arch::x86_64::{
        _mm256_add_pd, _mm256_add_ps, _mm256_loadu_pd, _mm256_loadu_ps, _mm256_mul_pd,
        _mm256_mul_ps, _mm256_set1_pd, _mm256_set1_ps, _mm256_setzero_pd, _mm256_setzero_ps,
        _mm256_storeu_pd, _mm256_storeu_ps,
    };

    use super::LANES;

    // Horizontal sums go through memory and add left to right, matching
    // `Lane8::hsum` exactly.

    #[target_feature(enable = "avx")]
    pub(super) unsafe fn sum_h_f32(x: &[f32]) -> f32 {
        let blocks = x.chunks_exact(LANES);
        let tail = blocks.remainder();
        let mut acc = 0.0f32;
        let mut lanes = [0.0f32; LANES];
        for block in blocks {
            _mm256_storeu_ps(lanes.as_mut_ptr(), _mm256_loadu_ps(block.as_ptr()));
            acc += lanes.iter().fold(0.0, |s, &v| s + v);
        }
        for &v in tail {
            acc += v;
        }
        acc
    }

    #[target_feature(enable = "avx")]
    pub(super) unsafe fn sum_v_f32(x: &[f32]) -> f32 {
        let blocks = x.chunks_exact(LANES);
        let tail = blocks.remainder();
        let mut acc = _mm256_setzero_ps();
        for block in blocks {
            acc = _mm256_add_ps(acc, _mm256_loadu_ps(block.as_ptr()));
        }
        let mut lanes = [0.0f32; LANES];
        _mm256_storeu_ps(lanes.as_mut_ptr(), acc);
        let mut sum = lanes.iter().fold(0.0, |s, &v| s + v);
        for &v in tail {
            sum += v;
        }
        sum
    }

    #[target_feature(enable = "avx")]
    pub(super) unsafe fn axpy_f32(a: f32, x: &[f32], y: &mut [f32]) {
        let av = _mm256_set1_ps(a);
        let mut xs = x.chunks_exact(LANES);
        let mut ys = y.chunks_exact_mut(LANES);
        for (xb, yb) in xs.by_ref().zip(ys.by_ref()) {
            let prod = _mm256_mul_ps(av, _mm256_loadu_ps(xb.as_ptr()));
            _mm256_storeu_ps(yb.as_mut_ptr(), _mm256_add_ps(prod, _mm256_loadu_ps(yb.as_ptr())));
        }
        for (xv, yv) in xs.remainder().iter().zip(ys.into_remainder()) {
            *yv = a * *xv + *yv;
        }
    }

    // An 8-lane f64 block spans two 256-bit registers: lanes 0..4 and 4..8.

    #[target_feature(enable = "avx")]
    pub(super) unsafe fn sum_h_f64(x: &[f64]) -> f64 {
        let blocks = x.chunks_exact(LANES);
        let tail = blocks.remainder();
        let mut acc = 0.0f64;
        let mut lanes = [0.0f64; LANES];
        for block in blocks {
            let p = block.as_ptr();
            _mm256_storeu_pd(lanes.as_mut_ptr(), _mm256_loadu_pd(p));
            _mm256_storeu_pd(lanes.as_mut_ptr().add(4), _mm256_loadu_pd(p.add(4)));
            acc += lanes.iter().fold(0.0, |s, &v| s + v);
        }
        for &v in tail {
            acc += v;
        }
        acc
    }

    #[target_feature(enable = "avx")]
    pub(super) unsafe fn sum_v_f64(x: &[f64]) -> f64 {
        let blocks = x.chunks_exact(LANES);
        let tail = blocks.remainder();
        let mut lo = _mm256_setzero_pd();
        let mut hi = _mm256_setzero_pd();
        for block in blocks {
            let p = block.as_ptr();
            lo = _mm256_add_pd(lo, _mm256_loadu_pd(p));
            hi = _mm256_add_pd(hi, _mm256_loadu_pd(p.add(4)));
        }
        let mut lanes = [0.0f64; LANES];
        _mm256_storeu_pd(lanes.as_mut_ptr(), lo);
        _mm256_storeu_pd(lanes.as_mut_ptr().add(4), hi);
        let mut sum = lanes.iter().fold(0.0, |s, &v| s + v);
        for &v in tail {
            sum += v;
        }
        sum
    }

    #[target_feature(enable = "avx")]
    pub(super) unsafe fn axpy_f64(a: f64, x: &[f64], y: &mut [f64]) {
        let av = _mm256_set1_pd(a);
        let mut xs = x.chunks_exact(LANES);
        let mut ys = y.chunks_exact_mut(LANES);
        for (xb, yb) in xs.by_ref().zip(ys.by_ref()) {
            let (px, py) = (xb.as_ptr(), yb.as_mut_ptr());
            let lo = _mm256_add_pd(_mm256_mul_pd(av, _mm256_loadu_pd(px)), _mm256_loadu_pd(py));
            let hi = _mm256_add_pd(
                _mm256_mul_pd(av, _mm256_loadu_pd(px.add(4))),
                _mm256_loadu_pd(py.add(4)),
            );
            _mm256_storeu_pd(py, lo);
            _mm256_storeu_pd(py.add(4), hi);
        }
        for (xv, yv) in xs.remainder().iter().zip(ys.into_remainder()) {
            *yv = a * *xv + *yv;
        }
    }
}

/// Per-type backend dispatch; a supertrait of [`Element`].
pub trait SimdElement: Copy + Sized {
    fn simd_sum_h(x: &[Self]) -> Self;
    fn simd_sum_v(x: &[Self]) -> Self;
    fn simd_axpy(a: Self, x: &[Self], y: &mut [Self]);
}

macro_rules! impl_simd_element {
    ($t:ty, $sum_h:ident, $sum_v:ident, $axpy:ident) => {
        impl SimdElement for $t {
            #[inline]
            fn simd_sum_h(x: &[Self]) -> Self {
                #[cfg(target_arch = "x86_64")]
                if is_x86_feature_detected!("avx") {
                    // SAFETY: the CPU supports AVX, checked above.
                    return unsafe { avx::$sum_h(x) };
                }
                portable::sum_h(x)
            }

            #[inline]
            fn simd_sum_v(x: &[Self]) -> Self {
                #[cfg(target_arch = "x86_64")]
                if is_x86_feature_detected!("avx") {
                    // SAFETY: the CPU supports AVX, checked above.
                    return unsafe { avx::$sum_v(x) };
                }
                portable::sum_v(x)
            }

            #[inline]
            fn simd_axpy(a: Self, x: &[Self], y: &mut [Self]) {
                assert_eq!(x.len(), y.len(), "axpy operands differ in length");
                #[cfg(target_arch = "x86_64")]
                if is_x86_feature_detected!("avx") {
                    // SAFETY: the CPU supports AVX, checked above; the
                    // lengths were checked equal.
                    unsafe { avx::$axpy(a, x, y) };
                    return;
                }
                portable::axpy(a, x, y);
            }
        }
    };
}

impl_simd_element!(f32, sum_h_f32, sum_v_f32, axpy_f32);
impl_simd_element!(f64, sum_h_f64, sum_v_f64, axpy_f64);

/// Reduction with one horizontal add per 8-lane block.
#[inline]
pub fn sum_h<T: Element>(x: &[T]) -> T {
    T::simd_sum_h(x)
}

/// Reduction with a vertical 8-lane accumulator and a single horizontal add.
#[inline]
pub fn sum_v<T: Element>(x: &[T]) -> T {
    T::simd_sum_v(x)
}

/// `y = a*x + y` on 8-lane blocks.
///
/// # Panics
///
/// Panics if the slices differ in length.
#[inline]
pub fn axpy<T: Element>(a: T, x: &[T], y: &mut [T]) {
    T::simd_axpy(a, x, y);
}
