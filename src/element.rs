//! Numeric element types accepted by the containers and kernels.

use core::fmt::Debug;
use core::iter::Sum;
use core::ops::{Add, AddAssign, Mul};

use crate::simd::SimdElement;

mod sealed {
    pub trait Sealed {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
}

/// Floating-point element of a benchmarked array.
///
/// Sealed: implemented for `f32` and `f64` only.
pub trait Element:
    sealed::Sealed
    + SimdElement
    + Copy
    + Default
    + Debug
    + PartialEq
    + PartialOrd
    + Send
    + Sync
    + Add<Output = Self>
    + AddAssign
    + Mul<Output = Self>
    + Sum
    + 'static
{
    /// Additive identity.
    const ZERO: Self;

    /// Type name used in benchmark ids.
    const NAME: &'static str;

    /// Multiplicative identity, the fill value of the uniform benchmark arrays.
    const ONE: Self;

    /// Widening conversion used by reference computations.
    fn to_f64(self) -> f64;

    /// `a * x + y` as two rounded operations.
    ///
    /// Never fused, so every kernel variant produces bit-identical updates.
    #[must_use]
    fn axpy(a: Self, x: Self, y: Self) -> Self;
}

impl Element for f32 {
    const NAME: &'static str = "f32";
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;

    #[inline]
    fn to_f64(self) -> f64 {
        f64::from(self)
    }

    #[inline]
    fn axpy(a: Self, x: Self, y: Self) -> Self {
        a * x + y
    }
}

impl Element for f64 {
    const NAME: &'static str = "f64";
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;

    #[inline]
    fn to_f64(self) -> f64 {
        self
    }

    #[inline]
    fn axpy(a: Self, x: Self, y: Self) -> Self {
        a * x + y
    }
}
