//! Memory initialization policies and the policy-tagged container.
//!
//! Where a page of memory lives on a NUMA machine is decided by the thread
//! that writes it first. [`NumaVec`] lets a benchmark choose *when* elements
//! are first written:
//!
//! | Operation | [`Eager`] | [`DefaultInit`] | [`NoInit`] |
//! |---|---|---|---|
//! | [`NumaVec::new`] | default value, calling thread | nothing | nothing |
//! | [`NumaVec::from_elem`] | value | value | nothing |
//! | [`NumaVec::resize`] (growth) | value | value | nothing |
//! | [`NumaVec::resize_default`] (growth) | default value | nothing | nothing |
//! | [`NumaVec::duplicate`] | copy | copy | nothing |
//!
//! `Eager` reproduces ordinary container semantics: every page is touched by
//! the allocating thread, which makes it the expected-to-perform-badly
//! baseline on multi-node machines. `DefaultInit` defers only the default
//! construction to a later parallel pass. `NoInit` never writes on its own, so
//! the first write of every element is exactly the one the caller performs.
//!
//! Reading a container whose slots were not all written is forbidden:
//! [`NumaVec::as_slice`] panics until an initializing pass ran. There is no
//! per-element tracking.

use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::ops::Range;

use crate::parallel::{for_each_chunk_mut, ParallelConfig};
use crate::Element;

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Eager {}
    impl Sealed for super::DefaultInit {}
    impl Sealed for super::NoInit {}
}

/// Runtime name of an [`InitPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyKind {
    Eager,
    DefaultInit,
    NoInit,
}

impl PolicyKind {
    /// Short label used in benchmark ids.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Eager => "Std",
            Self::DefaultInit => "DefaultInit",
            Self::NoInit => "NoInit",
        }
    }
}

/// Which element constructions a container performs by itself.
pub trait InitPolicy: sealed::Sealed + Send + Sync + 'static {
    const KIND: PolicyKind;
    /// Allocation and default-growth write `T::default()`.
    const CONSTRUCTS_DEFAULT: bool;
    /// Explicit-value construction and copies write their value.
    const CONSTRUCTS_VALUE: bool;
}

/// Every element is value-initialized at allocation, on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct Eager;

/// Default construction is skipped; explicit values are still written.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultInit;

/// No construction at all; only the caller's writes set elements.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInit;

impl InitPolicy for Eager {
    const KIND: PolicyKind = PolicyKind::Eager;
    const CONSTRUCTS_DEFAULT: bool = true;
    const CONSTRUCTS_VALUE: bool = true;
}

impl InitPolicy for DefaultInit {
    const KIND: PolicyKind = PolicyKind::DefaultInit;
    const CONSTRUCTS_DEFAULT: bool = false;
    const CONSTRUCTS_VALUE: bool = true;
}

impl InitPolicy for NoInit {
    const KIND: PolicyKind = PolicyKind::NoInit;
    const CONSTRUCTS_DEFAULT: bool = false;
    const CONSTRUCTS_VALUE: bool = false;
}

pub type EagerVec<T> = NumaVec<T, Eager>;
pub type DefaultInitVec<T> = NumaVec<T, DefaultInit>;
pub type NoInitVec<T> = NumaVec<T, NoInit>;

/// Flat numeric buffer whose element construction follows `P`.
pub struct NumaVec<T: Element, P: InitPolicy> {
    buf: Vec<MaybeUninit<T>>,
    /// Every slot holds a value written by an initializing pass.
    initialized: bool,
    /// Every slot holds at least this sentinel.
    poison: Option<T>,
    _policy: PhantomData<P>,
}

impl<T: Element, P: InitPolicy> NumaVec<T, P> {
    /// Allocate `len` elements.
    ///
    /// Under [`Eager`] every element is set to `T::default()` here, by the
    /// calling thread. Otherwise no element is written and the pages stay
    /// untouched.
    #[must_use]
    pub fn new(len: usize) -> Self {
        let mut v = Self {
            buf: Vec::new(),
            initialized: true,
            poison: None,
            _policy: PhantomData,
        };
        v.resize_default(len);
        v
    }

    /// Allocate `len` copies of `value`; [`NoInit`] does not write them.
    #[must_use]
    pub fn from_elem(len: usize, value: T) -> Self {
        let mut v = Self {
            buf: Vec::new(),
            initialized: true,
            poison: None,
            _policy: PhantomData,
        };
        v.resize(len, value);
        v
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[must_use]
    pub fn policy(&self) -> PolicyKind {
        P::KIND
    }

    /// Whether every element was written by an initializing pass.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Size of the element storage in bytes.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.buf.len() * size_of::<T>()
    }

    /// Grow or shrink to `new_len`; grown slots receive `value` unless the
    /// policy is [`NoInit`].
    pub fn resize(&mut self, new_len: usize, value: T) {
        let old_len = self.len();
        self.set_len_uninit(new_len);
        if new_len > old_len {
            if P::CONSTRUCTS_VALUE {
                for slot in &mut self.buf[old_len..] {
                    slot.write(value);
                }
            } else {
                self.mark_tail_unwritten();
            }
        }
    }

    /// Grow or shrink to `new_len`; grown slots receive `T::default()` only
    /// under [`Eager`].
    pub fn resize_default(&mut self, new_len: usize) {
        let old_len = self.len();
        self.set_len_uninit(new_len);
        if new_len > old_len {
            if P::CONSTRUCTS_DEFAULT {
                for slot in &mut self.buf[old_len..] {
                    slot.write(T::default());
                }
            } else {
                self.mark_tail_unwritten();
            }
        }
    }

    /// Copy of the container. [`NoInit`] allocates storage of the same length
    /// without copying any element.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        if P::CONSTRUCTS_VALUE {
            Self {
                buf: self.buf.clone(),
                initialized: self.initialized,
                poison: self.poison,
                _policy: PhantomData,
            }
        } else {
            let mut v = Self {
                buf: Vec::new(),
                initialized: true,
                poison: None,
                _policy: PhantomData,
            };
            v.resize_default(self.len());
            v
        }
    }

    /// Raw element slots, for placement writes by the owning thread.
    ///
    /// Writing through this does not mark the container initialized; see
    /// [`NumaVec::assume_init`].
    ///
    /// # Safety
    ///
    /// A slot that holds a value when this is called (after an initializing
    /// pass or [`NumaVec::poison`]) must still hold one when the borrow ends:
    /// callers may overwrite slots but never store `MaybeUninit::uninit()`.
    pub unsafe fn uninit_mut(&mut self) -> &mut [MaybeUninit<T>] {
        &mut self.buf
    }

    /// Slots for the crate's own owner passes, which write every element.
    pub(crate) fn slots_mut(&mut self) -> &mut [MaybeUninit<T>] {
        &mut self.buf
    }

    /// Declare every element written.
    ///
    /// # Safety
    ///
    /// Every slot must have been written through [`NumaVec::uninit_mut`] (or
    /// an earlier initializing operation) since allocation.
    pub unsafe fn assume_init(&mut self) {
        self.initialized = true;
    }

    /// Write `f(i)` to every index on the calling thread.
    pub fn fill_with(&mut self, mut f: impl FnMut(usize) -> T) {
        for (i, slot) in self.buf.iter_mut().enumerate() {
            slot.write(f(i));
        }
        self.initialized = true;
    }

    /// Write `f(i)` to every index with a task-parallel pass in the current
    /// rayon pool.
    pub fn par_fill_with<F>(&mut self, cfg: ParallelConfig, f: F)
    where
        F: Fn(usize) -> T + Sync + Send,
    {
        for_each_chunk_mut(&mut self.buf, cfg, |offset, chunk| {
            for (i, slot) in chunk.iter_mut().enumerate() {
                slot.write(f(offset + i));
            }
        });
        self.initialized = true;
    }

    /// Write `sentinel` to every slot without marking the container
    /// initialized.
    ///
    /// An owner pass must still overwrite every element;
    /// [`NumaVec::unwritten_ranges`] then reports the ranges it missed. Use a
    /// sentinel that compares equal to itself (not NaN).
    pub fn poison(&mut self, sentinel: T) {
        for slot in &mut self.buf {
            slot.write(sentinel);
        }
        self.poison = Some(sentinel);
    }

    /// Maximal index ranges still holding the poison sentinel.
    ///
    /// # Panics
    ///
    /// Panics if [`NumaVec::poison`] was not called first, since the slots
    /// could then be unwritten.
    #[must_use]
    pub fn unwritten_ranges(&self) -> Vec<Range<usize>> {
        let sentinel = self
            .poison
            .expect("unwritten_ranges requires a poisoned container");
        // SAFETY: poisoning wrote every slot.
        let values = unsafe { slice_assume_init(&self.buf) };

        let mut ranges = Vec::new();
        let mut start = None;
        for (i, v) in values.iter().enumerate() {
            match (start, *v == sentinel) {
                (None, true) => start = Some(i),
                (Some(s), false) => {
                    ranges.push(s..i);
                    start = None;
                }
                _ => {}
            }
        }
        if let Some(s) = start {
            ranges.push(s..values.len());
        }
        ranges
    }

    /// Initialized elements.
    ///
    /// # Panics
    ///
    /// Panics if the container was not initialized; reading before the
    /// initializing pass is a precondition violation.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        assert!(
            self.initialized,
            "read of a {} container before its initializing pass",
            P::KIND.name()
        );
        // SAFETY: checked above, every slot was written.
        unsafe { slice_assume_init(&self.buf) }
    }

    /// Initialized elements, mutably.
    ///
    /// # Panics
    ///
    /// Panics if the container was not initialized.
    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        assert!(
            self.initialized,
            "read of a {} container before its initializing pass",
            P::KIND.name()
        );
        // SAFETY: checked above, every slot was written.
        unsafe { &mut *(std::ptr::from_mut::<[MaybeUninit<T>]>(&mut self.buf) as *mut [T]) }
    }

    /// Initialized elements, or `None` before the initializing pass.
    #[must_use]
    pub fn try_as_slice(&self) -> Option<&[T]> {
        // SAFETY: only reached when every slot was written.
        self.initialized.then(|| unsafe { slice_assume_init(&self.buf) })
    }

    pub(crate) fn mark_initialized(&mut self) {
        self.initialized = true;
    }

    fn set_len_uninit(&mut self, new_len: usize) {
        if new_len <= self.buf.len() {
            self.buf.truncate(new_len);
            if new_len == 0 {
                self.initialized = true;
            }
            return;
        }
        self.buf.reserve_exact(new_len - self.buf.len());
        // SAFETY: capacity was reserved and MaybeUninit<T> needs no
        // initialization.
        unsafe { self.buf.set_len(new_len) };
    }

    fn mark_tail_unwritten(&mut self) {
        self.initialized = false;
        self.poison = None;
    }
}

impl<T: Element, P: InitPolicy> std::fmt::Debug for NumaVec<T, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NumaVec")
            .field("policy", &P::KIND)
            .field("len", &self.len())
            .field("initialized", &self.initialized)
            .finish_non_exhaustive()
    }
}

/// # Safety
///
/// Every element of `slots` must be initialized.
unsafe fn slice_assume_init<T>(slots: &[MaybeUninit<T>]) -> &[T] {
    // SAFETY: MaybeUninit<T> has the layout of T; the caller guarantees
    // initialization.
    unsafe { &*(std::ptr::from_ref::<[MaybeUninit<T>]>(slots) as *const [T]) }
}
