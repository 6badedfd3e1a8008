//! Task-parallel loop primitives with selectable partitioning.
//!
//! Provides thread pool initialization, workload chunking, and the
//! partitioner / grain-size knobs varied by the benchmarks. Everything runs on
//! [Rayon](https://docs.rs/rayon), inside whichever pool is current.
//!
//! # Example
//!
//! ```rust
//! use numakern::parallel::{reduce_chunks, ParallelConfig, Partitioner};
//!
//! let data: Vec<f32> = vec![1.0; 1_000_000];
//! let cfg = ParallelConfig::new(Partitioner::Auto, 4096);
//!
//! let sum = reduce_chunks(&data, cfg, || 0.0_f32, |acc, chunk| acc + chunk.iter().sum::<f32>(), |a, b| a + b);
//! assert_eq!(sum, 1_000_000.0);
//! ```

use std::ops::Range;
use std::sync::{Mutex, Once};

use rayon::prelude::*;
use rayon::{current_num_threads, ThreadPoolBuilder};

static START: Once = Once::new();

/// Initialize the global Rayon thread pool with named worker threads.
/// Called automatically by [`chunk_bounds`]; explicit calls are optional.
pub fn init_thread_pool() {
    START.call_once(|| {
        let built = ThreadPoolBuilder::new()
            .thread_name(|i| format!("numakern-global-{i}"))
            .build_global();
        if let Err(e) = built {
            // Someone configured the global pool first; theirs is used.
            tracing::debug!(error = %e, "global rayon pool already initialized");
        }
    });
}

/// Compute dynamic workload chunk bounds for parallel iterators.
/// Returns `(min_len, max_len)` used with `with_min_len`/`with_max_len`.
#[must_use]
pub fn chunk_bounds(total_len: usize) -> (usize, usize) {
    init_thread_pool();
    let threads = current_num_threads().max(1);
    let job_min = core::cmp::max(1024, total_len / (threads * 4));
    (job_min, job_min * 4)
}

/// How a parallel loop's index range is cut into tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Partitioner {
    /// One equal contiguous chunk per worker thread (never smaller than the
    /// grain), no further splitting.
    #[default]
    Static,
    /// Recursive split down to exactly grain-sized tasks.
    Simple,
    /// Load-adaptive splitting that stops at the grain.
    Auto,
    /// Per-worker contiguous blocks pinned to the worker index, so repeated
    /// runs hand the same block to the same thread.
    Affinity,
    /// Geometrically shrinking blocks, `remaining / (2 * threads)` each,
    /// never below the grain.
    Guided,
}

impl Partitioner {
    /// All partitioners, in benchmark order.
    pub const ALL: [Self; 5] = [
        Self::Static,
        Self::Simple,
        Self::Auto,
        Self::Affinity,
        Self::Guided,
    ];

    /// Short label used in benchmark ids.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Simple => "simple",
            Self::Auto => "auto",
            Self::Affinity => "affinity",
            Self::Guided => "guided",
        }
    }
}

/// OpenMP-style loop schedules, expressed through [`Partitioner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Schedule {
    /// `schedule(static)`
    Static,
    /// `schedule(dynamic)`: one task per grain block.
    Dynamic,
    /// `schedule(guided)`
    Guided,
}

impl Schedule {
    #[must_use]
    pub fn partitioner(self) -> Partitioner {
        match self {
            Self::Static => Partitioner::Static,
            Self::Dynamic => Partitioner::Simple,
            Self::Guided => Partitioner::Guided,
        }
    }
}

/// Partitioner plus grain size: the free parameters of a task-parallel run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParallelConfig {
    pub partitioner: Partitioner,
    /// Minimum chunk length below which splitting stops. Zero is treated as
    /// one.
    pub grain: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            partitioner: Partitioner::Static,
            grain: 1,
        }
    }
}

impl ParallelConfig {
    #[must_use]
    pub const fn new(partitioner: Partitioner, grain: usize) -> Self {
        Self { partitioner, grain }
    }

    /// Automatic partitioning with a grain derived from [`chunk_bounds`].
    #[must_use]
    pub fn auto_for(total_len: usize) -> Self {
        let (min_len, _) = chunk_bounds(total_len);
        Self::new(Partitioner::Auto, min_len)
    }

    /// Same partitioner, different grain.
    #[must_use]
    pub const fn with_grain(self, grain: usize) -> Self {
        Self {
            partitioner: self.partitioner,
            grain,
        }
    }

    fn grain(self) -> usize {
        self.grain.max(1)
    }
}

/// Task boundaries for `len` elements under `cfg` in a pool of `threads`.
///
/// The returned ranges are contiguous, non-empty and cover `0..len` in order.
#[must_use]
pub fn plan(len: usize, cfg: ParallelConfig, threads: usize) -> Vec<Range<usize>> {
    let grain = cfg.grain();
    let threads = threads.max(1);
    if len == 0 {
        return Vec::new();
    }

    let mut ranges = Vec::new();
    match cfg.partitioner {
        Partitioner::Static | Partitioner::Affinity => {
            let chunk = len.div_ceil(threads).max(grain);
            push_fixed(&mut ranges, len, chunk);
        }
        Partitioner::Simple | Partitioner::Auto => push_fixed(&mut ranges, len, grain),
        Partitioner::Guided => {
            let mut start = 0;
            while start < len {
                let remaining = len - start;
                let size = (remaining / (2 * threads)).max(grain).min(remaining);
                ranges.push(start..start + size);
                start += size;
            }
        }
    }
    ranges
}

fn push_fixed(ranges: &mut Vec<Range<usize>>, len: usize, chunk: usize) {
    let mut start = 0;
    while start < len {
        let end = (start + chunk).min(len);
        ranges.push(start..end);
        start = end;
    }
}

/// Disjoint mutable sub-slices handed out once each by index.
///
/// Lets a `Fn + Sync` closure running on several threads take ownership of
/// exactly one part of a split `&mut [T]`.
pub(crate) struct SliceSlots<'a, T> {
    slots: Vec<Mutex<Option<&'a mut [T]>>>,
}

impl<'a, T: Send> SliceSlots<'a, T> {
    /// Split `data` at the given contiguous ranges.
    pub(crate) fn split(mut data: &'a mut [T], ranges: &[Range<usize>]) -> Self {
        let mut slots = Vec::with_capacity(ranges.len());
        let mut consumed = 0;
        for range in ranges {
            debug_assert_eq!(range.start, consumed, "ranges must be contiguous");
            let (head, tail) = std::mem::take(&mut data).split_at_mut(range.len());
            slots.push(Mutex::new(Some(head)));
            data = tail;
            consumed = range.end;
        }
        Self { slots }
    }

    /// Take part `index`; `None` if it was already taken or does not exist.
    pub(crate) fn take(&self, index: usize) -> Option<&'a mut [T]> {
        self.slots
            .get(index)
            .and_then(|slot| slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner).take())
    }
}

/// Parallel fold over chunks of `data`, merged with `merge`.
///
/// `fold` receives each task's chunk; `merge` must be associative. Floating
/// point results may differ in the last bits between configurations.
pub fn reduce_chunks<T, R, I, F, M>(data: &[T], cfg: ParallelConfig, identity: I, fold: F, merge: M) -> R
where
    T: Sync,
    R: Send,
    I: Fn() -> R + Sync + Send,
    F: Fn(R, &[T]) -> R + Sync + Send,
    M: Fn(R, R) -> R + Sync + Send,
{
    let grain = cfg.grain();
    match cfg.partitioner {
        Partitioner::Static => {
            let chunk = data.len().div_ceil(current_num_threads()).max(grain);
            data.par_chunks(chunk)
                .with_max_len(1)
                .fold(&identity, &fold)
                .reduce(&identity, &merge)
        }
        Partitioner::Simple => data
            .par_chunks(grain)
            .with_max_len(1)
            .fold(&identity, &fold)
            .reduce(&identity, &merge),
        Partitioner::Auto => data
            .par_chunks(grain)
            .fold(&identity, &fold)
            .reduce(&identity, &merge),
        Partitioner::Affinity => {
            let ranges = plan(data.len(), cfg, current_num_threads());
            let partials = rayon::broadcast(|ctx| {
                ranges
                    .get(ctx.index())
                    .map_or_else(&identity, |r| fold(identity(), &data[r.clone()]))
            });
            partials.into_iter().fold(identity(), &merge)
        }
        Partitioner::Guided => plan(data.len(), cfg, current_num_threads())
            .into_par_iter()
            .with_max_len(1)
            .map(|r| fold(identity(), &data[r]))
            .reduce(&identity, &merge),
    }
}

/// Parallel for-each over mutable chunks of `data`.
///
/// `f` receives the chunk's offset into `data` and the chunk itself.
pub fn for_each_chunk_mut<T, F>(data: &mut [T], cfg: ParallelConfig, f: F)
where
    T: Send,
    F: Fn(usize, &mut [T]) + Sync + Send,
{
    let grain = cfg.grain();
    match cfg.partitioner {
        Partitioner::Static => {
            let chunk = data.len().div_ceil(current_num_threads()).max(grain);
            data.par_chunks_mut(chunk)
                .with_max_len(1)
                .enumerate()
                .for_each(|(i, c)| f(i * chunk, c));
        }
        Partitioner::Simple => data
            .par_chunks_mut(grain)
            .with_max_len(1)
            .enumerate()
            .for_each(|(i, c)| f(i * grain, c)),
        Partitioner::Auto => data
            .par_chunks_mut(grain)
            .enumerate()
            .for_each(|(i, c)| f(i * grain, c)),
        Partitioner::Affinity => {
            let ranges = plan(data.len(), cfg, current_num_threads());
            let slots = SliceSlots::split(data, &ranges);
            rayon::broadcast(|ctx| {
                if let Some(chunk) = slots.take(ctx.index()) {
                    f(ranges[ctx.index()].start, chunk);
                }
            });
        }
        Partitioner::Guided => {
            let ranges = plan(data.len(), cfg, current_num_threads());
            let mut parts = Vec::with_capacity(ranges.len());
            let mut rest = data;
            for r in &ranges {
                let (head, tail) = std::mem::take(&mut rest).split_at_mut(r.len());
                parts.push((r.start, head));
                rest = tail;
            }
            parts
                .into_par_iter()
                .with_max_len(1)
                .for_each(|(offset, c)| f(offset, c));
        }
    }
}
