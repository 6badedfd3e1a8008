//! NUMA-aware benchmarking of two primitive kernels: reduction (`sum`) and
//! scaled update (`y = a*x + y`).
//!
//! The crate provides the measurement methodology, not a numeric library:
//!
//! - [`numa::NumaTopology`] discovers NUMA nodes and their CPU sets,
//! - [`numa::NumaArenas`] owns one pinned rayon pool per node and partitions
//!   flat arrays into per-node index ranges,
//! - [`alloc::NumaVec`] controls whether elements are written at allocation
//!   time or by a later owner pass (first-touch placement),
//! - [`kernels`] holds the kernel bodies from plain iterators up to
//!   NUMA-partitioned task-parallel execution,
//! - [`bench`] holds the driver-facing glue: size sweeps, counters and
//!   post-timing verification.
//!
//! # Example
//!
//! ```rust,no_run
//! use numakern::alloc::NoInitVec;
//! use numakern::kernels::reduce;
//! use numakern::numa::{NumaArenas, NumaTopology};
//! use numakern::parallel::ParallelConfig;
//!
//! let topo = NumaTopology::load();
//! let arenas = NumaArenas::new(&topo, 4).expect("arena set");
//!
//! let mut x = NoInitVec::<f32>::new(1 << 20);
//! arenas.first_touch(&mut x, ParallelConfig::default(), |_| 1.0);
//!
//! let sum = reduce::numa_sum(&arenas, x.as_slice(), ParallelConfig::default());
//! assert_eq!(sum, (1 << 20) as f32);
//! ```

pub mod alloc;
pub mod bench;
pub mod config;
pub mod element;
pub mod kernels;
pub mod numa;
pub mod parallel;
pub mod simd;

pub use element::Element;
