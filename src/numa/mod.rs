//! NUMA placement for the benchmark kernels
//!
//! This module provides topology discovery, thread-to-node pinning and the
//! per-node arena set used for first-touch initialization and node-local
//! kernel execution.

pub mod arena;
mod error;
pub mod pin;
pub mod topo;

pub use arena::{index_range, NodeArena, NumaArenas};
pub use error::NumaError;
pub use pin::{pin_current_thread, PinBudget, PinStats};
pub use topo::{get_topology, CpuSet, NumaTopology};

/// Initialize NUMA topology and return the topology information
///
/// Discovers the topology once per process and logs it; later calls return
/// a copy of the cached value.
pub fn init_numa() -> NumaTopology {
    let topo = get_topology();
    topo.log_topology();
    topo.clone()
}

/// Whether topology discovery goes through hwloc rather than the built-in
/// sysfs reader.
#[must_use]
pub fn uses_hwloc() -> bool {
    cfg!(feature = "hwloc")
}
