//! Error types for topology discovery, pinning and arena construction.

/// Errors that can occur while setting up NUMA placement.
#[derive(Debug, thiserror::Error)]
pub enum NumaError {
    /// Topology discovery failed
    #[error("Topology detection failed: {0}")]
    TopologyError(String),

    /// A topology was described without any node
    #[error("Topology has no NUMA node")]
    EmptyTopology,

    /// A node was described without any CPU
    #[error("NUMA node {node} has an empty CPU set")]
    EmptyNode {
        /// The offending node
        node: usize,
    },

    /// Invalid NUMA node
    #[error("Invalid NUMA node: {node} (system has {available} nodes)")]
    InvalidNode {
        /// The requested node
        node: usize,
        /// Number of available nodes
        available: usize,
    },

    /// Requested zero worker threads per node
    #[error("Invalid thread count per node: {0}")]
    InvalidThreadCount(usize),

    /// Binding the current thread to a CPU set failed
    #[error("CPU pinning to {cpus} failed: {reason}")]
    PinFailed {
        /// CPU list the thread was to be bound to
        cpus: String,
        /// OS or platform reason
        reason: String,
    },

    /// Building a node arena failed
    #[error("Failed to build arena for NUMA node {node}: {reason}")]
    ArenaBuild {
        /// The node whose arena failed
        node: usize,
        /// Underlying pool error
        reason: String,
    },

    /// System call failed
    #[error("System call failed: {0}")]
    SyscallFailed(#[from] std::io::Error),
}
