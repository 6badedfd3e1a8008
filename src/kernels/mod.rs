//! Kernel bodies: the code inside the timed region.
//!
//! Each kernel comes at several levels of explicitness, from a plain iterator
//! loop up to NUMA-partitioned task-parallel execution. Operand arrays and
//! arenas are set up by the caller, outside the timed region.

pub mod hierarchical;
pub mod reduce;
pub mod transform;
