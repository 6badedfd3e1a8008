//! NUMA topology detection and caching
//!
//! The topology is discovered once, then queried read-only: node count and
//! the CPU set of every node. Discovery uses, in order:
//! 1. hwlocality (if the `hwloc` feature is enabled)
//! 2. sysfs on Linux (`/sys/devices/system/node`)
//! 3. a single node holding every logical CPU

use std::fmt;

use once_cell::sync::OnceCell;

use super::NumaError;

/// Set of logical CPU ids a thread may be bound to.
///
/// Always sorted and free of duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct CpuSet {
    cpus: Vec<usize>,
}

impl CpuSet {
    /// Build a set from arbitrary CPU ids.
    #[must_use]
    pub fn new(cpus: impl IntoIterator<Item = usize>) -> Self {
        let mut cpus: Vec<usize> = cpus.into_iter().collect();
        cpus.sort_unstable();
        cpus.dedup();
        Self { cpus }
    }

    /// CPU ids in ascending order.
    #[must_use]
    pub fn cpus(&self) -> &[usize] {
        &self.cpus
    }

    /// Number of CPUs in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cpus.len()
    }

    /// Whether the set contains no CPU.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cpus.is_empty()
    }

    #[must_use]
    pub fn contains(&self, cpu: usize) -> bool {
        self.cpus.binary_search(&cpu).is_ok()
    }

    /// Parse a kernel CPU list such as `"0-7,16-23"`.
    ///
    /// Malformed parts are skipped.
    #[must_use]
    pub fn parse_cpulist(s: &str) -> Self {
        let mut cpus = Vec::new();

        for part in s.trim().split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            if let Some((start, end)) = part.split_once('-') {
                if let (Ok(start), Ok(end)) = (start.parse::<usize>(), end.parse::<usize>()) {
                    cpus.extend(start..=end);
                }
            } else if let Ok(cpu) = part.parse::<usize>() {
                cpus.push(cpu);
            }
        }

        Self::new(cpus)
    }
}

impl fmt::Display for CpuSet {
    /// Formats in kernel cpulist notation (`0-3,8`).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut iter = self.cpus.iter().copied().peekable();
        let mut first = true;
        while let Some(start) = iter.next() {
            let mut end = start;
            while iter.peek() == Some(&(end + 1)) {
                end += 1;
                iter.next();
            }
            if !first {
                f.write_str(",")?;
            }
            first = false;
            if start == end {
                write!(f, "{start}")?;
            } else {
                write!(f, "{start}-{end}")?;
            }
        }
        Ok(())
    }
}

/// NUMA topology information
///
/// Contains the CPU set of every NUMA node. Immutable once loaded; resources
/// are released when the value is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumaTopology {
    /// CPUs per node (index = node ID)
    cpus_per_node: Vec<CpuSet>,
}

impl NumaTopology {
    /// Discover the host topology.
    ///
    /// # Errors
    ///
    /// Returns [`NumaError::TopologyError`] if the discovery backend fails.
    /// Hosts without NUMA information yield a single-node topology, not an
    /// error.
    pub fn try_load() -> Result<Self, NumaError> {
        #[cfg(feature = "hwloc")]
        return Self::detect_hwlocality();

        #[cfg(not(feature = "hwloc"))]
        {
            #[cfg(target_os = "linux")]
            {
                if let Some(topo) = Self::detect_sysfs()? {
                    return Ok(topo);
                }
            }

            Ok(Self::single_node_fallback())
        }
    }

    /// Discover the host topology, terminating on failure.
    ///
    /// Every other component depends on the topology, so a failed discovery
    /// leaves nothing to measure.
    ///
    /// # Panics
    ///
    /// Panics if [`NumaTopology::try_load`] fails.
    #[must_use]
    pub fn load() -> Self {
        match Self::try_load() {
            Ok(topo) => topo,
            Err(e) => panic!("NUMA topology discovery failed: {e}"),
        }
    }

    /// Build a topology from explicit per-node CPU sets.
    ///
    /// # Errors
    ///
    /// Fails if no node is given or if a node has no CPU.
    pub fn from_cpu_sets(cpus_per_node: Vec<CpuSet>) -> Result<Self, NumaError> {
        if cpus_per_node.is_empty() {
            return Err(NumaError::EmptyTopology);
        }
        if let Some(node) = cpus_per_node.iter().position(CpuSet::is_empty) {
            return Err(NumaError::EmptyNode { node });
        }
        Ok(Self { cpus_per_node })
    }

    /// Emulate `nodes` NUMA nodes on the current host.
    ///
    /// The host's CPUs are dealt round-robin into `nodes` groups; when there
    /// are fewer CPUs than nodes, CPUs are shared between groups. Used to run
    /// the multi-node methodology on single-node machines.
    ///
    /// # Panics
    ///
    /// Panics if `nodes == 0`.
    #[must_use]
    pub fn emulated(nodes: usize) -> Self {
        assert!(nodes > 0, "an emulated topology needs at least one node");
        let host = get_topology();
        let all: Vec<usize> = host
            .cpus_per_node
            .iter()
            .flat_map(|set| set.cpus().iter().copied())
            .collect();
        let all = if all.is_empty() { vec![0] } else { all };

        let mut groups = vec![Vec::new(); nodes];
        for (i, cpu) in all.iter().enumerate() {
            groups[i % nodes].push(*cpu);
        }
        for (node, group) in groups.iter_mut().enumerate() {
            if group.is_empty() {
                group.push(all[node % all.len()]);
            }
        }

        Self {
            cpus_per_node: groups.into_iter().map(CpuSet::new).collect(),
        }
    }

    /// Number of NUMA nodes, always at least one.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.cpus_per_node.len()
    }

    /// CPU set of `node`.
    ///
    /// # Panics
    ///
    /// Panics if `node >= self.node_count()`; an out-of-range node is a
    /// programming error.
    #[must_use]
    pub fn cpu_set_for(&self, node: usize) -> &CpuSet {
        assert!(
            node < self.node_count(),
            "NUMA node {node} out of range (topology has {} nodes)",
            self.node_count()
        );
        &self.cpus_per_node[node]
    }

    /// Checked variant of [`NumaTopology::cpu_set_for`].
    ///
    /// # Errors
    ///
    /// Returns [`NumaError::InvalidNode`] for an out-of-range node.
    pub fn get_cpu_set(&self, node: usize) -> Result<&CpuSet, NumaError> {
        self.cpus_per_node.get(node).ok_or(NumaError::InvalidNode {
            node,
            available: self.node_count(),
        })
    }

    /// Get the NUMA node for a given CPU
    #[must_use]
    pub fn node_for_cpu(&self, cpu: usize) -> Option<usize> {
        self.cpus_per_node.iter().position(|set| set.contains(cpu))
    }

    /// Total number of distinct CPUs across all nodes.
    #[must_use]
    pub fn cpu_count(&self) -> usize {
        CpuSet::new(self.cpus_per_node.iter().flat_map(|s| s.cpus().iter().copied())).len()
    }

    /// Whether the host has more than one node.
    #[must_use]
    pub fn is_numa(&self) -> bool {
        self.node_count() > 1
    }

    /// One-line-per-node description of the topology.
    #[must_use]
    pub fn summary(&self) -> String {
        use std::fmt::Write;

        let mut s = format!("NUMA: {} nodes, {} CPUs", self.node_count(), self.cpu_count());
        for (node, cpus) in self.cpus_per_node.iter().enumerate() {
            let _ = write!(s, "\n  Node {node}: {} CPUs ({cpus})", cpus.len());
        }
        s
    }

    /// Log the detected topology.
    pub fn log_topology(&self) {
        tracing::info!(
            nodes = self.node_count(),
            cpus = self.cpu_count(),
            "NUMA topology loaded"
        );
        for (node, cpus) in self.cpus_per_node.iter().enumerate() {
            tracing::debug!(node, cpus = %cpus, "NUMA node");
        }
    }

    #[cfg(feature = "hwloc")]
    fn detect_hwlocality() -> Result<Self, NumaError> {
        use hwlocality::object::types::ObjectType;
        use hwlocality::Topology;

        let topo = Topology::new()
            .map_err(|e| NumaError::TopologyError(format!("hwlocality init failed: {e}")))?;

        let mut cpus_per_node: Vec<CpuSet> = topo
            .objects_with_type(ObjectType::NUMANode)
            .map(|node| {
                node.cpuset()
                    .map(|set| CpuSet::new(set.iter_set().map(usize::from)))
                    .unwrap_or_default()
            })
            .collect();

        // Memory-only nodes (no CPUs) cannot host an arena.
        cpus_per_node.retain(|set| !set.is_empty());

        if cpus_per_node.is_empty() {
            let all = topo
                .objects_with_type(ObjectType::PU)
                .filter_map(hwlocality::object::TopologyObject::os_index)
                .collect::<Vec<_>>();
            if all.is_empty() {
                return Err(NumaError::TopologyError(
                    "hwlocality reported no processing unit".to_string(),
                ));
            }
            cpus_per_node = vec![CpuSet::new(all)];
        }

        Ok(Self { cpus_per_node })
    }

    /// Read node CPU lists from sysfs. `Ok(None)` when the host exposes no
    /// node directory (kernel built without NUMA).
    #[cfg(all(target_os = "linux", not(feature = "hwloc")))]
    fn detect_sysfs() -> Result<Option<Self>, NumaError> {
        use std::fs;
        use std::path::Path;

        let node_path = Path::new("/sys/devices/system/node");
        if !node_path.exists() {
            return Ok(None);
        }

        let mut node_ids: Vec<usize> = Vec::new();
        for entry in fs::read_dir(node_path)? {
            let name = entry?.file_name();
            let name = name.to_string_lossy();
            if let Some(id) = name.strip_prefix("node").and_then(|n| n.parse().ok()) {
                node_ids.push(id);
            }
        }
        node_ids.sort_unstable();

        let mut cpus_per_node = Vec::with_capacity(node_ids.len());
        for id in node_ids {
            let cpulist = fs::read_to_string(node_path.join(format!("node{id}/cpulist")))?;
            let cpus = CpuSet::parse_cpulist(&cpulist);
            // Memory-only nodes (no CPUs) cannot host an arena.
            if !cpus.is_empty() {
                cpus_per_node.push(cpus);
            }
        }

        if cpus_per_node.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self { cpus_per_node }))
    }

    #[cfg_attr(feature = "hwloc", expect(dead_code, reason = "hwloc discovery never falls back to a single node"))]
    fn single_node_fallback() -> Self {
        // Prefer the cores this process may actually run on.
        let cpus = core_affinity::get_core_ids()
            .map(|ids| CpuSet::new(ids.into_iter().map(|core| core.id)))
            .filter(|set| !set.is_empty())
            .unwrap_or_else(|| CpuSet::new(0..num_cpus::get().max(1)));
        Self {
            cpus_per_node: vec![cpus],
        }
    }
}

/// Process-wide topology cache
static TOPOLOGY_CACHE: OnceCell<NumaTopology> = OnceCell::new();

/// Load the topology once and cache it for the process lifetime.
///
/// # Panics
///
/// Panics if discovery fails, see [`NumaTopology::load`].
pub fn get_topology() -> &'static NumaTopology {
    TOPOLOGY_CACHE.get_or_init(NumaTopology::load)
}
