//! Per-node task arenas and index-range partitioning.
//!
//! [`NumaArenas`] owns one rayon pool per NUMA node. Each pool is built by an
//! initializer thread bound to the node, and its workers spend a one-shot
//! [`PinBudget`] binding themselves to the node's CPUs as they start. A flat
//! array is split into one contiguous range per node; node `n`'s range is
//! only ever touched by node `n`'s workers, from the first write on.
//!
//! ```text
//!  controlling thread
//!        │ broadcast (launcher pool, thread i pinned to node i)
//!  ┌─────┴──────┬──────────────┐
//!  ▼            ▼              ▼
//!  arena 0      arena 1   ...  arena N-1     (threads_per_node workers each)
//!  [0, e0)      [e0, e1)       [e(N-2), T)   (index_range, node 0 takes the remainder)
//! ```

use std::ops::{Index, Range};
use std::sync::Arc;

use rayon::{ThreadPool, ThreadPoolBuilder};

use super::pin::{pin_current_thread, PinBudget, PinStats};
use super::topo::{CpuSet, NumaTopology};
use super::NumaError;
use crate::alloc::{InitPolicy, NumaVec};
use crate::parallel::{for_each_chunk_mut, ParallelConfig, SliceSlots};
use crate::Element;

/// Half-open range of `total` elements owned by `node` out of `nodes`.
///
/// The elements are split into `nodes` equal parts; node 0 additionally
/// absorbs the `total % nodes` remainder, so every other node's range is
/// shifted by it. The ranges of all nodes cover `0..total` exactly once.
///
/// # Panics
///
/// Panics if `node >= nodes`.
#[must_use]
pub fn index_range(node: usize, nodes: usize, total: usize) -> Range<usize> {
    assert!(node < nodes, "NUMA node {node} out of range ({nodes} nodes)");
    let part = total / nodes;
    let rest = total % nodes;

    if node == 0 {
        0..part + rest
    } else {
        node * part + rest..(node + 1) * part + rest
    }
}

/// Task-execution context of one NUMA node.
pub struct NodeArena {
    node: usize,
    pool: ThreadPool,
    budget: Arc<PinBudget>,
}

impl NodeArena {
    fn build(node: usize, cpus: CpuSet, threads: usize) -> Result<Self, NumaError> {
        let budget = Arc::new(PinBudget::new(node, cpus, threads));
        let worker_budget = Arc::clone(&budget);

        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .spawn_handler(move |thread| {
                let budget = Arc::clone(&worker_budget);
                std::thread::Builder::new()
                    .name(format!("numakern-n{node}-w{}", thread.index()))
                    .spawn(move || {
                        budget.apply();
                        thread.run();
                    })
                    .map(|_| ())
            })
            .build()
            .map_err(|e| NumaError::ArenaBuild {
                node,
                reason: e.to_string(),
            })?;

        // Wait until every worker started, so the pin counters are final.
        pool.broadcast(|_| ());

        Ok(Self { node, pool, budget })
    }

    #[must_use]
    pub fn node(&self) -> usize {
        self.node
    }

    /// Run `f` inside this node's pool; rayon calls made by `f` are served
    /// by the node's workers.
    pub fn execute<R, F>(&self, f: F) -> R
    where
        R: Send,
        F: FnOnce() -> R + Send,
    {
        self.pool.install(f)
    }

    #[must_use]
    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    #[must_use]
    pub fn cpus(&self) -> &CpuSet {
        self.budget.cpus()
    }

    #[must_use]
    pub fn pin_stats(&self) -> &PinStats {
        self.budget.stats()
    }
}

impl std::fmt::Debug for NodeArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeArena")
            .field("node", &self.node)
            .field("threads", &self.num_threads())
            .field("cpus", &self.cpus().to_string())
            .field("pinned", &self.pin_stats().pinned())
            .finish()
    }
}

/// One [`NodeArena`] per NUMA node, plus a launcher pool that fans work out
/// to them.
#[derive(Debug)]
pub struct NumaArenas {
    topology: NumaTopology,
    threads_per_node: usize,
    arenas: Vec<NodeArena>,
    launcher: ThreadPool,
}

impl NumaArenas {
    /// Build one arena of `threads_per_node` workers for every node of
    /// `topology`.
    ///
    /// Arenas are constructed concurrently, each by an initializer thread
    /// bound to its node so that the pool's threads start on that node.
    /// Pinning failures are logged and the arena proceeds unpinned.
    ///
    /// # Errors
    ///
    /// Returns [`NumaError::InvalidThreadCount`] for zero threads, and
    /// [`NumaError::ArenaBuild`] or [`NumaError::SyscallFailed`] if a pool
    /// or initializer thread cannot be created.
    pub fn new(topology: &NumaTopology, threads_per_node: usize) -> Result<Self, NumaError> {
        if threads_per_node == 0 {
            return Err(NumaError::InvalidThreadCount(threads_per_node));
        }
        let nodes = topology.node_count();

        let built: Vec<Result<NodeArena, NumaError>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..nodes)
                .map(|node| {
                    let cpus = topology.cpu_set_for(node).clone();
                    std::thread::Builder::new()
                        .name(format!("numakern-init-{node}"))
                        .spawn_scoped(s, move || {
                            if let Err(e) = pin_current_thread(&cpus) {
                                tracing::warn!(node, error = %e, "initializer proceeding unpinned");
                            }
                            NodeArena::build(node, cpus, threads_per_node)
                        })
                })
                .collect();

            handles
                .into_iter()
                .enumerate()
                .map(|(node, handle)| {
                    let handle = handle?;
                    handle.join().unwrap_or_else(|_| {
                        Err(NumaError::ArenaBuild {
                            node,
                            reason: "initializer thread panicked".to_string(),
                        })
                    })
                })
                .collect()
        });
        let arenas = built.into_iter().collect::<Result<Vec<_>, _>>()?;

        let launcher = Self::build_launcher(topology)?;

        for arena in &arenas {
            let stats = arena.pin_stats();
            tracing::debug!(
                node = arena.node(),
                threads = arena.num_threads(),
                entered = stats.entered(),
                pinned = stats.pinned(),
                failed = stats.failed(),
                "NUMA arena ready"
            );
        }

        Ok(Self {
            topology: topology.clone(),
            threads_per_node,
            arenas,
            launcher,
        })
    }

    /// One launcher thread per node; thread `i` is bound to node `i`.
    fn build_launcher(topology: &NumaTopology) -> Result<ThreadPool, NumaError> {
        let cpu_sets: Vec<CpuSet> = (0..topology.node_count())
            .map(|node| topology.cpu_set_for(node).clone())
            .collect();

        ThreadPoolBuilder::new()
            .num_threads(cpu_sets.len())
            .spawn_handler(move |thread| {
                let node = thread.index();
                let cpus = cpu_sets[node].clone();
                std::thread::Builder::new()
                    .name(format!("numakern-launch-{node}"))
                    .spawn(move || {
                        if let Err(e) = pin_current_thread(&cpus) {
                            tracing::warn!(node, error = %e, "launcher proceeding unpinned");
                        }
                        thread.run();
                    })
                    .map(|_| ())
            })
            .build()
            .map_err(|e| NumaError::ArenaBuild {
                node: 0,
                reason: format!("launcher pool: {e}"),
            })
    }

    /// Number of arenas, equal to the topology's node count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.arenas.len()
    }

    /// Always false: a topology has at least one node.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.arenas.is_empty()
    }

    #[must_use]
    pub fn threads_per_node(&self) -> usize {
        self.threads_per_node
    }

    #[must_use]
    pub fn topology(&self) -> &NumaTopology {
        &self.topology
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeArena> {
        self.arenas.iter()
    }

    /// Range of `total` elements owned by `node`; see [`index_range`].
    ///
    /// # Panics
    ///
    /// Panics if `node >= self.len()`.
    #[must_use]
    pub fn index_range(&self, node: usize, total: usize) -> Range<usize> {
        index_range(node, self.len(), total)
    }

    /// Run `f(node, arena)` for every node concurrently, inside that node's
    /// arena. Blocks until all nodes finished; results are in node order.
    pub fn run_on_nodes<R, F>(&self, f: F) -> Vec<R>
    where
        R: Send,
        F: Fn(usize, &NodeArena) -> R + Sync,
    {
        self.launcher.broadcast(|ctx| {
            let node = ctx.index();
            let arena = &self.arenas[node];
            arena.execute(|| f(node, arena))
        })
    }

    /// Split `data` into the per-node ranges and run `f(node, range, part)`
    /// inside each node's arena. The parts are disjoint, so no node can
    /// observe another node's writes.
    pub fn run_on_node_chunks<T, R, F>(&self, data: &mut [T], f: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(usize, Range<usize>, &mut [T]) -> R + Sync,
    {
        let ranges: Vec<Range<usize>> = (0..self.len())
            .map(|node| self.index_range(node, data.len()))
            .collect();
        let slots = SliceSlots::split(data, &ranges);

        self.run_on_nodes(|node, _| {
            let part = slots
                .take(node)
                .expect("every node takes its own range exactly once");
            f(node, ranges[node].clone(), part)
        })
    }

    /// Owner-writes initialization: every index `i` in node `n`'s range is
    /// written `f(i)` by one of node `n`'s workers, which places the page on
    /// node `n` under the first-touch policy. Marks `v` initialized.
    pub fn first_touch<T, P, F>(&self, v: &mut NumaVec<T, P>, cfg: ParallelConfig, f: F)
    where
        T: Element,
        P: InitPolicy,
        F: Fn(usize) -> T + Sync + Send,
    {
        self.run_on_node_chunks(v.slots_mut(), |_, range, part| {
            for_each_chunk_mut(part, cfg, |offset, slots| {
                let base = range.start + offset;
                for (i, slot) in slots.iter_mut().enumerate() {
                    slot.write(f(base + i));
                }
            });
        });
        v.mark_initialized();
    }

    /// Owner-writes initialization without the arenas: node `n`'s launcher
    /// thread, bound to node `n`, writes the node's whole range itself in a
    /// sequential loop. Marks `v` initialized.
    pub fn first_touch_launcher<T, P, F>(&self, v: &mut NumaVec<T, P>, f: F)
    where
        T: Element,
        P: InitPolicy,
        F: Fn(usize) -> T + Sync,
    {
        let ranges: Vec<Range<usize>> = (0..self.len())
            .map(|node| self.index_range(node, v.len()))
            .collect();
        let slots = SliceSlots::split(v.slots_mut(), &ranges);

        self.launcher.broadcast(|ctx| {
            let node = ctx.index();
            let part = slots
                .take(node)
                .expect("every node takes its own range exactly once");
            for (i, slot) in ranges[node].clone().zip(part.iter_mut()) {
                slot.write(f(i));
            }
        });
        v.mark_initialized();
    }
}

impl Index<usize> for NumaArenas {
    type Output = NodeArena;

    /// # Panics
    ///
    /// Panics if `node >= self.len()`.
    fn index(&self, node: usize) -> &NodeArena {
        &self.arenas[node]
    }
}
