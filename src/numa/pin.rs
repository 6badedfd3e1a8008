//! Thread-to-node CPU binding.
//!
//! Pinning is a performance hint: a failed bind is logged and counted, never
//! propagated as a hard error by the arena set.

use std::sync::atomic::{AtomicUsize, Ordering};

use super::topo::CpuSet;
use super::NumaError;

/// Bind the calling thread to every CPU of `cpus`.
///
/// # Errors
///
/// Returns [`NumaError::PinFailed`] if the set is empty, exceeds the
/// platform's CPU mask, or the OS rejects the binding.
#[cfg(target_os = "linux")]
pub fn pin_current_thread(cpus: &CpuSet) -> Result<(), NumaError> {
    use libc::{cpu_set_t, sched_setaffinity, CPU_SET, CPU_SETSIZE, CPU_ZERO};
    use std::mem;

    if cpus.is_empty() {
        return Err(pin_error(cpus, "empty CPU set"));
    }
    let capacity = usize::try_from(CPU_SETSIZE).map_err(|_| pin_error(cpus, "negative CPU_SETSIZE"))?;
    if let Some(&cpu) = cpus.cpus().iter().find(|&&cpu| cpu >= capacity) {
        return Err(pin_error(cpus, &format!("CPU {cpu} exceeds CPU_SETSIZE ({capacity})")));
    }

    // SAFETY: cpu_set_t is valid when zeroed, every index was checked
    // against CPU_SETSIZE, and pid 0 designates the calling thread.
    let result = unsafe {
        let mut set: cpu_set_t = mem::zeroed();
        CPU_ZERO(&mut set);
        for &cpu in cpus.cpus() {
            CPU_SET(cpu, &mut set);
        }
        sched_setaffinity(0, mem::size_of::<cpu_set_t>(), &set)
    };

    if result != 0 {
        return Err(pin_error(cpus, &std::io::Error::last_os_error().to_string()));
    }
    Ok(())
}

/// Bind the calling thread to the first CPU of `cpus`.
///
/// Platforms without set-based affinity only support single-core binding.
///
/// # Errors
///
/// Returns [`NumaError::PinFailed`] if the set is empty or the platform
/// refuses the binding.
#[cfg(not(target_os = "linux"))]
pub fn pin_current_thread(cpus: &CpuSet) -> Result<(), NumaError> {
    let Some(&first) = cpus.cpus().first() else {
        return Err(pin_error(cpus, "empty CPU set"));
    };
    if core_affinity::set_for_current(core_affinity::CoreId { id: first }) {
        Ok(())
    } else {
        Err(pin_error(cpus, "thread affinity not supported on this platform"))
    }
}

fn pin_error(cpus: &CpuSet, reason: &str) -> NumaError {
    NumaError::PinFailed {
        cpus: cpus.to_string(),
        reason: reason.to_owned(),
    }
}

/// Diagnostic counters of one node's pinning budget.
#[derive(Debug, Default)]
pub struct PinStats {
    entered: AtomicUsize,
    pinned: AtomicUsize,
    failed: AtomicUsize,
}

impl PinStats {
    /// Threads that presented themselves to the budget.
    #[must_use]
    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::Relaxed)
    }

    /// Threads successfully bound to the node.
    #[must_use]
    pub fn pinned(&self) -> usize {
        self.pinned.load(Ordering::Relaxed)
    }

    /// Threads whose bind attempt failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Bounded number of pin operations for one node.
///
/// Each thread calling [`PinBudget::apply`] consumes one slot and is bound to
/// the node's CPU set; once the slots are exhausted the budget does nothing.
#[derive(Debug)]
pub struct PinBudget {
    node: usize,
    cpus: CpuSet,
    remaining: AtomicUsize,
    stats: PinStats,
}

impl PinBudget {
    #[must_use]
    pub fn new(node: usize, cpus: CpuSet, slots: usize) -> Self {
        Self {
            node,
            cpus,
            remaining: AtomicUsize::new(slots),
            stats: PinStats::default(),
        }
    }

    /// Pin the calling thread if a slot is left. Returns whether the thread
    /// ended up pinned.
    pub fn apply(&self) -> bool {
        self.stats.entered.fetch_add(1, Ordering::Relaxed);

        let took_slot = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();
        if !took_slot {
            return false;
        }

        match pin_current_thread(&self.cpus) {
            Ok(()) => {
                self.stats.pinned.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(node = self.node, error = %e, "proceeding unpinned");
                false
            }
        }
    }

    /// Slots not consumed yet.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn stats(&self) -> &PinStats {
        &self.stats
    }

    #[must_use]
    pub fn cpus(&self) -> &CpuSet {
        &self.cpus
    }
}
