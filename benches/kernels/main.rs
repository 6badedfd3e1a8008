use criterion::{criterion_group, BenchmarkId, Criterion, Throughput};
use numakern::bench::{CheckLog, Counters, VerifyError};
use numakern::config::BenchConfig;
use numakern::numa::{init_numa, NumaArenas};
use once_cell::sync::Lazy;
use tracing_subscriber::EnvFilter;

mod grain_size;
mod hierarchical;
mod init_policy;
mod numa_reduction;
mod numa_transform;
mod reduction;
mod transform;

// -----------------------------------------------------------------------------
// Shared context, built once per bench process.
pub struct BenchContext {
    pub config: BenchConfig,
    pub arenas: NumaArenas,
}

static CONTEXT: Lazy<BenchContext> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();

    let topo = init_numa();
    let config = BenchConfig::from_env(&topo)
        .unwrap_or_else(|e| panic!("invalid benchmark configuration: {e}"));
    let arenas = NumaArenas::new(&topo, config.threads_per_node)
        .unwrap_or_else(|e| panic!("cannot build NUMA arenas: {e}"));

    println!("{}", topo.summary());
    println!("threads per node: {}", config.threads_per_node);
    BenchContext { config, arenas }
});

pub fn context() -> &'static BenchContext {
    &CONTEXT
}

static CHECKS: CheckLog = CheckLog::new();

/// Record a post-timing check; a mismatch fails the case, not the run.
pub fn check(case: &str, outcome: Result<(), VerifyError>) {
    CHECKS.record(case, outcome);
}

pub fn throughput(counters: &Counters) -> Throughput {
    Throughput::Bytes(counters.bytes)
}

pub fn id(function: &str, counters: &Counters) -> BenchmarkId {
    BenchmarkId::new(function, &counters.label)
}

// -----------------------------------------------------------------------------

fn benches(c: &mut Criterion) {
    reduction::bench(c);
    transform::bench(c);
    numa_reduction::bench(c);
    numa_transform::bench(c);
    init_policy::bench(c);
    grain_size::bench(c);
    hierarchical::bench(c);
}

criterion_group!(kernels, benches);

fn main() {
    kernels();
    Criterion::default().configure_from_args().final_summary();

    let failures = CHECKS.failures();
    if failures > 0 {
        eprintln!("{failures} of {} benchmark checks failed", CHECKS.checked());
        std::process::exit(1);
    }
}
