//! Print the NUMA topology, build the per-node arenas, report how many
//! workers were pinned, and run every kernel once against the reference.

use anyhow::{bail, Context, Result};
use clap::Parser;
use numakern::alloc::NoInitVec;
use numakern::bench::{f32_sums_exactly, reference_sum, verify_sum, verify_uniform, VerifyError, SUM_REL_TOL};
use numakern::config::BenchConfig;
use numakern::kernels::{hierarchical, reduce, transform};
use numakern::numa::{init_numa, NumaArenas, NumaTopology};
use numakern::parallel::{ParallelConfig, Partitioner};
use numakern::simd::Backend;
use numakern::Element;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// NUMA topology and kernel self-check report
#[derive(Parser, Debug)]
#[command(name = "numa-report", author, version, about, long_about = None)]
struct Args {
    /// Emulate this many nodes by splitting the host's CPUs
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    emulate_nodes: Option<u16>,

    /// Worker threads per node (default: NUMAKERN_THREADS_PER_NODE or the
    /// CPU count of node 0)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    threads_per_node: Option<u32>,

    /// Self-check array length as a power of two
    #[arg(long, default_value_t = 20, value_parser = clap::value_parser!(u32).range(0..=30))]
    size_exp: u32,

    /// Skip the kernel self-check
    #[arg(long)]
    no_check: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("numakern={}", args.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let topo = match args.emulate_nodes {
        Some(n) => NumaTopology::emulated(usize::from(n)),
        None => init_numa(),
    };
    let config = BenchConfig::from_env(&topo).context("reading NUMAKERN_* configuration")?;
    let threads_per_node = args
        .threads_per_node
        .map_or(config.threads_per_node, |n| n as usize);

    println!("{}", topo.summary());
    println!("SIMD backend: {}", Backend::detect().name());

    let arenas = NumaArenas::new(&topo, threads_per_node).context("building NUMA arenas")?;
    println!("Arenas: {} x {} threads", arenas.len(), arenas.threads_per_node());
    for arena in arenas.iter() {
        let stats = arena.pin_stats();
        println!(
            "  Node {}: cpus {}, entered {}, pinned {}, failed {}",
            arena.node(),
            arena.cpus(),
            stats.entered(),
            stats.pinned(),
            stats.failed()
        );
    }

    if args.no_check {
        return Ok(());
    }

    let size = 1usize << args.size_exp;
    let failures = if f32_sums_exactly(size) {
        self_check::<f32>(&arenas, size)
    } else {
        self_check::<f64>(&arenas, size)
    };
    if failures > 0 {
        bail!("{failures} kernel(s) disagree with the reference");
    }
    println!("All kernels agree with the reference.");
    Ok(())
}

fn report(name: &str, outcome: Result<(), VerifyError>) -> usize {
    match outcome {
        Ok(()) => {
            println!("  ok    {name}");
            0
        }
        Err(e) => {
            println!("  FAIL  {name}: {e}");
            1
        }
    }
}

fn self_check<T: Element>(arenas: &NumaArenas, size: usize) -> usize {
    info!(size, element = T::NAME, "running kernel self-check");
    let mut x = NoInitVec::<T>::new(size);
    arenas.first_touch(&mut x, ParallelConfig::default(), |_| T::ONE);
    let x = x.as_slice();
    let expected = reference_sum(x);
    let mut failures = 0;

    println!("Reduction over {} ones (expected {expected}):", T::NAME);
    let sequential: [(&str, fn(&[T]) -> T); 7] = [
        ("iterator", reduce::iterator),
        ("range", reduce::range),
        ("range_for", reduce::range_for),
        ("stl", reduce::stl),
        ("lanes", reduce::lanes),
        ("simd_h", reduce::simd_h),
        ("simd_v", reduce::simd_v),
    ];
    for (name, kernel) in sequential {
        failures += report(name, verify_sum(expected, kernel(x), SUM_REL_TOL));
    }
    for partitioner in Partitioner::ALL {
        let cfg = ParallelConfig::new(partitioner, 1024);
        failures += report(
            &format!("par_sum/{}", partitioner.name()),
            verify_sum(expected, reduce::par_sum(x, cfg), SUM_REL_TOL),
        );
        failures += report(
            &format!("numa_sum/{}", partitioner.name()),
            verify_sum(expected, reduce::numa_sum(arenas, x, cfg), SUM_REL_TOL),
        );
    }
    failures += report(
        "par_sum/auto_for",
        verify_sum(expected, reduce::par_sum(x, ParallelConfig::auto_for(size)), SUM_REL_TOL),
    );
    failures += report(
        "sum_per_worker",
        verify_sum(expected, hierarchical::sum_per_worker(x, hierarchical::SLICE), SUM_REL_TOL),
    );

    let two = T::ONE + T::ONE;
    let four = two + two;
    println!("Transform (a=2, X=1, Y=2):");
    let ones = vec![T::ONE; size];
    let mut y = NoInitVec::<T>::new(size);
    let sequential: [(&str, fn(T, &[T], &mut [T])); 6] = [
        ("iterator", transform::iterator),
        ("range", transform::range),
        ("range_for", transform::range_for),
        ("stl", transform::stl),
        ("lanes", transform::lanes),
        ("simd", transform::simd),
    ];
    for (name, kernel) in sequential {
        arenas.first_touch(&mut y, ParallelConfig::default(), |_| two);
        kernel(two, &ones, y.as_mut_slice());
        failures += report(name, verify_uniform(y.as_slice(), four));
    }
    for partitioner in Partitioner::ALL {
        let cfg = ParallelConfig::new(partitioner, 1024);
        arenas.first_touch(&mut y, cfg, |_| two);
        transform::numa_axpy(arenas, two, &ones, y.as_mut_slice(), cfg);
        failures += report(
            &format!("numa_axpy/{}", partitioner.name()),
            verify_uniform(y.as_slice(), four),
        );
    }

    failures
}
