use std::hint::black_box;

use criterion::measurement::WallTime;
use criterion::{BenchmarkGroup, Criterion};
use numakern::alloc::NoInitVec;
use numakern::bench::{f32_sums_exactly, verify_sum, Counters, SUM_REL_TOL};
use numakern::kernels::reduce;
use numakern::numa::NumaArenas;
use numakern::parallel::{ParallelConfig, Partitioner};
use numakern::Element;

use crate::{check, context, id, throughput};

/// NUMA-partitioned sums over an array placed by the owner-writes pass:
/// every node reads only pages its own workers touched first.
pub fn bench(c: &mut Criterion) {
    let ctx = context();
    let mut group = c.benchmark_group("numa_reduction");

    for size in ctx.config.sizes.sizes() {
        if f32_sums_exactly(size) {
            size_case::<f32>(&mut group, &ctx.arenas, size);
        } else {
            size_case::<f64>(&mut group, &ctx.arenas, size);
        }
    }

    group.finish();
}

fn size_case<T: Element>(group: &mut BenchmarkGroup<'_, WallTime>, arenas: &NumaArenas, size: usize) {
    let mut x = NoInitVec::<T>::new(size);
    arenas.first_touch(&mut x, ParallelConfig::default(), |_| T::ONE);
    let x = x.as_slice();
    let expected = size as f64;
    let counters = Counters::reduction::<T>(size);
    group.throughput(throughput(&counters));

    for partitioner in Partitioner::ALL {
        let cfg = ParallelConfig::new(partitioner, 1);

        let name = format!("numa/{}/{}", partitioner.name(), T::NAME);
        group.bench_function(id(&name, &counters), |b| {
            b.iter(|| reduce::numa_sum(arenas, black_box(x), cfg));
        });
        check(
            &format!("numa_reduction/{name}/{}", counters.label),
            verify_sum(expected, reduce::numa_sum(arenas, x, cfg), SUM_REL_TOL),
        );

        let name = format!("numa_lanes/{}/{}", partitioner.name(), T::NAME);
        group.bench_function(id(&name, &counters), |b| {
            b.iter(|| reduce::numa_sum_lanes(arenas, black_box(x), cfg));
        });
        check(
            &format!("numa_reduction/{name}/{}", counters.label),
            verify_sum(expected, reduce::numa_sum_lanes(arenas, x, cfg), SUM_REL_TOL),
        );
    }
}
