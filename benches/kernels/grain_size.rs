use std::hint::black_box;

use criterion::measurement::WallTime;
use criterion::{BenchmarkGroup, BenchmarkId, Criterion};
use numakern::alloc::NoInitVec;
use numakern::bench::{f32_sums_exactly, verify_sum, verify_uniform, Counters, SUM_REL_TOL};
use numakern::kernels::{reduce, transform};
use numakern::numa::NumaArenas;
use numakern::parallel::{ParallelConfig, Partitioner};
use numakern::Element;

use crate::{check, context, throughput};

const A: f32 = 2.0;
const X: f32 = 1.0;
const Y: f32 = 2.0;

/// One fixed-size array across grain sizes, for every partitioner, in the
/// global pool and NUMA-partitioned; reduction and transform.
pub fn bench(c: &mut Criterion) {
    let ctx = context();
    let size = ctx.config.grain_sweep_len;

    let mut group = c.benchmark_group("grain_size");
    if f32_sums_exactly(size) {
        reduction::<f32>(&mut group, &ctx.arenas, size, ctx.config.grains.sizes());
    } else {
        reduction::<f64>(&mut group, &ctx.arenas, size, ctx.config.grains.sizes());
    }
    group.finish();

    let mut group = c.benchmark_group("grain_size_transform");
    transformation(&mut group, &ctx.arenas, size, ctx.config.grains.sizes());
    group.finish();
}

fn reduction<T: Element>(
    group: &mut BenchmarkGroup<'_, WallTime>,
    arenas: &NumaArenas,
    size: usize,
    grains: impl Iterator<Item = usize>,
) {
    let mut x = NoInitVec::<T>::new(size);
    arenas.first_touch(&mut x, ParallelConfig::default(), |_| T::ONE);
    let x = x.as_slice();
    let expected = size as f64;
    group.throughput(throughput(&Counters::reduction::<T>(size)));

    for grain in grains {
        for partitioner in Partitioner::ALL {
            let cfg = ParallelConfig::new(partitioner, grain);

            let name = format!("par/{}/{}", partitioner.name(), T::NAME);
            group.bench_with_input(BenchmarkId::new(&name, grain), &cfg, |b, &cfg| {
                b.iter(|| reduce::par_sum(black_box(x), cfg));
            });
            check(
                &format!("grain_size/{name}/{grain}"),
                verify_sum(expected, reduce::par_sum(x, cfg), SUM_REL_TOL),
            );

            let name = format!("numa/{}/{}", partitioner.name(), T::NAME);
            group.bench_with_input(BenchmarkId::new(&name, grain), &cfg, |b, &cfg| {
                b.iter(|| reduce::numa_sum(arenas, black_box(x), cfg));
            });
            check(
                &format!("grain_size/{name}/{grain}"),
                verify_sum(expected, reduce::numa_sum(arenas, x, cfg), SUM_REL_TOL),
            );
        }
    }
}

fn transformation(
    group: &mut BenchmarkGroup<'_, WallTime>,
    arenas: &NumaArenas,
    size: usize,
    grains: impl Iterator<Item = usize>,
) {
    let mut x = NoInitVec::<f32>::new(size);
    let mut y = NoInitVec::<f32>::new(size);
    arenas.first_touch(&mut x, ParallelConfig::default(), |_| X);
    arenas.first_touch(&mut y, ParallelConfig::default(), |_| Y);
    group.throughput(throughput(&Counters::transform::<f32>(size)));

    for grain in grains {
        for partitioner in Partitioner::ALL {
            let cfg = ParallelConfig::new(partitioner, grain);

            let name = format!("par/{}", partitioner.name());
            group.bench_with_input(BenchmarkId::new(&name, grain), &cfg, |b, &cfg| {
                b.iter(|| transform::par_axpy(A, black_box(x.as_slice()), black_box(y.as_mut_slice()), cfg));
            });
            arenas.first_touch(&mut y, cfg, |_| Y);
            transform::par_axpy(A, x.as_slice(), y.as_mut_slice(), cfg);
            check(
                &format!("grain_size_transform/{name}/{grain}"),
                verify_uniform(y.as_slice(), A * X + Y),
            );

            let name = format!("numa/{}", partitioner.name());
            group.bench_with_input(BenchmarkId::new(&name, grain), &cfg, |b, &cfg| {
                b.iter(|| {
                    transform::numa_axpy(arenas, A, black_box(x.as_slice()), black_box(y.as_mut_slice()), cfg);
                });
            });
            arenas.first_touch(&mut y, cfg, |_| Y);
            transform::numa_axpy(arenas, A, x.as_slice(), y.as_mut_slice(), cfg);
            check(
                &format!("grain_size_transform/{name}/{grain}"),
                verify_uniform(y.as_slice(), A * X + Y),
            );
        }
    }
}
