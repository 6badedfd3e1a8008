use std::hint::black_box;

use criterion::measurement::WallTime;
use criterion::{BenchmarkGroup, Criterion};
use numakern::bench::{f32_sums_exactly, reference_sum, verify_sum, Counters, SUM_REL_TOL};
use numakern::kernels::reduce;
use numakern::parallel::{ParallelConfig, Partitioner, Schedule};
use numakern::Element;

use crate::{check, context, id, throughput};

fn sequential<T: Element>() -> [(&'static str, fn(&[T]) -> T); 7] {
    [
        ("iterator", reduce::iterator),
        ("range", reduce::range),
        ("range_for", reduce::range_for),
        ("stl", reduce::stl),
        ("lanes", reduce::lanes),
        ("simd_h", reduce::simd_h),
        ("simd_v", reduce::simd_v),
    ]
}

/// Sequential, explicit-SIMD and task-parallel sums over one array that the
/// calling thread initialized. Sizes past the exact `f32` range run on `f64`.
pub fn bench(c: &mut Criterion) {
    let ctx = context();
    let mut group = c.benchmark_group("reduction");

    for size in ctx.config.sizes.sizes() {
        if f32_sums_exactly(size) {
            size_case::<f32>(&mut group, size);
        } else {
            size_case::<f64>(&mut group, size);
        }
    }

    group.finish();
}

fn size_case<T: Element>(group: &mut BenchmarkGroup<'_, WallTime>, size: usize) {
    let x = vec![T::ONE; size];
    let expected = reference_sum(&x);
    let counters = Counters::reduction::<T>(size);
    group.throughput(throughput(&counters));

    for (name, kernel) in sequential::<T>() {
        let name = format!("{name}/{}", T::NAME);
        group.bench_with_input(id(&name, &counters), &x, |b, x| {
            b.iter(|| kernel(black_box(x)));
        });
        report(&name, &counters, expected, kernel(&x));
    }

    for partitioner in Partitioner::ALL {
        let cfg = ParallelConfig::new(partitioner, 1);
        let name = format!("par/{}/{}", partitioner.name(), T::NAME);
        group.bench_with_input(id(&name, &counters), &x, |b, x| {
            b.iter(|| reduce::par_sum(black_box(x), cfg));
        });
        report(&name, &counters, expected, reduce::par_sum(&x, cfg));

        let name = format!("par_lanes/{}/{}", partitioner.name(), T::NAME);
        group.bench_with_input(id(&name, &counters), &x, |b, x| {
            b.iter(|| reduce::par_sum_lanes(black_box(x), cfg));
        });
        report(&name, &counters, expected, reduce::par_sum_lanes(&x, cfg));
    }

    for (label, schedule) in [
        ("omp_static", Schedule::Static),
        ("omp_dynamic", Schedule::Dynamic),
        ("omp_guided", Schedule::Guided),
    ] {
        let chunk = 1 << 12;
        let name = format!("{label}/{}", T::NAME);
        group.bench_with_input(id(&name, &counters), &x, |b, x| {
            b.iter(|| reduce::par_sum_schedule(black_box(x), schedule, chunk));
        });
        report(&name, &counters, expected, reduce::par_sum_schedule(&x, schedule, chunk));
    }
}

fn report<T: Element>(name: &str, counters: &Counters, expected: f64, actual: T) {
    check(
        &format!("reduction/{name}/{}", counters.label),
        verify_sum(expected, actual, SUM_REL_TOL),
    );
}
