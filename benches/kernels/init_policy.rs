use std::hint::black_box;

use criterion::measurement::WallTime;
use criterion::{BatchSize, BenchmarkGroup, Criterion};
use numakern::alloc::{DefaultInit, Eager, InitPolicy, NoInit, NumaVec};
use numakern::bench::{f32_sums_exactly, verify_sum, verify_uniform, Counters, SUM_REL_TOL};
use numakern::kernels::{reduce, transform};
use numakern::numa::NumaArenas;
use numakern::parallel::ParallelConfig;
use numakern::Element;

use crate::{check, context, id, throughput};

const A: f32 = 2.0;
const X: f32 = 1.0;
const Y: f32 = 2.0;

/// Who writes the array first.
#[derive(Debug, Clone, Copy)]
enum Placement {
    /// The container constructs every value on the calling thread.
    Caller,
    /// Each node's arena workers write the node's range.
    Workers,
    /// Each node's launcher thread writes the node's range alone.
    Launcher,
}

/// Allocation policy against placement.
///
/// `setup/*` times allocation plus placement: `Eager` writes every page
/// twice, first from the calling thread, and `default_init/from_elem` leaves
/// every page where the calling thread touched it. `sum/*` and `axpy/*` then
/// time the NUMA kernels over the arrays each case produced.
pub fn bench(c: &mut Criterion) {
    let ctx = context();
    let arenas = &ctx.arenas;

    let mut group = c.benchmark_group("init_policy");
    for size in ctx.config.sizes.sizes() {
        if f32_sums_exactly(size) {
            reduction_cases::<f32>(&mut group, arenas, size);
        } else {
            reduction_cases::<f64>(&mut group, arenas, size);
        }
    }
    group.finish();

    let mut group = c.benchmark_group("init_policy_transform");
    for size in ctx.config.sizes.sizes() {
        let counters = Counters::transform::<f32>(size);
        group.throughput(throughput(&counters));
        transform_case::<Eager>(&mut group, arenas, &counters, "eager", Placement::Workers);
        transform_case::<DefaultInit>(&mut group, arenas, &counters, "default_init", Placement::Workers);
        transform_case::<DefaultInit>(&mut group, arenas, &counters, "default_init/from_elem", Placement::Caller);
        transform_case::<NoInit>(&mut group, arenas, &counters, "no_init", Placement::Workers);
        transform_case::<NoInit>(&mut group, arenas, &counters, "no_init/launcher", Placement::Launcher);
    }
    group.finish();
}

fn place<T: Element, P: InitPolicy>(arenas: &NumaArenas, size: usize, value: T, placement: Placement) -> NumaVec<T, P> {
    match placement {
        Placement::Caller => NumaVec::from_elem(size, value),
        Placement::Workers => {
            let mut v = NumaVec::new(size);
            arenas.first_touch(&mut v, ParallelConfig::default(), |_| value);
            v
        }
        Placement::Launcher => {
            let mut v = NumaVec::new(size);
            arenas.first_touch_launcher(&mut v, |_| value);
            v
        }
    }
}

fn reduction_cases<T: Element>(group: &mut BenchmarkGroup<'_, WallTime>, arenas: &NumaArenas, size: usize) {
    let counters = Counters::reduction::<T>(size);
    group.throughput(throughput(&counters));
    reduction_case::<T, Eager>(group, arenas, &counters, "eager", Placement::Workers);
    reduction_case::<T, DefaultInit>(group, arenas, &counters, "default_init", Placement::Workers);
    reduction_case::<T, DefaultInit>(group, arenas, &counters, "default_init/from_elem", Placement::Caller);
    reduction_case::<T, NoInit>(group, arenas, &counters, "no_init", Placement::Workers);
    reduction_case::<T, NoInit>(group, arenas, &counters, "no_init/launcher", Placement::Launcher);
}

fn reduction_case<T: Element, P: InitPolicy>(
    group: &mut BenchmarkGroup<'_, WallTime>,
    arenas: &NumaArenas,
    counters: &Counters,
    label: &str,
    placement: Placement,
) {
    let size = counters.elements;
    let label = format!("{label}/{}", T::NAME);

    group.bench_function(id(&format!("setup/{label}"), counters), |b| {
        b.iter_batched(
            || (),
            |()| place::<T, P>(arenas, size, T::ONE, placement),
            BatchSize::PerIteration,
        );
    });

    let x = place::<T, P>(arenas, size, T::ONE, placement);
    let cfg = ParallelConfig::default();
    group.bench_function(id(&format!("sum/{label}"), counters), |b| {
        b.iter(|| reduce::numa_sum(arenas, black_box(x.as_slice()), cfg));
    });
    check(
        &format!("init_policy/sum/{label}/{}", counters.label),
        verify_sum(size as f64, reduce::numa_sum(arenas, x.as_slice(), cfg), SUM_REL_TOL),
    );
}

fn transform_case<P: InitPolicy>(
    group: &mut BenchmarkGroup<'_, WallTime>,
    arenas: &NumaArenas,
    counters: &Counters,
    label: &str,
    placement: Placement,
) {
    let size = counters.elements;
    let cfg = ParallelConfig::default();
    let x = place::<f32, P>(arenas, size, X, placement);
    let mut y = place::<f32, P>(arenas, size, Y, placement);

    group.bench_function(id(&format!("axpy/{label}"), counters), |b| {
        b.iter(|| transform::numa_axpy(arenas, A, black_box(x.as_slice()), black_box(y.as_mut_slice()), cfg));
    });

    // Y drifted while timing; check one update of a freshly placed Y.
    drop(y);
    let mut y = place::<f32, P>(arenas, size, Y, placement);
    transform::numa_axpy(arenas, A, x.as_slice(), y.as_mut_slice(), cfg);
    check(
        &format!("init_policy_transform/axpy/{label}/{}", counters.label),
        verify_uniform(y.as_slice(), A * X + Y),
    );
}
