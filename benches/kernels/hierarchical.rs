use std::hint::black_box;

use criterion::Criterion;
use numakern::bench::{reference_sum, verify_sum, verify_transform, Counters, SizeSweep, SUM_REL_TOL};
use numakern::kernels::hierarchical::{self, SLICE};

use crate::{check, context, id, throughput};

/// Column sums use at most `2^15` columns.
const MAX_COLUMN_EXP: u32 = 15;
const ROW_COUNTS: [usize; 2] = [4, 16];

/// Element-wise addition, per-worker-accumulator sums and stacked column
/// sums on `f64`.
pub fn bench(criterion: &mut Criterion) {
    let ctx = context();
    let mut group = criterion.benchmark_group("hierarchical");

    for size in ctx.config.sizes.sizes() {
        let b: Vec<f64> = (0..size).map(|i| i as f64).collect();
        let c: Vec<f64> = (0..size).map(|i| 1.0 + i as f64).collect();
        let want: Vec<f64> = b.iter().zip(&c).map(|(b, c)| b + c).collect();
        let mut a = vec![0.0f64; size];

        let counters = Counters::transform::<f64>(size);
        group.throughput(throughput(&counters));
        group.bench_function(id("add_array", &counters), |bench| {
            bench.iter(|| hierarchical::add_array(black_box(&mut a), &b, &c));
        });
        group.bench_function(id("add_array_par", &counters), |bench| {
            bench.iter(|| hierarchical::add_array_par(black_box(&mut a), &b, &c, SLICE));
        });
        check(
            &format!("hierarchical/add_array/{}", counters.label),
            verify_transform(&a, &want),
        );

        let counters = Counters::reduction::<f64>(size);
        group.throughput(throughput(&counters));
        group.bench_function(id("sum_per_worker", &counters), |bench| {
            bench.iter(|| hierarchical::sum_per_worker(black_box(&b), SLICE));
        });
        check(
            &format!("hierarchical/sum_per_worker/{}", counters.label),
            verify_sum(reference_sum(&b), hierarchical::sum_per_worker(&b, SLICE), SUM_REL_TOL),
        );
    }

    let lo = *ctx.config.sizes.exponents().start();
    let hi = (*ctx.config.sizes.exponents().end()).min(MAX_COLUMN_EXP);
    for m in ROW_COUNTS {
        for n in SizeSweep::new(lo.min(hi)..=hi).sizes() {
            column_sums(&mut group, n, m);
        }
    }

    group.finish();
}

fn column_sums(
    group: &mut criterion::BenchmarkGroup<'_, criterion::measurement::WallTime>,
    n: usize,
    m: usize,
) {
    let b: Vec<f64> = (0..n * m).map(|k| k as f64).collect();
    let want: Vec<f64> = (0..n)
        .map(|i| (0..m).map(|j| b[j * n + i]).sum())
        .collect();
    let mut a = vec![0.0f64; n];

    let counters = Counters::reduction::<f64>(n * m);
    group.throughput(throughput(&counters));

    type Kernel = fn(&mut [f64], usize, &[f64]);
    let kernels: [(&str, Kernel); 3] = [
        ("vec_par", hierarchical::add_arrays_vec_par),
        ("par_vec", hierarchical::add_arrays_par_vec),
        ("merged", hierarchical::add_arrays_merged),
    ];
    for (name, kernel) in kernels {
        let name = format!("columns/{name}/m{m}");
        group.bench_function(id(&name, &counters), |bench| {
            bench.iter(|| kernel(black_box(&mut a), m, &b));
        });
        a.fill(0.0);
        kernel(&mut a, m, &b);
        check(
            &format!("hierarchical/{name}/{}", counters.label),
            verify_transform(&a, &want),
        );
    }
}
