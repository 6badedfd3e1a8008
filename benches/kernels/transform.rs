use std::hint::black_box;

use criterion::Criterion;
use numakern::bench::{size_label, verify_uniform, Counters};
use numakern::kernels::transform;
use numakern::parallel::{ParallelConfig, Partitioner, Schedule};

use crate::{check, context, id, throughput};

type Kernel = fn(f32, &[f32], &mut [f32]);

const SEQUENTIAL: [(&str, Kernel); 6] = [
    ("iterator", transform::iterator),
    ("range", transform::range),
    ("range_for", transform::range_for),
    ("stl", transform::stl),
    ("lanes", transform::lanes),
    ("simd", transform::simd),
];

const A: f32 = 2.0;
const X: f32 = 1.0;
const Y: f32 = 2.0;

/// `Y = a*X + Y` at every explicitness level. Y drifts while timing, so the
/// check after each case restarts from fresh Y.
pub fn bench(c: &mut Criterion) {
    let ctx = context();
    let mut group = c.benchmark_group("transform");

    for size in ctx.config.sizes.sizes() {
        let x = vec![X; size];
        let mut y = vec![Y; size];
        let counters = Counters::transform::<f32>(size);
        group.throughput(throughput(&counters));

        for (name, kernel) in SEQUENTIAL {
            group.bench_function(id(name, &counters), |b| {
                b.iter(|| kernel(A, black_box(&x), black_box(&mut y)));
            });
            recheck(name, &mut y, |y| kernel(A, &x, y));
        }

        for partitioner in Partitioner::ALL {
            let cfg = ParallelConfig::new(partitioner, 1);
            let name = format!("par/{}", partitioner.name());
            group.bench_function(id(&name, &counters), |b| {
                b.iter(|| transform::par_axpy(A, black_box(&x), black_box(&mut y), cfg));
            });
            recheck(&name, &mut y, |y| transform::par_axpy(A, &x, y, cfg));
        }

        for (label, schedule) in [
            ("omp_static", Schedule::Static),
            ("omp_dynamic", Schedule::Dynamic),
            ("omp_guided", Schedule::Guided),
        ] {
            let chunk = 1 << 12;
            group.bench_function(id(label, &counters), |b| {
                b.iter(|| transform::par_axpy_schedule(A, black_box(&x), black_box(&mut y), schedule, chunk));
            });
            recheck(label, &mut y, |y| transform::par_axpy_schedule(A, &x, y, schedule, chunk));
        }
    }

    group.finish();
}

fn recheck(name: &str, y: &mut [f32], kernel: impl FnOnce(&mut [f32])) {
    y.fill(Y);
    kernel(y);
    check(&format!("transform/{name}/{}", size_label(y.len())), verify_uniform(y, A * X + Y));
}
