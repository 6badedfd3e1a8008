use std::hint::black_box;

use criterion::Criterion;
use numakern::alloc::NoInitVec;
use numakern::bench::{verify_uniform, Counters};
use numakern::kernels::transform;
use numakern::parallel::{ParallelConfig, Partitioner};

use crate::{check, context, id, throughput};

const A: f32 = 2.0;
const X: f32 = 1.0;
const Y: f32 = 2.0;

/// NUMA-partitioned `Y = a*X + Y`; X and Y are both placed by the
/// owner-writes pass, so node `n` streams three node-local arrays.
pub fn bench(c: &mut Criterion) {
    let ctx = context();
    let arenas = &ctx.arenas;
    let mut group = c.benchmark_group("numa_transform");

    for size in ctx.config.sizes.sizes() {
        let mut x = NoInitVec::<f32>::new(size);
        let mut y = NoInitVec::<f32>::new(size);
        arenas.first_touch(&mut x, ParallelConfig::default(), |_| X);
        arenas.first_touch(&mut y, ParallelConfig::default(), |_| Y);
        let counters = Counters::transform::<f32>(size);
        group.throughput(throughput(&counters));

        for partitioner in Partitioner::ALL {
            let cfg = ParallelConfig::new(partitioner, 1);
            let name = format!("numa/{}", partitioner.name());
            group.bench_function(id(&name, &counters), |b| {
                b.iter(|| {
                    transform::numa_axpy(arenas, A, black_box(x.as_slice()), black_box(y.as_mut_slice()), cfg);
                });
            });

            // Restore Y through the owners, then check one fresh update.
            arenas.first_touch(&mut y, cfg, |_| Y);
            transform::numa_axpy(arenas, A, x.as_slice(), y.as_mut_slice(), cfg);
            check(
                &format!("numa_transform/{name}/{}", counters.label),
                verify_uniform(y.as_slice(), A * X + Y),
            );
        }
    }

    group.finish();
}
