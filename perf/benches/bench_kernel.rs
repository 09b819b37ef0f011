use criterion::{Criterion, criterion_group, criterion_main};
use simkv_kernel::Env;

fn bench_schedule_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("kernel");
    group.bench_function("schedule_and_run_10k", |b| {
        b.iter(|| {
            let env = Env::new();
            for i in 0..10_000u64 {
                env.schedule_at(i % 64, |_env| {});
            }
            env.run();
        });
    });
    group.finish();
}

criterion_group!(benches, bench_schedule_churn);
criterion_main!(benches);
