use criterion::{Criterion, black_box, criterion_group, criterion_main};
use simkv_icc::BucketedIndex;
use simkv_kernel::Env;

fn bench_increment(c: &mut Criterion) {
    let mut group = c.benchmark_group("index");

    group.bench_function("increment_no_waiters", |b| {
        let env = Env::new();
        let index = BucketedIndex::new(1024);
        let mut bucket = 0usize;
        b.iter(|| {
            bucket = (bucket + 1) % 1024;
            black_box(index.increment(&env, bucket));
        });
    });

    group.bench_function("increment_with_waiter_wakeup", |b| {
        let env = Env::new();
        let index = BucketedIndex::new(1024);
        b.iter(|| {
            index.increment(&env, 0); // odd
            let ev = index.wait_for_even(0);
            ev.add_callback(&env, |_, _| {});
            index.increment(&env, 0); // even, wakes the waiter
            env.run();
        });
    });

    group.finish();
}

criterion_group!(benches, bench_increment);
criterion_main!(benches);
