use criterion::{Criterion, black_box, criterion_group, criterion_main};
use simkv_dispatch::DispatchPolicy;

fn bench_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");

    group.bench_function("erew_select", |b| {
        let mut policy = DispatchPolicy::erew(8, 1024);
        let mut req_id = 0u64;
        b.iter(|| {
            req_id += 1;
            black_box(policy.select(req_id, req_id % 4096, req_id % 10 == 0));
        });
    });

    group.bench_function("crcw_select", |b| {
        let mut policy = DispatchPolicy::crcw(8, 1024);
        let mut req_id = 0u64;
        b.iter(|| {
            req_id += 1;
            black_box(policy.select(req_id, req_id % 4096, req_id % 10 == 0));
        });
    });

    group.bench_function("jbsq_crew_select", |b| {
        let mut policy = DispatchPolicy::jbsq_crew(8, 1024, 4);
        let mut req_id = 0u64;
        b.iter(|| {
            req_id += 1;
            black_box(policy.select(req_id, req_id % 4096, req_id % 10 == 0));
        });
    });

    group.bench_function("dynamic_crew_select", |b| {
        let mut policy = DispatchPolicy::dynamic_crew(8, 1024, 1024, 4);
        let mut req_id = 0u64;
        b.iter(|| {
            req_id += 1;
            black_box(policy.select(req_id, req_id % 4096, req_id % 10 == 0));
        });
    });

    group.finish();
}

criterion_group!(benches, bench_select);
criterion_main!(benches);
