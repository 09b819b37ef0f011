use criterion::{Criterion, criterion_group, criterion_main};
use simkv_config::Config;

fn small_config(policy: &str) -> Config {
    Config::from_str(&format!(
        r#"
        dispatch-policy = "{policy}"
        cores = 4
        arrival-rate = 500.0
        reqs-to-sim = 2000
        hash-buckets = 256
        serv-time = 80
        "#
    ))
    .unwrap()
}

fn bench_run_point(c: &mut Criterion) {
    let mut group = c.benchmark_group("run_point");
    group.sample_size(20);

    for policy in ["erew", "crew", "crcw", "ideal"] {
        group.bench_function(policy, |b| {
            b.iter(|| {
                let cfg = small_config(policy);
                simkv_engine::run_point(&cfg).unwrap();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_run_point);
criterion_main!(benches);
