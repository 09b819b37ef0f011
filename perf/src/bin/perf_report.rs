use std::path::PathBuf;

use simkv_config::Config;
use simkv_perf::*;
use simkv_perf_recorder::{PerfRecorder, PerfStage};

fn main() {
    let rusage_start = capture_rusage();
    let cache = get_cache_info();

    print_banner(&cache);
    section_memory_layout(&cache);

    let criterion_dir = criterion_target_dir();
    let estimates = read_criterion_estimates(&criterion_dir);
    section_header("Microbenchmarks (criterion)");
    for (title, prefix) in [
        ("Kernel event heap", "kernel"),
        ("Dispatch policy select()", "dispatch"),
        ("Bucketed index", "index"),
        ("End-to-end run_point", "run_point"),
    ] {
        print_criterion_group(title, &estimates, prefix);
    }

    section_header("Soak: repeated run_point at fixed load");
    let soak = soak_run_point();
    print_table_header();
    print_result_row(&soak);

    let rusage_end = capture_rusage();
    section_resources(&rusage_start, &rusage_end);
}

fn criterion_target_dir() -> PathBuf {
    let manifest = env!("CARGO_MANIFEST_DIR");
    PathBuf::from(manifest).parent().unwrap().join("target").join("criterion")
}

fn print_banner(cache: &CacheInfo) {
    let bar = "=".repeat(90);
    println!("\n{bar}");
    println!("  SIMKV PERFORMANCE REPORT");
    println!("  criterion micro + soak, host execution time (not simulated virtual time)");
    println!("{bar}\n");
    println!("  cpu:  {} ({} cores)", cache.cpu_brand, cache.ncpu);
}

fn section_memory_layout(cache: &CacheInfo) {
    section_header("Memory Layout");
    println!("  L1d:        {}", format_bytes(cache.l1d_bytes));
    println!("  L2:         {}", format_bytes(cache.l2_bytes));
    println!("  line size:  {} B", cache.line_size);
    println!("  RAM:        {}", format_bytes(cache.ram_bytes));
}

fn section_resources(start: &ResourceSnapshot, end: &ResourceSnapshot) {
    section_header("Resource Usage");
    println!("  max RSS:          {}", format_bytes(end.max_rss_bytes.max(0) as u64));
    println!("  minor faults:     {}", end.minor_faults - start.minor_faults);
    println!("  major faults:     {}", end.major_faults - start.major_faults);
    println!(
        "  ctx switches:     {} vol / {} invol",
        end.vol_ctx_switches - start.vol_ctx_switches,
        end.invol_ctx_switches - start.invol_ctx_switches,
    );
    println!(
        "  cpu time:         {:.1} ms user / {:.1} ms sys",
        (end.user_time_us - start.user_time_us) as f64 / 1000.0,
        (end.sys_time_us - start.sys_time_us) as f64 / 1000.0,
    );
}

/// Times `run_point` end-to-end wall time across repeated small runs,
/// tagging each call as [`PerfStage::RunPointTotal`] so a build with the
/// `record` feature on keeps its own ring buffer of samples independent
/// of this report's own `Stats`.
fn soak_run_point() -> BenchResult {
    let cfg = Config::from_str(
        r#"
        dispatch-policy = "crew"
        cores = 4
        arrival-rate = 500.0
        reqs-to-sim = 2000
        hash-buckets = 256
        serv-time = 80
        "#,
    )
    .unwrap();

    let mut recorder = PerfRecorder::new();
    measure_batched("run_point(crew,4c)", 30, 1, 3, || {
        recorder.begin(PerfStage::RunPointTotal);
        simkv_engine::run_point(&cfg).unwrap();
        recorder.end(PerfStage::RunPointTotal);
    })
}
