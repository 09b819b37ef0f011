use anyhow::Context;
use clap::Parser;
use simkv_config::Config;
use tracing_subscriber::EnvFilter;

/// Run one simulation point from a TOML config and report its latency
/// percentiles and throughput.
#[derive(Parser, Debug)]
struct Args {
    /// Path to the TOML config describing the simulation point.
    config: String,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("INFO")))
        .init();

    let args = Args::parse();
    let config = Config::load(&args.config)
        .with_context(|| format!("loading config from {}", args.config))?;

    tracing::info!(cores = config.cores, policy = ?config.dispatch_policy, "starting run");

    let summary = simkv_engine::run_point(&config).context("running simulation point")?;

    if summary.unstable {
        println!("run went unstable before completing the measurement window");
    } else {
        println!("completed:     {}", summary.total_completed);
        println!("throughput:    {:.3} Mrps", summary.throughput_mrps);
        println!("read p99:      {} ns", summary.read_p99);
        for key in ["50", "90", "99", "99.9"] {
            if let Some(v) = summary.percentiles.get(key) {
                println!("p{key:>5}:       {v} ns");
            }
        }
        let b = &summary.balancer;
        if b.balanced_writes + b.exclusive_writes > 0 {
            println!(
                "exclusive writes: {:.1}% ({} of {})",
                b.exclusive_write_fraction() * 100.0,
                b.exclusive_writes,
                b.balanced_writes + b.exclusive_writes
            );
        }
        if b.compacted_write_count > 0 {
            println!(
                "compacted writes: {} (mean {:.1} ns)",
                b.compacted_write_count, b.compacted_write_mean_ns
            );
        }
        if !b.batch_size_histogram.is_empty() {
            println!("distinct batch sizes closed: {}", b.batch_size_histogram.len());
        }
        if !b.reader_wait_histogram.is_empty() {
            println!("distinct reader-wait buckets: {}", b.reader_wait_histogram.len());
        }
    }

    Ok(())
}
