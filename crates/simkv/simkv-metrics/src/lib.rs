//! Latency histograms and the metrics rollup returned by a simulation run.

mod latency_store;
mod summary;

pub use latency_store::LatencyStore;
pub use summary::{BalancerStats, MetricsSummary, max_sustainable_load, summarize};
