use std::collections::HashMap;

use crate::latency_store::LatencyStore;

/// Percentile/throughput rollup returned by `run_point`, plus whatever
/// balancer-side bookkeeping was collected along the way.
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub percentiles: HashMap<String, u64>,
    pub read_p99: u64,
    pub throughput_mrps: f64,
    pub total_completed: u64,
    pub unstable: bool,
    pub balancer: BalancerStats,
}

#[derive(Debug, Clone, Default)]
pub struct BalancerStats {
    pub balanced_writes: u64,
    pub exclusive_writes: u64,
    pub reader_wait_histogram: HashMap<u32, u64>,
    pub batch_size_histogram: HashMap<u32, u64>,
    pub compacted_write_count: u64,
    pub compacted_write_mean_ns: f64,
}

impl BalancerStats {
    pub fn exclusive_write_fraction(&self) -> f64 {
        let total = self.balanced_writes + self.exclusive_writes;
        if total == 0 {
            0.0
        } else {
            self.exclusive_writes as f64 / total as f64
        }
    }
}

pub fn summarize(
    store: &LatencyStore,
    virtual_time_ns: u64,
    unstable: bool,
    balancer: BalancerStats,
) -> MetricsSummary {
    let mut percentiles = HashMap::new();
    if unstable {
        // UnstableRun: mark the point saturated rather than reporting the
        // (meaningless, exploded) tail values.
        for key in ["50", "90", "99", "99.9"] {
            percentiles.insert(key.to_string(), u64::MAX);
        }
        return MetricsSummary {
            percentiles,
            read_p99: u64::MAX,
            throughput_mrps: 0.0,
            total_completed: store.total_count(),
            unstable: true,
            balancer,
        };
    }

    for (key, p) in [("50", 50.0), ("90", 90.0), ("99", 99.0), ("99.9", 99.9)] {
        percentiles.insert(key.to_string(), store.percentile(p));
    }
    let throughput_mrps = if virtual_time_ns == 0 {
        0.0
    } else {
        store.total_count() as f64 / virtual_time_ns as f64 * 1e9 / 1e6
    };

    MetricsSummary {
        percentiles,
        read_p99: store.read_percentile(99.0),
        throughput_mrps,
        total_completed: store.total_count(),
        unstable: false,
        balancer,
    }
}

/// Largest load point (by arrival rate) whose p99 stays within `slo_ns`,
/// used for "max sustainable load under SLO".
pub fn max_sustainable_load<'a>(
    points: impl IntoIterator<Item = (f64, &'a MetricsSummary)>,
    slo_ns: u64,
) -> Option<f64> {
    points
        .into_iter()
        .filter(|(_, m)| !m.unstable && *m.percentiles.get("99").unwrap_or(&u64::MAX) <= slo_ns)
        .map(|(rate, _)| rate)
        .fold(None, |acc, rate| match acc {
            None => Some(rate),
            Some(best) => Some(best.max(rate)),
        })
}
