use hdrhistogram::Histogram;

const LOW_NS: u64 = 1;
const HIGH_NS: u64 = 100_000_000; // 100 ms
const SIG_FIGS: u8 = 3;

/// HDR-style latency histograms split by overall / read-only / write-only,
/// plus a side channel for writes absorbed into a compaction batch.
/// Optionally retains the slowest handful of raw requests for
/// introspection of "what exactly was the p99 request".
pub struct LatencyStore {
    all: Histogram<u64>,
    read: Histogram<u64>,
    write: Histogram<u64>,
    compacted: Histogram<u64>,
    store_objects: bool,
    slow_requests: Vec<(u64, u64)>, // (latency_ns, request_id), capped
}

const SLOW_REQUEST_CAP: usize = 256;

impl LatencyStore {
    pub fn new(store_objects: bool) -> Self {
        let new_hist = || Histogram::new_with_bounds(LOW_NS, HIGH_NS, SIG_FIGS).unwrap();
        Self {
            all: new_hist(),
            read: new_hist(),
            write: new_hist(),
            compacted: new_hist(),
            store_objects,
            slow_requests: Vec::new(),
        }
    }

    pub fn record(&mut self, request_id: u64, write: bool, compacted: bool, latency_ns: u64) {
        let clamped = latency_ns.clamp(LOW_NS, HIGH_NS);
        let _ = self.all.record(clamped);
        if write {
            let _ = self.write.record(clamped);
        } else {
            let _ = self.read.record(clamped);
        }
        if compacted {
            let _ = self.compacted.record(clamped);
        }
        if self.store_objects {
            self.track_slow(request_id, latency_ns);
        }
    }

    fn track_slow(&mut self, request_id: u64, latency_ns: u64) {
        self.slow_requests.push((latency_ns, request_id));
        if self.slow_requests.len() > SLOW_REQUEST_CAP * 2 {
            self.slow_requests.sort_unstable();
            self.slow_requests
                .drain(..self.slow_requests.len() - SLOW_REQUEST_CAP);
        }
    }

    pub fn percentile(&self, p: f64) -> u64 {
        self.all.value_at_percentile(p)
    }

    pub fn read_percentile(&self, p: f64) -> u64 {
        self.read.value_at_percentile(p)
    }

    pub fn write_percentile(&self, p: f64) -> u64 {
        self.write.value_at_percentile(p)
    }

    pub fn compacted_percentile(&self, p: f64) -> u64 {
        self.compacted.value_at_percentile(p)
    }

    pub fn total_count(&self) -> u64 {
        self.all.len()
    }

    pub fn compacted_count(&self) -> u64 {
        self.compacted.len()
    }

    pub fn compacted_mean(&self) -> f64 {
        self.compacted.mean()
    }

    /// The request id at (approximately) the given percentile, if raw
    /// objects were retained. Only percentiles that actually fall within
    /// the retained slow tail can be answered — `slow_requests` only ever
    /// holds the highest-latency handful, not every request, so a rank
    /// computed against the tail's own length instead of `total_count`
    /// would silently report the wrong request once the cap has trimmed
    /// anything below it.
    pub fn request_at_percentile(&self, p: f64) -> Option<u64> {
        if !self.store_objects || self.slow_requests.is_empty() {
            return None;
        }
        let total = self.total_count() as usize;
        if total == 0 {
            return None;
        }
        let mut sorted = self.slow_requests.clone();
        sorted.sort_unstable();
        let rank = ((total as f64) * (p / 100.0)).floor() as usize;
        let floor_rank = total - sorted.len();
        if rank < floor_rank {
            return None;
        }
        sorted
            .get((rank - floor_rank).min(sorted.len() - 1))
            .map(|(_, id)| *id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentiles_reflect_recorded_values() {
        let mut store = LatencyStore::new(true);
        for i in 1..=100u64 {
            store.record(i, i % 5 == 0, false, i * 1000);
        }
        assert_eq!(store.total_count(), 100);
        assert!(store.percentile(99.0) >= store.percentile(50.0));
        assert!(store.write_percentile(50.0) > 0);
    }
}
