/// A point read/write RPC as it flows through the pipeline. Mutated only
/// by its current owner — the load balancer while queued, the worker core
/// while processing — and released once measured.
#[derive(Debug, Clone)]
pub struct Request {
    pub id: u64,
    pub key: u64,
    pub write: bool,

    pub generated_time: u64,
    pub dispatch_time: Option<u64>,
    pub start_proc_time: Option<u64>,
    pub end_proc_time: Option<u64>,
    pub completion_time: Option<u64>,

    pub num_cc_spins: u32,
    pub num_cc_aborts: u32,
}

impl Request {
    pub fn new(id: u64, key: u64, write: bool, generated_time: u64) -> Self {
        Self {
            id,
            key,
            write,
            generated_time,
            dispatch_time: None,
            start_proc_time: None,
            end_proc_time: None,
            completion_time: None,
            num_cc_spins: 0,
            num_cc_aborts: 0,
        }
    }

    pub fn queued_time(&self) -> Option<u64> {
        Some(self.dispatch_time? - self.generated_time)
    }

    pub fn processing_time(&self) -> Option<u64> {
        Some(self.end_proc_time? - self.start_proc_time?)
    }

    pub fn post_processing_time(&self) -> Option<u64> {
        Some(self.completion_time? - self.end_proc_time?)
    }

    pub fn total_service_time(&self) -> Option<u64> {
        Some(self.completion_time? - self.generated_time)
    }
}

/// An item travelling through the pipeline's channels: either a real
/// request, or the sentinel that ends measurement. The sentinel traverses
/// queues exactly like a request but terminates its consumer instead of
/// being measured.
#[derive(Debug, Clone)]
pub enum PipelineItem {
    Request(Request),
    EndOfMeasurements,
}

/// Sent from a worker back to the balancer on completion: carries the
/// worker id and the completed request, so the balancer can release
/// bucket exclusivity, wake blocked readers, and/or update queue tracking.
#[derive(Debug, Clone)]
pub struct PullFeedback {
    pub worker_id: usize,
    pub request: Request,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_times_need_all_stamps() {
        let mut r = Request::new(1, 42, false, 100);
        assert!(r.queued_time().is_none());
        r.dispatch_time = Some(110);
        assert_eq!(r.queued_time(), Some(10));
        r.start_proc_time = Some(110);
        r.end_proc_time = Some(700);
        r.completion_time = Some(800);
        assert_eq!(r.processing_time(), Some(590));
        assert_eq!(r.post_processing_time(), Some(100));
        assert_eq!(r.total_service_time(), Some(700));
    }
}
