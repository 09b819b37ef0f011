use simkv_icc::ExclusiveBucketMap;

use crate::tracking::{TrackingQueues, bucket_for, queue_for_bucket};

/// A tagged variant over the five dispatch policies. Policies are narrow
/// and closed, so a sum type plus a match compiles down to a switch
/// instead of paying for dynamic dispatch through a trait object.
pub enum DispatchPolicy {
    /// Exclusive-Read Exclusive-Write: every request hashed to its core.
    Erew(Shared),
    /// Concurrent-Read Exclusive-Write: reads load-balanced, writes hashed.
    Crew(Shared),
    /// Concurrent-Read Concurrent-Write: pure load balancing.
    Crcw(Shared),
    /// "Ideal" single-queue baseline: dispatches exactly like CRCW; the
    /// worker pairs it with bypassing all concurrency control.
    Ideal(Shared),
    /// CREW bounded to `depth` per private queue for reads.
    JbsqCrew(Shared, usize),
    /// CREW with per-bucket exclusive core ownership, released on drain.
    /// The `usize` is the same read-side depth bound JBSQ(D) uses: an
    /// unowned bucket's reads balance to the shortest queue only while
    /// that queue has room under the cap.
    DynamicCrew(Shared, ExclusiveBucketMap, usize),
}

pub struct Shared {
    pub num_buckets: usize,
    pub tracking: TrackingQueues,
}

impl Shared {
    fn new(num_queues: usize, num_buckets: usize) -> Self {
        Self {
            num_buckets,
            tracking: TrackingQueues::new(num_queues),
        }
    }
}

impl DispatchPolicy {
    pub fn erew(num_queues: usize, num_buckets: usize) -> Self {
        DispatchPolicy::Erew(Shared::new(num_queues, num_buckets))
    }
    pub fn crew(num_queues: usize, num_buckets: usize) -> Self {
        DispatchPolicy::Crew(Shared::new(num_queues, num_buckets))
    }
    pub fn crcw(num_queues: usize, num_buckets: usize) -> Self {
        DispatchPolicy::Crcw(Shared::new(num_queues, num_buckets))
    }
    pub fn ideal(num_queues: usize, num_buckets: usize) -> Self {
        DispatchPolicy::Ideal(Shared::new(num_queues, num_buckets))
    }
    pub fn jbsq_crew(num_queues: usize, num_buckets: usize, depth: usize) -> Self {
        DispatchPolicy::JbsqCrew(Shared::new(num_queues, num_buckets), depth)
    }
    pub fn dynamic_crew(num_queues: usize, num_buckets: usize, map_capacity: usize, depth: usize) -> Self {
        DispatchPolicy::DynamicCrew(
            Shared::new(num_queues, num_buckets),
            ExclusiveBucketMap::new(map_capacity),
            depth,
        )
    }

    fn shared(&self) -> &Shared {
        match self {
            DispatchPolicy::Erew(s)
            | DispatchPolicy::Crew(s)
            | DispatchPolicy::Crcw(s)
            | DispatchPolicy::Ideal(s)
            | DispatchPolicy::JbsqCrew(s, _)
            | DispatchPolicy::DynamicCrew(s, _, _) => s,
        }
    }

    fn shared_mut(&mut self) -> &mut Shared {
        match self {
            DispatchPolicy::Erew(s)
            | DispatchPolicy::Crew(s)
            | DispatchPolicy::Crcw(s)
            | DispatchPolicy::Ideal(s)
            | DispatchPolicy::JbsqCrew(s, _)
            | DispatchPolicy::DynamicCrew(s, _, _) => s,
        }
    }

    pub fn num_queues(&self) -> usize {
        self.shared().tracking.num_queues()
    }

    /// Select a destination queue for `req_id`/`key`, or `None` to mean
    /// "refuse, queues full". On success the request is appended to the
    /// chosen queue's tracking deque.
    pub fn select(&mut self, req_id: u64, key: u64, write: bool) -> Option<usize> {
        match self {
            DispatchPolicy::Erew(s) => {
                let bucket = bucket_for(key, s.num_buckets);
                let q = queue_for_bucket(bucket, s.tracking.num_queues());
                s.tracking.push(q, req_id);
                Some(q)
            }
            DispatchPolicy::Crcw(s) | DispatchPolicy::Ideal(s) => {
                let q = s.tracking.shortest(&[]);
                s.tracking.push(q, req_id);
                Some(q)
            }
            DispatchPolicy::Crew(s) => {
                let q = if write {
                    queue_for_bucket(bucket_for(key, s.num_buckets), s.tracking.num_queues())
                } else {
                    s.tracking.shortest(&[])
                };
                s.tracking.push(q, req_id);
                Some(q)
            }
            DispatchPolicy::JbsqCrew(s, depth) => {
                if write {
                    let q = queue_for_bucket(bucket_for(key, s.num_buckets), s.tracking.num_queues());
                    s.tracking.push(q, req_id);
                    Some(q)
                } else {
                    let q = s.tracking.shortest(&[]);
                    if s.tracking.len(q) >= *depth {
                        None
                    } else {
                        s.tracking.push(q, req_id);
                        Some(q)
                    }
                }
            }
            DispatchPolicy::DynamicCrew(s, map, depth) => {
                let depth = *depth;
                let bucket = bucket_for(key, s.num_buckets);
                let q_star = s.tracking.shortest(&[]);
                if let Some(owner) = map.owner(bucket) {
                    if write {
                        map.increment_outstanding(bucket);
                        s.tracking.push(owner, req_id);
                        Some(owner)
                    } else if s.tracking.len(q_star) < depth {
                        s.tracking.push(q_star, req_id);
                        Some(q_star)
                    } else {
                        None
                    }
                } else if write {
                    map.insert(bucket, q_star);
                    s.tracking.push(q_star, req_id);
                    Some(q_star)
                } else {
                    s.tracking.push(q_star, req_id);
                    Some(q_star)
                }
            }
        }
    }

    /// Record a dispatch that bypassed `select` (e.g. the bucket-serialising
    /// balancer dispatching directly after draining a blocked queue).
    pub fn notify_dispatch(&mut self, q: usize, req_id: u64) {
        self.shared_mut().tracking.push(q, req_id);
    }

    /// Completion notification: pop the tracking entry for `q`.
    pub fn func_executed(&mut self, q: usize) -> Option<u64> {
        self.shared_mut().tracking.pop_completed(q)
    }

    /// On completion of a write to `bucket`: decrement/clear dynamic-CREW
    /// exclusivity. No-op for every other policy.
    pub fn write_req_finished(&mut self, bucket: usize) {
        if let DispatchPolicy::DynamicCrew(_, map, _) = self {
            map.decrement_outstanding(bucket);
        }
    }

    pub fn tracking_len(&self, q: usize) -> usize {
        self.shared().tracking.len(q)
    }

    /// Whether a write to `key`, if dispatched right now, would land on an
    /// already-owned bucket (dynamic-CREW's "exclusive" path) or would be
    /// load-balanced like any other write. Every other policy always
    /// reports `Balanced`, since none of them track per-bucket ownership.
    pub fn classify_write(&self, key: u64) -> WriteClass {
        match self {
            DispatchPolicy::DynamicCrew(s, map, _) => {
                let bucket = bucket_for(key, s.num_buckets);
                if map.contains(bucket) {
                    WriteClass::Exclusive
                } else {
                    WriteClass::Balanced
                }
            }
            _ => WriteClass::Balanced,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteClass {
    Balanced,
    Exclusive,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn erew_is_deterministic_for_same_key() {
        let mut p = DispatchPolicy::erew(4, 16);
        let a = p.select(1, 42, false).unwrap();
        let b = p.select(2, 42, true).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn jbsq_crew_refuses_reads_past_depth() {
        let mut p = DispatchPolicy::jbsq_crew(1, 16, 1);
        assert_eq!(p.select(1, 5, false), Some(0));
        assert_eq!(p.select(2, 6, false), None);
    }

    #[test]
    fn dynamic_crew_refuses_reads_past_depth_on_owned_bucket() {
        let mut p = DispatchPolicy::dynamic_crew(1, 16, 4, 1);
        assert_eq!(p.select(1, 9, true), Some(0));
        assert_eq!(p.select(2, 9, false), None);
    }

    #[test]
    fn dynamic_crew_keeps_writes_on_owner() {
        let mut p = DispatchPolicy::dynamic_crew(4, 16, 4, usize::MAX);
        let owner = p.select(1, 9, true).unwrap();
        for i in 2..5u64 {
            assert_eq!(p.select(i, 9, true), Some(owner));
        }
    }
}
