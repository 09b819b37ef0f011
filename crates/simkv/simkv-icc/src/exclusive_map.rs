use std::collections::{HashMap, VecDeque};

/// The bucket→(owning core, outstanding-write-count) map used by
/// dynamic-CREW. Bounded by `capacity`; eviction is oldest-insertion-first.
/// A bucket's entry is removed once its outstanding count reaches zero.
pub struct ExclusiveBucketMap {
    capacity: usize,
    owners: HashMap<usize, Entry>,
    insertion_order: VecDeque<usize>,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    core: usize,
    outstanding: usize,
}

impl ExclusiveBucketMap {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            owners: HashMap::new(),
            insertion_order: VecDeque::new(),
        }
    }

    pub fn owner(&self, bucket: usize) -> Option<usize> {
        self.owners.get(&bucket).map(|e| e.core)
    }

    pub fn contains(&self, bucket: usize) -> bool {
        self.owners.contains_key(&bucket)
    }

    /// Claim `bucket` for `core` with one outstanding write, evicting the
    /// oldest entry if the map is at capacity. Returns the evicted bucket,
    /// if any.
    pub fn insert(&mut self, bucket: usize, core: usize) -> Option<usize> {
        debug_assert!(!self.owners.contains_key(&bucket));
        let evicted = if self.owners.len() >= self.capacity {
            self.evict_oldest()
        } else {
            None
        };
        self.owners.insert(bucket, Entry { core, outstanding: 1 });
        self.insertion_order.push_back(bucket);
        evicted
    }

    fn evict_oldest(&mut self) -> Option<usize> {
        while let Some(candidate) = self.insertion_order.pop_front() {
            if self.owners.remove(&candidate).is_some() {
                return Some(candidate);
            }
        }
        None
    }

    /// Add one more outstanding write to an already-owned bucket.
    pub fn increment_outstanding(&mut self, bucket: usize) {
        if let Some(entry) = self.owners.get_mut(&bucket) {
            entry.outstanding += 1;
        }
    }

    /// Record completion of one write to `bucket`. Returns `true` if the
    /// entry was removed (outstanding reached zero).
    pub fn decrement_outstanding(&mut self, bucket: usize) -> bool {
        let Some(entry) = self.owners.get_mut(&bucket) else {
            return false;
        };
        entry.outstanding -= 1;
        if entry.outstanding == 0 {
            self.owners.remove(&bucket);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_and_releases() {
        let mut m = ExclusiveBucketMap::new(4);
        m.insert(10, 1);
        assert_eq!(m.owner(10), Some(1));
        m.increment_outstanding(10);
        assert!(!m.decrement_outstanding(10));
        assert_eq!(m.owner(10), Some(1));
        assert!(m.decrement_outstanding(10));
        assert_eq!(m.owner(10), None);
    }

    #[test]
    fn evicts_oldest_at_capacity() {
        let mut m = ExclusiveBucketMap::new(2);
        m.insert(1, 0);
        m.insert(2, 0);
        let evicted = m.insert(3, 0);
        assert_eq!(evicted, Some(1));
        assert_eq!(m.owner(1), None);
        assert_eq!(m.owner(3), Some(0));
    }
}
