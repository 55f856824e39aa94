//! Partitioning functions for routing data elements across an edge's
//! downstream queues.

use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};

use ahash::AHasher;

/// Picks the downstream queue for one data element.
pub trait Partitioner<T>: Send {
    /// Return a queue index in `0..num_partitions`.
    fn partition(&self, value: &T, num_partitions: usize) -> usize;
}

/// Key-hash partitioner: elements with equal keys always land on the same
/// queue.
pub struct HashPartitioner<K, F> {
    key_fn: F,
    _key: PhantomData<fn() -> K>,
}

impl<K, F> HashPartitioner<K, F> {
    pub fn new(key_fn: F) -> Self {
        Self {
            key_fn,
            _key: PhantomData,
        }
    }
}

impl<K, T, F> Partitioner<T> for HashPartitioner<K, F>
where
    K: Hash,
    F: Fn(&T) -> K + Send,
{
    fn partition(&self, value: &T, num_partitions: usize) -> usize {
        let mut hasher = AHasher::default();
        (self.key_fn)(value).hash(&mut hasher);
        hasher.finish() as usize % num_partitions
    }
}

/// Keyless rotation, for operators whose output has no grouping key.
#[derive(Debug, Default)]
pub struct RoundRobinPartitioner {
    next: AtomicUsize,
}

impl RoundRobinPartitioner {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T> Partitioner<T> for RoundRobinPartitioner {
    fn partition(&self, _value: &T, num_partitions: usize) -> usize {
        self.next.fetch_add(1, Ordering::Relaxed) % num_partitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_partitioner_is_stable_per_key() {
        let partitioner = HashPartitioner::new(|v: &(u32, &str)| v.0);
        let first = partitioner.partition(&(9, "a"), 5);
        for payload in ["b", "c", "d"] {
            assert_eq!(partitioner.partition(&(9, payload), 5), first);
        }
    }

    #[test]
    fn test_hash_partitioner_stays_in_bounds() {
        let partitioner = HashPartitioner::new(|v: &u64| *v);
        for v in 0..256u64 {
            assert!(partitioner.partition(&v, 3) < 3);
        }
    }

    #[test]
    fn test_hash_partitioner_spreads_keys() {
        let partitioner = HashPartitioner::new(|v: &u64| *v);
        let mut hit = vec![false; 4];
        for v in 0..64u64 {
            hit[partitioner.partition(&v, 4)] = true;
        }
        assert!(hit.iter().all(|h| *h), "some partition never chosen: {hit:?}");
    }

    #[test]
    fn test_round_robin_cycles() {
        let partitioner = RoundRobinPartitioner::new();
        let picks: Vec<usize> = (0..6).map(|_| partitioner.partition(&(), 3)).collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1, 2]);
    }
}
