//! The atomic units moved between operators.
//!
//! Everything that flows along an edge is an [`Item`]: user data, watermarks,
//! snapshot barriers, and the done sentinel that closes a stream. Snapshot
//! state travels separately as [`SnapshotEntry`] key/value pairs.

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Monotonically increasing snapshot epoch number.
///
/// `-1` is used by the snapshot context for "no snapshot completed yet".
pub type SnapshotId = i64;

/// Event time in milliseconds since epoch.
pub type EventTime = i64;

/// Watermark indicates that no elements with timestamp <= this value will arrive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Watermark {
    pub timestamp: EventTime,
}

impl Watermark {
    pub fn new(timestamp: EventTime) -> Self {
        Self { timestamp }
    }
}

impl std::fmt::Display for Watermark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Watermark({}ms)", self.timestamp)
    }
}

/// Barrier delimiting snapshot epochs, aligned across input edges.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotBarrier {
    pub snapshot_id: SnapshotId,
}

impl SnapshotBarrier {
    pub fn new(snapshot_id: SnapshotId) -> Self {
        Self { snapshot_id }
    }
}

/// One unit flowing along an edge between operators.
///
/// Watermarks, barriers, and the done sentinel are broadcast to every
/// outbound edge; data elements are offered through the edge's partitioning
/// function.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Item<T> {
    /// User data element.
    Data(T),
    /// Event-time progress marker.
    Watermark(Watermark),
    /// Snapshot epoch delimiter.
    Barrier(SnapshotBarrier),
    /// End of stream. Never enters an inbox; edges consume it.
    Done,
}

impl<T> Item<T> {
    pub fn data(value: T) -> Self {
        Self::Data(value)
    }

    pub fn watermark(timestamp: EventTime) -> Self {
        Self::Watermark(Watermark::new(timestamp))
    }

    pub fn barrier(snapshot_id: SnapshotId) -> Self {
        Self::Barrier(SnapshotBarrier::new(snapshot_id))
    }

    pub fn is_barrier(&self) -> bool {
        matches!(self, Item::Barrier(_))
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Item::Done)
    }

    /// True for the kinds delivered to every outbound edge rather than
    /// partitioned: watermarks, barriers, and the done sentinel.
    pub fn is_broadcast(&self) -> bool {
        !matches!(self, Item::Data(_))
    }
}

/// One key/value pair of processor state emitted during a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl SnapshotEntry {
    /// Serialize a typed key/value pair into an entry.
    pub fn encode<K, V>(key: &K, value: &V) -> Result<Self>
    where
        K: Serialize,
        V: Serialize,
    {
        Ok(Self {
            key: bincode::serialize(key)?,
            value: bincode::serialize(value)?,
        })
    }

    pub fn decode_key<K: for<'de> Deserialize<'de>>(&self) -> Result<K> {
        Ok(bincode::deserialize(&self.key)?)
    }

    pub fn decode_value<V: for<'de> Deserialize<'de>>(&self) -> Result<V> {
        Ok(bincode::deserialize(&self.value)?)
    }
}

/// What the snapshot sink receives: state entries from the processor, epoch
/// markers from the tasklet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum SnapshotItem {
    Entry(SnapshotEntry),
    Barrier(SnapshotBarrier),
    Done,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_constructors() {
        assert_eq!(Item::data(7), Item::Data(7));
        match Item::<i32>::watermark(1000) {
            Item::Watermark(wm) => assert_eq!(wm.timestamp, 1000),
            other => panic!("expected watermark, got {other:?}"),
        }
        match Item::<i32>::barrier(3) {
            Item::Barrier(b) => assert_eq!(b.snapshot_id, 3),
            other => panic!("expected barrier, got {other:?}"),
        }
    }

    #[test]
    fn test_broadcast_kinds() {
        assert!(!Item::data("x").is_broadcast());
        assert!(Item::<i32>::watermark(1).is_broadcast());
        assert!(Item::<i32>::barrier(0).is_broadcast());
        assert!(Item::<i32>::Done.is_broadcast());
        assert!(Item::<i32>::Done.is_done());
    }

    #[test]
    fn test_snapshot_entry_encode_decode() {
        let entry = SnapshotEntry::encode(&"count", &42u64).unwrap();
        assert_eq!(entry.decode_key::<String>().unwrap(), "count");
        assert_eq!(entry.decode_value::<u64>().unwrap(), 42);
    }

    #[test]
    fn test_watermark_ordering() {
        assert!(Watermark::new(5) < Watermark::new(6));
        assert_eq!(Watermark::new(5).to_string(), "Watermark(5ms)");
    }
}
