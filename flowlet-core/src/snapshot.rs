//! Job-wide snapshot state shared between the tasklets of one job.

use crate::item::SnapshotId;
use std::sync::atomic::{AtomicI64, Ordering};

/// State-snapshot semantics a job runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingGuarantee {
    /// No snapshots; barriers are never produced.
    None,
    /// Snapshots without barrier alignment; items may be replayed.
    AtLeastOnce,
    /// Aligned snapshots; an ordinal that delivered the current barrier is
    /// muted until the local snapshot completes.
    ExactlyOnce,
}

/// Read-mostly snapshot bookkeeping for one job.
///
/// Shared via `Arc` across the job's tasklets. The snapshot coordinator
/// advances the ids; tasklets only read.
#[derive(Debug)]
pub struct SnapshotContext {
    guarantee: ProcessingGuarantee,
    current_snapshot_id: AtomicI64,
    completed_snapshot_id: AtomicI64,
}

impl SnapshotContext {
    pub fn new(guarantee: ProcessingGuarantee) -> Self {
        Self {
            guarantee,
            current_snapshot_id: AtomicI64::new(0),
            completed_snapshot_id: AtomicI64::new(-1),
        }
    }

    pub fn guarantee(&self) -> ProcessingGuarantee {
        self.guarantee
    }

    /// Id of the snapshot currently in progress (or next to start).
    pub fn current_snapshot_id(&self) -> SnapshotId {
        self.current_snapshot_id.load(Ordering::SeqCst)
    }

    /// Id of the latest fully completed snapshot, `-1` before the first one.
    pub fn completed_snapshot_id(&self) -> SnapshotId {
        self.completed_snapshot_id.load(Ordering::SeqCst)
    }

    /// Coordinator side: publish a newly started snapshot id.
    pub fn set_current_snapshot_id(&self, id: SnapshotId) {
        self.current_snapshot_id.store(id, Ordering::SeqCst);
    }

    /// Coordinator side: publish a completed snapshot id.
    pub fn set_completed_snapshot_id(&self, id: SnapshotId) {
        self.completed_snapshot_id.store(id, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_context_ids() {
        let ctx = SnapshotContext::new(ProcessingGuarantee::ExactlyOnce);
        assert_eq!(ctx.guarantee(), ProcessingGuarantee::ExactlyOnce);
        assert_eq!(ctx.current_snapshot_id(), 0);
        assert_eq!(ctx.completed_snapshot_id(), -1);
    }

    #[test]
    fn test_coordinator_updates_are_visible() {
        let ctx = SnapshotContext::new(ProcessingGuarantee::AtLeastOnce);
        ctx.set_current_snapshot_id(3);
        ctx.set_completed_snapshot_id(2);
        assert_eq!(ctx.current_snapshot_id(), 3);
        assert_eq!(ctx.completed_snapshot_id(), 2);
    }
}
