//! Bounded multi-edge emission buffer with an optional snapshot sink.

use crate::item::{Item, SnapshotEntry, SnapshotItem};
use crate::progress::ProgressState;

/// Downstream sink of one outbound edge.
///
/// Implementations must never block: a full queue is reported as
/// [`ProgressState::NoProgress`] and the offer is retried on a later slice.
pub trait OutboundCollector<T> {
    /// Offer a single item, routed by the edge's partitioning function.
    fn offer(&mut self, item: Item<T>) -> ProgressState;

    /// Offer an item to every downstream queue of this edge.
    fn offer_broadcast(&mut self, item: Item<T>) -> ProgressState;
}

/// Sink for the snapshot stream of one tasklet.
pub trait SnapshotCollector {
    fn offer(&mut self, item: SnapshotItem) -> ProgressState;
}

/// An outbound edge: dense ordinal plus the collector it feeds.
pub struct OutboundEdgeStream<T> {
    ordinal: usize,
    collector: Box<dyn OutboundCollector<T>>,
}

impl<T> OutboundEdgeStream<T> {
    pub fn new(ordinal: usize, collector: Box<dyn OutboundCollector<T>>) -> Self {
        Self { ordinal, collector }
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }
}

/// Per-tasklet emission buffer over N outbound edges plus an optional
/// snapshot sink.
///
/// Data items go to each edge through `offer`; watermarks, barriers, and the
/// done sentinel go through `offer_broadcast`. A multi-target offer is atomic
/// in aggregate: per-target acceptance is remembered across retries, so a
/// target that accepted is never offered the same item again. Callers must
/// retry the same in-flight item until the offer reports done.
pub struct Outbox<T> {
    edges: Vec<OutboundEdgeStream<T>>,
    snapshot: Option<Box<dyn SnapshotCollector>>,
    // in-flight acceptance per target; last slot is the snapshot sink
    accepted: Vec<bool>,
    progress: bool,
}

impl<T: Clone> Outbox<T> {
    pub fn new(
        mut edges: Vec<OutboundEdgeStream<T>>,
        snapshot: Option<Box<dyn SnapshotCollector>>,
    ) -> Self {
        edges.sort_by_key(|e| e.ordinal());
        let targets = edges.len() + 1;
        Self {
            edges,
            snapshot,
            accepted: vec![false; targets],
            progress: false,
        }
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn has_snapshot_sink(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Offer an item to every data edge.
    pub fn offer(&mut self, item: Item<T>) -> ProgressState {
        self.offer_internal(&item, false)
    }

    /// Offer an item to every data edge and the snapshot sink. Used by the
    /// tasklet for barriers and the done sentinel, which the snapshot stream
    /// must also observe.
    pub fn offer_to_edges_and_snapshot(&mut self, item: Item<T>) -> ProgressState {
        self.offer_internal(&item, true)
    }

    /// Offer one state entry to the snapshot sink only.
    ///
    /// A tasklet without a snapshot sink accepts and drops the entry; wiring
    /// a stateful processor without a snapshot queue is a job-plan mistake
    /// the tasklet cannot report from here.
    pub fn offer_to_snapshot(&mut self, entry: SnapshotEntry) -> ProgressState {
        match &mut self.snapshot {
            Some(sink) => {
                let state = sink.offer(SnapshotItem::Entry(entry));
                self.progress |= state.made_progress();
                state
            }
            None => ProgressState::Done,
        }
    }

    /// True if any target accepted an item since the last call. The tasklet
    /// folds this into its progress tracker after each processor invocation.
    pub fn take_progress(&mut self) -> bool {
        std::mem::take(&mut self.progress)
    }

    fn offer_internal(&mut self, item: &Item<T>, include_snapshot: bool) -> ProgressState {
        let mut all_accepted = true;
        for i in 0..self.edges.len() {
            if self.accepted[i] {
                continue;
            }
            let collector = &mut self.edges[i].collector;
            let state = if item.is_broadcast() {
                collector.offer_broadcast(item.clone())
            } else {
                collector.offer(item.clone())
            };
            if state.is_done() {
                self.accepted[i] = true;
                self.progress = true;
            } else {
                all_accepted = false;
            }
        }

        if include_snapshot && self.snapshot.is_some() {
            let slot = self.edges.len();
            if !self.accepted[slot] {
                match Self::to_snapshot_item(item) {
                    Some(marker) => {
                        let sink = self.snapshot.as_mut().unwrap();
                        if sink.offer(marker).is_done() {
                            self.accepted[slot] = true;
                            self.progress = true;
                        } else {
                            all_accepted = false;
                        }
                    }
                    // data and watermarks have no snapshot-stream form
                    None => self.accepted[slot] = true,
                }
            }
        }

        if all_accepted {
            self.accepted.fill(false);
            ProgressState::Done
        } else {
            ProgressState::NoProgress
        }
    }

    fn to_snapshot_item(item: &Item<T>) -> Option<SnapshotItem> {
        match item {
            Item::Barrier(b) => Some(SnapshotItem::Barrier(*b)),
            Item::Done => Some(SnapshotItem::Done),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    #[derive(Default)]
    struct QueueState {
        items: VecDeque<Item<i32>>,
        capacity: usize,
        offers: usize,
        broadcasts: usize,
    }

    struct StubCollector(Rc<RefCell<QueueState>>);

    impl StubCollector {
        fn with_capacity(capacity: usize) -> (Self, Rc<RefCell<QueueState>>) {
            let state = Rc::new(RefCell::new(QueueState {
                capacity,
                ..QueueState::default()
            }));
            (Self(Rc::clone(&state)), state)
        }

        fn push(&mut self, item: Item<i32>) -> ProgressState {
            let mut state = self.0.borrow_mut();
            if state.items.len() >= state.capacity {
                return ProgressState::NoProgress;
            }
            state.items.push_back(item);
            ProgressState::Done
        }
    }

    impl OutboundCollector<i32> for StubCollector {
        fn offer(&mut self, item: Item<i32>) -> ProgressState {
            self.0.borrow_mut().offers += 1;
            self.push(item)
        }

        fn offer_broadcast(&mut self, item: Item<i32>) -> ProgressState {
            self.0.borrow_mut().broadcasts += 1;
            self.push(item)
        }
    }

    struct StubSnapshotSink(Rc<RefCell<Vec<SnapshotItem>>>);

    impl SnapshotCollector for StubSnapshotSink {
        fn offer(&mut self, item: SnapshotItem) -> ProgressState {
            self.0.borrow_mut().push(item);
            ProgressState::Done
        }
    }

    fn outbox_with(
        capacities: &[usize],
        snapshot: bool,
    ) -> (Outbox<i32>, Vec<Rc<RefCell<QueueState>>>, Rc<RefCell<Vec<SnapshotItem>>>) {
        let mut edges = Vec::new();
        let mut states = Vec::new();
        for (ordinal, &capacity) in capacities.iter().enumerate() {
            let (collector, state) = StubCollector::with_capacity(capacity);
            edges.push(OutboundEdgeStream::new(ordinal, Box::new(collector)));
            states.push(state);
        }
        let snapshot_items = Rc::new(RefCell::new(Vec::new()));
        let sink: Option<Box<dyn SnapshotCollector>> = snapshot
            .then(|| Box::new(StubSnapshotSink(Rc::clone(&snapshot_items))) as Box<dyn SnapshotCollector>);
        (Outbox::new(edges, sink), states, snapshot_items)
    }

    #[test]
    fn test_data_goes_to_every_edge() {
        let (mut outbox, states, _) = outbox_with(&[4, 4], false);
        assert!(outbox.offer(Item::data(1)).is_done());
        for state in &states {
            let state = state.borrow();
            assert_eq!(state.items.len(), 1);
            assert_eq!(state.offers, 1);
            assert_eq!(state.broadcasts, 0);
        }
        assert!(outbox.take_progress());
        assert!(!outbox.take_progress());
    }

    #[test]
    fn test_broadcast_kind_uses_broadcast_offer() {
        let (mut outbox, states, _) = outbox_with(&[4], false);
        assert!(outbox.offer(Item::watermark(10)).is_done());
        let state = states[0].borrow();
        assert_eq!(state.offers, 0);
        assert_eq!(state.broadcasts, 1);
    }

    #[test]
    fn test_partial_acceptance_retries_refusers_only() {
        let (mut outbox, states, _) = outbox_with(&[4, 0], false);
        assert_eq!(outbox.offer(Item::data(7)), ProgressState::NoProgress);
        assert_eq!(states[0].borrow().offers, 1);
        assert_eq!(states[1].borrow().offers, 1);

        // make room downstream and retry the same item
        states[1].borrow_mut().capacity = 1;
        assert!(outbox.offer(Item::data(7)).is_done());
        // the edge that already accepted was not offered again
        assert_eq!(states[0].borrow().offers, 1);
        assert_eq!(states[1].borrow().offers, 2);
        assert_eq!(states[0].borrow().items.len(), 1);
        assert_eq!(states[1].borrow().items.len(), 1);
    }

    #[test]
    fn test_acceptance_state_clears_after_completion() {
        let (mut outbox, states, _) = outbox_with(&[4], false);
        assert!(outbox.offer(Item::data(1)).is_done());
        assert!(outbox.offer(Item::data(2)).is_done());
        assert_eq!(states[0].borrow().items.len(), 2);
    }

    #[test]
    fn test_barrier_reaches_snapshot_sink() {
        let (mut outbox, states, snapshot) = outbox_with(&[4, 4], true);
        assert!(outbox.offer_to_edges_and_snapshot(Item::barrier(0)).is_done());
        for state in &states {
            assert_eq!(state.borrow().broadcasts, 1);
        }
        assert_eq!(
            snapshot.borrow().as_slice(),
            &[SnapshotItem::Barrier(crate::item::SnapshotBarrier::new(0))]
        );
    }

    #[test]
    fn test_done_reaches_snapshot_sink() {
        let (mut outbox, _, snapshot) = outbox_with(&[4], true);
        assert!(outbox.offer_to_edges_and_snapshot(Item::Done).is_done());
        assert_eq!(snapshot.borrow().as_slice(), &[SnapshotItem::Done]);
    }

    #[test]
    fn test_snapshot_entry_offer() {
        let (mut outbox, _, snapshot) = outbox_with(&[4], true);
        let entry = SnapshotEntry::encode(&1u8, &2u8).unwrap();
        assert!(outbox.offer_to_snapshot(entry.clone()).is_done());
        assert_eq!(snapshot.borrow().as_slice(), &[SnapshotItem::Entry(entry)]);
    }

    #[test]
    fn test_snapshot_entry_without_sink_is_dropped() {
        let (mut outbox, _, _) = outbox_with(&[4], false);
        let entry = SnapshotEntry::encode(&1u8, &2u8).unwrap();
        assert!(outbox.offer_to_snapshot(entry).is_done());
    }
}
