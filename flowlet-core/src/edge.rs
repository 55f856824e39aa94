//! In-process edge implementations over bounded channels.
//!
//! Edges never block the tasklet: draining uses `try_recv`, emission uses
//! `try_send`, and a full queue surfaces as [`ProgressState::NoProgress`] so
//! the worker can run other tasklets until the peer catches up.

use crate::inbox::Inbox;
use crate::item::Item;
use crate::outbox::OutboundCollector;
use crate::partitioner::Partitioner;
use crate::progress::ProgressState;
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};

/// Ordered source of items tagged with (ordinal, priority).
///
/// Lower priority numbers are exhausted before higher ones; ordinals are
/// dense non-negative integers unique per tasklet.
pub trait InboundEdgeStream<T> {
    /// Move available items into `inbox`.
    ///
    /// Stops immediately after moving a snapshot barrier, so the barrier is
    /// always the last item in the inbox. Returns `Done` once the edge is
    /// exhausted; the done sentinel itself never enters the inbox.
    fn drain_to(&mut self, inbox: &mut Inbox<Item<T>>) -> ProgressState;

    fn ordinal(&self) -> usize;

    fn priority(&self) -> i32;
}

/// Inbound edge backed by a crossbeam channel from a peer tasklet.
pub struct ChannelInboundEdge<T> {
    receiver: Receiver<Item<T>>,
    ordinal: usize,
    priority: i32,
}

impl<T> ChannelInboundEdge<T> {
    pub fn new(receiver: Receiver<Item<T>>, ordinal: usize, priority: i32) -> Self {
        Self {
            receiver,
            ordinal,
            priority,
        }
    }
}

impl<T> InboundEdgeStream<T> for ChannelInboundEdge<T> {
    fn drain_to(&mut self, inbox: &mut Inbox<Item<T>>) -> ProgressState {
        let mut drained = false;
        loop {
            match self.receiver.try_recv() {
                Ok(Item::Done) => return ProgressState::Done,
                Ok(item) => {
                    let is_barrier = item.is_barrier();
                    inbox.add(item);
                    drained = true;
                    if is_barrier {
                        return ProgressState::MadeProgress;
                    }
                }
                Err(TryRecvError::Empty) => break,
                // sender gone: the stream can produce nothing further
                Err(TryRecvError::Disconnected) => return ProgressState::Done,
            }
        }
        if drained {
            ProgressState::MadeProgress
        } else {
            ProgressState::NoProgress
        }
    }

    fn ordinal(&self) -> usize {
        self.ordinal
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

/// Outbound collector feeding a single downstream queue.
pub struct ChannelCollector<T> {
    sender: Sender<Item<T>>,
}

impl<T> ChannelCollector<T> {
    pub fn new(sender: Sender<Item<T>>) -> Self {
        Self { sender }
    }

    fn push(&mut self, item: Item<T>) -> ProgressState {
        match self.sender.try_send(item) {
            Ok(()) => ProgressState::Done,
            Err(TrySendError::Full(_)) => ProgressState::NoProgress,
            // receiver torn down mid-job; the item goes with it
            Err(TrySendError::Disconnected(_)) => ProgressState::Done,
        }
    }
}

impl<T> OutboundCollector<T> for ChannelCollector<T> {
    fn offer(&mut self, item: Item<T>) -> ProgressState {
        self.push(item)
    }

    fn offer_broadcast(&mut self, item: Item<T>) -> ProgressState {
        self.push(item)
    }
}

/// Create one in-process edge: the collector side goes into the upstream
/// tasklet's outbox, the inbound side into the downstream tasklet.
pub fn edge_channel<T>(
    ordinal: usize,
    priority: i32,
    capacity: usize,
) -> (ChannelCollector<T>, ChannelInboundEdge<T>) {
    let (sender, receiver) = bounded(capacity);
    (
        ChannelCollector::new(sender),
        ChannelInboundEdge::new(receiver, ordinal, priority),
    )
}

/// Outbound collector spreading data over the queues of a parallelized
/// downstream vertex.
///
/// Data elements are routed by the partitioning function; broadcast kinds go
/// to every queue, with per-queue acceptance remembered across retries so a
/// queue that already took the in-flight item is not offered it again.
pub struct PartitionedCollector<T> {
    senders: Vec<Sender<Item<T>>>,
    partitioner: Box<dyn Partitioner<T>>,
    broadcast_accepted: Vec<bool>,
}

impl<T> PartitionedCollector<T> {
    pub fn new(senders: Vec<Sender<Item<T>>>, partitioner: Box<dyn Partitioner<T>>) -> Self {
        let queues = senders.len();
        Self {
            senders,
            partitioner,
            broadcast_accepted: vec![false; queues],
        }
    }

    fn try_send(sender: &Sender<Item<T>>, item: Item<T>) -> ProgressState {
        match sender.try_send(item) {
            Ok(()) => ProgressState::Done,
            Err(TrySendError::Full(_)) => ProgressState::NoProgress,
            Err(TrySendError::Disconnected(_)) => ProgressState::Done,
        }
    }
}

impl<T: Clone> OutboundCollector<T> for PartitionedCollector<T> {
    fn offer(&mut self, item: Item<T>) -> ProgressState {
        match &item {
            Item::Data(value) => {
                let target = self.partitioner.partition(value, self.senders.len());
                Self::try_send(&self.senders[target], item)
            }
            _ => self.offer_broadcast(item),
        }
    }

    fn offer_broadcast(&mut self, item: Item<T>) -> ProgressState {
        let mut all_accepted = true;
        for (i, sender) in self.senders.iter().enumerate() {
            if self.broadcast_accepted[i] {
                continue;
            }
            if Self::try_send(sender, item.clone()).is_done() {
                self.broadcast_accepted[i] = true;
            } else {
                all_accepted = false;
            }
        }
        if all_accepted {
            self.broadcast_accepted.fill(false);
            ProgressState::Done
        } else {
            ProgressState::NoProgress
        }
    }
}
