//! The processor tasklet: a cooperative state machine driving one processor
//! instance through its lifecycle.
//!
//! A worker thread multiplexes many tasklets and repeatedly invokes
//! [`ProcessorTasklet::call`]. Each invocation runs a single pass through the
//! state machine without blocking, returns a progress verdict, and yields:
//!
//! ```text
//! NULLARY_PROCESS -> PROCESS_INBOX -+-> SAVE_SNAPSHOT -> EMIT_BARRIER -> NULLARY_PROCESS
//!                                   |
//!                                   +-> EMIT_DONE_ITEM -> END
//! ```
//!
//! Inbound edges are drained in ascending priority groups, round-robin within
//! a group. Under the exactly-once guarantee an ordinal that delivered the
//! current snapshot barrier is muted until the local snapshot completes; once
//! every active ordinal has contributed its barrier, the processor state is
//! saved and one barrier is emitted downstream.

use crate::cursor::CircularCursor;
use crate::edge::InboundEdgeStream;
use crate::inbox::Inbox;
use crate::item::{Item, SnapshotId};
use crate::outbox::{Outbox, OutboundEdgeStream, SnapshotCollector};
use crate::processor::{Processor, ProcessorContext, SnapshotCapability};
use crate::progress::{ProgressState, ProgressTracker};
use crate::snapshot::{ProcessingGuarantee, SnapshotContext};
use anyhow::{anyhow, Result};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative job-cancellation flag, shared by all tasklets of one job.
///
/// Observed at state-machine boundaries; there is no preemption.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskletState {
    NullaryProcess,
    ProcessInbox,
    SaveSnapshot,
    EmitBarrier,
    EmitDoneItem,
    Complete,
    End,
}

type BoxedInstream<T> = Box<dyn InboundEdgeStream<T>>;

/// Drives one processor instance on behalf of the worker pool.
pub struct ProcessorTasklet<P: Processor> {
    context: ProcessorContext,
    processor: P,
    capability: SnapshotCapability,
    snapshot_context: Arc<SnapshotContext>,

    progress: ProgressTracker,
    inbox: Inbox<Item<P::In>>,
    outbox: Outbox<P::Out>,

    instream_groups: VecDeque<Vec<BoxedInstream<P::In>>>,
    cursor: Option<CircularCursor<BoxedInstream<P::In>>>,
    curr_ordinal: usize,

    // indexed by input ordinal; ordinals are dense per tasklet
    barrier_received: Vec<bool>,
    input_done: Vec<bool>,
    curr_snapshot: SnapshotId,

    state: TaskletState,
    cancel: CancelToken,
}

impl<P: Processor> ProcessorTasklet<P> {
    pub fn new(
        vertex_name: impl Into<String>,
        processor: P,
        instreams: Vec<BoxedInstream<P::In>>,
        outstreams: Vec<OutboundEdgeStream<P::Out>>,
        snapshot_context: Arc<SnapshotContext>,
        snapshot_queue: Option<Box<dyn SnapshotCollector>>,
        capability: SnapshotCapability,
    ) -> Self {
        let ordinal_space = instreams
            .iter()
            .map(|s| s.ordinal() + 1)
            .max()
            .unwrap_or(0);
        // unused slots in a sparse ordinal space count as already done
        let mut input_done = vec![true; ordinal_space];
        for stream in &instreams {
            input_done[stream.ordinal()] = false;
        }

        let has_inputs = !instreams.is_empty();
        let mut by_priority: BTreeMap<i32, Vec<BoxedInstream<P::In>>> = BTreeMap::new();
        for stream in instreams {
            by_priority.entry(stream.priority()).or_default().push(stream);
        }
        let mut instream_groups: VecDeque<Vec<BoxedInstream<P::In>>> =
            by_priority.into_values().collect();
        let cursor = instream_groups.pop_front().map(CircularCursor::new);

        Self {
            context: ProcessorContext::new(vertex_name, snapshot_context.guarantee()),
            processor,
            capability,
            snapshot_context,
            progress: ProgressTracker::new(),
            inbox: Inbox::new(),
            outbox: Outbox::new(outstreams, snapshot_queue),
            instream_groups,
            cursor,
            curr_ordinal: 0,
            barrier_received: vec![false; ordinal_space],
            input_done,
            curr_snapshot: 0,
            state: if has_inputs {
                TaskletState::NullaryProcess
            } else {
                TaskletState::Complete
            },
            cancel: CancelToken::new(),
        }
    }

    /// Attach the job-cancel token and initialize the processor. Called once.
    pub fn init(&mut self, cancel: CancelToken) -> Result<()> {
        self.cancel = cancel;
        self.processor.init(&self.context)
    }

    /// Run one scheduling slice: at most one transition per state, never
    /// blocking. Processor errors and barrier-protocol violations propagate
    /// unchanged; the worker records them against the job.
    pub fn call(&mut self) -> Result<ProgressState> {
        if self.cancel.is_cancelled() {
            return Err(anyhow!("job cancelled: {} will not run again", self));
        }
        self.progress.reset();

        if self.state == TaskletState::NullaryProcess {
            if self.processor.try_process(&mut self.outbox)? {
                self.transition(TaskletState::ProcessInbox);
            } else {
                self.progress.not_done();
            }
        }

        if self.state == TaskletState::ProcessInbox {
            self.process_inbox()?;
        }

        if self.state == TaskletState::SaveSnapshot {
            let saved = match self.capability {
                // stateless: nothing to save, forward the barrier at once
                SnapshotCapability::Stateless => true,
                SnapshotCapability::Stateful => self.processor.save_snapshot(&mut self.outbox)?,
            };
            if saved {
                self.transition(TaskletState::EmitBarrier);
            } else {
                self.progress.not_done();
            }
        }

        if self.state == TaskletState::EmitBarrier {
            if self
                .outbox
                .offer_to_edges_and_snapshot(Item::barrier(self.curr_snapshot))
                .is_done()
            {
                self.barrier_received.fill(false);
                self.curr_snapshot += 1;
                self.transition(TaskletState::NullaryProcess);
                // the snapshot cycle is over but the input is not
                self.progress.not_done();
            } else {
                self.progress.not_done();
            }
        }

        if self.state == TaskletState::Complete {
            if self.processor.complete(&mut self.outbox)? {
                self.transition(TaskletState::EmitDoneItem);
            } else {
                self.progress.not_done();
            }
        }

        if self.state == TaskletState::EmitDoneItem {
            if self.outbox.offer_to_edges_and_snapshot(Item::Done).is_done() {
                self.transition(TaskletState::End);
            } else {
                self.progress.not_done();
            }
        }

        self.progress.made_progress(self.outbox.take_progress());
        Ok(self.progress.to_progress_state())
    }

    fn transition(&mut self, next: TaskletState) {
        self.state = next;
        self.progress.made_progress(true);
    }

    fn process_inbox(&mut self) -> Result<()> {
        if self.inbox.is_empty() {
            if self.snapshot_pending() {
                self.transition(TaskletState::SaveSnapshot);
                return Ok(());
            }
            self.try_fill_inbox()?;
        }

        if !self.inbox.is_empty() {
            self.progress.not_done();
            let before = self.inbox.len();
            self.processor
                .process(self.curr_ordinal, &mut self.inbox, &mut self.outbox)?;
            self.progress.made_progress(self.inbox.len() < before);
        } else if self.cursor.is_none() {
            // every input drained; drive completion from here
            if self.processor.complete(&mut self.outbox)? {
                self.transition(TaskletState::EmitDoneItem);
            } else {
                self.progress.not_done();
            }
        }
        Ok(())
    }

    /// Drain the current priority group into the inbox, round-robin, until
    /// one edge yields items or every edge was visited once.
    ///
    /// Stops immediately after a drain that ends in a snapshot barrier: the
    /// processor must consume everything ahead of the barrier before any
    /// other edge is drained. Under exactly-once, ordinals that already
    /// delivered the current barrier are skipped.
    fn try_fill_inbox(&mut self) -> Result<()> {
        let Some(first_cursor) = self.cursor.as_ref() else {
            return Ok(());
        };
        let first_ordinal = first_cursor.value().ordinal();
        self.progress.not_done();

        let exactly_once =
            self.snapshot_context.guarantee() == ProcessingGuarantee::ExactlyOnce;

        loop {
            let cursor = self.cursor.as_mut().expect("cursor present in fill loop");
            let ordinal = cursor.value().ordinal();
            self.curr_ordinal = ordinal;

            let mut result = ProgressState::NoProgress;
            if !(exactly_once && self.barrier_received[ordinal]) {
                result = cursor.value_mut().drain_to(&mut self.inbox);
                if result.is_done() {
                    cursor.remove();
                }
            }
            if result.is_done() {
                self.input_done[ordinal] = true;
            }
            self.progress.made_progress(result.made_progress());

            let trailing_barrier = match self.inbox.peek_last() {
                Some(Item::Barrier(b)) => Some(b.snapshot_id),
                _ => None,
            };
            if let Some(id) = trailing_barrier {
                self.observe_snapshot(ordinal, id)?;
                return Ok(());
            }

            let cursor = self.cursor.as_mut().expect("cursor present in fill loop");
            if !cursor.advance() {
                self.cursor = self.instream_groups.pop_front().map(CircularCursor::new);
                return Ok(());
            }
            if result.made_progress() || cursor.value().ordinal() == first_ordinal {
                return Ok(());
            }
        }
    }

    /// True once at least one barrier for the current snapshot arrived and
    /// every not-yet-done ordinal has contributed its barrier.
    fn snapshot_pending(&self) -> bool {
        let mut any_received = false;
        for ordinal in 0..self.barrier_received.len() {
            if self.barrier_received[ordinal] {
                any_received = true;
            } else if !self.input_done[ordinal] {
                return false;
            }
        }
        any_received
    }

    fn observe_snapshot(&mut self, ordinal: usize, snapshot_id: SnapshotId) -> Result<()> {
        if snapshot_id != self.curr_snapshot {
            return Err(anyhow!(
                "unexpected snapshot barrier {} from ordinal {}, expected {}",
                snapshot_id,
                ordinal,
                self.curr_snapshot
            ));
        }
        self.barrier_received[ordinal] = true;
        Ok(())
    }
}

impl<P: Processor> std::fmt::Display for ProcessorTasklet<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ProcessorTasklet{{vertex={}, processor={}}}",
            self.context.vertex_name(),
            std::any::type_name::<P>()
        )
    }
}

#[cfg(test)]
#[path = "tests/tasklet_tests.rs"]
mod tests;
