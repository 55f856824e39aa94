//! # Flowlet Testkit
//!
//! Deterministic single-threaded harness for testing flowlet processors in
//! isolation, without a tasklet or worker pool.
//!
//! [`test_processor`] initializes the processor, feeds it a preloaded inbox
//! through `process(0, ..)`, drives `complete()` to the end, and asserts the
//! collected output against the expected list. For cooperative processors the
//! outbox holds a single item, and `process` is re-invoked against the full
//! outbox to verify the processor copes without emitting. With snapshots
//! enabled, state is saved and restored into a fresh instance after every
//! call, so a processor that loses state in the round-trip fails its test.
//!
//! ```no_run
//! use flowlet_core::processors;
//! use flowlet_testkit::test_processor;
//!
//! test_processor(
//!     || processors::map(|s: &String| s.to_uppercase()),
//!     vec!["foo".to_string(), "bar".to_string()],
//!     vec!["FOO".to_string(), "BAR".to_string()],
//! );
//! ```

use flowlet_core::{
    Inbox, Item, MemberAddress, Outbox, OutboundCollector, OutboundEdgeStream, Processor,
    ProcessorContext, ProcessorMetaSupplier, ProcessorSupplier, ProgressState, SnapshotCollector,
    SnapshotEntry, SnapshotItem,
};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt::Debug;
use std::rc::Rc;

/// In-memory queue standing in for a downstream edge.
struct BufferCollector<T> {
    queue: Rc<RefCell<VecDeque<Item<T>>>>,
    capacity: usize,
}

impl<T> OutboundCollector<T> for BufferCollector<T> {
    fn offer(&mut self, item: Item<T>) -> ProgressState {
        let mut queue = self.queue.borrow_mut();
        if queue.len() >= self.capacity {
            return ProgressState::NoProgress;
        }
        queue.push_back(item);
        ProgressState::Done
    }

    fn offer_broadcast(&mut self, item: Item<T>) -> ProgressState {
        self.offer(item)
    }
}

struct BufferSnapshotSink {
    queue: Rc<RefCell<VecDeque<SnapshotItem>>>,
    capacity: usize,
}

impl SnapshotCollector for BufferSnapshotSink {
    fn offer(&mut self, item: SnapshotItem) -> ProgressState {
        let mut queue = self.queue.borrow_mut();
        if queue.len() >= self.capacity {
            return ProgressState::NoProgress;
        }
        queue.push_back(item);
        ProgressState::Done
    }
}

/// Outbox over one in-memory data edge (ordinal 0) plus a snapshot queue,
/// both inspectable from the test.
pub struct TestOutbox<T> {
    outbox: Outbox<T>,
    bucket: Rc<RefCell<VecDeque<Item<T>>>>,
    snapshot: Rc<RefCell<VecDeque<SnapshotItem>>>,
}

impl<T: Clone + 'static> TestOutbox<T> {
    /// Both queues hold at most `capacity` items; used with capacity 1 to
    /// exercise cooperative processors against a full outbox.
    pub fn bounded(capacity: usize) -> Self {
        let bucket = Rc::new(RefCell::new(VecDeque::new()));
        let snapshot = Rc::new(RefCell::new(VecDeque::new()));
        let edge = OutboundEdgeStream::new(
            0,
            Box::new(BufferCollector {
                queue: Rc::clone(&bucket),
                capacity,
            }),
        );
        let sink = BufferSnapshotSink {
            queue: Rc::clone(&snapshot),
            capacity,
        };
        Self {
            outbox: Outbox::new(vec![edge], Some(Box::new(sink))),
            bucket,
            snapshot,
        }
    }

    pub fn unbounded() -> Self {
        Self::bounded(usize::MAX)
    }

    pub fn outbox_mut(&mut self) -> &mut Outbox<T> {
        &mut self.outbox
    }

    /// Items currently queued on the data edge.
    pub fn queued(&self) -> usize {
        self.bucket.borrow().len()
    }

    pub fn snapshot_queued(&self) -> usize {
        self.snapshot.borrow().len()
    }

    /// Move queued data payloads into `output`. Control items (watermarks,
    /// barriers, done) are dropped; the harness compares data only.
    pub fn drain_into(&mut self, output: &mut Vec<T>) {
        let mut bucket = self.bucket.borrow_mut();
        while let Some(item) = bucket.pop_front() {
            if let Item::Data(value) = item {
                output.push(value);
            }
        }
    }

    /// Move queued snapshot entries into a restore inbox, returning how many
    /// were moved. Epoch markers are dropped.
    pub fn drain_snapshot_into(&mut self, inbox: &mut Inbox<SnapshotEntry>) -> usize {
        let mut queue = self.snapshot.borrow_mut();
        let mut moved = 0;
        while let Some(item) = queue.pop_front() {
            if let SnapshotItem::Entry(entry) = item {
                inbox.add(entry);
                moved += 1;
            }
        }
        moved
    }
}

/// Exercise a processor with progress assertions on and snapshots off.
///
/// `new_processor` is called once per processor instance needed; see
/// [`test_processor_with`] for the full protocol.
pub fn test_processor<P, F>(mut new_processor: F, input: Vec<P::In>, expected: Vec<P::Out>)
where
    P: Processor,
    P::Out: PartialEq + Debug + 'static,
    F: FnMut() -> P,
{
    test_processor_with(move || Some(new_processor()), input, expected, true, false);
}

/// Exercise a single processor instance. The supplier yields it once, so
/// snapshot testing is not possible through this entry point.
pub fn test_single_processor<P>(processor: P, input: Vec<P::In>, expected: Vec<P::Out>)
where
    P: Processor,
    P::Out: PartialEq + Debug + 'static,
{
    let mut slot = Some(processor);
    test_processor_with(move || slot.take(), input, expected, true, false);
}

/// The full harness protocol.
///
/// 1. Preload a test inbox with `input` and build a [`TestOutbox`]: capacity
///    1 if the processor is cooperative, unbounded otherwise.
/// 2. `init` the processor with a default context.
/// 3. While the inbox is non-empty: call `process(0, ..)`; for a cooperative
///    processor with exactly one queued item, call `process` again against
///    the full outbox; assert progress; drain the outbox; snapshot-and-
///    restore if enabled.
/// 4. Call `complete()` until it returns true, with the same assertion,
///    drain, and snapshot steps.
/// 5. Assert the collected data equals `expected`, order-sensitive.
///
/// `try_process` is never invoked, only input ordinal 0 is used, and no
/// end-state emptiness is asserted.
pub fn test_processor_with<P, S>(
    mut supplier: S,
    input: Vec<P::In>,
    expected: Vec<P::Out>,
    assert_progress: bool,
    do_snapshots: bool,
) where
    P: Processor,
    P::Out: PartialEq + Debug + 'static,
    S: FnMut() -> Option<P>,
{
    let mut inbox = Inbox::new();
    inbox.add_all(input.into_iter().map(Item::Data));

    let mut processor = supplier().expect("supplier yielded no processor");
    let cooperative = processor.is_cooperative();
    let mut outbox = if cooperative {
        TestOutbox::bounded(1)
    } else {
        TestOutbox::unbounded()
    };

    processor
        .init(&ProcessorContext::default())
        .expect("processor init failed");

    let mut actual: Vec<P::Out> = Vec::new();

    let mut last_inbox_size = inbox.len();
    while !inbox.is_empty() {
        processor
            .process(0, &mut inbox, outbox.outbox_mut())
            .expect("process() failed");
        if cooperative && outbox.queued() == 1 {
            // the outbox is full; the processor must cope without emitting
            processor
                .process(0, &mut inbox, outbox.outbox_mut())
                .expect("process() failed");
        }
        assert!(
            !assert_progress || last_inbox_size > inbox.len() || outbox.queued() > 0,
            "process() call without progress"
        );
        outbox.drain_into(&mut actual);
        if do_snapshots {
            processor =
                snapshot_and_restore(processor, &mut supplier, &mut outbox, &mut actual, assert_progress);
        }
        last_inbox_size = inbox.len();
    }

    loop {
        let done = processor
            .complete(outbox.outbox_mut())
            .expect("complete() failed");
        assert!(
            !assert_progress || done || outbox.queued() > 0,
            "complete() call without progress"
        );
        outbox.drain_into(&mut actual);
        if do_snapshots {
            processor =
                snapshot_and_restore(processor, &mut supplier, &mut outbox, &mut actual, assert_progress);
        }
        if done {
            break;
        }
    }

    assert_eq!(actual, expected, "processor output doesn't match");
}

/// Save the current processor's state, then restore it into a fresh instance
/// from the supplier and hand that instance back.
fn snapshot_and_restore<P, S>(
    mut processor: P,
    supplier: &mut S,
    outbox: &mut TestOutbox<P::Out>,
    actual: &mut Vec<P::Out>,
    assert_progress: bool,
) -> P
where
    P: Processor,
    P::Out: PartialEq + Debug + 'static,
    S: FnMut() -> Option<P>,
{
    let mut restore_inbox = Inbox::new();
    loop {
        let done = processor
            .save_snapshot(outbox.outbox_mut())
            .expect("save_snapshot() failed");
        let collected = outbox.drain_snapshot_into(&mut restore_inbox);
        assert!(
            !assert_progress || done || collected > 0 || outbox.queued() > 0,
            "save_snapshot() call without progress"
        );
        outbox.drain_into(actual);
        if done {
            break;
        }
    }

    let mut fresh = supplier()
        .expect("supplier out of processors; snapshot testing needs a reusable supplier");
    fresh
        .init(&ProcessorContext::default())
        .expect("processor init failed");

    if restore_inbox.is_empty() {
        // nothing was saved, so finish_snapshot_restore is skipped
        return fresh;
    }

    let mut last_size = restore_inbox.len();
    while !restore_inbox.is_empty() {
        fresh
            .restore_snapshot(&mut restore_inbox, outbox.outbox_mut())
            .expect("restore_snapshot() failed");
        assert!(
            !assert_progress || last_size > restore_inbox.len() || outbox.queued() > 0,
            "restore_snapshot() call without progress"
        );
        outbox.drain_into(actual);
        last_size = restore_inbox.len();
    }
    fresh
        .finish_snapshot_restore()
        .expect("finish_snapshot_restore() failed");
    fresh
}

/// Derive a single-processor supplier from a [`ProcessorSupplier`], asking it
/// for one processor at a time on behalf of the local member.
pub fn supplier_from<S>(mut supplier: S) -> impl FnMut() -> Option<S::P>
where
    S: ProcessorSupplier,
{
    supplier
        .init(&ProcessorContext::default())
        .expect("supplier init failed");
    move || supplier.get(1).pop()
}

/// Derive a single-processor supplier from a [`ProcessorMetaSupplier`],
/// initialized with a synthetic single-address member list.
pub fn supplier_from_meta<M>(mut meta: M) -> impl FnMut() -> Option<<M::S as ProcessorSupplier>::P>
where
    M: ProcessorMetaSupplier,
{
    let local = MemberAddress::local();
    meta.init(std::slice::from_ref(&local))
        .expect("meta supplier init failed");
    supplier_from(meta.supplier_for(&local))
}
