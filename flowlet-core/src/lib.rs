//! # Flowlet Core
//!
//! Per-operator execution core of the flowlet dataflow engine.
//!
//! A dataflow job is a directed graph of *processors* connected by edges. On
//! each worker, every processor instance is wrapped in a cooperative
//! [`ProcessorTasklet`](tasklet::ProcessorTasklet) that a shared worker pool
//! round-robins over; one `call()` never blocks and reports whether it made
//! progress. This crate provides the tasklet and everything it is built from:
//!
//! - [`item`] — Units moved between operators: [`Item`](item::Item) (data,
//!   watermark, barrier, done sentinel), [`SnapshotEntry`](item::SnapshotEntry).
//! - [`progress`] — [`ProgressState`](progress::ProgressState) verdicts and
//!   the per-slice [`ProgressTracker`](progress::ProgressTracker).
//! - [`inbox`] / [`outbox`] — The FIFO a processor reads and the bounded
//!   multi-edge buffer it emits to.
//! - [`edge`] — Inbound/outbound edge streams over bounded channels.
//! - [`cursor`] — Circular iteration over one priority group of edges.
//! - [`partitioner`] — Key-hash and round-robin data routing.
//! - [`processor`] — The user-facing [`Processor`](processor::Processor)
//!   contract and its supplier layers.
//! - [`processors`] — Stock map / filter / flat-map processors.
//! - [`snapshot`] — [`ProcessingGuarantee`](snapshot::ProcessingGuarantee)
//!   and the job-wide shared [`SnapshotContext`](snapshot::SnapshotContext).
//! - [`tasklet`] — The processor tasklet state machine.

pub mod cursor;
pub mod edge;
pub mod inbox;
pub mod item;
pub mod outbox;
pub mod partitioner;
pub mod processor;
pub mod processors;
pub mod progress;
pub mod snapshot;
pub mod tasklet;

pub use inbox::Inbox;
pub use item::{Item, SnapshotBarrier, SnapshotEntry, SnapshotId, SnapshotItem, Watermark};
pub use outbox::{Outbox, OutboundCollector, OutboundEdgeStream, SnapshotCollector};
pub use processor::{
    MemberAddress, Processor, ProcessorContext, ProcessorMetaSupplier, ProcessorSupplier,
    SnapshotCapability,
};
pub use progress::{ProgressState, ProgressTracker};
pub use snapshot::{ProcessingGuarantee, SnapshotContext};
pub use tasklet::{CancelToken, ProcessorTasklet};
