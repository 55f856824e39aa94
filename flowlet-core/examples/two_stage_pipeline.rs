//! Two tasklets connected by an in-process edge, driven by a miniature
//! worker loop with an aligned snapshot in the middle of the stream.
//!
//! ```text
//! [feed] -> tokenize (flat-map) -> uppercase (map) -> [sink]
//! ```

use anyhow::Result;
use flowlet_core::edge::{edge_channel, ChannelCollector, ChannelInboundEdge};
use flowlet_core::item::SnapshotItem;
use flowlet_core::processors;
use flowlet_core::{
    CancelToken, Item, OutboundCollector, OutboundEdgeStream, ProcessingGuarantee,
    ProcessorTasklet, ProgressState, SnapshotCapability, SnapshotCollector, SnapshotContext,
};
use std::sync::Arc;

struct PrintingSnapshotSink;

impl SnapshotCollector for PrintingSnapshotSink {
    fn offer(&mut self, item: SnapshotItem) -> ProgressState {
        if let SnapshotItem::Barrier(b) = item {
            println!("snapshot sink: epoch {} closed", b.snapshot_id);
        }
        ProgressState::Done
    }
}

fn main() -> Result<()> {
    let ctx = Arc::new(SnapshotContext::new(ProcessingGuarantee::ExactlyOnce));
    let cancel = CancelToken::new();

    // feed -> tokenize
    let (mut feed, feed_edge) = edge_channel::<String>(0, 0, 64);
    // tokenize -> uppercase
    let (mid_tx, mid_rx) = crossbeam_channel::bounded(4);
    // uppercase -> sink
    let (out_tx, out_rx) = crossbeam_channel::bounded(4);

    for line in ["first line", "second line"] {
        feed.offer(Item::data(line.to_string()));
    }
    feed.offer_broadcast(Item::barrier(0));
    feed.offer(Item::data("third line".to_string()));
    feed.offer_broadcast(Item::Done);

    let mut tokenize = ProcessorTasklet::new(
        "tokenize",
        processors::flat_map(|line: &String| {
            line.split_whitespace()
                .map(str::to_string)
                .collect::<Vec<_>>()
        }),
        vec![Box::new(feed_edge)],
        vec![OutboundEdgeStream::new(
            0,
            Box::new(ChannelCollector::new(mid_tx)),
        )],
        Arc::clone(&ctx),
        Some(Box::new(PrintingSnapshotSink)),
        SnapshotCapability::Stateless,
    );
    tokenize.init(cancel.clone())?;

    let mut uppercase = ProcessorTasklet::new(
        "uppercase",
        processors::map(|word: &String| word.to_uppercase()),
        vec![Box::new(ChannelInboundEdge::new(mid_rx, 0, 0))],
        vec![OutboundEdgeStream::new(
            0,
            Box::new(ChannelCollector::new(out_tx)),
        )],
        Arc::clone(&ctx),
        Some(Box::new(PrintingSnapshotSink)),
        SnapshotCapability::Stateless,
    );
    uppercase.init(cancel)?;

    // round-robin worker loop over both tasklets
    let mut finished = [false, false];
    while !finished.iter().all(|done| *done) {
        if !finished[0] {
            finished[0] = tokenize.call()?.is_done();
        }
        if !finished[1] {
            finished[1] = uppercase.call()?.is_done();
        }
        for item in out_rx.try_iter() {
            match item {
                Item::Data(word) => println!("out: {word}"),
                Item::Barrier(b) => println!("out: barrier {}", b.snapshot_id),
                Item::Done => println!("out: done"),
                Item::Watermark(wm) => println!("out: {wm}"),
            }
        }
    }
    Ok(())
}
