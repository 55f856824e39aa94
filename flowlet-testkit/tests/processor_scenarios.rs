//! End-to-end harness scenarios over stock and hand-written processors.

use anyhow::Result;
use flowlet_core::processors;
use flowlet_core::{
    Inbox, Item, MemberAddress, Outbox, Processor, ProcessorMetaSupplier, ProcessorSupplier,
    SnapshotEntry,
};
use flowlet_testkit::{
    supplier_from, supplier_from_meta, test_processor, test_processor_with, test_single_processor,
};
use std::cell::Cell;
use std::rc::Rc;

fn abc() -> Vec<String> {
    vec!["a".to_string(), "b".to_string(), "c".to_string()]
}

#[test]
fn test_uppercase_map() {
    test_processor(
        || processors::map(|s: &String| s.to_uppercase()),
        vec!["foo".to_string(), "bar".to_string()],
        vec!["FOO".to_string(), "BAR".to_string()],
    );
}

#[test]
fn test_flat_map_duplicates_each_item() {
    test_processor(
        || processors::flat_map(|v: &i32| vec![*v, *v]),
        vec![1, 2],
        vec![1, 1, 2, 2],
    );
}

#[test]
fn test_single_shot_processor() {
    test_single_processor(processors::map(|v: &i32| v + 1), vec![1, 2], vec![2, 3]);
}

#[test]
fn test_snapshots_do_not_change_stateless_output() {
    test_processor_with(
        || Some(processors::map(|v: &i32| v * 2)),
        vec![1, 2, 3],
        vec![2, 4, 6],
        true,
        true,
    );
}

/// Counts data items and emits the total once the input is exhausted. The
/// count is the snapshot state.
struct CountingProcessor {
    count: u64,
}

impl Processor for CountingProcessor {
    type In = String;
    type Out = u64;

    fn process(
        &mut self,
        _ordinal: usize,
        inbox: &mut Inbox<Item<String>>,
        _outbox: &mut Outbox<u64>,
    ) -> Result<()> {
        while let Some(item) = inbox.poll() {
            if matches!(item, Item::Data(_)) {
                self.count += 1;
            }
        }
        Ok(())
    }

    fn complete(&mut self, outbox: &mut Outbox<u64>) -> Result<bool> {
        Ok(outbox.offer(Item::data(self.count)).is_done())
    }

    fn save_snapshot(&mut self, outbox: &mut Outbox<u64>) -> Result<bool> {
        let entry = SnapshotEntry::encode(&"count", &self.count)?;
        Ok(outbox.offer_to_snapshot(entry).is_done())
    }

    fn restore_snapshot(
        &mut self,
        inbox: &mut Inbox<SnapshotEntry>,
        _outbox: &mut Outbox<u64>,
    ) -> Result<()> {
        while let Some(entry) = inbox.poll() {
            self.count += entry.decode_value::<u64>()?;
        }
        Ok(())
    }
}

#[test]
fn test_stateful_counter() {
    test_processor(|| CountingProcessor { count: 0 }, abc(), vec![3]);
}

#[test]
fn test_stateful_counter_survives_snapshots() {
    test_processor_with(
        || Some(CountingProcessor { count: 0 }),
        abc(),
        vec![3],
        true,
        true,
    );
}

/// Cooperative map-by-two that counts how often it found the outbox full.
struct DoublingProbe {
    full_hits: Rc<Cell<usize>>,
}

impl Processor for DoublingProbe {
    type In = i32;
    type Out = i32;

    fn process(
        &mut self,
        _ordinal: usize,
        inbox: &mut Inbox<Item<i32>>,
        outbox: &mut Outbox<i32>,
    ) -> Result<()> {
        while let Some(item) = inbox.peek() {
            let out = match item {
                Item::Data(v) => Item::data(v * 2),
                _ => {
                    inbox.poll();
                    continue;
                }
            };
            if outbox.offer(out).is_done() {
                inbox.poll();
            } else {
                self.full_hits.set(self.full_hits.get() + 1);
                break;
            }
        }
        Ok(())
    }
}

#[test]
fn test_cooperative_processor_reentered_with_full_outbox() {
    let full_hits = Rc::new(Cell::new(0));
    let probe_hits = Rc::clone(&full_hits);
    test_processor(
        move || DoublingProbe {
            full_hits: Rc::clone(&probe_hits),
        },
        vec![1, 2, 3, 4],
        vec![2, 4, 6, 8],
    );
    assert!(
        full_hits.get() >= 1,
        "the harness never re-entered process() with a full outbox"
    );
}

/// Consumes nothing and emits nothing; the progress assertion must fire.
struct Stuck;

impl Processor for Stuck {
    type In = i32;
    type Out = i32;

    fn process(
        &mut self,
        _ordinal: usize,
        _inbox: &mut Inbox<Item<i32>>,
        _outbox: &mut Outbox<i32>,
    ) -> Result<()> {
        Ok(())
    }
}

#[test]
#[should_panic(expected = "process() call without progress")]
fn test_progress_assertion_catches_stuck_processor() {
    test_processor(|| Stuck, vec![1], Vec::<i32>::new());
}

struct CounterSupplier;

impl ProcessorSupplier for CounterSupplier {
    type P = CountingProcessor;

    fn get(&mut self, count: usize) -> Vec<CountingProcessor> {
        (0..count).map(|_| CountingProcessor { count: 0 }).collect()
    }
}

#[test]
fn test_batch_supplier_with_snapshots() {
    test_processor_with(supplier_from(CounterSupplier), abc(), vec![3], true, true);
}

struct CounterMeta;

impl ProcessorMetaSupplier for CounterMeta {
    type S = CounterSupplier;

    fn supplier_for(&mut self, _address: &MemberAddress) -> CounterSupplier {
        CounterSupplier
    }
}

#[test]
fn test_meta_supplier_derives_local_processor() {
    test_processor_with(supplier_from_meta(CounterMeta), abc(), vec![3], true, false);
}
