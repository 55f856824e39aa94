//! Stock processors for the common stateless transforms.
//!
//! All of them are cooperative and outbox-full tolerant: an item is removed
//! from the inbox only after the outbox accepted its output. Watermarks are
//! forwarded unchanged; barriers are consumed silently, since the tasklet
//! emits the aligned barrier itself.

use crate::inbox::Inbox;
use crate::item::Item;
use crate::outbox::Outbox;
use crate::processor::Processor;
use anyhow::Result;
use std::collections::VecDeque;
use std::marker::PhantomData;

/// One-to-one transform over data elements.
pub struct MapProcessor<In, Out, F> {
    map_fn: F,
    _types: PhantomData<fn(&In) -> Out>,
}

/// Create a processor applying `map_fn` to every data element.
pub fn map<In, Out, F>(map_fn: F) -> MapProcessor<In, Out, F>
where
    F: FnMut(&In) -> Out,
{
    MapProcessor {
        map_fn,
        _types: PhantomData,
    }
}

impl<In, Out, F> Processor for MapProcessor<In, Out, F>
where
    F: FnMut(&In) -> Out,
    Out: Clone,
{
    type In = In;
    type Out = Out;

    fn process(
        &mut self,
        _ordinal: usize,
        inbox: &mut Inbox<Item<In>>,
        outbox: &mut Outbox<Out>,
    ) -> Result<()> {
        while let Some(item) = inbox.peek() {
            let out = match item {
                Item::Data(value) => Item::Data((self.map_fn)(value)),
                Item::Watermark(wm) => Item::Watermark(*wm),
                Item::Barrier(_) | Item::Done => {
                    inbox.poll();
                    continue;
                }
            };
            if outbox.offer(out).is_done() {
                inbox.poll();
            } else {
                return Ok(());
            }
        }
        Ok(())
    }
}

/// Keeps data elements matching a predicate.
pub struct FilterProcessor<In, F> {
    predicate: F,
    _types: PhantomData<fn(&In)>,
}

/// Create a processor passing through the data elements `predicate` accepts.
pub fn filter<In, F>(predicate: F) -> FilterProcessor<In, F>
where
    F: FnMut(&In) -> bool,
{
    FilterProcessor {
        predicate,
        _types: PhantomData,
    }
}

impl<In, F> Processor for FilterProcessor<In, F>
where
    F: FnMut(&In) -> bool,
    In: Clone,
{
    type In = In;
    type Out = In;

    fn process(
        &mut self,
        _ordinal: usize,
        inbox: &mut Inbox<Item<In>>,
        outbox: &mut Outbox<In>,
    ) -> Result<()> {
        while let Some(item) = inbox.peek() {
            let out = match item {
                Item::Data(value) => {
                    if !(self.predicate)(value) {
                        inbox.poll();
                        continue;
                    }
                    Item::Data(value.clone())
                }
                Item::Watermark(wm) => Item::Watermark(*wm),
                Item::Barrier(_) | Item::Done => {
                    inbox.poll();
                    continue;
                }
            };
            if outbox.offer(out).is_done() {
                inbox.poll();
            } else {
                return Ok(());
            }
        }
        Ok(())
    }
}

/// One-to-many transform over data elements.
///
/// Expanded outputs are parked in a pending queue so a full outbox can
/// interrupt the expansion mid-way and the next call resumes where it
/// stopped.
pub struct FlatMapProcessor<In, Out, F> {
    flat_map_fn: F,
    pending: VecDeque<Item<Out>>,
    _types: PhantomData<fn(&In) -> Out>,
}

/// Create a processor emitting every element of `flat_map_fn`'s output.
pub fn flat_map<In, Out, I, F>(flat_map_fn: F) -> FlatMapProcessor<In, Out, F>
where
    F: FnMut(&In) -> I,
    I: IntoIterator<Item = Out>,
{
    FlatMapProcessor {
        flat_map_fn,
        pending: VecDeque::new(),
        _types: PhantomData,
    }
}

impl<In, Out, I, F> Processor for FlatMapProcessor<In, Out, F>
where
    F: FnMut(&In) -> I,
    I: IntoIterator<Item = Out>,
    Out: Clone,
{
    type In = In;
    type Out = Out;

    fn process(
        &mut self,
        _ordinal: usize,
        inbox: &mut Inbox<Item<In>>,
        outbox: &mut Outbox<Out>,
    ) -> Result<()> {
        loop {
            while let Some(item) = self.pending.front() {
                if outbox.offer(item.clone()).is_done() {
                    self.pending.pop_front();
                } else {
                    return Ok(());
                }
            }
            match inbox.poll() {
                Some(Item::Data(value)) => {
                    self.pending
                        .extend((self.flat_map_fn)(&value).into_iter().map(Item::Data));
                }
                Some(Item::Watermark(wm)) => self.pending.push_back(Item::Watermark(wm)),
                Some(Item::Barrier(_)) | Some(Item::Done) => {}
                None => return Ok(()),
            }
        }
    }

    fn complete(&mut self, outbox: &mut Outbox<Out>) -> Result<bool> {
        while let Some(item) = self.pending.front() {
            if outbox.offer(item.clone()).is_done() {
                self.pending.pop_front();
            } else {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
