//! The user-facing operator contract and its factory layers.

use crate::inbox::Inbox;
use crate::item::{Item, SnapshotEntry};
use crate::outbox::Outbox;
use crate::snapshot::ProcessingGuarantee;
use anyhow::Result;

/// What a processor may inspect while being initialized.
#[derive(Debug, Clone)]
pub struct ProcessorContext {
    vertex_name: String,
    guarantee: ProcessingGuarantee,
}

impl ProcessorContext {
    pub fn new(vertex_name: impl Into<String>, guarantee: ProcessingGuarantee) -> Self {
        Self {
            vertex_name: vertex_name.into(),
            guarantee,
        }
    }

    pub fn vertex_name(&self) -> &str {
        &self.vertex_name
    }

    pub fn guarantee(&self) -> ProcessingGuarantee {
        self.guarantee
    }
}

impl Default for ProcessorContext {
    fn default() -> Self {
        Self::new("vertex", ProcessingGuarantee::None)
    }
}

/// Whether a processor carries state worth snapshotting.
///
/// Decided when the tasklet is constructed; a stateless tasklet forwards
/// barriers without a save step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotCapability {
    Stateless,
    Stateful,
}

/// A user-implemented operator.
///
/// The tasklet passes the outbox into every working call rather than handing
/// it out at `init`, so "init must not emit" holds by construction. Every
/// working method must tolerate a full outbox: offer, observe
/// [`crate::progress::ProgressState::NoProgress`], keep the item, and return.
/// The tasklet will call again on a later slice.
pub trait Processor {
    type In;
    type Out: Clone;

    /// Called once before any other method. Must not emit.
    fn init(&mut self, ctx: &ProcessorContext) -> Result<()> {
        let _ = ctx;
        Ok(())
    }

    /// A cooperative processor promises that every call returns promptly and
    /// never emits more than the outbox can absorb; in exchange it runs on
    /// the shared non-blocking worker pool.
    fn is_cooperative(&self) -> bool {
        true
    }

    /// Optional work that needs no input. Return `true` when there is nothing
    /// more to do in this call.
    fn try_process(&mut self, outbox: &mut Outbox<Self::Out>) -> Result<bool> {
        let _ = outbox;
        Ok(true)
    }

    /// Consume zero or more items from `inbox`, emitting to `outbox`.
    ///
    /// `ordinal` identifies the input edge the inbox was drained from. The
    /// inbox may hold watermarks and barriers alongside data; inspect each
    /// item's kind.
    fn process(
        &mut self,
        ordinal: usize,
        inbox: &mut Inbox<Item<Self::In>>,
        outbox: &mut Outbox<Self::Out>,
    ) -> Result<()>;

    /// Called once every input is exhausted; may emit. Return `true` when
    /// fully complete.
    fn complete(&mut self, outbox: &mut Outbox<Self::Out>) -> Result<bool> {
        let _ = outbox;
        Ok(true)
    }

    /// Emit all snapshot state to the snapshot sink. Return `true` once
    /// everything has been offered and accepted.
    fn save_snapshot(&mut self, outbox: &mut Outbox<Self::Out>) -> Result<bool> {
        let _ = outbox;
        Ok(true)
    }

    /// Consume restored state entries. The default discards them.
    fn restore_snapshot(
        &mut self,
        inbox: &mut Inbox<SnapshotEntry>,
        outbox: &mut Outbox<Self::Out>,
    ) -> Result<()> {
        let _ = outbox;
        while inbox.poll().is_some() {}
        Ok(())
    }

    /// Called once after the last restore entry has been consumed.
    fn finish_snapshot_restore(&mut self) -> Result<()> {
        Ok(())
    }
}

/// One cluster member, as "host:port".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberAddress {
    pub host: String,
    pub port: u16,
}

impl MemberAddress {
    pub const DEFAULT_PORT: u16 = 7700;

    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// The synthetic single-member address used by local test contexts.
    pub fn local() -> Self {
        Self::new("localhost", Self::DEFAULT_PORT)
    }
}

impl std::fmt::Display for MemberAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Creates the processor instances that run on one member.
///
/// The supplier, not the processor instance, is the unit of reusability: a
/// snapshot restore asks it for a fresh instance.
pub trait ProcessorSupplier {
    type P: Processor;

    fn init(&mut self, ctx: &ProcessorContext) -> Result<()> {
        let _ = ctx;
        Ok(())
    }

    /// Create `count` processor instances.
    fn get(&mut self, count: usize) -> Vec<Self::P>;
}

/// Cluster-level factory: one [`ProcessorSupplier`] per member address.
pub trait ProcessorMetaSupplier {
    type S: ProcessorSupplier;

    fn init(&mut self, addresses: &[MemberAddress]) -> Result<()> {
        let _ = addresses;
        Ok(())
    }

    fn supplier_for(&mut self, address: &MemberAddress) -> Self::S;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Discarding;

    impl Processor for Discarding {
        type In = i32;
        type Out = i32;

        fn process(
            &mut self,
            _ordinal: usize,
            inbox: &mut Inbox<Item<i32>>,
            _outbox: &mut Outbox<i32>,
        ) -> Result<()> {
            while inbox.poll().is_some() {}
            Ok(())
        }
    }

    #[test]
    fn test_default_snapshot_hooks() {
        let mut p = Discarding;
        let mut outbox = Outbox::new(Vec::new(), None);
        assert!(p.save_snapshot(&mut outbox).unwrap());

        let mut restore = Inbox::new();
        restore.add(SnapshotEntry::encode(&1u8, &2u8).unwrap());
        p.restore_snapshot(&mut restore, &mut outbox).unwrap();
        assert!(restore.is_empty());
        p.finish_snapshot_restore().unwrap();
    }

    #[test]
    fn test_default_lifecycle_hooks() {
        let mut p = Discarding;
        let mut outbox = Outbox::new(Vec::new(), None);
        assert!(p.is_cooperative());
        p.init(&ProcessorContext::default()).unwrap();
        assert!(p.try_process(&mut outbox).unwrap());
        assert!(p.complete(&mut outbox).unwrap());
    }

    #[test]
    fn test_member_address_display() {
        assert_eq!(MemberAddress::local().to_string(), "localhost:7700");
    }
}
