//! Best-effort block propagation

use std::{fmt::Debug, sync::Arc};

use dyn_clone::DynClone;
use parking_lot::Mutex;

use crate::block::{Block, BlockId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    #[error("network unreachable: {0}")]
    Unreachable(String),
    #[error("block {0} was rejected by the network")]
    Rejected(BlockId),
}

/// Sends blocks to the network and signals the event layer about locally
/// mined blocks.
pub trait BroadcastBus: Debug + DynClone + Send {
    /// Gossips `block` to peers. Failures are never retried.
    fn publish(&mut self, block: &Block) -> Result<(), PublishError>;

    /// Signals that `block` should be treated as locally mined.
    fn notify_mined(&mut self, block: &Block);
}

dyn_clone::clone_trait_object!(BroadcastBus);

/// Something observed on a [`RecordingBus`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    Published(BlockId),
    NotifiedMined(BlockId),
}

/// A [`BroadcastBus`] which records every event in a buffer shared between
/// all of its clones.
#[derive(Debug, Clone, Default)]
pub struct RecordingBus {
    events: Arc<Mutex<Vec<BusEvent>>>,
    failing: bool,
}

impl RecordingBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a bus whose publishes always fail with
    /// [`PublishError::Unreachable`]. Notifications are still recorded.
    pub fn failing() -> Self {
        Self { failing: true, ..Self::default() }
    }

    /// Returns a copy of every event recorded so far.
    pub fn events(&self) -> Vec<BusEvent> {
        self.events.lock().clone()
    }

    /// IDs of successfully published blocks, in order.
    pub fn published(&self) -> Vec<BlockId> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                BusEvent::Published(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    /// IDs of blocks announced as locally mined, in order.
    pub fn notified(&self) -> Vec<BlockId> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                BusEvent::NotifiedMined(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    /// Forgets every recorded event.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl BroadcastBus for RecordingBus {
    fn publish(&mut self, block: &Block) -> Result<(), PublishError> {
        if self.failing {
            return Err(PublishError::Unreachable("no peers".into()));
        }

        self.events.lock().push(BusEvent::Published(block.id));
        Ok(())
    }

    fn notify_mined(&mut self, block: &Block) {
        self.events.lock().push(BusEvent::NotifiedMined(block.id));
    }
}

/// A [`BroadcastBus`] that drops everything. Used where the ledgers are the
/// only network, as in simulations.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBus;

impl BroadcastBus for NullBus {
    fn publish(&mut self, _block: &Block) -> Result<(), PublishError> {
        Ok(())
    }

    fn notify_mined(&mut self, _block: &Block) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Block;

    #[test]
    fn clones_share_events() {
        let bus = RecordingBus::new();
        let mut handle = bus.clone();
        let block = Block::root(3.into(), 1);

        handle.publish(&block).unwrap();
        handle.notify_mined(&block);

        assert_eq!(
            bus.events(),
            vec![BusEvent::Published(3.into()), BusEvent::NotifiedMined(3.into())]
        );
        assert_eq!(bus.published(), vec![BlockId(3)]);
        assert_eq!(bus.notified(), vec![BlockId(3)]);
    }

    #[test]
    fn failing_bus_records_no_publish() {
        let mut bus = RecordingBus::failing();
        let block = Block::root(3.into(), 1);

        assert!(matches!(bus.publish(&block), Err(PublishError::Unreachable(_))));
        assert!(bus.published().is_empty());
    }
}
