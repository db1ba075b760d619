use crate::{
    block::MinerId,
    broadcast::BroadcastBus,
    ledger::Ledger,
    strategy::Strategy,
};

use super::{ForkState, Inner, PendingImports, StrategyController};

/// Builds a [`StrategyController`].
#[derive(Debug, Default)]
pub struct ControllerBuilder {
    strategy: Strategy,
    public: Option<Box<dyn Ledger>>,
    private: Option<Box<dyn Ledger>>,
    bus: Option<Box<dyn BroadcastBus>>,
    publish_cursor: Option<u64>,
    miner: Option<MinerId>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControllerBuildError {
    #[error("no public ledger was given")]
    MissingPublicLedger,
    #[error("no broadcast bus was given")]
    MissingBroadcast,
    #[error("publish cursor {cursor} exceeds private height + 1 ({max})")]
    CursorOutOfRange { cursor: u64, max: u64 },
}

impl ControllerBuilder {
    /// Creates a new [`ControllerBuilder`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the mining strategy ([`Strategy::Honest`] otherwise).
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;

        self
    }

    /// Sets the ledger mirroring the network's view of the chain.
    pub fn public_ledger<L: Ledger + 'static>(mut self, ledger: L) -> Self {
        self.public = Some(Box::new(ledger));

        self
    }

    /// Sets the ledger holding the private branch (a copy of the public
    /// ledger otherwise).
    pub fn private_ledger<L: Ledger + 'static>(mut self, ledger: L) -> Self {
        self.private = Some(Box::new(ledger));

        self
    }

    /// Sets the bus used to gossip released blocks.
    pub fn broadcast<B: BroadcastBus + 'static>(mut self, bus: B) -> Self {
        self.bus = Some(Box::new(bus));

        self
    }

    /// Sets the height of the first withheld private block. Defaults to one
    /// above the lower of the two ledger heights.
    pub fn publish_cursor(mut self, height: u64) -> Self {
        self.publish_cursor = Some(height);

        self
    }

    /// Sets the local miner, whose blocks on the public canonical chain are
    /// counted in the controller's chain summaries.
    pub fn miner(mut self, miner: MinerId) -> Self {
        self.miner = Some(miner);

        self
    }

    /// Creates a [`StrategyController`] from the specified parameters.
    pub fn build(self) -> Result<StrategyController, ControllerBuildError> {
        use ControllerBuildError::*;

        let ControllerBuilder { strategy, public, private, bus, publish_cursor, miner } =
            self;

        let public = public.ok_or(MissingPublicLedger)?;
        let bus = bus.ok_or(MissingBroadcast)?;
        let private =
            private.unwrap_or_else(|| dyn_clone::clone_box(&*public));

        let max = private.height() + 1;
        let publish_cursor = match publish_cursor {
            Some(cursor) if cursor > max => {
                return Err(CursorOutOfRange { cursor, max })
            }
            Some(cursor) => cursor,
            None => public.height().min(private.height()) + 1,
        };

        // Entries past the common prefix are imported on the first adoption
        let mut entries = public.entries();
        let shared = entries
            .iter()
            .zip(private.entries())
            .take_while(|(a, b)| **a == *b)
            .count();
        let entries = entries.split_off(shared);

        Ok(StrategyController {
            inner: parking_lot::Mutex::new(Inner {
                strategy,
                fork: ForkState { branch_count: 0, publish_cursor },
                public,
                private,
                bus,
                pending: PendingImports { shared, entries },
                miner,
            }),
        })
    }
}
