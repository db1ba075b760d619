/*!
The fork-race decision engine

A [`StrategyController`] sits between a local mining loop, the network
ingestion layer, and two [`Ledger`]s. It is told about every block the local
miner finds ([`StrategyController::on_self_mined_block`]) and every batch of
blocks the network reveals ([`StrategyController::on_external_blocks_observed`]),
and decides what to withhold, what to release, and when to give up on the
private branch.

# Reaction table

With `prev` being the private lead measured before the triggering commit:

| Event | `prev` | Action |
|---|---|---|
| self-mined | `0` with branch count `2` | release the whole private branch |
| self-mined | anything else | keep withholding |
| external | `<= 0` | adopt the public ledger, re-publish the observed blocks |
| external | `1` | release the private head to match the public head |
| external | `2` | release the whole private branch |
| external | `> 2` | release the oldest withheld block |

Honest controllers commit to the public ledger and publish immediately.
*/

pub mod builder;

pub use builder::{ControllerBuildError, ControllerBuilder};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn, Level};

use crate::{
    block::{Block, ExecutionResult, MinerId},
    broadcast::BroadcastBus,
    ledger::{Ledger, LedgerEntry, LedgerError},
    strategy::Strategy,
};

/// Fork-race bookkeeping owned by one controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForkState {
    /// Consecutive self-mined blocks since the last full release or
    /// adoption.
    pub branch_count: u64,
    /// Height of the next withheld private block eligible for release.
    pub publish_cursor: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("ledger rejected the commit")]
    CommitFailure(#[from] LedgerError),
    /// The private ledger could not mirror the public one.
    ///
    /// Raised after the observed batch was committed: the public ledger
    /// holds the new blocks while the private ledger and [`ForkState`] are
    /// unchanged.
    #[error("private ledger could not adopt the public ledger")]
    Adoption(#[source] LedgerError),
}

/// Decides what a miner withholds and publishes. See the
/// [module documentation](self) for the decision rules.
///
/// Both entry points lock the controller for their whole duration, so calls
/// from different threads are applied one at a time.
#[derive(Debug)]
pub struct StrategyController {
    inner: Mutex<Inner>,
}

#[derive(Debug, Clone)]
struct Inner {
    strategy: Strategy,
    fork: ForkState,
    public: Box<dyn Ledger>,
    private: Box<dyn Ledger>,
    bus: Box<dyn BroadcastBus>,
    pending: PendingImports,
    /// Miner whose canonical blocks are counted in chain summaries.
    miner: Option<MinerId>,
}

/// Public ledger entries the private ledger lacks, imported on the next
/// adoption in place of a full copy.
#[derive(Debug, Clone, Default)]
struct PendingImports {
    /// Number of leading entries both ledgers hold in the same order.
    shared: usize,
    /// Entries appended to the public ledger after the shared prefix.
    entries: Vec<LedgerEntry>,
}

impl StrategyController {
    pub fn builder() -> ControllerBuilder {
        ControllerBuilder::new()
    }

    /// Handles a block found by the local miner.
    ///
    /// The block is committed to the private ledger when withholding and to
    /// the public ledger otherwise. On commit failure the block is dropped
    /// and nothing else changes.
    pub fn on_self_mined_block(
        &self,
        block: Block,
        execution: ExecutionResult,
    ) -> Result<(), ControllerError> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let prev = inner.lead();

        if !inner.strategy.withholds() {
            inner.public.append(&[block.clone()], Some(execution))?;
            debug!(block = %block.id, height = block.height, "committed mined block");
            inner.broadcast(&block);
            inner.report();
            return Ok(());
        }

        inner.private.append(&[block.clone()], Some(execution))?;
        inner.fork.branch_count += 1;

        debug!(
            block = %block.id,
            height = block.height,
            prev,
            branch_count = inner.fork.branch_count,
            publish_cursor = inner.fork.publish_cursor,
            "withheld mined block"
        );

        if prev == 0 && inner.fork.branch_count == 2 {
            info!(prev, "won fork race, releasing private branch");
            inner.publish_all();
            inner.fork.branch_count = 0;
        }

        inner.report();
        Ok(())
    }

    /// Handles a non-empty, height-ordered batch of blocks newly seen on the
    /// network.
    ///
    /// The batch is committed to the public ledger as a whole; on failure
    /// the call is aborted and nothing else changes.
    pub fn on_external_blocks_observed(
        &self,
        blocks: Vec<Block>,
    ) -> Result<(), ControllerError> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let prev = inner.lead();
        inner.public.append(&blocks, None)?;

        if !inner.strategy.withholds() {
            inner.report();
            return Ok(());
        }

        inner.pending.record(&blocks);

        debug!(
            count = blocks.len(),
            prev,
            branch_count = inner.fork.branch_count,
            publish_cursor = inner.fork.publish_cursor,
            "observed external blocks"
        );

        match prev {
            i64::MIN..=0 => inner.adopt(&blocks)?,
            1 => {
                if let Some(head) = inner.private.head() {
                    info!(block = %head.id, "matching public head");
                    inner.publish(&head);
                    inner.fork.publish_cursor = head.height + 1;
                }
            }
            2 => {
                info!("lead of two, releasing private branch");
                inner.publish_all();
                inner.fork.branch_count = 0;
            }
            _ => {
                let cursor = inner.fork.publish_cursor;
                match inner.private.block_at(cursor) {
                    Some(block) => {
                        inner.publish(&block);
                        inner.fork.publish_cursor += 1;
                    }
                    None => warn!(cursor, "no withheld block at publish cursor"),
                }
            }
        }

        inner.report();
        Ok(())
    }

    /// Returns the strategy this controller follows.
    pub fn strategy(&self) -> Strategy {
        self.inner.lock().strategy
    }

    /// Returns a copy of the current fork-race state.
    pub fn fork_state(&self) -> ForkState {
        self.inner.lock().fork
    }

    /// Private height minus public height.
    pub fn lead(&self) -> i64 {
        self.inner.lock().lead()
    }

    pub fn public_height(&self) -> u64 {
        self.inner.lock().public.height()
    }

    pub fn private_height(&self) -> u64 {
        self.inner.lock().private.height()
    }

    /// Returns the block that newly mined work should extend: the private
    /// head when withholding, the public head otherwise.
    pub fn mining_base(&self) -> Option<Block> {
        let inner = self.inner.lock();
        if inner.strategy.withholds() {
            inner.private.head()
        } else {
            inner.public.head()
        }
    }

    /// Runs `f` against the public ledger while holding the controller lock.
    ///
    /// The lock is not reentrant: calling any method of this controller
    /// from within `f` deadlocks.
    pub fn with_public<R>(&self, f: impl FnOnce(&dyn Ledger) -> R) -> R {
        f(&*self.inner.lock().public)
    }

    /// Runs `f` against the private ledger while holding the controller lock.
    ///
    /// The lock is not reentrant: calling any method of this controller
    /// from within `f` deadlocks.
    pub fn with_private<R>(&self, f: impl FnOnce(&dyn Ledger) -> R) -> R {
        f(&*self.inner.lock().private)
    }
}

impl Clone for StrategyController {
    fn clone(&self) -> Self {
        StrategyController { inner: Mutex::new(self.inner.lock().clone()) }
    }
}

impl Inner {
    #[inline]
    fn lead(&self) -> i64 {
        self.private.height() as i64 - self.public.height() as i64
    }

    /// Discards the private branch and mirrors the public ledger.
    ///
    /// Only the entries the public ledger gained since the last adoption
    /// are imported; the prefix both ledgers share is kept.
    fn adopt(&mut self, observed: &[Block]) -> Result<(), ControllerError> {
        let PendingImports { shared, entries } = &mut self.pending;
        if let Err(e) = self.private.rebase(*shared, &entries[..]) {
            error!(error = %e, "failed to adopt public ledger");
            return Err(ControllerError::Adoption(e));
        }

        debug!(kept = *shared, imported = entries.len(), "imported public entries");
        *shared += entries.len();
        entries.clear();

        self.fork.branch_count = 0;
        self.fork.publish_cursor = self.private.height() + 1;
        info!(height = self.private.height(), "adopted public ledger");

        // Peers eclipsed from the sender still need these
        for block in observed {
            self.publish(block);
        }

        Ok(())
    }

    /// Releases every withheld block from the publish cursor through the
    /// private head.
    fn publish_all(&mut self) {
        let head = self.private.height();
        for height in self.fork.publish_cursor..=head {
            match self.private.block_at(height) {
                Some(block) => self.publish(&block),
                None => warn!(height, "missing private block during release"),
            }
        }

        self.fork.publish_cursor = head + 1;
    }

    /// Makes `block` part of the public ledger, then broadcasts it. Blocks
    /// the public ledger already holds are only broadcast.
    fn publish(&mut self, block: &Block) {
        if !self.public.contains(block.id) {
            if let Err(e) = self.public.append(&[block.clone()], None) {
                warn!(block = %block.id, error = %e, "failed to publish block");
                return;
            }
            self.pending.record(std::slice::from_ref(block));
        }

        self.broadcast(block);
    }

    fn broadcast(&mut self, block: &Block) {
        if let Err(e) = self.bus.publish(block) {
            warn!(block = %block.id, error = %e, "broadcast failed");
        }
        self.bus.notify_mined(block);
    }

    /// Logs both ledger heights and the local miner's share of the public
    /// canonical chain.
    fn report(&self) {
        if !tracing::enabled!(Level::INFO) {
            return;
        }

        info!(
            public_height = self.public.height(),
            private_height = self.private.height(),
            own_blocks = self.own_blocks(),
            "chain summary"
        );
    }

    /// Number of the local miner's blocks on the public canonical chain.
    fn own_blocks(&self) -> Option<usize> {
        self.miner.map(|miner| {
            self.public
                .canonical_chain()
                .iter()
                .filter(|block| block.miner == miner)
                .count()
        })
    }
}

impl PendingImports {
    fn record(&mut self, blocks: &[Block]) {
        self.entries.extend(
            blocks
                .iter()
                .map(|block| LedgerEntry { block: block.clone(), execution: None }),
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use proptest::{
        prop_assert, prop_assert_eq, prop_oneof, proptest,
        strategy::{Just, Strategy as _},
    };

    use super::*;
    use crate::{
        block::{BlockId, MinerId},
        broadcast::RecordingBus,
        ledger::MemoryLedger,
    };

    const ATTACKER: MinerId = MinerId(1);
    const HONEST: MinerId = MinerId(2);

    struct Harness {
        controller: StrategyController,
        bus: RecordingBus,
        next_id: u64,
    }

    impl Harness {
        fn new(strategy: Strategy) -> Self {
            Self::with_ledgers(
                strategy,
                MemoryLedger::with_genesis(),
                None::<MemoryLedger>,
            )
        }

        fn with_ledgers<P: Ledger + 'static>(
            strategy: Strategy,
            public: MemoryLedger,
            private: Option<P>,
        ) -> Self {
            let bus = RecordingBus::new();
            let mut builder = StrategyController::builder()
                .strategy(strategy)
                .public_ledger(public)
                .broadcast(bus.clone());
            if let Some(private) = private {
                builder = builder.private_ledger(private);
            }

            Harness {
                controller: builder.build().unwrap(),
                bus,
                next_id: 100,
            }
        }

        fn id(&mut self) -> BlockId {
            self.next_id += 1;
            self.next_id.into()
        }

        fn mine(&mut self) -> Block {
            let base = self.controller.mining_base().unwrap();
            let block = base.child(self.id(), ATTACKER);
            self.controller
                .on_self_mined_block(block.clone(), ExecutionResult::default())
                .unwrap();
            block
        }

        fn observe(&mut self) -> Block {
            let head = self.controller.with_public(|l| l.head()).unwrap();
            let block = head.child(self.id(), HONEST);
            self.controller
                .on_external_blocks_observed(vec![block.clone()])
                .unwrap();
            block
        }
    }

    #[test]
    fn honest_commits_and_publishes_immediately() {
        let bus = RecordingBus::new();
        let controller = StrategyController::builder()
            .public_ledger(MemoryLedger::new())
            .private_ledger(MemoryLedger::new())
            .broadcast(bus.clone())
            .build()
            .unwrap();
        let block = Block::new(1.into(), None, 5, ATTACKER);

        controller
            .on_self_mined_block(block.clone(), ExecutionResult::default())
            .unwrap();

        assert_eq!(controller.public_height(), 5);
        assert_eq!(bus.notified(), vec![block.id]);
        assert_eq!(bus.published(), vec![block.id]);
        assert!(controller.with_private(|l| l.entries().is_empty()));
    }

    #[test]
    fn honest_never_touches_private_state() {
        let mut h = Harness::new(Strategy::Honest);
        let before = h.controller.fork_state();
        let private_before = h.controller.with_private(|l| l.entries());

        for round in 0..10 {
            if round % 3 == 0 {
                h.observe();
            } else {
                h.mine();
            }
        }

        assert_eq!(h.controller.fork_state(), before);
        assert_eq!(h.controller.with_private(|l| l.entries()), private_before);
        assert_eq!(h.controller.public_height(), 10);
    }

    #[test]
    fn first_withheld_block_is_not_published() {
        let mut h = Harness::new(Strategy::SelfishNoUncles);

        h.mine();

        let fork = h.controller.fork_state();
        assert_eq!(fork.branch_count, 1);
        assert_eq!(fork.publish_cursor, 1);
        assert_eq!(h.controller.lead(), 1);
        assert!(h.bus.events().is_empty());
    }

    #[test]
    fn winning_tied_race_releases_branch() {
        let mut h = Harness::new(Strategy::SelfishNoUncles);
        let first = h.mine();
        h.observe();
        h.bus.clear();

        let second = h.mine();

        assert_eq!(second.parent, Some(first.id));
        assert_eq!(h.bus.published(), vec![second.id]);
        assert_eq!(h.controller.fork_state().branch_count, 0);
        assert_eq!(h.controller.fork_state().publish_cursor, 3);
        assert_eq!(h.controller.with_public(|l| l.block_at(1)), Some(first));
        assert_eq!(h.controller.with_public(|l| l.head()), Some(second));
    }

    #[test]
    fn growing_lead_keeps_withholding() {
        let mut h = Harness::new(Strategy::SelfishOwnUncles);

        h.mine();
        h.mine();

        assert_eq!(h.controller.fork_state().branch_count, 2);
        assert_eq!(h.controller.lead(), 2);
        assert!(h.bus.events().is_empty());
    }

    #[test]
    fn lead_of_one_matches_with_private_head() {
        let mut h = Harness::new(Strategy::SelfishNoUncles);
        let mined = h.mine();
        let cursor = h.controller.fork_state().publish_cursor;

        let honest = h.observe();

        assert_eq!(h.bus.published(), vec![mined.id]);
        assert_eq!(h.controller.fork_state().publish_cursor, cursor + 1);
        assert_eq!(h.controller.fork_state().branch_count, 1);
        // The first-seen block keeps the public head
        assert_eq!(h.controller.with_public(|l| l.head()), Some(honest));
        assert_eq!(h.controller.with_public(|l| l.tip().len()), 2);
    }

    #[test]
    fn lead_of_two_releases_everything() {
        let mut h = Harness::new(Strategy::SelfishAllUncles);
        let a = h.mine();
        let b = h.mine();

        h.observe();

        assert_eq!(h.bus.published(), vec![a.id, b.id]);
        assert_eq!(h.bus.notified(), vec![a.id, b.id]);
        let fork = h.controller.fork_state();
        assert_eq!(fork.branch_count, 0);
        assert_eq!(fork.publish_cursor, 3);
        assert_eq!(h.controller.with_public(|l| l.head()), Some(b));
        assert_eq!(h.controller.lead(), 0);
    }

    #[test]
    fn large_lead_releases_one_block() {
        let mut h = Harness::new(Strategy::SelfishNoUncles);
        let mined: Vec<_> = (0..5).map(|_| h.mine()).collect();
        assert_eq!(h.controller.lead(), 5);
        let before = h.controller.fork_state();

        h.observe();

        assert_eq!(h.bus.published(), vec![mined[0].id]);
        let after = h.controller.fork_state();
        assert_eq!(after.publish_cursor, before.publish_cursor + 1);
        assert_eq!(after.branch_count, before.branch_count);
        assert_eq!(h.controller.lead(), 4);
    }

    #[test]
    fn trickle_then_full_release() {
        let mut h = Harness::new(Strategy::SelfishNoUncles);
        let mined: Vec<_> = (0..4).map(|_| h.mine()).collect();

        h.observe(); // prev = 4
        h.observe(); // prev = 3
        h.observe(); // prev = 2

        assert_eq!(
            h.bus.published(),
            mined.iter().map(|b| b.id).collect::<Vec<_>>()
        );
        assert_eq!(h.controller.fork_state().publish_cursor, 5);
        assert_eq!(h.controller.with_public(|l| l.head()), mined.last().cloned());
    }

    #[test]
    fn losing_race_adopts_public_ledger() {
        let mut public = MemoryLedger::with_genesis();
        let genesis = public.head().unwrap();
        let first = genesis.child(1.into(), HONEST);
        public.append(&[first.clone()], None).unwrap();

        let mut h = Harness::with_ledgers(
            Strategy::SelfishNoUncles,
            public,
            Some(MemoryLedger::with_genesis()),
        );
        assert_eq!(h.controller.lead(), -1);

        let observed = h.observe();

        assert_eq!(
            h.controller.with_private(|l| l.entries()),
            h.controller.with_public(|l| l.entries())
        );
        let fork = h.controller.fork_state();
        assert_eq!(fork.branch_count, 0);
        assert_eq!(fork.publish_cursor, h.controller.public_height() + 1);
        assert_eq!(h.bus.published(), vec![observed.id]);
    }

    #[test]
    fn tie_without_private_branch_adopts() {
        let mut h = Harness::new(Strategy::SelfishNoUncles);

        let observed = h.observe();

        assert_eq!(h.controller.private_height(), 1);
        assert_eq!(h.controller.mining_base(), Some(observed.clone()));
        assert_eq!(h.controller.fork_state().publish_cursor, 2);
        assert_eq!(h.bus.notified(), vec![observed.id]);
    }

    #[test]
    fn abandoned_branch_is_dropped() {
        let mut h = Harness::new(Strategy::SelfishNoUncles);
        let mined = h.mine();
        h.observe(); // match
        let winner = h.observe(); // honest branch pulls ahead

        assert!(!h.controller.with_private(|l| l.canonical_chain().contains(&mined)));
        assert_eq!(h.controller.mining_base(), Some(winner));
        assert_eq!(h.controller.fork_state().branch_count, 0);
    }

    #[test]
    fn batches_are_judged_by_lead_before_commit() {
        let mut h = Harness::new(Strategy::SelfishNoUncles);
        let mined: Vec<_> = (0..4).map(|_| h.mine()).collect();
        let genesis = h.controller.with_public(|l| l.head()).unwrap();
        let a = genesis.child(h.id(), HONEST);
        let b = a.child(h.id(), HONEST);

        h.controller.on_external_blocks_observed(vec![a, b]).unwrap();

        assert_eq!(h.bus.published(), vec![mined[0].id]);
        assert_eq!(h.controller.fork_state().publish_cursor, 2);
    }

    #[test]
    fn resubmitted_batch_is_rejected() {
        let mut h = Harness::new(Strategy::SelfishNoUncles);
        (0..3).for_each(|_| {
            h.mine();
        });
        let observed = h.observe();
        let before = h.controller.fork_state();
        let heights = (h.controller.public_height(), h.controller.private_height());

        let err = h
            .controller
            .on_external_blocks_observed(vec![observed.clone()])
            .unwrap_err();

        assert!(matches!(
            err,
            ControllerError::CommitFailure(LedgerError::DuplicateBlock(id)) if id == observed.id
        ));
        assert_eq!(h.controller.fork_state(), before);
        assert_eq!(
            (h.controller.public_height(), h.controller.private_height()),
            heights
        );
    }

    #[test]
    fn failed_self_commit_changes_nothing() {
        let mut h = Harness::new(Strategy::SelfishNoUncles);
        h.mine();
        let before = h.controller.fork_state();
        let orphan = Block::new(h.id(), Some(999.into()), 2, ATTACKER);

        let result = h
            .controller
            .on_self_mined_block(orphan, ExecutionResult::default());

        assert!(matches!(result, Err(ControllerError::CommitFailure(_))));
        assert_eq!(h.controller.fork_state(), before);
        assert_eq!(h.controller.private_height(), 1);
    }

    #[test]
    fn empty_batch_is_a_commit_failure() {
        let h = Harness::new(Strategy::SelfishNoUncles);

        let result = h.controller.on_external_blocks_observed(vec![]);

        assert!(matches!(
            result,
            Err(ControllerError::CommitFailure(LedgerError::EmptyBatch))
        ));
    }

    #[test]
    fn broadcast_failure_is_not_fatal() {
        let bus = RecordingBus::failing();
        let controller = StrategyController::builder()
            .strategy(Strategy::SelfishNoUncles)
            .public_ledger(MemoryLedger::with_genesis())
            .broadcast(bus.clone())
            .build()
            .unwrap();
        let genesis = controller.mining_base().unwrap();
        let a = genesis.child(1.into(), ATTACKER);
        let b = a.child(2.into(), ATTACKER);
        controller.on_self_mined_block(a.clone(), ExecutionResult::default()).unwrap();
        controller.on_self_mined_block(b.clone(), ExecutionResult::default()).unwrap();

        controller
            .on_external_blocks_observed(vec![genesis.child(3.into(), HONEST)])
            .unwrap();

        assert!(bus.published().is_empty());
        assert_eq!(bus.notified(), vec![a.id, b.id]);
        assert_eq!(controller.with_public(|l| l.head()), Some(b));
        assert_eq!(controller.fork_state().publish_cursor, 3);
    }

    #[test]
    fn rejected_publish_is_not_broadcast() {
        let mut h = Harness::new(Strategy::SelfishNoUncles);
        let mined: Vec<_> = (0..4).map(|_| h.mine()).collect();
        h.observe(); // prev = 4
        let head = h.controller.with_public(|l| l.head()).unwrap();
        let a = head.child(h.id(), HONEST);
        let b = a.child(h.id(), HONEST);
        h.controller.on_external_blocks_observed(vec![a, b]).unwrap(); // prev = 3
        assert_eq!(h.controller.lead(), 1);
        h.bus.clear();

        // The private head's parent is still withheld, so the public ledger
        // refuses it
        h.observe();

        assert!(h.bus.events().is_empty());
        assert!(!h.controller.with_public(|l| l.contains(mined[3].id)));
        assert!(!h.controller.with_public(|l| l.contains(mined[2].id)));
        let fork = h.controller.fork_state();
        assert_eq!(fork.publish_cursor, mined[3].height + 1);
        assert_eq!(fork.branch_count, 4);
    }

    /// Counts the entries written to it by adoption, or refuses every
    /// rebase.
    #[derive(Debug, Clone)]
    struct CountingLedger {
        inner: MemoryLedger,
        imported: Arc<AtomicUsize>,
        refuse: bool,
    }

    impl Ledger for CountingLedger {
        fn height(&self) -> u64 {
            self.inner.height()
        }

        fn block_at(&self, height: u64) -> Option<Block> {
            self.inner.block_at(height)
        }

        fn contains(&self, id: BlockId) -> bool {
            self.inner.contains(id)
        }

        fn tip(&self) -> Vec<Block> {
            self.inner.tip()
        }

        fn entries(&self) -> Vec<LedgerEntry> {
            self.inner.entries()
        }

        fn append(
            &mut self,
            blocks: &[Block],
            execution: Option<ExecutionResult>,
        ) -> Result<usize, LedgerError> {
            self.inner.append(blocks, execution)
        }

        fn replace_with(&mut self, other: &dyn Ledger) -> Result<(), LedgerError> {
            self.imported.fetch_add(other.entries().len(), Ordering::Relaxed);
            self.inner.replace_with(other)
        }

        fn rebase(
            &mut self,
            keep: usize,
            imports: &[LedgerEntry],
        ) -> Result<(), LedgerError> {
            if self.refuse {
                return Err(LedgerError::EmptyBatch);
            }
            self.imported.fetch_add(imports.len(), Ordering::Relaxed);
            self.inner.rebase(keep, imports)
        }
    }

    #[test]
    fn adoption_imports_only_new_entries() {
        let imported = Arc::new(AtomicUsize::new(0));
        let private = CountingLedger {
            inner: MemoryLedger::with_genesis(),
            imported: Arc::clone(&imported),
            refuse: false,
        };
        let mut h = Harness::with_ledgers(
            Strategy::SelfishNoUncles,
            MemoryLedger::with_genesis(),
            Some(private),
        );

        for _ in 0..50 {
            h.observe();
        }
        assert_eq!(imported.load(Ordering::Relaxed), 50);

        let mined = h.mine();
        h.observe(); // match
        h.observe(); // adopt

        // Two observed blocks and the released one
        assert_eq!(imported.load(Ordering::Relaxed), 53);
        assert!(h.controller.with_private(|l| l.contains(mined.id)));
        assert_eq!(
            h.controller.with_private(|l| l.entries()),
            h.controller.with_public(|l| l.entries())
        );
    }

    #[test]
    fn failed_adoption_keeps_observed_blocks_public() {
        let private = CountingLedger {
            inner: MemoryLedger::with_genesis(),
            imported: Arc::new(AtomicUsize::new(0)),
            refuse: true,
        };
        let mut h = Harness::with_ledgers(
            Strategy::SelfishNoUncles,
            MemoryLedger::with_genesis(),
            Some(private),
        );
        let before = h.controller.fork_state();
        let genesis = h.controller.with_public(|l| l.head()).unwrap();
        let observed = genesis.child(h.id(), HONEST);

        let result = h.controller.on_external_blocks_observed(vec![observed.clone()]);

        assert!(matches!(result, Err(ControllerError::Adoption(_))));
        assert!(h.controller.with_public(|l| l.contains(observed.id)));
        assert_eq!(h.controller.private_height(), 0);
        assert_eq!(h.controller.fork_state(), before);
        assert!(h.bus.events().is_empty());
    }

    #[test]
    fn chain_summary_counts_local_blocks() {
        let controller = StrategyController::builder()
            .strategy(Strategy::SelfishNoUncles)
            .public_ledger(MemoryLedger::with_genesis())
            .broadcast(RecordingBus::new())
            .miner(ATTACKER)
            .build()
            .unwrap();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(Level::INFO)
            .with_test_writer()
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let genesis = controller.mining_base().unwrap();
            let a = genesis.child(1.into(), ATTACKER);
            let b = a.child(2.into(), ATTACKER);
            for block in [a, b] {
                controller
                    .on_self_mined_block(block, ExecutionResult::default())
                    .unwrap();
            }
            controller
                .on_external_blocks_observed(vec![genesis.child(3.into(), HONEST)])
                .unwrap();
        });

        assert_eq!(controller.inner.lock().own_blocks(), Some(2));
        let anonymous = Harness::new(Strategy::Honest);
        assert_eq!(anonymous.controller.inner.lock().own_blocks(), None);
    }

    #[test]
    fn clone_is_independent() {
        let mut h = Harness::new(Strategy::SelfishNoUncles);
        h.mine();
        let snapshot = h.controller.clone();

        h.mine();

        assert_eq!(snapshot.private_height(), 1);
        assert_eq!(h.controller.private_height(), 2);
    }

    #[test]
    fn concurrent_events_keep_cursor_in_range() {
        let controller = Arc::new(
            StrategyController::builder()
                .strategy(Strategy::SelfishNoUncles)
                .public_ledger(MemoryLedger::with_genesis())
                .broadcast(RecordingBus::new())
                .build()
                .unwrap(),
        );

        std::thread::scope(|s| {
            let miner = Arc::clone(&controller);
            s.spawn(move || {
                for id in 1_000..1_200u64 {
                    if let Some(base) = miner.mining_base() {
                        let block = base.child(id.into(), ATTACKER);
                        let _ = miner
                            .on_self_mined_block(block, ExecutionResult::default());
                    }
                }
            });

            let network = Arc::clone(&controller);
            s.spawn(move || {
                for id in 2_000..2_200u64 {
                    if let Some(head) = network.with_public(|l| l.head()) {
                        let block = head.child(id.into(), HONEST);
                        let _ = network.on_external_blocks_observed(vec![block]);
                    }
                }
            });
        });

        let fork = controller.fork_state();
        assert!(fork.publish_cursor <= controller.private_height() + 1);
    }

    #[derive(Debug, Clone)]
    enum Event {
        Mine,
        Observe(usize),
    }

    fn event() -> impl proptest::strategy::Strategy<Value = Event> {
        prop_oneof![Just(Event::Mine), (1usize..=3).prop_map(Event::Observe)]
    }

    proptest! {
        #[test]
        fn cursor_stays_in_range_and_never_decreases(
            events in proptest::collection::vec(event(), 1..60)
        ) {
            let mut h = Harness::new(Strategy::SelfishNoUncles);

            for event in events {
                let before = h.controller.fork_state().publish_cursor;
                match event {
                    Event::Mine => {
                        h.mine();
                    }
                    Event::Observe(n) => {
                        let mut parent =
                            h.controller.with_public(|l| l.head()).unwrap();
                        let mut batch = vec![];
                        for _ in 0..n {
                            let block = parent.child(h.id(), HONEST);
                            parent = block.clone();
                            batch.push(block);
                        }
                        h.controller.on_external_blocks_observed(batch).unwrap();
                    }
                }

                let fork = h.controller.fork_state();
                prop_assert!(fork.publish_cursor >= before);
                prop_assert!(
                    fork.publish_cursor <= h.controller.private_height() + 1
                );
            }
        }

        #[test]
        fn honest_ignores_fork_state(
            events in proptest::collection::vec(event(), 1..40)
        ) {
            let mut h = Harness::new(Strategy::Honest);
            let initial = h.controller.fork_state();

            for event in events {
                match event {
                    Event::Mine => {
                        h.mine();
                    }
                    Event::Observe(_) => {
                        h.observe();
                    }
                }
            }

            prop_assert_eq!(h.controller.fork_state(), initial);
            prop_assert_eq!(h.controller.private_height(), 0);
        }
    }
}
