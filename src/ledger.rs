/*!
Height-indexed block ledgers

A [`Ledger`] is the controller's view of one chain. Each controller owns two
of them: the *public* ledger mirrors what the network has seen, and the
*private* ledger holds the branch a withholding miner works on.

Ledgers are append-only. Blocks are discarded only by
[`Ledger::replace_with`], which swaps the entire contents for a copy of
another ledger, and [`Ledger::rebase`], which drops everything appended after
a given entry and imports a list of entries in its place.
*/

pub mod memory;

pub use memory::MemoryLedger;

use std::fmt::Debug;

use dyn_clone::DynClone;

use crate::block::{Block, BlockId, ExecutionResult};

/// A block together with the execution output it was committed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub block: Block,
    /// `Some` only for blocks committed by the local miner.
    pub execution: Option<ExecutionResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("cannot append an empty batch of blocks")]
    EmptyBatch,
    #[error("batch heights are not strictly increasing at block {0}")]
    NotAscending(BlockId),
    #[error("block {0} already exists in this ledger")]
    DuplicateBlock(BlockId),
    #[error("block {0} does not name a parent block")]
    NoParentGiven(BlockId),
    #[error("parent of block {0} was not found in this ledger")]
    ParentNotFound(BlockId),
    #[error("block {id} has height {found}, expected {expected}")]
    HeightMismatch { id: BlockId, expected: u64, found: u64 },
}

/// Append-only, height-indexed view of a chain.
///
/// Heights returned by [`Ledger::height`] and accepted by
/// [`Ledger::block_at`] refer to the *canonical* chain, which ends at the
/// earliest appended block of maximum height.
pub trait Ledger: Debug + DynClone + Send {
    /// Height of the canonical head, or 0 if the ledger is empty.
    fn height(&self) -> u64;

    /// Returns the canonical-chain block at `height`, if one exists.
    fn block_at(&self, height: u64) -> Option<Block>;

    /// Returns true iff a block with the given ID has been appended.
    fn contains(&self, id: BlockId) -> bool;

    /// Returns every block of maximum height, in the order they were
    /// appended.
    fn tip(&self) -> Vec<Block>;

    /// Returns every entry of the ledger in the order it was appended.
    fn entries(&self) -> Vec<LedgerEntry>;

    /// Atomically appends `blocks` in order, returning the number appended.
    ///
    /// Either every block is accepted or the ledger is left unchanged.
    /// `execution` is stored with the last block of the batch.
    fn append(
        &mut self,
        blocks: &[Block],
        execution: Option<ExecutionResult>,
    ) -> Result<usize, LedgerError>;

    /// Atomically replaces the contents of this ledger with a copy of
    /// `other`'s contents.
    fn replace_with(&mut self, other: &dyn Ledger) -> Result<(), LedgerError>;

    /// Atomically keeps the first `keep` appended entries, drops every
    /// later one, then appends `imports` in order.
    ///
    /// Unlike [`Ledger::append`], imports need not be ascending in height:
    /// they may span several forks. Each import must link to a kept entry
    /// or an earlier import, one height above its parent.
    fn rebase(
        &mut self,
        keep: usize,
        imports: &[LedgerEntry],
    ) -> Result<(), LedgerError>;

    /// Returns the canonical chain from the lowest held height to the head.
    fn canonical_chain(&self) -> Vec<Block> {
        let head = self.height();
        let mut chain: Vec<_> = (0..=head)
            .rev()
            .map_while(|height| self.block_at(height))
            .collect();

        chain.reverse();
        chain
    }

    /// Returns the canonical head block.
    #[inline]
    fn head(&self) -> Option<Block> {
        self.block_at(self.height())
    }
}

dyn_clone::clone_trait_object!(Ledger);
