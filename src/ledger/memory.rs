//! In-memory ledger backed by a block tree

use std::collections::HashMap;

use crate::block::{Block, BlockId, ExecutionResult};

use super::{Ledger, LedgerEntry, LedgerError};

/// A [`Ledger`] which keeps every appended block in memory, including blocks
/// on forks. Blocks may share a height; the canonical chain ends at the
/// earliest appended block of maximum height.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    /// Map from the ID of a block to its associated data.
    blocks: HashMap<BlockId, BlockData>,
    /// Height of the root block. Meaningless while the ledger is empty.
    base_height: u64,
    /// IDs of all blocks, indexed by `height - base_height`, then by the
    /// order in which they were appended.
    blocks_by_height: Vec<Vec<BlockId>>,
    /// IDs of all blocks in the order in which they were appended.
    order: Vec<BlockId>,
}

/// A block and its associated metadata as held within a [`MemoryLedger`].
#[derive(Debug, Clone)]
struct BlockData {
    block: Block,
    execution: Option<ExecutionResult>,
    /// All blocks which directly point to `block`.
    children: Vec<BlockId>,
    /// Position of `block` in the append order.
    seq: usize,
}

impl MemoryLedger {
    /// Creates an empty ledger. The first block appended becomes its root.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a ledger whose root is a genesis block with ID 0 at height 0.
    pub fn with_genesis() -> Self {
        let mut ledger = Self::new();
        ledger.insert(Block::root(0.into(), 0), None);

        ledger
    }

    /// Returns true iff no block has been appended.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Total number of blocks held, on every fork.
    #[inline]
    pub fn num_blocks(&self) -> usize {
        self.order.len()
    }

    /// Returns the IDs of all blocks at `height`, in append order.
    pub fn at_height(&self, height: u64) -> &[BlockId] {
        height
            .checked_sub(self.base_height)
            .and_then(|idx| self.blocks_by_height.get(idx as usize))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Returns the IDs of the blocks which directly extend `id`.
    pub fn children_of(&self, id: BlockId) -> &[BlockId] {
        self.blocks
            .get(&id)
            .map(|data| data.children.as_slice())
            .unwrap_or_default()
    }

    /// Returns the execution output committed with block `id`, if any.
    pub fn execution_of(&self, id: BlockId) -> Option<&ExecutionResult> {
        self.blocks.get(&id).and_then(|data| data.execution.as_ref())
    }

    /// Returns the IDs of all blocks on the path from the root to `id`, in
    /// ascending order of height and including `id`.
    pub fn ancestors_of(&self, id: BlockId) -> Vec<BlockId> {
        let mut ancestors = vec![];

        let mut curr = Some(id);
        while let Some(block_id) = curr {
            match self.blocks.get(&block_id) {
                Some(data) => {
                    ancestors.push(block_id);
                    curr = data.block.parent;
                }
                None => break,
            }
        }

        ancestors.reverse();
        ancestors
    }

    fn head_id(&self) -> Option<BlockId> {
        self.blocks_by_height.last().and_then(|ids| ids.first()).copied()
    }

    /// Height of block `id` if it is one of the first `keep` blocks appended.
    fn kept_height(&self, id: BlockId, keep: usize) -> Option<u64> {
        self.blocks
            .get(&id)
            .filter(|data| data.seq < keep)
            .map(|data| data.block.height)
    }

    /// Checks that `blocks` can be appended as one batch.
    fn validate(&self, blocks: &[Block]) -> Result<(), LedgerError> {
        if blocks.is_empty() {
            return Err(LedgerError::EmptyBatch);
        }

        for pair in blocks.windows(2) {
            if pair[1].height <= pair[0].height {
                return Err(LedgerError::NotAscending(pair[1].id));
            }
        }

        self.check_links(self.order.len(), blocks)
    }

    /// Checks that `blocks` can be inserted in order on top of the first
    /// `keep` blocks of this ledger. Every block must be new, and must name
    /// a parent one height below it.
    fn check_links<'a, I>(&self, keep: usize, blocks: I) -> Result<(), LedgerError>
    where
        I: IntoIterator<Item = &'a Block>,
    {
        use LedgerError::*;

        let mut staged: HashMap<BlockId, u64> = HashMap::new();
        for block in blocks {
            if self.kept_height(block.id, keep).is_some()
                || staged.contains_key(&block.id)
            {
                return Err(DuplicateBlock(block.id));
            }

            // An empty ledger takes its first block as the root
            if keep > 0 || !staged.is_empty() {
                let parent = block.parent.ok_or(NoParentGiven(block.id))?;
                let parent_height = self
                    .kept_height(parent, keep)
                    .or_else(|| staged.get(&parent).copied())
                    .ok_or(ParentNotFound(block.id))?;

                if block.height != parent_height + 1 {
                    return Err(HeightMismatch {
                        id: block.id,
                        expected: parent_height + 1,
                        found: block.height,
                    });
                }
            }

            staged.insert(block.id, block.height);
        }

        Ok(())
    }

    /// Removes every block appended after the first `keep`.
    fn truncate(&mut self, keep: usize) {
        while self.order.len() > keep {
            let Some(id) = self.order.pop() else { break };
            let Some(data) = self.blocks.remove(&id) else { continue };

            if let Some(parent) = data.block.parent {
                if let Some(parent) = self.blocks.get_mut(&parent) {
                    parent.children.retain(|child| *child != id);
                }
            }

            let idx = (data.block.height - self.base_height) as usize;
            if let Some(ids) = self.blocks_by_height.get_mut(idx) {
                ids.retain(|other| *other != id);
            }
        }

        while self.blocks_by_height.last().is_some_and(Vec::is_empty) {
            self.blocks_by_height.pop();
        }
    }

    /// Inserts a block which has already been validated.
    fn insert(&mut self, block: Block, execution: Option<ExecutionResult>) {
        if self.is_empty() {
            self.base_height = block.height;
        }

        if let Some(parent) = block.parent {
            if let Some(data) = self.blocks.get_mut(&parent) {
                data.children.push(block.id);
            }
        }

        let idx = (block.height - self.base_height) as usize;
        match self.blocks_by_height.get_mut(idx) {
            Some(ids) => ids.push(block.id),
            None => {
                debug_assert_eq!(idx, self.blocks_by_height.len());
                self.blocks_by_height.push(vec![block.id]);
            }
        }

        let id = block.id;
        let seq = self.order.len();
        self.order.push(id);
        self.blocks.insert(id, BlockData { block, execution, children: vec![], seq });
    }
}

impl Ledger for MemoryLedger {
    fn height(&self) -> u64 {
        match self.blocks_by_height.len() {
            0 => 0,
            n => self.base_height + n as u64 - 1,
        }
    }

    fn block_at(&self, height: u64) -> Option<Block> {
        if height < self.base_height || height > self.height() {
            return None;
        }

        let mut curr = self.head_id()?;
        loop {
            let data = self.blocks.get(&curr)?;
            if data.block.height == height {
                return Some(data.block.clone());
            }
            curr = data.block.parent?;
        }
    }

    #[inline]
    fn contains(&self, id: BlockId) -> bool {
        self.blocks.contains_key(&id)
    }

    fn tip(&self) -> Vec<Block> {
        self.blocks_by_height
            .last()
            .map(|ids| ids.iter().map(|id| self.blocks[id].block.clone()).collect())
            .unwrap_or_default()
    }

    fn entries(&self) -> Vec<LedgerEntry> {
        self.order
            .iter()
            .map(|id| {
                let data = &self.blocks[id];
                LedgerEntry {
                    block: data.block.clone(),
                    execution: data.execution.clone(),
                }
            })
            .collect()
    }

    fn append(
        &mut self,
        blocks: &[Block],
        execution: Option<ExecutionResult>,
    ) -> Result<usize, LedgerError> {
        self.validate(blocks)?;

        let last = blocks.len() - 1;
        let mut execution = execution;
        for (i, block) in blocks.iter().enumerate() {
            let exec = if i == last { execution.take() } else { None };
            self.insert(block.clone(), exec);
        }

        Ok(blocks.len())
    }

    fn replace_with(&mut self, other: &dyn Ledger) -> Result<(), LedgerError> {
        let entries = other.entries();

        let mut fresh = MemoryLedger::new();
        fresh.check_links(0, entries.iter().map(|entry| &entry.block))?;
        for LedgerEntry { block, execution } in entries {
            fresh.insert(block, execution);
        }

        *self = fresh;
        Ok(())
    }

    fn rebase(
        &mut self,
        keep: usize,
        imports: &[LedgerEntry],
    ) -> Result<(), LedgerError> {
        let keep = keep.min(self.order.len());
        self.check_links(keep, imports.iter().map(|entry| &entry.block))?;

        self.truncate(keep);
        for entry in imports {
            self.insert(entry.block.clone(), entry.execution.clone());
        }

        Ok(())
    }

    fn canonical_chain(&self) -> Vec<Block> {
        self.head_id()
            .map(|head| {
                self.ancestors_of(head)
                    .into_iter()
                    .map(|id| self.blocks[&id].block.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}
