//! Blocks, identifiers, and execution output

/// A block as seen by the fork-race controller. Validation and execution
/// happen elsewhere; the controller only orders blocks by height.
#[derive(Debug, Clone)]
pub struct Block {
    /// Unique identifier of this block.
    pub id: BlockId,
    /// The block this block extends. `None` only for root blocks.
    pub parent: Option<BlockId>,
    /// Distance from the root of the chain this block was mined on.
    pub height: u64,
    /// The miner of this block.
    pub miner: MinerId,
}

/// A unique identifier assigned to each [`Block`].
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub struct BlockId(pub u64);

impl From<u64> for BlockId {
    fn from(value: u64) -> Self {
        BlockId(value)
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifies the producer of a block.
///
/// `MinerId(0)` is reserved for blocks whose producer is unknown, such as
/// roots of freshly created ledgers.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MinerId(pub usize);

impl MinerId {
    pub const UNKNOWN: MinerId = MinerId(0);

    /// Returns the [`usize`] corresponding to this [`MinerId`].
    pub fn get(&self) -> usize {
        self.0
    }
}

impl From<usize> for MinerId {
    fn from(value: usize) -> Self {
        MinerId(value)
    }
}

impl std::fmt::Display for MinerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl Block {
    pub fn new(
        id: BlockId,
        parent: Option<BlockId>,
        height: u64,
        miner: MinerId,
    ) -> Self {
        Block { id, parent, height, miner }
    }

    /// Creates a block with no parent. Only accepted by empty ledgers.
    pub fn root(id: BlockId, height: u64) -> Self {
        Block::new(id, None, height, MinerId::UNKNOWN)
    }

    /// Creates a block extending `self`.
    pub fn child(&self, id: BlockId, miner: MinerId) -> Self {
        Block::new(id, Some(self.id), self.height + 1, miner)
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Block {}

impl PartialOrd for Block {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Block {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

/// Result of executing one transaction of a locally mined block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Receipt {
    pub tx_index: usize,
    pub success: bool,
    pub gas_used: u64,
}

/// Execution output committed together with a locally mined block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    pub receipts: Vec<Receipt>,
    pub gas_used: u64,
}

impl ExecutionResult {
    pub fn new(receipts: Vec<Receipt>) -> Self {
        let gas_used = receipts.iter().map(|r| r.gas_used).sum();

        ExecutionResult { receipts, gas_used }
    }
}
