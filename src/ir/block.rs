//! Basic blocks.

use std::fmt;

use crate::ir::NodeId;

/// Identifier of a block in a method's flow graph.
///
/// Blocks 0 and 1 are the graph's virtual entry and exit; real blocks start
/// at 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub(crate) u32);

impl BlockId {
    /// Raw index into the flow graph's block table.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block_{}", self.0)
    }
}

/// A basic block: an ordered list of tree roots plus its graph edges.
#[derive(Debug, Clone)]
pub struct Block {
    pub(crate) id: BlockId,
    /// Tree roots evaluated in order.
    pub trees: Vec<NodeId>,
    pub(crate) preds: Vec<BlockId>,
    pub(crate) succs: Vec<BlockId>,
    /// Estimated execution frequency; negative until computed.
    pub(crate) frequency: i32,
    pub(crate) removed: bool,
    /// When this block is a fall-through extension, the head of its
    /// extended block.
    pub(crate) extension_of: Option<BlockId>,
}

impl Block {
    pub(crate) fn new(id: BlockId) -> Self {
        Self {
            id,
            trees: Vec::new(),
            preds: Vec::new(),
            succs: Vec::new(),
            frequency: -1,
            removed: false,
            extension_of: None,
        }
    }

    /// This block's identifier.
    #[must_use]
    pub fn id(&self) -> BlockId {
        self.id
    }

    /// Successor blocks.
    #[must_use]
    pub fn successors(&self) -> &[BlockId] {
        &self.succs
    }

    /// Predecessor blocks.
    #[must_use]
    pub fn predecessors(&self) -> &[BlockId] {
        &self.preds
    }

    /// Estimated execution frequency, or a negative value if frequencies
    /// have not been computed for this flow graph.
    #[must_use]
    pub fn frequency(&self) -> i32 {
        self.frequency
    }

    /// Has this block been removed from the flow graph?
    #[must_use]
    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// Is this block the head of its extended block?
    #[must_use]
    pub fn is_extension_start(&self) -> bool {
        self.extension_of.is_none()
    }
}
