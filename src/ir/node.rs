//! Expression tree nodes and the per-method node pool.
//!
//! Nodes live in a slot pool owned by the method. Identifiers are stable
//! across mutation; deleting a node frees its slot for reuse. Passes rewrite
//! trees in place (for example constant folding replaces an `IAdd` node's
//! opcode with `IConst`), which strands child nodes — the pool's mark/sweep
//! [`NodePool::remove_dead_nodes`] reclaims them between strategy steps.

use std::fmt;

use crate::ir::SymRefId;

/// Identifier of a node in a method's [`NodePool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Raw pool index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Operation performed by a [`Node`].
///
/// The set is intentionally small: integer constants and arithmetic, loads
/// and stores through symbol references, tree anchors and returns. Control
/// flow is expressed by block edges, not by nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// Integer constant.
    IConst(i64),
    /// Integer addition of the two children.
    IAdd,
    /// Integer subtraction of the two children.
    ISub,
    /// Integer multiplication of the two children.
    IMul,
    /// Load of the named storage location.
    ILoad(SymRefId),
    /// Store of the single child into the named storage location.
    IStore(SymRefId),
    /// Anchor evaluating its child for side effects only.
    Treetop,
    /// Method return; the optional child is the returned value.
    Return,
}

impl Opcode {
    /// Is this an arithmetic opcode foldable over constant children?
    #[must_use]
    pub fn is_arithmetic(self) -> bool {
        matches!(self, Opcode::IAdd | Opcode::ISub | Opcode::IMul)
    }

    /// The constant carried by an `IConst`, if any.
    #[must_use]
    pub fn const_value(self) -> Option<i64> {
        match self {
            Opcode::IConst(v) => Some(v),
            _ => None,
        }
    }

    /// The symbol reference accessed by a load or store, if any.
    #[must_use]
    pub fn symref(self) -> Option<SymRefId> {
        match self {
            Opcode::ILoad(s) | Opcode::IStore(s) => Some(s),
            _ => None,
        }
    }
}

/// A single expression tree node.
#[derive(Debug, Clone)]
pub struct Node {
    /// The operation this node performs.
    pub opcode: Opcode,
    /// Child operands, outermost first.
    pub children: Vec<NodeId>,
    /// Visit stamp used by tree walkers; reset through the compilation.
    pub visit: u32,
}

/// Slot pool holding every node of one method.
///
/// `node_count` is the number of live slots; it is the quantity the driver
/// snapshots around each pass to decide whether value-number and use-def
/// information survived (nodes added invalidate both, subject to the pass's
/// `MAINTAINS_USE_DEFS` capability).
#[derive(Debug, Default)]
pub struct NodePool {
    slots: Vec<Option<Node>>,
    live: u32,
}

impl NodePool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a node, reusing a free slot when one exists.
    pub fn alloc(&mut self, opcode: Opcode, children: Vec<NodeId>) -> NodeId {
        let node = Node {
            opcode,
            children,
            visit: 0,
        };
        self.live += 1;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(node);
                return NodeId(index as u32);
            }
        }
        self.slots.push(Some(node));
        NodeId((self.slots.len() - 1) as u32)
    }

    /// Borrows a live node.
    ///
    /// # Panics
    ///
    /// Panics if `id` names a freed slot; node identifiers must not be held
    /// across a dead-node sweep.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        self.slots[id.index()].as_ref().expect("node is live")
    }

    /// Mutably borrows a live node.
    ///
    /// # Panics
    ///
    /// Panics if `id` names a freed slot.
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.slots[id.index()].as_mut().expect("node is live")
    }

    /// Number of live nodes.
    #[must_use]
    pub fn node_count(&self) -> u32 {
        self.live
    }

    /// Iterates the identifiers of all live nodes.
    pub fn live_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|_| NodeId(i as u32)))
    }

    /// Does the subtree rooted at `id` contain a store or return?
    #[must_use]
    pub fn subtree_has_side_effects(&self, id: NodeId) -> bool {
        let node = self.node(id);
        match node.opcode {
            Opcode::IStore(_) | Opcode::Return => true,
            _ => node
                .children
                .iter()
                .any(|&c| self.subtree_has_side_effects(c)),
        }
    }

    /// Sets every live node's visit stamp to `value`.
    pub fn reset_visits(&mut self, value: u32) {
        for slot in self.slots.iter_mut().flatten() {
            slot.visit = value;
        }
    }

    /// Frees every node not reachable from `roots`.
    ///
    /// Returns `true` if anything was freed. The driver runs this after each
    /// top-level strategy step and invalidates value-number info when it
    /// reports removals.
    pub fn remove_dead_nodes(&mut self, roots: impl Iterator<Item = NodeId>) -> bool {
        let mut marked = vec![false; self.slots.len()];
        let mut work: Vec<NodeId> = roots.collect();
        while let Some(id) = work.pop() {
            if marked[id.index()] {
                continue;
            }
            marked[id.index()] = true;
            work.extend(self.node(id).children.iter().copied());
        }

        let mut removed = false;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_some() && !marked[index] {
                *slot = None;
                self.live -= 1;
                removed = true;
            }
        }
        removed
    }

    /// Recounts live nodes reachable from `roots`, dropping the rest.
    ///
    /// This is the accurate-node-count service requested by passes carrying
    /// `REQUIRES_ACCURATE_NODE_COUNT`: an over-approximate count is fine for
    /// cache invalidation but not for passes budgeting by tree size.
    pub fn generate_accurate_node_count(&mut self, roots: impl Iterator<Item = NodeId>) -> u32 {
        self.remove_dead_nodes(roots);
        self.live
    }
}
