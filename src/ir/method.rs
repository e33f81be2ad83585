//! The method symbol: the unit of compilation.

use bitflags::bitflags;

use crate::ir::{BlockId, Cfg, NodeId, NodePool, Opcode, SymRefId, SymRefTable};

bitflags! {
    /// Shape properties of a method consulted by strategy guards.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MethodFlags: u32 {
        /// The method allocates heap objects.
        const HAS_NEWS = 1 << 0;
        /// The method may enter or exit monitors.
        const MAY_CONTAIN_MONITORS = 1 << 1;
        /// Escape analysis found candidate allocations.
        const HAS_ESCAPE_ANALYSIS_OPPORTUNITIES = 1 << 2;
        /// The method contains method-handle invocations.
        const HAS_METHOD_HANDLE_INVOKES = 1 << 3;
        /// The method uses the vector API.
        const HAS_VECTOR_API = 1 << 4;
    }
}

/// A method under compilation: its flow graph, node pool, symbol-reference
/// table and shape flags.
#[derive(Debug)]
pub struct Method {
    name: String,
    /// Shape flags consulted by guards such as `IfNews` or `IfMonitors`.
    pub flags: MethodFlags,
    /// The method's expression trees.
    pub pool: NodePool,
    /// The method's flow graph.
    pub cfg: Cfg,
    /// The method's symbol-reference table.
    pub symrefs: SymRefTable,
}

impl Method {
    /// Creates an empty method with the given diagnostic name.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            flags: MethodFlags::empty(),
            pool: NodePool::new(),
            cfg: Cfg::new(),
            symrefs: SymRefTable::new(),
        }
    }

    /// Diagnostic name of the method.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The method allocates heap objects.
    #[must_use]
    pub fn has_news(&self) -> bool {
        self.flags.contains(MethodFlags::HAS_NEWS)
    }

    /// The method may enter or exit monitors.
    #[must_use]
    pub fn may_contain_monitors(&self) -> bool {
        self.flags.contains(MethodFlags::MAY_CONTAIN_MONITORS)
    }

    /// Escape analysis found candidate allocations.
    #[must_use]
    pub fn has_escape_analysis_opportunities(&self) -> bool {
        self.flags
            .contains(MethodFlags::HAS_ESCAPE_ANALYSIS_OPPORTUNITIES)
    }

    /// The method contains method-handle invocations.
    #[must_use]
    pub fn has_method_handle_invokes(&self) -> bool {
        self.flags.contains(MethodFlags::HAS_METHOD_HANDLE_INVOKES)
    }

    /// The method uses the vector API.
    #[must_use]
    pub fn has_vector_api(&self) -> bool {
        self.flags.contains(MethodFlags::HAS_VECTOR_API)
    }

    /// Every tree root in block order; the root set for dead-node sweeps.
    pub fn tree_roots(&self) -> impl Iterator<Item = NodeId> + '_ {
        let mut roots = Vec::new();
        for block in self.cfg.live_blocks() {
            roots.extend(self.cfg.block(block).trees.iter().copied());
        }
        roots.into_iter()
    }

    /// Builds `store symref <- const value` as a new tree in `block`.
    ///
    /// A convenience for constructing test methods and IL-generation
    /// fixtures.
    pub fn append_const_store(&mut self, block: BlockId, symref: SymRefId, value: i64) -> NodeId {
        let constant = self.pool.alloc(Opcode::IConst(value), Vec::new());
        let store = self.pool.alloc(Opcode::IStore(symref), vec![constant]);
        self.cfg.block_mut(block).trees.push(store);
        store
    }

    /// Builds `store symref <- load other` as a new tree in `block`.
    pub fn append_copy(&mut self, block: BlockId, symref: SymRefId, from: SymRefId) -> NodeId {
        let load = self.pool.alloc(Opcode::ILoad(from), Vec::new());
        let store = self.pool.alloc(Opcode::IStore(symref), vec![load]);
        self.cfg.block_mut(block).trees.push(store);
        store
    }
}
