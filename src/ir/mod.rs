//! Compact reference IR driven by the optimizer.
//!
//! The pipeline consumes its program representation through a narrow query
//! surface: trees of typed operations, basic blocks holding tree roots, a
//! flow graph that knows about loops, frequencies and structure, and a
//! symbol-reference table with alias classes. This module supplies a small
//! but fully functional implementation of that surface.
//!
//! The representation is deliberately minimal — integer expression trees
//! over named storage locations — because the orchestrator's contract is
//! about *when* analyses are valid and *which* passes run, not about the
//! richness of the instruction set. Everything the driver queries
//! (`node_count`, `may_have_loops`, `set_frequencies`, `structure`,
//! `remove_unreachable_blocks`, visit counts, symref counts) is backed by
//! real bookkeeping here, so cache invalidation has observable effects.

mod block;
mod cfg;
mod method;
mod node;
mod structure;
mod symref;

pub use block::{Block, BlockId};
pub use cfg::Cfg;
pub use method::{Method, MethodFlags};
pub use node::{Node, NodeId, NodePool, Opcode};
pub use structure::{Region, Structure};
pub use symref::{AliasInfo, SymRef, SymRefId, SymRefTable, Symbol, SymbolId, SymbolKind};
