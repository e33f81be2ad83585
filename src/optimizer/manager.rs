//! Per-optimization managers and the request table.
//!
//! A manager carries one optimization's static configuration (capability
//! flags, factory or sub-strategy) plus the small amount of per-compilation
//! state owned by the driver: the last-run marker, the trace flag and the
//! enabled-blocks dispatch latch. The *requested* state — the flag and the
//! per-block set that earlier passes use to enqueue follow-on work — lives
//! in a separate [`RequestTable`] so a running pass can request other
//! optimizations without aliasing the manager being driven.

use std::collections::BTreeSet;

use bitflags::bitflags;
use strum::EnumCount;

use crate::ir::{BlockId, Cfg};
use crate::optimizer::pass::PassFactory;
use crate::optimizer::strategy::Strategy;
use crate::optimizer::OptId;

bitflags! {
    /// Capability flags declared by an optimization.
    ///
    /// The driver reads these to decide which analyses to materialize
    /// before the pass runs and which caches survive it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OptCaps: u32 {
        /// The pass needs the structure tree.
        const REQUIRES_STRUCTURE = 1 << 0;
        /// The pass needs use-def info with at least local coverage.
        const REQUIRES_LOCAL_USE_DEFS = 1 << 1;
        /// The pass needs use-def info with global coverage.
        const REQUIRES_GLOBAL_USE_DEFS = 1 << 2;
        /// A local build should attempt global coverage when cheap.
        const PREFERS_GLOBAL_USE_DEFS = 1 << 3;
        /// The pass needs value numbers with at least local coverage.
        const REQUIRES_LOCAL_VALUE_NUMBERS = 1 << 4;
        /// The pass needs value numbers with global coverage.
        const REQUIRES_GLOBAL_VALUE_NUMBERS = 1 << 5;
        /// A local build should attempt global coverage when cheap.
        const PREFERS_GLOBAL_VALUE_NUMBERS = 1 << 6;
        /// A locals-only use-def cache is worth discarding to get a global
        /// one for this pass.
        const STRONGLY_PREFERS_GLOBAL_VALUE_NUMBERS = 1 << 7;
        /// The pass repairs use-def info as it transforms.
        const MAINTAINS_USE_DEFS = 1 << 8;
        /// The pass tolerates stale or missing alias classes.
        const DOES_NOT_REQUIRE_ALIAS_SETS = 1 << 9;
        /// The pass never looks at the trees (block-shape work only).
        const DOES_NOT_REQUIRE_TREES = 1 << 16;
        /// Use-def info must treat loads as definitions.
        const LOADS_AS_DEFS = 1 << 10;
        /// Use-def info must keep defs that have no uses.
        const CANNOT_OMIT_TRIVIAL_DEFS = 1 << 11;
        /// The pass tolerates IL-generation-level trees.
        const SUPPORTS_ILGEN_OPT_LEVEL = 1 << 12;
        /// Do not compute block frequencies on this pass's behalf.
        const DO_NOT_SET_FREQUENCIES = 1 << 13;
        /// The pass may create symbol references.
        const CAN_ADD_SYMREFS = 1 << 14;
        /// The pass budgets by tree size and needs an exact node count.
        const REQUIRES_ACCURATE_NODE_COUNT = 1 << 15;
    }
}

/// One optimization's configuration and driver-owned state.
#[derive(Debug)]
pub struct OptimizationManager {
    id: OptId,
    caps: OptCaps,
    factory: Option<PassFactory>,
    group: Option<Strategy>,
    enabled: bool,
    last_run: bool,
    trace: bool,
    perform_only_on_enabled_blocks: bool,
}

impl OptimizationManager {
    /// Creates the manager for `id` from the static tables.
    #[must_use]
    pub fn new(id: OptId) -> Self {
        Self {
            id,
            caps: id.default_caps(),
            factory: id.factory(),
            group: id.group_strategy(),
            enabled: true,
            last_run: false,
            trace: false,
            perform_only_on_enabled_blocks: false,
        }
    }

    /// The managed optimization.
    #[must_use]
    pub fn id(&self) -> OptId {
        self.id
    }

    /// The optimization's name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.id.name()
    }

    /// Capability flags.
    #[must_use]
    pub fn caps(&self) -> OptCaps {
        self.caps
    }

    /// Replaces the capability flags (embedder customization point).
    pub fn set_caps(&mut self, caps: OptCaps) {
        self.caps = caps;
    }

    /// The pass factory, when this is a primitive optimization.
    #[must_use]
    pub fn factory(&self) -> Option<PassFactory> {
        self.factory
    }

    /// Replaces the pass factory (embedder customization point).
    pub fn set_factory(&mut self, factory: PassFactory) {
        self.factory = Some(factory);
    }

    /// The sub-strategy, when this is a group.
    #[must_use]
    pub fn group(&self) -> Option<Strategy> {
        self.group
    }

    /// Is this optimization enabled at all?
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Enables or disables the optimization outright.
    pub fn set_enabled(&mut self, value: bool) {
        self.enabled = value;
    }

    /// Has the last-run marker been set?
    #[must_use]
    pub fn last_run(&self) -> bool {
        self.last_run
    }

    pub(crate) fn set_last_run(&mut self, value: bool) {
        self.last_run = value;
    }

    /// Is tracing forced on for this optimization?
    #[must_use]
    pub fn trace(&self) -> bool {
        self.trace
    }

    pub(crate) fn set_trace(&mut self, value: bool) {
        self.trace = value;
    }

    pub(crate) fn perform_only_on_enabled_blocks(&self) -> bool {
        self.perform_only_on_enabled_blocks
    }

    pub(crate) fn set_perform_only_on_enabled_blocks(&mut self, value: bool) {
        self.perform_only_on_enabled_blocks = value;
    }
}

#[derive(Debug, Default, Clone)]
struct RequestEntry {
    requested: bool,
    blocks: BTreeSet<BlockId>,
}

/// Requested state per optimization: the flag plus the per-block set.
///
/// Passes append to it through their [`crate::optimizer::PassContext`];
/// the driver consumes it during guard evaluation and per-block dispatch.
#[derive(Debug)]
pub struct RequestTable {
    entries: Vec<RequestEntry>,
}

impl Default for RequestTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestTable {
    /// Creates a table with every optimization unrequested.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: vec![RequestEntry::default(); OptId::COUNT],
        }
    }

    /// Requests a whole-method run of `opt`.
    pub fn request(&mut self, opt: OptId) {
        let entry = &mut self.entries[opt as usize];
        entry.requested = true;
        // A block-less request runs whole-method; the virtual entry block
        // marks it so the dispatcher can tell the two modes apart.
        entry.blocks.insert(Cfg::ENTRY);
    }

    /// Requests a run of `opt` on `block`.
    pub fn request_on_block(&mut self, opt: OptId, block: BlockId) {
        let entry = &mut self.entries[opt as usize];
        entry.requested = true;
        entry.blocks.insert(block);
    }

    /// Clears the flag and the block set.
    pub fn clear(&mut self, opt: OptId) {
        let entry = &mut self.entries[opt as usize];
        entry.requested = false;
        entry.blocks.clear();
    }

    /// Is `opt` requested?
    #[must_use]
    pub fn is_requested(&self, opt: OptId) -> bool {
        self.entries[opt as usize].requested
    }

    /// The blocks requested for `opt`.
    #[must_use]
    pub fn blocks(&self, opt: OptId) -> &BTreeSet<BlockId> {
        &self.entries[opt as usize].blocks
    }

    /// Does `opt` have requested blocks?
    #[must_use]
    pub fn has_blocks(&self, opt: OptId) -> bool {
        !self.entries[opt as usize].blocks.is_empty()
    }

    /// Drains the requested blocks of `opt` in block order.
    pub fn take_blocks(&mut self, opt: OptId) -> Vec<BlockId> {
        std::mem::take(&mut self.entries[opt as usize].blocks)
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_and_drain() {
        let mut table = RequestTable::new();
        assert!(!table.is_requested(OptId::LocalCSE));
        table.request_on_block(OptId::LocalCSE, BlockId(2));
        table.request_on_block(OptId::LocalCSE, BlockId(4));
        assert!(table.is_requested(OptId::LocalCSE));
        assert_eq!(table.take_blocks(OptId::LocalCSE), vec![BlockId(2), BlockId(4)]);
        assert!(!table.has_blocks(OptId::LocalCSE));
        // the flag survives a drain; clearing is explicit
        assert!(table.is_requested(OptId::LocalCSE));
        table.clear(OptId::LocalCSE);
        assert!(!table.is_requested(OptId::LocalCSE));
    }
}
