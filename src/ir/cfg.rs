//! Flow graph for one method.
//!
//! The graph owns its blocks (including the virtual entry/exit pair),
//! tracks estimated block frequencies, and carries the structure tree once
//! region analysis has run. Mutating the graph invalidates the structure
//! tree; removal of blocks is deferred — blocks are marked removed and a
//! graph-level flag tells the driver to sweep unreachable blocks after the
//! pass that disconnected them.

use std::collections::HashSet;

use crate::ir::{Block, BlockId, Structure};

/// Frequency assigned to straight-line code on the method's entry path.
const BASE_FREQUENCY: i32 = 10_000;

/// Multiplier applied per loop level when estimating frequencies.
const LOOP_FREQUENCY_FACTOR: i32 = 10;

/// Control flow graph.
#[derive(Debug, Default)]
pub struct Cfg {
    blocks: Vec<Block>,
    structure: Option<Structure>,
    max_frequency: i32,
    might_have_unreachable: bool,
}

impl Cfg {
    /// Virtual entry block.
    pub const ENTRY: BlockId = BlockId(0);
    /// Virtual exit block.
    pub const EXIT: BlockId = BlockId(1);

    /// Creates a graph holding only the virtual entry and exit.
    #[must_use]
    pub fn new() -> Self {
        let mut cfg = Self {
            blocks: Vec::new(),
            structure: None,
            max_frequency: -1,
            might_have_unreachable: false,
        };
        cfg.blocks.push(Block::new(Self::ENTRY));
        cfg.blocks.push(Block::new(Self::EXIT));
        cfg
    }

    /// Appends a fresh, unconnected block.
    pub fn add_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block::new(id));
        self.structure = None;
        id
    }

    /// Adds the edge `from → to`.
    pub fn add_edge(&mut self, from: BlockId, to: BlockId) {
        if !self.blocks[from.index()].succs.contains(&to) {
            self.blocks[from.index()].succs.push(to);
            self.blocks[to.index()].preds.push(from);
            self.structure = None;
        }
    }

    /// Removes the edge `from → to` and flags a possible unreachable sweep.
    pub fn remove_edge(&mut self, from: BlockId, to: BlockId) {
        self.blocks[from.index()].succs.retain(|&s| s != to);
        self.blocks[to.index()].preds.retain(|&p| p != from);
        self.structure = None;
        self.might_have_unreachable = true;
    }

    /// Borrows a block.
    #[must_use]
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    /// Mutably borrows a block.
    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.index()]
    }

    /// First real, live block in numbering order.
    #[must_use]
    pub fn first_block(&self) -> Option<BlockId> {
        self.live_blocks().next()
    }

    /// Next real, live block after `id` in numbering order.
    #[must_use]
    pub fn next_block(&self, id: BlockId) -> Option<BlockId> {
        self.live_blocks().find(|b| b.0 > id.0)
    }

    /// Iterates the identifiers of real, live blocks.
    pub fn live_blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.blocks
            .iter()
            .skip(2)
            .filter(|b| !b.removed)
            .map(Block::id)
    }

    /// Number of live flow-graph nodes, virtual entry/exit included.
    #[must_use]
    pub fn node_count(&self) -> u32 {
        self.blocks.iter().filter(|b| !b.removed).count() as u32
    }

    /// Highest block number ever allocated plus one.
    #[must_use]
    pub fn next_block_number(&self) -> u32 {
        self.blocks.len() as u32
    }

    /// Does the method have more than one real block?
    #[must_use]
    pub fn more_than_one_block(&self) -> bool {
        self.live_blocks().nth(1).is_some()
    }

    /// May the graph contain a natural loop?
    ///
    /// Detected by a depth-first search for a back edge; conservative in
    /// name only, since the search is exact for reachable cycles.
    #[must_use]
    pub fn may_have_loops(&self) -> bool {
        let mut state = vec![0u8; self.blocks.len()]; // 0 unvisited, 1 open, 2 done
        let mut stack: Vec<(BlockId, usize)> = vec![(Self::ENTRY, 0)];
        state[Self::ENTRY.index()] = 1;
        while let Some(&(block, next)) = stack.last() {
            let succs = &self.blocks[block.index()].succs;
            if next < succs.len() {
                stack.last_mut().expect("stack is non-empty").1 += 1;
                let succ = succs[next];
                if self.blocks[succ.index()].removed {
                    continue;
                }
                match state[succ.index()] {
                    0 => {
                        state[succ.index()] = 1;
                        stack.push((succ, 0));
                    }
                    1 => return true,
                    _ => {}
                }
            } else {
                state[block.index()] = 2;
                stack.pop();
            }
        }
        false
    }

    /// The structure tree, if region analysis has run since the last
    /// mutation.
    #[must_use]
    pub fn structure(&self) -> Option<&Structure> {
        self.structure.as_ref()
    }

    /// Records (or clears) the structure tree.
    pub fn set_structure(&mut self, structure: Option<Structure>) {
        self.structure = structure;
    }

    /// Highest frequency assigned so far, or a negative value before
    /// [`Cfg::set_frequencies`] has run.
    #[must_use]
    pub fn max_frequency(&self) -> i32 {
        self.max_frequency
    }

    /// Estimates block frequencies from loop nesting.
    ///
    /// Entry-reachable straight-line blocks get the base frequency; each
    /// enclosing natural loop multiplies it. The estimate is deliberately
    /// static — profile-directed counts belong to the runtime embedding.
    pub fn set_frequencies(&mut self) {
        let reachable = self.reachable_from_entry();
        let mut depth = vec![0u32; self.blocks.len()];
        for (header, latch) in self.back_edges() {
            for body in self.natural_loop_body(header, latch) {
                depth[body.index()] += 1;
            }
        }

        self.max_frequency = -1;
        for block in &mut self.blocks {
            if block.removed || !reachable.contains(&block.id) {
                continue;
            }
            let mut freq = BASE_FREQUENCY;
            for _ in 0..depth[block.id.index()].min(3) {
                freq = freq.saturating_mul(LOOP_FREQUENCY_FACTOR);
            }
            block.frequency = freq;
            self.max_frequency = self.max_frequency.max(freq);
        }
    }

    /// Should the driver sweep unreachable blocks after the current pass?
    #[must_use]
    pub fn might_have_unreachable_blocks(&self) -> bool {
        self.might_have_unreachable
    }

    /// Flags that a pass may have disconnected blocks.
    pub fn set_might_have_unreachable_blocks(&mut self) {
        self.might_have_unreachable = true;
    }

    /// Marks blocks unreachable from the entry as removed.
    ///
    /// Returns the number of blocks removed. Clears the pending sweep flag
    /// and drops the structure tree when anything changed.
    pub fn remove_unreachable_blocks(&mut self) -> u32 {
        let reachable = self.reachable_from_entry();
        let mut removed = 0;
        for index in 2..self.blocks.len() {
            let id = self.blocks[index].id;
            if !self.blocks[index].removed && !reachable.contains(&id) {
                self.blocks[index].removed = true;
                self.blocks[index].succs.clear();
                self.blocks[index].preds.clear();
                for other in &mut self.blocks {
                    other.succs.retain(|&s| s != id);
                    other.preds.retain(|&p| p != id);
                }
                removed += 1;
            }
        }
        self.might_have_unreachable = false;
        if removed > 0 {
            self.structure = None;
        }
        removed
    }

    /// Head of the extended basic block containing `id`.
    #[must_use]
    pub fn start_of_extended_block(&self, id: BlockId) -> BlockId {
        let mut current = id;
        while let Some(head) = self.blocks[current.index()].extension_of {
            current = head;
        }
        current
    }

    /// Marks `block` as a fall-through extension of `head`.
    pub fn set_extension_of(&mut self, block: BlockId, head: Option<BlockId>) {
        self.blocks[block.index()].extension_of = head;
    }

    /// Blocks reachable from the virtual entry.
    pub(crate) fn reachable_from_entry(&self) -> HashSet<BlockId> {
        let mut seen = HashSet::new();
        let mut work = vec![Self::ENTRY];
        while let Some(block) = work.pop() {
            if !seen.insert(block) {
                continue;
            }
            for &succ in &self.blocks[block.index()].succs {
                if !self.blocks[succ.index()].removed {
                    work.push(succ);
                }
            }
        }
        seen
    }

    /// All `(header, latch)` pairs whose edge `latch → header` closes a
    /// natural loop (the header dominates the latch).
    pub(crate) fn back_edges(&self) -> Vec<(BlockId, BlockId)> {
        let dominators = self.dominators();
        let mut edges = Vec::new();
        for block in &self.blocks {
            if block.removed {
                continue;
            }
            for &succ in &block.succs {
                if dominators[block.id.index()].contains(&succ) {
                    edges.push((succ, block.id));
                }
            }
        }
        edges
    }

    /// The body of the natural loop with back edge `latch → header`:
    /// every block that reaches the latch without passing through the
    /// header, plus the header itself.
    pub(crate) fn natural_loop_body(&self, header: BlockId, latch: BlockId) -> HashSet<BlockId> {
        let mut body = HashSet::new();
        body.insert(header);
        let mut work = vec![latch];
        while let Some(block) = work.pop() {
            if !body.insert(block) {
                continue;
            }
            for &pred in &self.blocks[block.index()].preds {
                if !self.blocks[pred.index()].removed {
                    work.push(pred);
                }
            }
        }
        body
    }

    /// Per-block dominator sets, computed by the classic iterative scheme.
    ///
    /// Quadratic in the worst case, which is fine at the block counts the
    /// complexity gate admits.
    pub(crate) fn dominators(&self) -> Vec<HashSet<BlockId>> {
        let all: HashSet<BlockId> = self
            .blocks
            .iter()
            .filter(|b| !b.removed)
            .map(Block::id)
            .collect();
        let mut dom: Vec<HashSet<BlockId>> = self
            .blocks
            .iter()
            .map(|b| {
                if b.id == Self::ENTRY {
                    std::iter::once(Self::ENTRY).collect()
                } else {
                    all.clone()
                }
            })
            .collect();

        let mut changed = true;
        while changed {
            changed = false;
            for block in &self.blocks {
                if block.removed || block.id == Self::ENTRY {
                    continue;
                }
                let mut new: Option<HashSet<BlockId>> = None;
                for &pred in &block.preds {
                    if self.blocks[pred.index()].removed {
                        continue;
                    }
                    new = Some(match new {
                        None => dom[pred.index()].clone(),
                        Some(acc) => acc.intersection(&dom[pred.index()]).copied().collect(),
                    });
                }
                let mut new = new.unwrap_or_default();
                new.insert(block.id);
                if new != dom[block.id.index()] {
                    dom[block.id.index()] = new;
                    changed = true;
                }
            }
        }
        dom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> (Cfg, BlockId, BlockId, BlockId, BlockId) {
        let mut cfg = Cfg::new();
        let a = cfg.add_block();
        let b = cfg.add_block();
        let c = cfg.add_block();
        let d = cfg.add_block();
        cfg.add_edge(Cfg::ENTRY, a);
        cfg.add_edge(a, b);
        cfg.add_edge(a, c);
        cfg.add_edge(b, d);
        cfg.add_edge(c, d);
        cfg.add_edge(d, Cfg::EXIT);
        (cfg, a, b, c, d)
    }

    #[test]
    fn diamond_has_no_loops() {
        let (cfg, ..) = diamond();
        assert!(!cfg.may_have_loops());
        assert!(cfg.more_than_one_block());
    }

    #[test]
    fn back_edge_is_a_loop() {
        let (mut cfg, a, b, _, d) = diamond();
        cfg.add_edge(d, a);
        assert!(cfg.may_have_loops());
        let edges = cfg.back_edges();
        assert_eq!(edges, vec![(a, d)]);
        let body = cfg.natural_loop_body(a, d);
        assert!(body.contains(&a) && body.contains(&b) && body.contains(&d));
        assert!(!body.contains(&Cfg::ENTRY));
    }

    #[test]
    fn unreachable_sweep() {
        let (mut cfg, a, b, _, _) = diamond();
        cfg.remove_edge(a, b);
        assert!(cfg.might_have_unreachable_blocks());
        let removed = cfg.remove_unreachable_blocks();
        assert_eq!(removed, 1);
        assert!(cfg.block(b).is_removed());
        assert!(!cfg.might_have_unreachable_blocks());
    }

    #[test]
    fn frequencies_scale_with_loop_depth() {
        let (mut cfg, a, b, c, d) = diamond();
        cfg.add_edge(d, a);
        cfg.set_frequencies();
        assert!(cfg.block(a).frequency() > 0);
        assert!(cfg.block(b).frequency() >= cfg.block(a).frequency());
        assert_eq!(cfg.max_frequency(), cfg.block(c).frequency().max(cfg.block(d).frequency()));
        assert!(cfg.max_frequency() > 0);
    }

    #[test]
    fn extended_block_chains_resolve_to_head() {
        let (mut cfg, a, b, _, _) = diamond();
        cfg.set_extension_of(b, Some(a));
        assert_eq!(cfg.start_of_extended_block(b), a);
        assert_eq!(cfg.start_of_extended_block(a), a);
    }
}
