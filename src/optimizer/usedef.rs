//! Use-def information.
//!
//! Links every load to the definitions that may reach it, and every
//! definition to the loads it may feed. Two flavors exist: the *local*
//! build connects uses only to definitions earlier in the same block, the
//! *global* build runs reaching-definitions dataflow over the flow graph
//! first. Options mirror what passes can demand: loads may themselves be
//! treated as definitions (so load-to-load chains exist), and trivial
//! definitions — stores nothing ever reads — may be kept or omitted from
//! the use table.
//!
//! The structures are deterministic for a given method: blocks are walked
//! in numbering order and def lists are sorted, so building twice with the
//! same parameters yields the same [`UseDefInfo::fingerprint`].

use std::collections::hash_map::Entry;
use std::hash::{Hash, Hasher};

use rustc_hash::{FxHashMap, FxHasher};

use crate::ir::{BlockId, Method, NodeId, Opcode, SymRefId};

/// Parameters of a use-def build.
#[derive(Debug, Clone, Copy, Default)]
pub struct UseDefBuildOptions {
    /// Run reaching-definitions dataflow across blocks.
    pub requires_globals: bool,
    /// Attempt global coverage even though only local was demanded.
    pub prefers_globals: bool,
    /// Treat loads as definitions.
    pub loads_as_defs: bool,
    /// Keep definitions that have no uses in the use table.
    pub cannot_omit_trivial_defs: bool,
    /// Restrict to conversion registers only (accepted for interface
    /// parity; the reference IR has no conversion registers).
    pub conversion_regs_only: bool,
}

#[derive(Debug, Clone, Copy)]
struct DefSite {
    node: NodeId,
    symref: SymRefId,
    is_store: bool,
}

/// Use-def chains for one method.
#[derive(Debug)]
pub struct UseDefInfo {
    has_globals: bool,
    loads_as_defs: bool,
    cannot_omit_trivial_defs: bool,
    valid: bool,
    defs_per_use: FxHashMap<NodeId, Vec<NodeId>>,
    uses_per_def: FxHashMap<NodeId, Vec<NodeId>>,
}

impl UseDefInfo {
    /// Builds use-def info for `method` with the given options.
    #[must_use]
    pub fn build(method: &Method, options: &UseDefBuildOptions) -> Self {
        Builder::new(method, options).run()
    }

    /// Did the build propagate definitions across blocks?
    #[must_use]
    pub fn has_globals_use_defs(&self) -> bool {
        self.has_globals
    }

    /// Were loads treated as definitions?
    #[must_use]
    pub fn has_loads_as_defs(&self) -> bool {
        self.loads_as_defs
    }

    /// Were trivial definitions kept?
    #[must_use]
    pub fn keeps_trivial_defs(&self) -> bool {
        self.cannot_omit_trivial_defs
    }

    /// Did the build complete with usable information?
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// The definitions that may reach `use_node`.
    #[must_use]
    pub fn defs_for_use(&self, use_node: NodeId) -> Option<&[NodeId]> {
        self.defs_per_use.get(&use_node).map(Vec::as_slice)
    }

    /// The uses that `def_node` may feed.
    #[must_use]
    pub fn uses_for_def(&self, def_node: NodeId) -> Option<&[NodeId]> {
        self.uses_per_def.get(&def_node).map(Vec::as_slice)
    }

    /// Number of uses with a recorded definition list.
    #[must_use]
    pub fn use_count(&self) -> usize {
        self.defs_per_use.len()
    }

    /// Stable hash of the `(defs_per_use, uses_per_def)` structures.
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = FxHasher::default();
        let mut uses: Vec<_> = self.defs_per_use.iter().collect();
        uses.sort_by_key(|(node, _)| **node);
        for (node, defs) in uses {
            node.hash(&mut hasher);
            defs.hash(&mut hasher);
        }
        let mut defs: Vec<_> = self.uses_per_def.iter().collect();
        defs.sort_by_key(|(node, _)| **node);
        for (node, use_list) in defs {
            node.hash(&mut hasher);
            use_list.hash(&mut hasher);
        }
        hasher.finish()
    }
}

/// Appends the subtree rooted at `root` in evaluation (post) order.
fn collect_post_order(method: &Method, root: NodeId, out: &mut Vec<NodeId>) {
    for index in 0..method.pool.node(root).children.len() {
        let child = method.pool.node(root).children[index];
        collect_post_order(method, child, out);
    }
    out.push(root);
}

/// Every node of `block` in evaluation order.
fn block_nodes(method: &Method, block: BlockId) -> Vec<NodeId> {
    let mut order = Vec::new();
    for &root in &method.cfg.block(block).trees {
        collect_post_order(method, root, &mut order);
    }
    order
}

struct Builder<'a> {
    method: &'a Method,
    options: &'a UseDefBuildOptions,
    defs: Vec<DefSite>,
    def_index_of: FxHashMap<NodeId, usize>,
    defs_in_block: FxHashMap<BlockId, Vec<usize>>,
}

impl<'a> Builder<'a> {
    fn new(method: &'a Method, options: &'a UseDefBuildOptions) -> Self {
        Self {
            method,
            options,
            defs: Vec::new(),
            def_index_of: FxHashMap::default(),
            defs_in_block: FxHashMap::default(),
        }
    }

    fn may_alias(&self, a: SymRefId, b: SymRefId) -> bool {
        match self.method.symrefs.alias_info() {
            Some(info) => info.may_alias(a, b),
            None => {
                let ra = self.method.symrefs.symref(a);
                let rb = self.method.symrefs.symref(b);
                ra.symbol == rb.symbol && ra.offset == rb.offset
            }
        }
    }

    fn collect_defs(&mut self) {
        let blocks: Vec<BlockId> = self.method.cfg.live_blocks().collect();
        for block in blocks {
            let mut in_block = Vec::new();
            for node in block_nodes(self.method, block) {
                let site = match self.method.pool.node(node).opcode {
                    Opcode::IStore(symref) => Some(DefSite {
                        node,
                        symref,
                        is_store: true,
                    }),
                    Opcode::ILoad(symref) if self.options.loads_as_defs => Some(DefSite {
                        node,
                        symref,
                        is_store: false,
                    }),
                    _ => None,
                };
                if let Some(site) = site {
                    self.defs.push(site);
                    let index = self.defs.len() - 1;
                    self.def_index_of.insert(node, index);
                    in_block.push(index);
                }
            }
            self.defs_in_block.insert(block, in_block);
        }
    }

    /// Reaching-definitions IN sets, one bitset per block.
    fn reaching_in_sets(&self) -> FxHashMap<BlockId, BitSet> {
        let words = BitSet::words_for(self.defs.len());
        let blocks: Vec<BlockId> = self.method.cfg.live_blocks().collect();

        let mut gen_sets = FxHashMap::default();
        let mut kill_sets = FxHashMap::default();
        for &block in &blocks {
            let mut gen = BitSet::new(words);
            let mut kill = BitSet::new(words);
            for &index in &self.defs_in_block[&block] {
                let def = self.defs[index];
                if def.is_store {
                    for (other_index, other) in self.defs.iter().enumerate() {
                        if other_index != index && self.may_alias(def.symref, other.symref) {
                            gen.remove(other_index);
                            kill.insert(other_index);
                        }
                    }
                }
                gen.insert(index);
                kill.remove(index);
            }
            gen_sets.insert(block, gen);
            kill_sets.insert(block, kill);
        }

        let mut in_sets: FxHashMap<BlockId, BitSet> =
            blocks.iter().map(|&b| (b, BitSet::new(words))).collect();
        let mut out_sets: FxHashMap<BlockId, BitSet> =
            blocks.iter().map(|&b| (b, BitSet::new(words))).collect();

        let mut changed = true;
        while changed {
            changed = false;
            for &block in &blocks {
                let mut incoming = BitSet::new(words);
                for &pred in self.method.cfg.block(block).predecessors() {
                    if let Some(out) = out_sets.get(&pred) {
                        incoming.union_with(out);
                    }
                }
                let mut out = incoming.clone();
                out.subtract(&kill_sets[&block]);
                out.union_with(&gen_sets[&block]);
                if in_sets[&block] != incoming {
                    in_sets.insert(block, incoming);
                    changed = true;
                }
                if out_sets[&block] != out {
                    out_sets.insert(block, out);
                    changed = true;
                }
            }
        }
        in_sets
    }

    fn run(mut self) -> UseDefInfo {
        self.collect_defs();

        let global = self.options.requires_globals || self.options.prefers_globals;
        let in_sets = if global {
            Some(self.reaching_in_sets())
        } else {
            None
        };

        let words = BitSet::words_for(self.defs.len());
        let mut defs_per_use: FxHashMap<NodeId, Vec<NodeId>> = FxHashMap::default();
        let mut uses_per_def: FxHashMap<NodeId, Vec<NodeId>> = FxHashMap::default();

        if self.options.cannot_omit_trivial_defs {
            for def in &self.defs {
                uses_per_def.entry(def.node).or_default();
            }
        }

        let blocks: Vec<BlockId> = self.method.cfg.live_blocks().collect();
        for block in blocks {
            let mut reaching = match &in_sets {
                Some(sets) => sets[&block].clone(),
                None => BitSet::new(words),
            };
            for node in block_nodes(self.method, block) {
                if let Opcode::ILoad(symref) = self.method.pool.node(node).opcode {
                    let mut reached: Vec<usize> = reaching
                        .iter()
                        .filter(|&index| self.may_alias(self.defs[index].symref, symref))
                        .collect();
                    reached.sort_unstable();
                    let defs: Vec<NodeId> =
                        reached.iter().map(|&index| self.defs[index].node).collect();
                    for &def_node in &defs {
                        match uses_per_def.entry(def_node) {
                            Entry::Occupied(mut entry) => entry.get_mut().push(node),
                            Entry::Vacant(entry) => {
                                entry.insert(vec![node]);
                            }
                        }
                    }
                    defs_per_use.insert(node, defs);
                }
                if let Some(&index) = self.def_index_of.get(&node) {
                    let def = self.defs[index];
                    if def.is_store {
                        let stale: Vec<usize> = reaching
                            .iter()
                            .filter(|&other| self.may_alias(self.defs[other].symref, def.symref))
                            .collect();
                        for other in stale {
                            reaching.remove(other);
                        }
                    }
                    reaching.insert(index);
                }
            }
        }

        for uses in uses_per_def.values_mut() {
            uses.sort_unstable();
            uses.dedup();
        }

        UseDefInfo {
            has_globals: global,
            loads_as_defs: self.options.loads_as_defs,
            cannot_omit_trivial_defs: self.options.cannot_omit_trivial_defs,
            valid: true,
            defs_per_use,
            uses_per_def,
        }
    }
}

/// Minimal fixed-width bitset for the dataflow sets.
#[derive(Debug, Clone, PartialEq, Eq)]
struct BitSet {
    words: Vec<u64>,
}

impl BitSet {
    fn words_for(bits: usize) -> usize {
        bits.div_ceil(64)
    }

    fn new(words: usize) -> Self {
        Self {
            words: vec![0; words],
        }
    }

    fn insert(&mut self, bit: usize) {
        self.words[bit / 64] |= 1 << (bit % 64);
    }

    fn remove(&mut self, bit: usize) {
        if bit / 64 < self.words.len() {
            self.words[bit / 64] &= !(1 << (bit % 64));
        }
    }

    fn union_with(&mut self, other: &BitSet) {
        for (word, o) in self.words.iter_mut().zip(&other.words) {
            *word |= o;
        }
    }

    fn subtract(&mut self, other: &BitSet) {
        for (word, o) in self.words.iter_mut().zip(&other.words) {
            *word &= !o;
        }
    }

    fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(index, &word)| {
            (0..64)
                .filter(move |bit| word & (1 << bit) != 0)
                .map(move |bit| index * 64 + bit)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Cfg, Method};

    /// store a <- 1; store b <- load a, across two straight-line blocks.
    fn two_block_method() -> (Method, NodeId, NodeId) {
        let mut method = Method::new("usedef");
        let a = method.symrefs.create_auto();
        let b = method.symrefs.create_auto();
        let b1 = method.cfg.add_block();
        let b2 = method.cfg.add_block();
        method.cfg.add_edge(Cfg::ENTRY, b1);
        method.cfg.add_edge(b1, b2);
        method.cfg.add_edge(b2, Cfg::EXIT);
        let store_a = method.append_const_store(b1, a, 1);
        let store_b = method.append_copy(b2, b, a);
        let load_a = method.pool.node(store_b).children[0];
        (method, store_a, load_a)
    }

    #[test]
    fn global_build_links_across_blocks() {
        let (method, store_a, load_a) = two_block_method();
        let info = UseDefInfo::build(
            &method,
            &UseDefBuildOptions {
                requires_globals: true,
                ..Default::default()
            },
        );
        assert!(info.has_globals_use_defs());
        assert_eq!(info.defs_for_use(load_a), Some(&[store_a][..]));
        assert_eq!(info.uses_for_def(store_a), Some(&[load_a][..]));
    }

    #[test]
    fn local_build_does_not_cross_blocks() {
        let (method, _store_a, load_a) = two_block_method();
        let info = UseDefInfo::build(&method, &UseDefBuildOptions::default());
        assert!(!info.has_globals_use_defs());
        assert_eq!(info.defs_for_use(load_a), Some(&[][..]));
    }

    #[test]
    fn rebuild_fingerprints_match() {
        let (method, ..) = two_block_method();
        let options = UseDefBuildOptions {
            requires_globals: true,
            loads_as_defs: true,
            cannot_omit_trivial_defs: true,
            ..Default::default()
        };
        let first = UseDefInfo::build(&method, &options);
        let second = UseDefInfo::build(&method, &options);
        assert_eq!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn trivial_defs_follow_the_option() {
        let mut method = Method::new("trivial");
        let a = method.symrefs.create_auto();
        let b1 = method.cfg.add_block();
        method.cfg.add_edge(Cfg::ENTRY, b1);
        method.cfg.add_edge(b1, Cfg::EXIT);
        let store = method.append_const_store(b1, a, 7);

        let omitted = UseDefInfo::build(&method, &UseDefBuildOptions::default());
        assert!(omitted.uses_for_def(store).is_none());

        let kept = UseDefInfo::build(
            &method,
            &UseDefBuildOptions {
                cannot_omit_trivial_defs: true,
                ..Default::default()
            },
        );
        assert_eq!(kept.uses_for_def(store), Some(&[][..]));
    }
}
