//! Local common-subexpression elimination.
//!
//! Commons pure subtrees within a block: later occurrences of an
//! expression already computed are replaced by a reference to the first
//! occurrence. Loads participate position-sensitively — a store to
//! aliasing storage opens a new epoch and stops commoning across it.

use rustc_hash::FxHashMap;

use crate::error::Result;
use crate::ir::{BlockId, NodeId, Opcode};
use crate::optimizer::pass::{OptimizationPass, PassContext};
use crate::optimizer::OptId;

pub(crate) fn create() -> Box<dyn OptimizationPass> {
    Box::new(LocalCse)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CseKey {
    Const(i64),
    Arith(u8, Vec<NodeId>),
    Load(u32, u32),
}

struct LocalCse;

impl LocalCse {
    /// Commons within one block; returns the number of replacements.
    fn common_block(ctx: &mut PassContext<'_>, block: BlockId) -> u32 {
        let roots: Vec<NodeId> = ctx.comp.method().cfg.block(block).trees.clone();
        let mut seen: FxHashMap<CseKey, NodeId> = FxHashMap::default();
        let mut epochs: FxHashMap<u32, u32> = FxHashMap::default();
        let mut replaced = 0;

        for root in roots {
            replaced += Self::common_node(ctx, root, &mut seen, &epochs);
            Self::bump_epochs(ctx, root, &mut epochs);
        }
        replaced
    }

    /// Rewrites duplicate children of `node` to their first occurrence.
    fn common_node(
        ctx: &mut PassContext<'_>,
        node: NodeId,
        seen: &mut FxHashMap<CseKey, NodeId>,
        epochs: &FxHashMap<u32, u32>,
    ) -> u32 {
        let mut replaced = 0;
        for index in 0..ctx.comp.method().pool.node(node).children.len() {
            let child = ctx.comp.method().pool.node(node).children[index];
            replaced += Self::common_node(ctx, child, seen, epochs);
            if let Some(key) = Self::key_for(ctx, child, epochs) {
                match seen.get(&key) {
                    Some(&first) if first != child => {
                        ctx.comp.method_mut().pool.node_mut(node).children[index] = first;
                        replaced += 1;
                    }
                    Some(_) => {}
                    None => {
                        seen.insert(key, child);
                    }
                }
            }
        }
        replaced
    }

    fn key_for(
        ctx: &PassContext<'_>,
        node: NodeId,
        epochs: &FxHashMap<u32, u32>,
    ) -> Option<CseKey> {
        let n = ctx.comp.method().pool.node(node);
        match n.opcode {
            Opcode::IConst(value) => Some(CseKey::Const(value)),
            Opcode::IAdd => Some(CseKey::Arith(1, n.children.clone())),
            Opcode::ISub => Some(CseKey::Arith(2, n.children.clone())),
            Opcode::IMul => Some(CseKey::Arith(3, n.children.clone())),
            Opcode::ILoad(symref) => {
                let epoch = epochs.get(&(symref.index() as u32)).copied().unwrap_or(0);
                Some(CseKey::Load(symref.index() as u32, epoch))
            }
            _ => None,
        }
    }

    /// Opens a new epoch for every storage location the tree stores to.
    fn bump_epochs(ctx: &PassContext<'_>, root: NodeId, epochs: &mut FxHashMap<u32, u32>) {
        let method = ctx.comp.method();
        let mut work = vec![root];
        while let Some(node) = work.pop() {
            let n = method.pool.node(node);
            if let Opcode::IStore(symref) = n.opcode {
                let target = method.symrefs.symref(symref);
                for (id, entry) in method.symrefs.iter() {
                    if entry.symbol == target.symbol && entry.offset == target.offset {
                        *epochs.entry(id.index() as u32).or_insert(0) += 1;
                    }
                }
            }
            work.extend(n.children.iter().copied());
        }
    }
}

impl OptimizationPass for LocalCse {
    fn perform(&mut self, ctx: &mut PassContext<'_>) -> Result<u32> {
        let blocks: Vec<BlockId> = ctx.comp.method().cfg.live_blocks().collect();
        let mut replaced = 0;
        for block in blocks {
            let here = Self::common_block(ctx, block);
            if here > 0 {
                ctx.requests
                    .request_on_block(OptId::LocalDeadStoreElimination, block);
            }
            replaced += here;
        }
        if replaced > 0 {
            ctx.record_transformation("commoned local subexpressions");
        }
        Ok(replaced)
    }

    fn perform_on_block(&mut self, block: BlockId, ctx: &mut PassContext<'_>) -> Result<u32> {
        let replaced = Self::common_block(ctx, block);
        if replaced > 0 {
            ctx.requests
                .request_on_block(OptId::LocalDeadStoreElimination, block);
        }
        Ok(replaced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Cfg, Method};
    use crate::optimizer::manager::RequestTable;
    use crate::optimizer::{Compilation, Hotness};

    #[test]
    fn commons_repeated_loads_until_a_store_intervenes() {
        let mut method = Method::new("cse");
        let a = method.symrefs.create_auto();
        let out = method.symrefs.create_auto();
        let block = method.cfg.add_block();
        method.cfg.add_edge(Cfg::ENTRY, block);
        method.cfg.add_edge(block, Cfg::EXIT);

        // out <- load a + load a  (the two loads common)
        let l1 = method.pool.alloc(Opcode::ILoad(a), Vec::new());
        let l2 = method.pool.alloc(Opcode::ILoad(a), Vec::new());
        let add = method.pool.alloc(Opcode::IAdd, vec![l1, l2]);
        let store = method.pool.alloc(Opcode::IStore(out), vec![add]);
        method.cfg.block_mut(block).trees.push(store);

        // a <- 9 ; out <- load a  (the new load must not common with l1)
        method.append_const_store(block, a, 9);
        let copy = method.append_copy(block, out, a);
        let late_load = method.pool.node(copy).children[0];

        let mut comp = Compilation::new(method, Hotness::Cold);
        let mut requests = RequestTable::new();
        let mut ctx = PassContext {
            comp: &mut comp,
            requests: &mut requests,
            use_defs: None,
            value_numbers: None,
            opt: OptId::LocalCSE,
            trace: false,
        };
        let replaced = LocalCse.perform(&mut ctx).unwrap();
        assert_eq!(replaced, 1);
        let add_children = &comp.method().pool.node(add).children;
        assert_eq!(add_children[0], add_children[1]);
        assert_ne!(comp.method().pool.node(copy).children[0], add_children[0]);
        let _ = late_load;
    }
}
