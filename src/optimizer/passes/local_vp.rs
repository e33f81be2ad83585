//! Local value propagation.
//!
//! Tracks constants stored within a block and rewrites later loads of the
//! same storage to the constant. A store of a non-constant value, or to
//! aliasing storage, forgets the tracked constant.

use rustc_hash::FxHashMap;

use crate::error::Result;
use crate::ir::{BlockId, NodeId, Opcode};
use crate::optimizer::pass::{OptimizationPass, PassContext};
use crate::optimizer::OptId;

pub(crate) fn create() -> Box<dyn OptimizationPass> {
    Box::new(LocalValuePropagation)
}

struct LocalValuePropagation;

impl LocalValuePropagation {
    fn propagate_block(ctx: &mut PassContext<'_>, block: BlockId) -> u32 {
        let roots: Vec<NodeId> = ctx.comp.method().cfg.block(block).trees.clone();
        let mut known: FxHashMap<u32, i64> = FxHashMap::default();
        let mut rewritten = 0;

        for root in roots {
            rewritten += Self::rewrite_loads(ctx, root, &known);
            Self::note_stores(ctx, root, &mut known);
        }
        rewritten
    }

    fn rewrite_loads(
        ctx: &mut PassContext<'_>,
        node: NodeId,
        known: &FxHashMap<u32, i64>,
    ) -> u32 {
        let mut rewritten = 0;
        for index in 0..ctx.comp.method().pool.node(node).children.len() {
            let child = ctx.comp.method().pool.node(node).children[index];
            rewritten += Self::rewrite_loads(ctx, child, known);
        }
        if let Opcode::ILoad(symref) = ctx.comp.method().pool.node(node).opcode {
            if let Some(&value) = known.get(&(symref.index() as u32)) {
                let target = ctx.comp.method_mut().pool.node_mut(node);
                target.opcode = Opcode::IConst(value);
                target.children.clear();
                rewritten += 1;
            }
        }
        rewritten
    }

    fn note_stores(ctx: &PassContext<'_>, root: NodeId, known: &mut FxHashMap<u32, i64>) {
        let method = ctx.comp.method();
        let mut work = vec![root];
        while let Some(node) = work.pop() {
            let n = method.pool.node(node);
            if let Opcode::IStore(symref) = n.opcode {
                let stored = n
                    .children
                    .first()
                    .and_then(|&c| method.pool.node(c).opcode.const_value());
                let target = method.symrefs.symref(symref);
                for (id, entry) in method.symrefs.iter() {
                    if entry.symbol == target.symbol && entry.offset == target.offset {
                        match stored {
                            Some(value) => {
                                known.insert(id.index() as u32, value);
                            }
                            None => {
                                known.remove(&(id.index() as u32));
                            }
                        }
                    }
                }
            }
            work.extend(n.children.iter().copied());
        }
    }
}

impl OptimizationPass for LocalValuePropagation {
    fn perform(&mut self, ctx: &mut PassContext<'_>) -> Result<u32> {
        let blocks: Vec<BlockId> = ctx.comp.method().cfg.live_blocks().collect();
        let mut rewritten = 0;
        for block in blocks {
            let here = Self::propagate_block(ctx, block);
            if here > 0 {
                ctx.requests.request_on_block(OptId::LocalCSE, block);
            }
            rewritten += here;
        }
        if rewritten > 0 {
            ctx.record_transformation("propagated local constants");
        }
        Ok(rewritten)
    }

    fn perform_on_block(&mut self, block: BlockId, ctx: &mut PassContext<'_>) -> Result<u32> {
        let rewritten = Self::propagate_block(ctx, block);
        if rewritten > 0 {
            ctx.requests.request_on_block(OptId::LocalCSE, block);
        }
        Ok(rewritten)
    }
}
