//! Dead-trees elimination.
//!
//! Drops tree roots whose evaluation has no side effects: bare pure
//! expressions and anchors whose subtree neither stores nor returns.

use crate::error::Result;
use crate::ir::{BlockId, NodeId};
use crate::optimizer::pass::{OptimizationPass, PassContext};

pub(crate) fn create() -> Box<dyn OptimizationPass> {
    Box::new(DeadTrees)
}

struct DeadTrees;

impl DeadTrees {
    fn clean_block(ctx: &mut PassContext<'_>, block: BlockId) -> u32 {
        let dead: Vec<NodeId> = {
            let method = ctx.comp.method();
            method
                .cfg
                .block(block)
                .trees
                .iter()
                .copied()
                .filter(|&root| !method.pool.subtree_has_side_effects(root))
                .collect()
        };
        if dead.is_empty() {
            return 0;
        }
        let removed = dead.len() as u32;
        ctx.comp
            .method_mut()
            .cfg
            .block_mut(block)
            .trees
            .retain(|root| !dead.contains(root));
        removed
    }
}

impl OptimizationPass for DeadTrees {
    fn perform(&mut self, ctx: &mut PassContext<'_>) -> Result<u32> {
        let blocks: Vec<BlockId> = ctx.comp.method().cfg.live_blocks().collect();
        let mut removed = 0;
        for block in blocks {
            removed += Self::clean_block(ctx, block);
        }
        if removed > 0 {
            ctx.record_transformation("removed dead trees");
        }
        Ok(removed)
    }

    fn perform_on_block(&mut self, block: BlockId, ctx: &mut PassContext<'_>) -> Result<u32> {
        Ok(Self::clean_block(ctx, block))
    }
}
