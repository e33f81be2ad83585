//! Tree simplification: constant folding.
//!
//! Folds arithmetic over constant operands in place. Folding strands the
//! operand nodes; the driver's dead-node sweep reclaims them after the
//! strategy step, which is what makes the node count shrink observably.

use crate::error::Result;
use crate::ir::{BlockId, NodeId, NodePool, Opcode};
use crate::optimizer::pass::{OptimizationPass, PassContext};

pub(crate) fn create() -> Box<dyn OptimizationPass> {
    Box::new(Simplifier)
}

struct Simplifier;

impl Simplifier {
    fn fold(pool: &mut NodePool, node: NodeId) -> u32 {
        let mut folded = 0;
        for index in 0..pool.node(node).children.len() {
            let child = pool.node(node).children[index];
            folded += Self::fold(pool, child);
        }

        let opcode = pool.node(node).opcode;
        if !opcode.is_arithmetic() {
            return folded;
        }
        let operands: Vec<Option<i64>> = pool
            .node(node)
            .children
            .iter()
            .map(|&c| pool.node(c).opcode.const_value())
            .collect();
        if let [Some(left), Some(right)] = operands[..] {
            let value = match opcode {
                Opcode::IAdd => left.wrapping_add(right),
                Opcode::ISub => left.wrapping_sub(right),
                Opcode::IMul => left.wrapping_mul(right),
                _ => unreachable!("checked arithmetic above"),
            };
            let target = pool.node_mut(node);
            target.opcode = Opcode::IConst(value);
            target.children.clear();
            folded += 1;
        }
        folded
    }

    fn simplify_block(ctx: &mut PassContext<'_>, block: BlockId) -> u32 {
        let roots: Vec<NodeId> = ctx.comp.method().cfg.block(block).trees.clone();
        let mut folded = 0;
        for root in roots {
            folded += Self::fold(&mut ctx.comp.method_mut().pool, root);
        }
        folded
    }
}

impl OptimizationPass for Simplifier {
    fn perform(&mut self, ctx: &mut PassContext<'_>) -> Result<u32> {
        let blocks: Vec<BlockId> = ctx.comp.method().cfg.live_blocks().collect();
        let mut folded = 0;
        for block in blocks {
            folded += Self::simplify_block(ctx, block);
        }
        if folded > 0 {
            ctx.record_transformation("folded constant expressions");
        }
        Ok(folded)
    }

    fn perform_on_block(&mut self, block: BlockId, ctx: &mut PassContext<'_>) -> Result<u32> {
        Ok(Self::simplify_block(ctx, block))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Cfg, Method};
    use crate::optimizer::manager::RequestTable;
    use crate::optimizer::{Compilation, Hotness, OptId};

    #[test]
    fn folds_nested_arithmetic() {
        let mut method = Method::new("fold");
        let sym = method.symrefs.create_auto();
        let block = method.cfg.add_block();
        method.cfg.add_edge(Cfg::ENTRY, block);
        method.cfg.add_edge(block, Cfg::EXIT);

        let two = method.pool.alloc(Opcode::IConst(2), Vec::new());
        let three = method.pool.alloc(Opcode::IConst(3), Vec::new());
        let add = method.pool.alloc(Opcode::IAdd, vec![two, three]);
        let four = method.pool.alloc(Opcode::IConst(4), Vec::new());
        let mul = method.pool.alloc(Opcode::IMul, vec![add, four]);
        let store = method.pool.alloc(Opcode::IStore(sym), vec![mul]);
        method.cfg.block_mut(block).trees.push(store);

        let mut comp = Compilation::new(method, Hotness::Cold);
        let mut requests = RequestTable::new();
        let mut ctx = PassContext {
            comp: &mut comp,
            requests: &mut requests,
            use_defs: None,
            value_numbers: None,
            opt: OptId::TreeSimplification,
            trace: false,
        };
        let cost = Simplifier.perform(&mut ctx).unwrap();
        assert_eq!(cost, 2);
        assert_eq!(comp.method().pool.node(mul).opcode, Opcode::IConst(20));
    }
}
