//! Basic-block extension.
//!
//! Marks single-predecessor fall-through blocks as extensions of their
//! predecessor so per-block passes operate on whole fall-through chains.

use crate::error::Result;
use crate::ir::BlockId;
use crate::optimizer::pass::{OptimizationPass, PassContext};

pub(crate) fn create() -> Box<dyn OptimizationPass> {
    Box::new(BlockExtension)
}

struct BlockExtension;

impl OptimizationPass for BlockExtension {
    fn perform(&mut self, ctx: &mut PassContext<'_>) -> Result<u32> {
        let blocks: Vec<BlockId> = ctx.comp.method().cfg.live_blocks().collect();

        let mut extensions: Vec<(BlockId, Option<BlockId>)> = Vec::new();
        for &block in &blocks {
            let method = ctx.comp.method();
            let preds = method.cfg.block(block).predecessors();
            let head = match preds {
                [single] if *single != crate::ir::Cfg::ENTRY => {
                    let pred = *single;
                    if method.cfg.block(pred).successors().len() == 1 {
                        Some(pred)
                    } else {
                        None
                    }
                }
                _ => None,
            };
            extensions.push((block, head));
        }

        let mut marked = 0;
        for (block, head) in extensions {
            if head.is_some() {
                marked += 1;
            }
            ctx.comp.method_mut().cfg.set_extension_of(block, head);
        }
        if marked > 0 {
            ctx.record_transformation("extended fall-through chains");
        }
        Ok(marked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Cfg, Method};
    use crate::optimizer::manager::RequestTable;
    use crate::optimizer::{Compilation, Hotness, OptId};

    #[test]
    fn chains_resolve_to_their_head() {
        let mut method = Method::new("bbe");
        let a = method.cfg.add_block();
        let b = method.cfg.add_block();
        let c = method.cfg.add_block();
        method.cfg.add_edge(Cfg::ENTRY, a);
        method.cfg.add_edge(a, b);
        method.cfg.add_edge(b, c);
        method.cfg.add_edge(c, Cfg::EXIT);

        let mut comp = Compilation::new(method, Hotness::Cold);
        let mut requests = RequestTable::new();
        let mut ctx = PassContext {
            comp: &mut comp,
            requests: &mut requests,
            use_defs: None,
            value_numbers: None,
            opt: OptId::BasicBlockExtension,
            trace: false,
        };
        let marked = BlockExtension.perform(&mut ctx).unwrap();
        assert_eq!(marked, 2);
        assert_eq!(comp.method().cfg.start_of_extended_block(c), a);
    }
}
