//! Global value propagation.
//!
//! Rewrites a load to a constant when use-def information shows exactly
//! one reaching definition and that definition stores a constant. Runs
//! over global use-defs and global value numbers, which is what makes the
//! driver materialize both before dispatching it.

use crate::error::Result;
use crate::ir::{NodeId, Opcode};
use crate::optimizer::pass::{OptimizationPass, PassContext};
use crate::optimizer::OptId;

pub(crate) fn create() -> Box<dyn OptimizationPass> {
    Box::new(GlobalValuePropagation)
}

struct GlobalValuePropagation;

impl OptimizationPass for GlobalValuePropagation {
    fn perform(&mut self, ctx: &mut PassContext<'_>) -> Result<u32> {
        let Some(use_defs) = ctx.use_defs else {
            return Ok(0);
        };

        // Find single-definition constant loads first, then rewrite.
        let mut rewrites: Vec<(NodeId, i64)> = Vec::new();
        {
            let method = ctx.comp.method();
            for node in method.pool.live_nodes() {
                if !matches!(method.pool.node(node).opcode, Opcode::ILoad(_)) {
                    continue;
                }
                let Some(defs) = use_defs.defs_for_use(node) else {
                    continue;
                };
                let [single] = defs else { continue };
                let def = method.pool.node(*single);
                if !matches!(def.opcode, Opcode::IStore(_)) {
                    continue;
                }
                let stored = def
                    .children
                    .first()
                    .and_then(|&c| method.pool.node(c).opcode.const_value());
                if let Some(value) = stored {
                    rewrites.push((node, value));
                }
            }
        }

        if rewrites.is_empty() {
            return Ok(0);
        }
        let rewritten = rewrites.len() as u32;
        for (node, value) in rewrites {
            let target = ctx.comp.method_mut().pool.node_mut(node);
            target.opcode = Opcode::IConst(value);
            target.children.clear();
        }
        ctx.requests.request(OptId::TreeSimplification);
        ctx.record_transformation("propagated constants over use-def chains");
        Ok(rewritten)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Cfg, Method};
    use crate::optimizer::manager::RequestTable;
    use crate::optimizer::usedef::{UseDefBuildOptions, UseDefInfo};
    use crate::optimizer::{Compilation, Hotness};

    #[test]
    fn rewrites_single_definition_loads() {
        let mut method = Method::new("gvp");
        let a = method.symrefs.create_auto();
        let out = method.symrefs.create_auto();
        let b1 = method.cfg.add_block();
        let b2 = method.cfg.add_block();
        method.cfg.add_edge(Cfg::ENTRY, b1);
        method.cfg.add_edge(b1, b2);
        method.cfg.add_edge(b2, Cfg::EXIT);

        method.append_const_store(b1, a, 11);
        let copy = method.append_copy(b2, out, a);
        let load = method.pool.node(copy).children[0];

        let info = UseDefInfo::build(
            &method,
            &UseDefBuildOptions {
                requires_globals: true,
                ..Default::default()
            },
        );
        let mut comp = Compilation::new(method, Hotness::Hot);
        let mut requests = RequestTable::new();
        let mut ctx = PassContext {
            comp: &mut comp,
            requests: &mut requests,
            use_defs: Some(&info),
            value_numbers: None,
            opt: OptId::GlobalValuePropagation,
            trace: false,
        };
        let rewritten = GlobalValuePropagation.perform(&mut ctx).unwrap();
        assert_eq!(rewritten, 1);
        assert_eq!(comp.method().pool.node(load).opcode, Opcode::IConst(11));
        assert!(requests.is_requested(OptId::TreeSimplification));
    }
}
