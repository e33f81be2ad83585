//! Induction-variable analysis.
//!
//! For every natural loop in the structure tree, finds storage locations
//! stepped by a constant each iteration (`x <- load x + k` anywhere in the
//! loop body) and records them on the compilation. A pure analysis: it
//! never mutates the trees, it only publishes results.

use std::collections::HashSet;

use crate::error::Result;
use crate::ir::{BlockId, Opcode, Region};
use crate::optimizer::compilation::InductionVariable;
use crate::optimizer::pass::{OptimizationPass, PassContext};

pub(crate) fn create() -> Box<dyn OptimizationPass> {
    Box::new(InductionAnalysis)
}

struct InductionAnalysis;

fn region_blocks(region: &Region, out: &mut HashSet<BlockId>) {
    match region {
        Region::Block(block) => {
            out.insert(*block);
        }
        Region::Region { children, .. } => {
            for child in children {
                region_blocks(child, out);
            }
        }
    }
}

fn loop_regions<'a>(region: &'a Region, out: &mut Vec<&'a Region>) {
    if let Region::Region {
        natural_loop,
        children,
        ..
    } = region
    {
        if *natural_loop {
            out.push(region);
        }
        for child in children {
            loop_regions(child, out);
        }
    }
}

impl OptimizationPass for InductionAnalysis {
    fn pre_perform(&mut self, ctx: &mut PassContext<'_>) {
        ctx.comp.induction_variables.clear();
    }

    fn perform(&mut self, ctx: &mut PassContext<'_>) -> Result<u32> {
        let mut found: Vec<InductionVariable> = Vec::new();
        let mut loops_scanned = 0;
        {
            let method = ctx.comp.method();
            let Some(structure) = method.cfg.structure() else {
                return Ok(0);
            };
            let mut loops = Vec::new();
            loop_regions(&structure.root, &mut loops);
            for region in loops {
                let Region::Region {
                    header: Some(header),
                    ..
                } = region
                else {
                    continue;
                };
                loops_scanned += 1;
                let mut body = HashSet::new();
                region_blocks(region, &mut body);

                for &block in &body {
                    for &root in &method.cfg.block(block).trees {
                        let Opcode::IStore(symref) = method.pool.node(root).opcode else {
                            continue;
                        };
                        let Some(&value) = method.pool.node(root).children.first() else {
                            continue;
                        };
                        let value_node = method.pool.node(value);
                        let increment = match value_node.opcode {
                            Opcode::IAdd | Opcode::ISub => {
                                let operands: Vec<_> = value_node
                                    .children
                                    .iter()
                                    .map(|&c| method.pool.node(c).opcode)
                                    .collect();
                                match operands[..] {
                                    [Opcode::ILoad(loaded), Opcode::IConst(step)]
                                        if loaded == symref =>
                                    {
                                        Some(if value_node.opcode == Opcode::ISub {
                                            -step
                                        } else {
                                            step
                                        })
                                    }
                                    [Opcode::IConst(step), Opcode::ILoad(loaded)]
                                        if loaded == symref
                                            && value_node.opcode == Opcode::IAdd =>
                                    {
                                        Some(step)
                                    }
                                    _ => None,
                                }
                            }
                            _ => None,
                        };
                        if let Some(increment) = increment {
                            found.push(InductionVariable {
                                symref,
                                increment,
                                header: *header,
                            });
                        }
                    }
                }
            }
        }

        found.sort_by_key(|iv| (iv.header, iv.symref));
        let count = found.len();
        ctx.comp.induction_variables = found;
        if count > 0 {
            ctx.record_transformation("recorded induction variables");
        }
        Ok(loops_scanned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Cfg, Method};
    use crate::optimizer::manager::RequestTable;
    use crate::optimizer::{regions, Compilation, Hotness, OptId};

    #[test]
    fn finds_stepped_storage_in_a_loop() {
        let mut method = Method::new("iv");
        let i = method.symrefs.create_auto();
        let body = method.cfg.add_block();
        method.cfg.add_edge(Cfg::ENTRY, body);
        method.cfg.add_edge(body, body);
        method.cfg.add_edge(body, Cfg::EXIT);

        // i <- load i + 1
        let load = method.pool.alloc(Opcode::ILoad(i), Vec::new());
        let one = method.pool.alloc(Opcode::IConst(1), Vec::new());
        let add = method.pool.alloc(Opcode::IAdd, vec![load, one]);
        let store = method.pool.alloc(Opcode::IStore(i), vec![add]);
        method.cfg.block_mut(body).trees.push(store);

        let structure = regions::analyze(&method.cfg);
        method.cfg.set_structure(Some(structure));

        let mut comp = Compilation::new(method, Hotness::Hot);
        let mut requests = RequestTable::new();
        let mut ctx = PassContext {
            comp: &mut comp,
            requests: &mut requests,
            use_defs: None,
            value_numbers: None,
            opt: OptId::InductionVariableAnalysis,
            trace: false,
        };
        let loops = InductionAnalysis.perform(&mut ctx).unwrap();
        assert_eq!(loops, 1);
        assert_eq!(comp.induction_variables.len(), 1);
        assert_eq!(comp.induction_variables[0].symref, i);
        assert_eq!(comp.induction_variables[0].increment, 1);
    }
}
