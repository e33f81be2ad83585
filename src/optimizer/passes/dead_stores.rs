//! Dead-store elimination, local and global.
//!
//! The local flavor removes a store overwritten later in its own block
//! with no intervening load of aliasing storage. The global flavor walks
//! use-def information — built with trivial defs kept — and removes
//! stores to automatics that feed no use anywhere in the method.

use rustc_hash::FxHashMap;

use crate::error::Result;
use crate::ir::{BlockId, NodeId, Opcode, SymbolKind};
use crate::optimizer::pass::{OptimizationPass, PassContext};
use crate::optimizer::OptId;

pub(crate) fn create_local() -> Box<dyn OptimizationPass> {
    Box::new(LocalDeadStores)
}

pub(crate) fn create_global() -> Box<dyn OptimizationPass> {
    Box::new(GlobalDeadStores)
}

struct LocalDeadStores;

impl LocalDeadStores {
    fn clean_block(ctx: &mut PassContext<'_>, block: BlockId) -> u32 {
        let roots: Vec<NodeId> = ctx.comp.method().cfg.block(block).trees.clone();
        // storage class -> tree index of the pending (unread) store
        let mut pending: FxHashMap<(u32, i32), usize> = FxHashMap::default();
        let mut dead: Vec<usize> = Vec::new();

        for (position, &root) in roots.iter().enumerate() {
            // Any load under this root consumes pending stores first.
            Self::consume_reads(ctx, root, &mut pending);

            if let Opcode::IStore(symref) = ctx.comp.method().pool.node(root).opcode {
                let entry = ctx.comp.method().symrefs.symref(symref);
                let key = (entry.symbol.0, entry.offset);
                if let Some(previous) = pending.insert(key, position) {
                    dead.push(previous);
                }
            }
        }

        if dead.is_empty() {
            return 0;
        }
        let removed = dead.len() as u32;
        let trees = &mut ctx.comp.method_mut().cfg.block_mut(block).trees;
        let mut index = 0;
        trees.retain(|_| {
            let keep = !dead.contains(&index);
            index += 1;
            keep
        });
        removed
    }

    fn consume_reads(
        ctx: &PassContext<'_>,
        root: NodeId,
        pending: &mut FxHashMap<(u32, i32), usize>,
    ) {
        let method = ctx.comp.method();
        let mut work = vec![root];
        while let Some(node) = work.pop() {
            let n = method.pool.node(node);
            if let Opcode::ILoad(symref) = n.opcode {
                let entry = method.symrefs.symref(symref);
                pending.remove(&(entry.symbol.0, entry.offset));
            }
            work.extend(n.children.iter().copied());
        }
    }
}

impl OptimizationPass for LocalDeadStores {
    fn perform(&mut self, ctx: &mut PassContext<'_>) -> Result<u32> {
        let blocks: Vec<BlockId> = ctx.comp.method().cfg.live_blocks().collect();
        let mut removed = 0;
        for block in blocks {
            let here = Self::clean_block(ctx, block);
            if here > 0 {
                ctx.requests
                    .request_on_block(OptId::DeadTreesElimination, block);
            }
            removed += here;
        }
        if removed > 0 {
            ctx.record_transformation("removed overwritten local stores");
        }
        Ok(removed)
    }

    fn perform_on_block(&mut self, block: BlockId, ctx: &mut PassContext<'_>) -> Result<u32> {
        Ok(Self::clean_block(ctx, block))
    }
}

struct GlobalDeadStores;

impl OptimizationPass for GlobalDeadStores {
    fn should_perform(&self, comp: &crate::optimizer::Compilation) -> bool {
        comp.method().cfg.first_block().is_some()
    }

    fn perform(&mut self, ctx: &mut PassContext<'_>) -> Result<u32> {
        let Some(use_defs) = ctx.use_defs else {
            return Ok(0);
        };

        // Collect removable stores first; mutate afterwards.
        let mut dead: Vec<(BlockId, NodeId)> = Vec::new();
        {
            let method = ctx.comp.method();
            for block in method.cfg.live_blocks() {
                for &root in &method.cfg.block(block).trees {
                    let Opcode::IStore(symref) = method.pool.node(root).opcode else {
                        continue;
                    };
                    let entry = method.symrefs.symref(symref);
                    if !matches!(
                        method.symrefs.symbol_kind(entry.symbol),
                        Some(SymbolKind::Auto)
                    ) {
                        continue;
                    }
                    if matches!(use_defs.uses_for_def(root), Some(uses) if uses.is_empty()) {
                        dead.push((block, root));
                    }
                }
            }
        }

        if dead.is_empty() {
            return Ok(0);
        }
        let removed = dead.len() as u32;
        for (block, root) in dead {
            ctx.comp
                .method_mut()
                .cfg
                .block_mut(block)
                .trees
                .retain(|&t| t != root);
            ctx.requests
                .request_on_block(OptId::DeadTreesElimination, block);
        }
        ctx.record_transformation("removed unread stores");
        Ok(removed)
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
    fn local_flavor_removes_overwritten_store() {
        let mut method = Method::new("ldse");
        let a = method.symrefs.create_auto();
        let out = method.symrefs.create_auto();
        let block = method.cfg.add_block();
        method.cfg.add_edge(Cfg::ENTRY, block);
        method.cfg.add_edge(block, Cfg::EXIT);

        method.append_const_store(block, a, 1); // dead: overwritten below
        method.append_const_store(block, a, 2);
        method.append_copy(block, out, a);

        let mut comp = Compilation::new(method, Hotness::Warm);
        let mut requests = RequestTable::new();
        let mut ctx = PassContext {
            comp: &mut comp,
            requests: &mut requests,
            use_defs: None,
            value_numbers: None,
            opt: OptId::LocalDeadStoreElimination,
            trace: false,
        };
        let removed = LocalDeadStores.perform(&mut ctx).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(comp.method().cfg.block(block).trees.len(), 2);
    }

    #[test]
    fn global_flavor_removes_unread_store() {
        let mut method = Method::new("gdse");
        let a = method.symrefs.create_auto();
        let unread = method.symrefs.create_auto();
        let out = method.symrefs.create_auto();
        let b1 = method.cfg.add_block();
        let b2 = method.cfg.add_block();
        method.cfg.add_edge(Cfg::ENTRY, b1);
        method.cfg.add_edge(b1, b2);
        method.cfg.add_edge(b2, Cfg::EXIT);

        method.append_const_store(b1, a, 1);
        method.append_const_store(b1, unread, 5); // never loaded anywhere
        method.append_copy(b2, out, a);

        let info = UseDefInfo::build(
            &method,
            &UseDefBuildOptions {
                requires_globals: true,
                loads_as_defs: true,
                cannot_omit_trivial_defs: true,
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
            opt: OptId::GlobalDeadStoreElimination,
            trace: false,
        };
        let removed = GlobalDeadStores.perform(&mut ctx).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(comp.method().cfg.block(b1).trees.len(), 1);
    }
}
