//! Analysis-result lifetimes.
//!
//! The optimizer owns one instance of [`AnalysisCaches`] per compilation.
//! Every derived analysis has an explicit slot and an explicit
//! invalidation: alias-set validity is a flag on this struct, use-def and
//! value-number info are owned options, the symbol-reference snapshot is
//! rebuilt whenever the reference count moves, and the structure tree
//! lives on the flow graph itself. [`AnalysisCaches::reconcile_after_pass`]
//! is the single place where a finished pass's effects are folded back
//! into cache validity.

use crate::ir::Method;
use crate::optimizer::events::{CacheKind, Event, EventLog};
use crate::optimizer::usedef::UseDefInfo;
use crate::optimizer::valuenum::ValueNumberInfo;
use crate::optimizer::Compilation;

/// Snapshot of the quantities whose movement invalidates caches, taken
/// immediately before a pass runs.
#[derive(Debug, Clone, Copy)]
pub struct PassBaseline {
    /// Live node count before the pass.
    pub node_count: u32,
    /// Symbol-reference count before the pass.
    pub symref_count: u32,
}

impl PassBaseline {
    /// Captures the baseline from `comp`.
    #[must_use]
    pub fn capture(comp: &Compilation) -> Self {
        Self {
            node_count: comp.method().pool.node_count(),
            symref_count: comp.method().symrefs.symref_count(),
        }
    }
}

/// The orchestrator-owned analysis caches for one compilation.
#[derive(Debug)]
pub struct AnalysisCaches {
    pub(crate) alias_sets_valid: bool,
    use_defs: Option<UseDefInfo>,
    value_numbers: Option<ValueNumberInfo>,
    sym_references: Option<Vec<u32>>,
    pub(crate) cant_build_global_use_defs: bool,
    pub(crate) cant_build_local_use_defs: bool,
    pub(crate) cant_build_global_value_numbers: bool,
    pub(crate) cant_build_local_value_numbers: bool,
    pub(crate) first_time_structure_built: bool,
    pub(crate) num_loops: u32,
    pub(crate) num_blocks: u32,
    pub(crate) disable_loop_opts_that_can_create_loops: bool,
}

impl Default for AnalysisCaches {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisCaches {
    /// Creates empty caches.
    #[must_use]
    pub fn new() -> Self {
        Self {
            alias_sets_valid: false,
            use_defs: None,
            value_numbers: None,
            sym_references: None,
            cant_build_global_use_defs: false,
            cant_build_local_use_defs: false,
            cant_build_global_value_numbers: false,
            cant_build_local_value_numbers: false,
            first_time_structure_built: true,
            num_loops: 0,
            num_blocks: 0,
            disable_loop_opts_that_can_create_loops: false,
        }
    }

    /// Are alias sets currently valid?
    #[must_use]
    pub fn alias_sets_valid(&self) -> bool {
        self.alias_sets_valid
    }

    /// Current use-def info, if any.
    #[must_use]
    pub fn use_defs(&self) -> Option<&UseDefInfo> {
        self.use_defs.as_ref()
    }

    /// Replaces the use-def cache. Passing `None` drops it.
    pub fn set_use_defs(&mut self, info: Option<UseDefInfo>) {
        self.use_defs = info;
    }

    /// Current value-number info, if any.
    #[must_use]
    pub fn value_numbers(&self) -> Option<&ValueNumberInfo> {
        self.value_numbers.as_ref()
    }

    /// Replaces the value-number cache. Passing `None` drops it.
    pub fn set_value_numbers(&mut self, info: Option<ValueNumberInfo>) {
        self.value_numbers = info;
    }

    /// The canonical symbol-reference snapshot, built on first demand.
    ///
    /// Entry `i` holds the index of the earliest reference naming the same
    /// symbol and offset as reference `i` (itself, when it is the first).
    pub fn sym_references_table(&mut self, method: &Method) -> &[u32] {
        if self.sym_references.is_none() {
            let count = method.symrefs.symref_count() as usize;
            let mut table: Vec<u32> = (0..count as u32).collect();
            for index in crate::ir::SymRefTable::FIRST_USER_INDEX as usize..count {
                let symref = method.symrefs.symref(crate::ir::SymRefId(index as u32));
                for earlier in crate::ir::SymRefTable::FIRST_USER_INDEX as usize..index {
                    if table[earlier] == earlier as u32 {
                        let other = method.symrefs.symref(crate::ir::SymRefId(earlier as u32));
                        if other.symbol == symref.symbol && other.offset == symref.offset {
                            table[index] = earlier as u32;
                            break;
                        }
                    }
                }
            }
            self.sym_references = Some(table);
        }
        self.sym_references.as_ref().expect("just built").as_slice()
    }

    /// Is the snapshot currently materialized?
    #[must_use]
    pub fn has_sym_references_table(&self) -> bool {
        self.sym_references.is_some()
    }

    /// Folds a finished pass's effects into cache validity.
    ///
    /// Node growth invalidates value numbers, and use-defs too unless the
    /// pass maintains them. Any symbol-reference movement invalidates the
    /// snapshot and the alias sets.
    pub fn reconcile_after_pass(
        &mut self,
        method: &Method,
        maintains_use_defs: bool,
        baseline: &PassBaseline,
        events: &mut EventLog,
    ) {
        if method.pool.node_count() > baseline.node_count {
            self.value_numbers = None;
            events.record(Event::CacheInvalidated {
                cache: CacheKind::ValueNumbers,
            });
            if !maintains_use_defs {
                self.use_defs = None;
                events.record(Event::CacheInvalidated {
                    cache: CacheKind::UseDefs,
                });
            }
        }

        if method.symrefs.symref_count() != baseline.symref_count {
            self.sym_references = None;
            events.record(Event::CacheInvalidated {
                cache: CacheKind::SymRefTable,
            });
            self.alias_sets_valid = false;
            events.record(Event::CacheInvalidated {
                cache: CacheKind::AliasSets,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Method, SymbolKind};

    #[test]
    fn symref_table_is_identity_with_canonical_representatives() {
        let mut method = Method::new("snapshot");
        let symbol = method.symrefs.create_symbol(SymbolKind::Auto);
        let first = method.symrefs.create_symref(symbol, 0);
        let duplicate = method.symrefs.create_symref(symbol, 0);
        let other = method.symrefs.create_symref(symbol, 4);

        let mut caches = AnalysisCaches::new();
        let table = caches.sym_references_table(&method);
        assert_eq!(table[first.index()], first.index() as u32);
        assert_eq!(table[duplicate.index()], first.index() as u32);
        assert_eq!(table[other.index()], other.index() as u32);
    }

    #[test]
    fn symref_growth_invalidates_snapshot_and_aliases() {
        let mut method = Method::new("reconcile");
        method.symrefs.create_auto();
        let baseline = PassBaseline {
            node_count: method.pool.node_count(),
            symref_count: method.symrefs.symref_count() - 1,
        };
        let mut caches = AnalysisCaches::new();
        caches.alias_sets_valid = true;
        caches.sym_references_table(&method);
        let mut events = EventLog::new();
        caches.reconcile_after_pass(&method, false, &baseline, &mut events);
        assert!(!caches.alias_sets_valid());
        assert!(!caches.has_sym_references_table());
        assert_eq!(events.invalidations(CacheKind::SymRefTable), 1);
        assert_eq!(events.invalidations(CacheKind::AliasSets), 1);
    }
}
