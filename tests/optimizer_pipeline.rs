//! End-to-end scenarios for the optimizer orchestrator.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use jitport::ir::{Cfg, Method, NodeId, Opcode};
use jitport::optimizer::events::{CacheKind, Event};
use jitport::optimizer::{
    CompileFlags, Compilation, Hotness, OptGuard, OptId, OptimizationPass, Optimizer,
    PassContext, StrategyEntry,
};
use jitport::Error;

/// One block holding `out <- add(2, 3)`.
fn one_block_add_method() -> (Method, NodeId) {
    let mut method = Method::new("one-block-add");
    let out = method.symrefs.create_auto();
    let block = method.cfg.add_block();
    method.cfg.add_edge(Cfg::ENTRY, block);
    method.cfg.add_edge(block, Cfg::EXIT);

    let two = method.pool.alloc(Opcode::IConst(2), Vec::new());
    let three = method.pool.alloc(Opcode::IConst(3), Vec::new());
    let add = method.pool.alloc(Opcode::IAdd, vec![two, three]);
    let store = method.pool.alloc(Opcode::IStore(out), vec![add]);
    method.cfg.block_mut(block).trees.push(store);
    (method, add)
}

/// Straight-line two-block method with a cross-block constant copy.
fn straight_line_method() -> Method {
    let mut method = Method::new("straight-line");
    let a = method.symrefs.create_auto();
    let out = method.symrefs.create_auto();
    let b1 = method.cfg.add_block();
    let b2 = method.cfg.add_block();
    method.cfg.add_edge(Cfg::ENTRY, b1);
    method.cfg.add_edge(b1, b2);
    method.cfg.add_edge(b2, Cfg::EXIT);
    method.append_const_store(b1, a, 21);
    method.append_copy(b2, out, a);
    method
}

/// A counted loop: `i <- load i + 1` in a self-looping body block.
fn loop_method() -> Method {
    let mut method = Method::new("loop");
    let i = method.symrefs.create_auto();
    let out = method.symrefs.create_auto();
    let body = method.cfg.add_block();
    let tail = method.cfg.add_block();
    method.cfg.add_edge(Cfg::ENTRY, body);
    method.cfg.add_edge(body, body);
    method.cfg.add_edge(body, tail);
    method.cfg.add_edge(tail, Cfg::EXIT);

    let load = method.pool.alloc(Opcode::ILoad(i), Vec::new());
    let one = method.pool.alloc(Opcode::IConst(1), Vec::new());
    let add = method.pool.alloc(Opcode::IAdd, vec![load, one]);
    let store = method.pool.alloc(Opcode::IStore(i), vec![add]);
    method.cfg.block_mut(body).trees.push(store);
    method.append_copy(tail, out, i);
    method
}

#[test]
fn e1_single_pass_strategy_folds_constants() {
    let (method, add) = one_block_add_method();
    let mut comp = Compilation::new(method, Hotness::Warm);
    let before = comp.method().pool.node_count();

    let mut optimizer = Optimizer::create_with_strategy(
        &mut comp,
        vec![StrategyEntry {
            opt: OptId::TreeSimplification,
            guard: OptGuard::Always,
        }],
    )
    .unwrap();
    optimizer.optimize(&mut comp).unwrap();

    assert_eq!(comp.method().pool.node(add).opcode, Opcode::IConst(5));
    assert!(comp.method().pool.node_count() < before);
    assert_eq!(comp.events.invalidations(CacheKind::ValueNumbers), 1);
}

#[test]
fn e2_loop_guard_skips_pass_on_loop_free_method() {
    let mut comp = Compilation::new(straight_line_method(), Hotness::Warm);
    let mut optimizer = Optimizer::create_with_strategy(
        &mut comp,
        vec![StrategyEntry {
            opt: OptId::InductionVariableAnalysis,
            guard: OptGuard::IfLoops,
        }],
    )
    .unwrap();
    optimizer.optimize(&mut comp).unwrap();

    assert_eq!(
        comp.events
            .count_matching(|e| matches!(e, Event::PassPerformed { .. })),
        0
    );
    assert_eq!(
        comp.events
            .count_matching(|e| matches!(e, Event::OptimizationPhase { .. })),
        0
    );
    assert!(!optimizer.requests_mut().is_requested(OptId::InductionVariableAnalysis));
    assert!(comp.induction_variables.is_empty());
}

static E3_ROUNDS: AtomicU32 = AtomicU32::new(0);
static E3_BLOCK_RUNS: AtomicU32 = AtomicU32::new(0);

struct BlockRequester;

impl OptimizationPass for BlockRequester {
    fn perform(&mut self, _ctx: &mut PassContext<'_>) -> jitport::Result<u32> {
        Ok(0)
    }

    fn pre_perform_on_blocks(&mut self, _ctx: &mut PassContext<'_>) {
        E3_ROUNDS.fetch_add(1, Ordering::SeqCst);
    }

    fn perform_on_block(
        &mut self,
        block: jitport::ir::BlockId,
        ctx: &mut PassContext<'_>,
    ) -> jitport::Result<u32> {
        E3_BLOCK_RUNS.fetch_add(1, Ordering::SeqCst);
        if E3_ROUNDS.load(Ordering::SeqCst) <= 3 {
            ctx.requests.request_on_block(OptId::LocalCSE, block);
        }
        Ok(1)
    }
}

fn block_requester_factory() -> Box<dyn OptimizationPass> {
    Box::new(BlockRequester)
}

#[test]
fn e3_local_analysis_group_reenters_while_blocks_pend() {
    let mut comp = Compilation::new(straight_line_method(), Hotness::Warm);
    let blocks: Vec<_> = comp.method().cfg.live_blocks().collect();

    let mut optimizer = Optimizer::create_with_strategy(
        &mut comp,
        vec![StrategyEntry {
            opt: OptId::EachLocalAnalysisPassGroup,
            guard: OptGuard::Always,
        }],
    )
    .unwrap();
    optimizer
        .manager_mut(OptId::LocalCSE)
        .set_factory(block_requester_factory);
    for &block in &blocks {
        optimizer.requests_mut().request_on_block(OptId::LocalCSE, block);
    }

    optimizer.optimize(&mut comp).unwrap();

    let iterations = comp.events.events().iter().find_map(|e| match e {
        Event::GroupExited { opt, iterations } if *opt == OptId::EachLocalAnalysisPassGroup => {
            Some(*iterations)
        }
        _ => None,
    });
    assert_eq!(iterations, Some(4));
    assert_eq!(E3_ROUNDS.load(Ordering::SeqCst), 4);
    assert_eq!(E3_BLOCK_RUNS.load(Ordering::SeqCst), 8);
}

#[test]
fn p1_optimize_preserves_outer_optimizer() {
    let mut comp = Compilation::new(straight_line_method(), Hotness::Warm);
    assert_eq!(comp.current_optimizer(), None);
    let mut optimizer = Optimizer::create(&mut comp, false).unwrap();
    optimizer.optimize(&mut comp).unwrap();
    assert_eq!(comp.current_optimizer(), None);
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "last-run")]
fn p2_running_after_last_run_is_a_programmer_error() {
    let mut comp = Compilation::new(straight_line_method(), Hotness::Warm);
    let mut optimizer = Optimizer::create_with_strategy(
        &mut comp,
        vec![
            StrategyEntry {
                opt: OptId::LocalValuePropagation,
                guard: OptGuard::MarkLastRun,
            },
            StrategyEntry {
                opt: OptId::LocalValuePropagation,
                guard: OptGuard::Always,
            },
        ],
    )
    .unwrap();
    let _ = optimizer.optimize(&mut comp);
}

static P3_SAW_USE_DEFS: AtomicBool = AtomicBool::new(false);

struct UseDefProbe;

impl OptimizationPass for UseDefProbe {
    fn perform(&mut self, ctx: &mut PassContext<'_>) -> jitport::Result<u32> {
        P3_SAW_USE_DEFS.store(ctx.use_defs.is_some(), Ordering::SeqCst);
        Ok(0)
    }
}

fn use_def_probe_factory() -> Box<dyn OptimizationPass> {
    Box::new(UseDefProbe)
}

#[test]
fn p3_use_def_requirement_is_satisfied_before_dispatch() {
    let mut comp = Compilation::new(straight_line_method(), Hotness::Hot);
    let mut optimizer = Optimizer::create_with_strategy(
        &mut comp,
        vec![StrategyEntry {
            opt: OptId::GlobalDeadStoreElimination,
            guard: OptGuard::Always,
        }],
    )
    .unwrap();
    optimizer
        .manager_mut(OptId::GlobalDeadStoreElimination)
        .set_factory(use_def_probe_factory);
    optimizer.optimize(&mut comp).unwrap();
    assert!(P3_SAW_USE_DEFS.load(Ordering::SeqCst));
}

#[test]
fn p4_stable_symrefs_keep_snapshot_and_aliases_valid() {
    let mut comp = Compilation::new(straight_line_method(), Hotness::Warm);
    let mut optimizer = Optimizer::create(&mut comp, false).unwrap();
    optimizer.optimize(&mut comp).unwrap();
    assert_eq!(comp.events.invalidations(CacheKind::SymRefTable), 0);
    assert_eq!(comp.events.invalidations(CacheKind::AliasSets), 0);
}

#[test]
fn b3_empty_strategy_is_a_valid_no_op() {
    let mut comp = Compilation::new(straight_line_method(), Hotness::NoOpt);
    let mut optimizer = Optimizer::create(&mut comp, false).unwrap();
    optimizer.optimize(&mut comp).unwrap();
    assert!(comp.events.events().is_empty());
}

#[test]
fn warm_pipeline_cleans_redundancy_end_to_end() {
    let mut method = straight_line_method();
    let scrap = method.symrefs.create_auto();
    let block = method.cfg.first_block().unwrap();
    method.append_const_store(block, scrap, 1);
    method.append_const_store(block, scrap, 2);

    let mut comp = Compilation::new(method, Hotness::Warm);
    let mut optimizer = Optimizer::create(&mut comp, false).unwrap();
    optimizer.optimize(&mut comp).unwrap();

    // Local dead-store elimination drops the overwritten `scrap` store,
    // and the global flavor then drops every store no load ever reads;
    // only the store feeding the cross-block copy survives.
    let stores: usize = comp
        .method()
        .cfg
        .live_blocks()
        .map(|b| comp.method().cfg.block(b).trees.len())
        .sum();
    assert_eq!(stores, 1);
}

#[test]
fn hot_pipeline_records_induction_variables() {
    let mut comp = Compilation::new(loop_method(), Hotness::Hot);
    let mut optimizer = Optimizer::create(&mut comp, false).unwrap();
    optimizer.optimize(&mut comp).unwrap();
    assert_eq!(comp.induction_variables.len(), 1);
    assert_eq!(comp.induction_variables[0].increment, 1);
}

#[test]
fn excessive_complexity_aborts_the_compilation() {
    let mut method = Method::new("loopy");
    let mut previous = Cfg::ENTRY;
    for _ in 0..70 {
        let block = method.cfg.add_block();
        method.cfg.add_edge(previous, block);
        method.cfg.add_edge(block, block);
        previous = block;
    }
    method.cfg.add_edge(previous, Cfg::EXIT);

    let mut comp = Compilation::new(method, Hotness::Hot);
    let mut optimizer = Optimizer::create_with_strategy(
        &mut comp,
        vec![StrategyEntry {
            opt: OptId::InductionVariableAnalysis,
            guard: OptGuard::IfLoops,
        }],
    )
    .unwrap();
    let result = optimizer.optimize(&mut comp);
    assert!(matches!(result, Err(Error::ExcessiveComplexity { loops, .. }) if loops >= 65));
}

#[test]
fn huge_method_override_lifts_the_complexity_gate() {
    let mut method = Method::new("loopy-override");
    let mut previous = Cfg::ENTRY;
    for _ in 0..70 {
        let block = method.cfg.add_block();
        method.cfg.add_edge(previous, block);
        method.cfg.add_edge(block, block);
        previous = block;
    }
    method.cfg.add_edge(previous, Cfg::EXIT);

    let mut comp = Compilation::new(method, Hotness::Hot);
    comp.options_mut().flags |= CompileFlags::PROCESS_HUGE_METHODS;
    let mut optimizer = Optimizer::create_with_strategy(
        &mut comp,
        vec![StrategyEntry {
            opt: OptId::InductionVariableAnalysis,
            guard: OptGuard::IfLoops,
        }],
    )
    .unwrap();
    optimizer.optimize(&mut comp).unwrap();
    assert!(comp
        .events
        .count_matching(|e| matches!(e, Event::ComplexityOverridden { .. }))
        >= 1);
}

#[test]
fn cancellation_is_observed_at_the_pass_boundary() {
    let mut comp = Compilation::new(straight_line_method(), Hotness::Warm);
    comp.request_interruption();
    let mut optimizer = Optimizer::create_with_strategy(
        &mut comp,
        vec![StrategyEntry {
            opt: OptId::TreeSimplification,
            guard: OptGuard::Always,
        }],
    )
    .unwrap();
    assert!(matches!(
        optimizer.optimize(&mut comp),
        Err(Error::CompilationInterrupted)
    ));
}

#[test]
fn deterministic_compilation_demands_a_hotter_tier() {
    let mut comp = Compilation::new(straight_line_method(), Hotness::Hot);
    comp.options_mut().flags |= CompileFlags::DETERMINISTIC_COMPILATION;
    comp.record_inlined_body(Hotness::Scorching);
    let mut optimizer = Optimizer::create(&mut comp, false).unwrap();
    let result = optimizer.optimize(&mut comp);
    assert!(matches!(
        result,
        Err(Error::InsufficientlyAggressiveCompilation {
            next: Hotness::Scorching
        })
    ));
    assert_eq!(comp.next_opt_level(), Some(Hotness::Scorching));
}

#[test]
fn disabled_opt_filter_suppresses_the_pass() {
    let (method, add) = one_block_add_method();
    let mut comp = Compilation::new(method, Hotness::Warm);
    comp.options_mut()
        .disabled_opts
        .push(jitport::optimizer::OptFilter::Name(
            "treeSimplification".into(),
        ));
    let mut optimizer = Optimizer::create_with_strategy(
        &mut comp,
        vec![StrategyEntry {
            opt: OptId::TreeSimplification,
            guard: OptGuard::Always,
        }],
    )
    .unwrap();
    optimizer.optimize(&mut comp).unwrap();
    assert_eq!(comp.method().pool.node(add).opcode, Opcode::IAdd);
}
