//! The optimizer driver.
//!
//! Owns the per-optimization managers, the request table and the analysis
//! caches for one compilation, and executes a strategy against it. The
//! core of the module is [`Optimizer::perform_optimization`], which takes
//! one strategy entry from guard evaluation through analysis
//! materialization, dispatch and cache reconciliation.

use strum::EnumCount;

use crate::error::{Error, Result};
use crate::ir::{Cfg, NodeId};
use crate::optimizer::caches::{AnalysisCaches, PassBaseline};
use crate::optimizer::compilation::HIGH_VISIT_COUNT;
use crate::optimizer::events::{AnalysisPhase, CacheKind, Event};
use crate::optimizer::manager::{OptCaps, OptimizationManager, RequestTable};
use crate::optimizer::regions;
use crate::optimizer::strategy::{
    decode_custom_strategy, strategy_for_hotness, StrategyEntry, ILGEN_STRATEGY,
};
use crate::optimizer::usedef::{UseDefBuildOptions, UseDefInfo};
use crate::optimizer::valuenum::ValueNumberInfo;
use crate::optimizer::{CompileFlags, Compilation, Hotness, OptGuard, OptId, PassContext};

/// Methods with at least this many flow-graph nodes trip the complexity
/// gate.
const HIGH_BASIC_BLOCK_COUNT: u32 = 2500;

/// Methods with at least this many natural loops trip the complexity gate.
const HIGH_LOOP_COUNT: u32 = 65;

/// Raised loop threshold for very-hot and hotter compilations.
const VERY_HOT_HIGH_LOOP_COUNT: u32 = 100;

/// Iteration cap of the local-analysis group's re-entry protocol.
const MAX_LOCAL_OPTS_ITERS: u32 = 5;

#[derive(Debug, Clone, Copy, Default)]
struct GuardDecision {
    do_this: bool,
    if_enabled: bool,
    must_be_done: bool,
    just_set_last_run: bool,
}

#[derive(Debug)]
enum StrategySource {
    Fixed(&'static [StrategyEntry]),
    Custom(Vec<StrategyEntry>),
}

/// The optimizer: one strategy execution engine per compilation.
///
/// Optimizers nest — a pass may create an inner optimizer against the
/// same compilation — so [`Optimizer::optimize`] saves and restores the
/// compilation's current-optimizer slot.
#[derive(Debug)]
pub struct Optimizer {
    id: u32,
    il_gen: bool,
    strategy: StrategySource,
    managers: Vec<OptimizationManager>,
    requests: RequestTable,
    caches: AnalysisCaches,
    opt_depth: u32,
}

impl Optimizer {
    /// Creates an optimizer for `comp`.
    ///
    /// With `il_gen` set, the fixed IL-generation strategy is used and
    /// every selected pass must support the IL-generation level. Otherwise
    /// a configured custom strategy is decoded, falling back to the
    /// hotness-indexed built-in tables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStrategy`] when a custom strategy fails to
    /// decode or an IL-generation strategy selects an unsupported pass.
    pub fn create(comp: &mut Compilation, il_gen: bool) -> Result<Self> {
        if il_gen {
            return Self::with_source(comp, StrategySource::Fixed(ILGEN_STRATEGY), true);
        }
        if let Some(words) = comp.options().custom_strategy.clone() {
            let entries = decode_custom_strategy(&words)?;
            return Self::with_source(comp, StrategySource::Custom(entries), false);
        }
        let strategy = strategy_for_hotness(comp.method_hotness());
        Self::with_source(comp, StrategySource::Fixed(strategy), false)
    }

    /// Creates an optimizer running `entries` instead of the built-in
    /// tables. This is the embedder and test hook for mock strategies.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStrategy`] if the entries are unusable.
    pub fn create_with_strategy(
        comp: &mut Compilation,
        entries: Vec<StrategyEntry>,
    ) -> Result<Self> {
        Self::with_source(comp, StrategySource::Custom(entries), false)
    }

    fn with_source(
        comp: &mut Compilation,
        strategy: StrategySource,
        il_gen: bool,
    ) -> Result<Self> {
        let managers: Vec<OptimizationManager> = (0..OptId::COUNT as u16)
            .map(|index| OptimizationManager::new(OptId::from_repr(index).expect("dense ids")))
            .collect();

        if il_gen {
            let entries: &[StrategyEntry] = match &strategy {
                StrategySource::Fixed(s) => s,
                StrategySource::Custom(v) => v,
            };
            for entry in entries {
                let caps = managers[entry.opt as usize].caps();
                if !caps.contains(OptCaps::SUPPORTS_ILGEN_OPT_LEVEL) {
                    return Err(Error::InvalidStrategy {
                        reason: format!(
                            "{} does not support the IL generation opt level",
                            entry.opt.name()
                        ),
                    });
                }
            }
        }

        Ok(Self {
            id: comp.allocate_optimizer_id(),
            il_gen,
            strategy,
            managers,
            requests: RequestTable::new(),
            caches: AnalysisCaches::new(),
            opt_depth: 0,
        })
    }

    /// Is this the IL-generation optimizer?
    #[must_use]
    pub fn is_il_gen_opt(&self) -> bool {
        self.il_gen
    }

    /// This optimizer's identity on the compilation.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Borrows the manager of `opt`.
    #[must_use]
    pub fn manager(&self, opt: OptId) -> &OptimizationManager {
        &self.managers[opt as usize]
    }

    /// Mutably borrows the manager of `opt` (embedder customization).
    pub fn manager_mut(&mut self, opt: OptId) -> &mut OptimizationManager {
        &mut self.managers[opt as usize]
    }

    /// The request table.
    pub fn requests_mut(&mut self) -> &mut RequestTable {
        &mut self.requests
    }

    /// The analysis caches.
    #[must_use]
    pub fn caches(&self) -> &AnalysisCaches {
        &self.caches
    }

    /// Per-block dispatch is never available to IL-generation optimizers.
    fn can_run_block_by_block(&self) -> bool {
        !self.il_gen
    }

    /// Runs the strategy end to end.
    ///
    /// # Errors
    ///
    /// Propagates pass-level typed failures unchanged:
    /// [`Error::ExcessiveComplexity`],
    /// [`Error::InsufficientlyAggressiveCompilation`] and
    /// [`Error::CompilationInterrupted`] abort the compilation.
    pub fn optimize(&mut self, comp: &mut Compilation) -> Result<()> {
        let previous = comp.current_optimizer();
        comp.set_current_optimizer(Some(self.id));
        let result = self.optimize_inner(comp);
        comp.set_current_optimizer(previous);
        result
    }

    fn optimize_inner(&mut self, comp: &mut Compilation) -> Result<()> {
        let first_index = comp.options().first_opt_index;
        let last_index = comp.options().last_opt_index;

        let entries: Vec<StrategyEntry> = match &self.strategy {
            StrategySource::Fixed(s) => s.to_vec(),
            StrategySource::Custom(v) => v.clone(),
        };
        for entry in entries {
            self.perform_optimization(comp, entry, first_index, last_index)?;

            if !self.il_gen {
                let roots: Vec<NodeId> = comp.method().tree_roots().collect();
                if comp.method_mut().pool.remove_dead_nodes(roots.into_iter()) {
                    self.caches.set_value_numbers(None);
                    comp.events.record(Event::CacheInvalidated {
                        cache: CacheKind::ValueNumbers,
                    });
                }
            }
        }

        if comp.option(CompileFlags::DETERMINISTIC_COMPILATION)
            && comp.is_outermost_method()
            && comp.method_hotness() > Hotness::Cold
            && comp.method_hotness() < Hotness::Scorching
        {
            let next = comp.max_hotness_of_inlined_bodies();
            if next > comp.method_hotness() {
                comp.set_next_opt_level(next);
                return Err(Error::InsufficientlyAggressiveCompilation { next });
            }
        }
        Ok(())
    }

    /// Dispatches one strategy entry.
    ///
    /// Returns a rough cost of the work performed: analysis builds and the
    /// pass's own estimate. Entries outside `[first_index, last_index]`
    /// (and not `MustBeDone`) are counted but not run.
    ///
    /// # Errors
    ///
    /// Propagates pass failures and raises [`Error::ExcessiveComplexity`]
    /// and [`Error::CompilationInterrupted`] per the driver contract.
    pub fn perform_optimization(
        &mut self,
        comp: &mut Compilation,
        entry: StrategyEntry,
        first_index: u32,
        last_index: u32,
    ) -> Result<u32> {
        let opt = entry.opt;
        comp.report_analysis_phase(AnalysisPhase::BeforeOptimization);

        // Not incremented yet: we may be looking at a group.
        let opt_index = comp.opt_index() + 1;

        let decision = self.evaluate_guard(comp, entry);
        let mut do_this = decision.do_this;
        if decision.if_enabled && !self.requests.has_blocks(opt) {
            do_this = false;
        }

        if opt.is_group() && do_this {
            return self.perform_group(comp, opt, first_index, last_index);
        }

        // A real optimization. The index counts even when we skip, to keep
        // opt indexes stable across option changes.
        if comp.is_outermost_method() {
            comp.inc_opt_index();
        }

        if !do_this {
            debug_assert!(
                self.requests.is_requested(opt) || !self.requests.has_blocks(opt),
                "{} is disabled but blocks are still present",
                opt.name()
            );
            return Ok(0);
        }

        if !(decision.must_be_done || (opt_index >= first_index && opt_index <= last_index)) {
            return Ok(0);
        }

        if !self.managers[opt as usize].enabled() {
            return Ok(0);
        }

        let name = opt.name();
        if comp
            .options()
            .disabled_opts
            .iter()
            .any(|f| f.matches(opt_index, name))
        {
            return Ok(0);
        }
        if comp
            .options()
            .break_on_opts
            .iter()
            .any(|f| f.matches(opt_index, name))
        {
            comp.events.record(Event::BreakRequested {
                opt,
                index: opt_index,
            });
        }

        let Some(factory) = self.managers[opt as usize].factory() else {
            debug_assert!(false, "{name} has no pass factory");
            return Ok(0);
        };
        let mut pass = factory();
        if !pass.should_perform(comp) {
            return Ok(0);
        }

        let caps = self.managers[opt as usize].caps();
        let mut cost: u32 = 0;

        // Alias classes.
        if !self.caches.alias_sets_valid && !caps.contains(OptCaps::DOES_NOT_REQUIRE_ALIAS_SETS) {
            comp.report_analysis_phase(AnalysisPhase::BuildingAliases);
            comp.method_mut().symrefs.create_alias_info();
            self.caches.alias_sets_valid = true;
            cost += 1;
        }

        // Use-defs and value numbers are built over structure.
        let requires_use_defs =
            caps.intersects(OptCaps::REQUIRES_LOCAL_USE_DEFS | OptCaps::REQUIRES_GLOBAL_USE_DEFS);
        let requires_value_numbers = caps
            .intersects(OptCaps::REQUIRES_LOCAL_VALUE_NUMBERS | OptCaps::REQUIRES_GLOBAL_VALUE_NUMBERS);
        let requires_structure =
            caps.contains(OptCaps::REQUIRES_STRUCTURE) || requires_use_defs || requires_value_numbers;

        if requires_structure && comp.method().cfg.structure().is_none() {
            comp.report_analysis_phase(AnalysisPhase::BuildingStructure);
            let structure = regions::analyze(&comp.method().cfg);
            comp.method_mut().cfg.set_structure(Some(structure));
            cost += 10;

            if self.caches.first_time_structure_built {
                self.caches.first_time_structure_built = false;
                let loops = comp
                    .method()
                    .cfg
                    .structure()
                    .map_or(0, crate::ir::Structure::count_loops);
                if !comp.option(CompileFlags::PROCESS_HUGE_METHODS)
                    && loops >= HIGH_LOOP_COUNT - 25
                {
                    self.caches.disable_loop_opts_that_can_create_loops = true;
                }
            }
        }

        cost += self.materialize_use_defs(comp, caps);
        cost += self.materialize_value_numbers(comp, caps);

        // The guard admitted the pass, but a required analysis could not
        // be built; the pass is skipped rather than run with nothing.
        if requires_use_defs && self.caches.use_defs().is_none() {
            return Ok(cost);
        }
        if requires_value_numbers && self.caches.value_numbers().is_none() {
            return Ok(cost);
        }

        if caps.contains(OptCaps::REQUIRES_ACCURATE_NODE_COUNT) {
            comp.report_analysis_phase(AnalysisPhase::BuildingAccurateNodeCount);
            let roots: Vec<NodeId> = comp.method().tree_roots().collect();
            comp.method_mut()
                .pool
                .generate_accurate_node_count(roots.into_iter());
        }

        let baseline = PassBaseline::capture(comp);

        if comp.is_outermost_method()
            && comp.method().cfg.max_frequency() < 0
            && !caps.contains(OptCaps::DO_NOT_SET_FREQUENCIES)
        {
            comp.report_analysis_phase(AnalysisPhase::BuildingFrequencies);
            comp.method_mut().cfg.set_frequencies();
            comp.events.record(Event::FrequenciesComputed);
        }

        let orig_trace = self.managers[opt as usize].trace();
        if comp
            .options()
            .opts_to_trace
            .iter()
            .any(|f| f.matches(opt_index, name))
        {
            self.managers[opt as usize].set_trace(true);
        }
        if decision.if_enabled {
            self.managers[opt as usize].set_perform_only_on_enabled_blocks(true);
        }

        // Complexity gate.
        if requires_structure && comp.method().cfg.structure().is_some() {
            if let Some((blocks, loops)) = self.check_complexity(comp) {
                if comp.option(CompileFlags::PROCESS_HUGE_METHODS) {
                    comp.events.record(Event::ComplexityOverridden { blocks, loops });
                } else {
                    return Err(Error::ExcessiveComplexity { blocks, loops });
                }
            }
        }

        comp.report_optimization_phase(opt);

        let trace_now =
            self.managers[opt as usize].trace() || comp.option(CompileFlags::TRACE_OPTS);
        let bounds_requested = {
            let blocks = self.requests.blocks(opt);
            blocks.contains(&Cfg::ENTRY) || blocks.contains(&Cfg::EXIT)
        };

        if !decision.if_enabled || bounds_requested {
            debug_assert!(
                decision.just_set_last_run || !self.managers[opt as usize].last_run(),
                "{name} must not run after its last-run marker was set"
            );
            self.requests.clear(opt);
            comp.report_analysis_phase(AnalysisPhase::PerformingOptimization);
            {
                let mut ctx = PassContext {
                    comp: &mut *comp,
                    requests: &mut self.requests,
                    use_defs: self.caches.use_defs(),
                    value_numbers: self.caches.value_numbers(),
                    opt,
                    trace: trace_now,
                };
                pass.pre_perform(&mut ctx);
                cost += pass.perform(&mut ctx)?;
                pass.post_perform(&mut ctx);
            }
            comp.report_analysis_phase(AnalysisPhase::AfterOptimization);
            comp.events.record(Event::PassPerformed { opt, cost });
        } else if self.can_run_block_by_block() {
            {
                let mut ctx = PassContext {
                    comp: &mut *comp,
                    requests: &mut self.requests,
                    use_defs: self.caches.use_defs(),
                    value_numbers: self.caches.value_numbers(),
                    opt,
                    trace: trace_now,
                };
                pass.pre_perform_on_blocks(&mut ctx);
            }
            let blocks = self.requests.take_blocks(opt);
            self.requests.clear(opt);
            self.managers[opt as usize].set_perform_only_on_enabled_blocks(false);

            let mut dispatched = 0;
            for block in blocks {
                if comp.method().cfg.block(block).is_removed() {
                    continue;
                }
                let head = comp.method().cfg.start_of_extended_block(block);
                debug_assert!(
                    decision.just_set_last_run || !self.managers[opt as usize].last_run(),
                    "{name} must not run after its last-run marker was set"
                );
                let mut ctx = PassContext {
                    comp: &mut *comp,
                    requests: &mut self.requests,
                    use_defs: self.caches.use_defs(),
                    value_numbers: self.caches.value_numbers(),
                    opt,
                    trace: trace_now,
                };
                cost += pass.perform_on_block(head, &mut ctx)?;
                dispatched += 1;
            }
            {
                let mut ctx = PassContext {
                    comp: &mut *comp,
                    requests: &mut self.requests,
                    use_defs: self.caches.use_defs(),
                    value_numbers: self.caches.value_numbers(),
                    opt,
                    trace: trace_now,
                };
                pass.post_perform_on_blocks(&mut ctx);
            }
            comp.events.record(Event::PassPerformedOnBlocks {
                opt,
                blocks: dispatched,
            });
        }
        drop(pass);

        if comp.should_be_interrupted() {
            return Err(Error::CompilationInterrupted);
        }

        self.managers[opt as usize].set_trace(orig_trace);

        let maintains = caps.contains(OptCaps::MAINTAINS_USE_DEFS);
        {
            let (method, events) = comp.method_and_events();
            self.caches
                .reconcile_after_pass(method, maintains, &baseline, events);
        }

        if comp.visit_count() > HIGH_VISIT_COUNT {
            comp.reset_visit_counts(1);
            comp.events.record(Event::VisitCountsReset);
        }

        if comp.method().cfg.might_have_unreachable_blocks() {
            comp.method_mut().cfg.remove_unreachable_blocks();
        }

        Ok(cost)
    }

    /// Runs a group's sub-strategy, re-entering the local-analysis group
    /// while its members still have requested blocks.
    fn perform_group(
        &mut self,
        comp: &mut Compilation,
        opt: OptId,
        first_index: u32,
        last_index: u32,
    ) -> Result<u32> {
        comp.events.record(Event::GroupEntered { opt });
        self.opt_depth += 1;

        self.requests.clear(opt);
        if let Some(companion) = opt.companion_group() {
            self.requests.clear(companion);
        }

        let body = self.managers[opt as usize]
            .group()
            .expect("groups carry a sub-strategy");

        let mut cost = 0;
        let mut iterations = 0u32;
        loop {
            for sub in body {
                cost += self.perform_optimization(comp, *sub, first_index, last_index)?;
            }
            iterations += 1;

            if opt == OptId::EachLocalAnalysisPassGroup {
                let blocks_pending = body.iter().any(|sub| self.requests.has_blocks(sub.opt));
                if !blocks_pending || iterations >= MAX_LOCAL_OPTS_ITERS {
                    break;
                }
            } else {
                break;
            }
        }

        self.opt_depth -= 1;
        comp.events.record(Event::GroupExited { opt, iterations });
        Ok(cost)
    }

    fn materialize_use_defs(&mut self, comp: &mut Compilation, caps: OptCaps) -> u32 {
        let mut cost = 0;

        // A locals-only cache is worth discarding when the pass strongly
        // prefers global coverage and a global build is still possible.
        if caps.contains(OptCaps::STRONGLY_PREFERS_GLOBAL_VALUE_NUMBERS)
            && !self.caches.cant_build_global_use_defs
        {
            if let Some(ud) = self.caches.use_defs() {
                if !ud.has_globals_use_defs() {
                    self.caches.set_use_defs(None);
                    comp.events.record(Event::CacheInvalidated {
                        cache: CacheKind::UseDefs,
                    });
                }
            }
        }

        // A loads-as-defs mismatch in either direction forces a rebuild.
        let wants_loads_as_defs = caps.contains(OptCaps::LOADS_AS_DEFS);
        if let Some(ud) = self.caches.use_defs() {
            if ud.has_loads_as_defs() != wants_loads_as_defs {
                self.caches.set_use_defs(None);
                comp.events.record(Event::CacheInvalidated {
                    cache: CacheKind::UseDefs,
                });
            }
        }

        let requires_globals =
            caps.intersects(OptCaps::REQUIRES_GLOBAL_USE_DEFS | OptCaps::REQUIRES_GLOBAL_VALUE_NUMBERS);
        let requires_locals =
            caps.intersects(OptCaps::REQUIRES_LOCAL_USE_DEFS | OptCaps::REQUIRES_LOCAL_VALUE_NUMBERS);

        if requires_globals {
            let needs = self
                .caches
                .use_defs()
                .map_or(true, |ud| !ud.has_globals_use_defs());
            if needs && !self.caches.cant_build_global_use_defs {
                comp.report_analysis_phase(AnalysisPhase::BuildingUseDefs);
                let info = UseDefInfo::build(
                    comp.method(),
                    &UseDefBuildOptions {
                        requires_globals: true,
                        prefers_globals: false,
                        loads_as_defs: wants_loads_as_defs,
                        cannot_omit_trivial_defs: caps.contains(OptCaps::CANNOT_OMIT_TRIVIAL_DEFS),
                        conversion_regs_only: false,
                    },
                );
                if info.is_valid() {
                    self.caches.set_use_defs(Some(info));
                }
                cost += 10;
            }
        } else if requires_locals
            && self.caches.use_defs().is_none()
            && !self.caches.cant_build_local_use_defs
        {
            comp.report_analysis_phase(AnalysisPhase::BuildingUseDefs);
            let prefers = caps.intersects(
                OptCaps::PREFERS_GLOBAL_USE_DEFS | OptCaps::PREFERS_GLOBAL_VALUE_NUMBERS,
            );
            let info = UseDefInfo::build(
                comp.method(),
                &UseDefBuildOptions {
                    requires_globals: false,
                    prefers_globals: prefers,
                    loads_as_defs: wants_loads_as_defs,
                    cannot_omit_trivial_defs: caps.contains(OptCaps::CANNOT_OMIT_TRIVIAL_DEFS),
                    conversion_regs_only: false,
                },
            );
            if info.is_valid() {
                self.caches.set_use_defs(Some(info));
            }
            cost += 10;
        }
        cost
    }

    fn materialize_value_numbers(&mut self, comp: &mut Compilation, caps: OptCaps) -> u32 {
        let mut cost = 0;
        if caps.contains(OptCaps::REQUIRES_GLOBAL_VALUE_NUMBERS) {
            let needs = self
                .caches
                .value_numbers()
                .map_or(true, |vn| !vn.has_globals_value_numbers());
            if needs && !self.caches.cant_build_global_value_numbers {
                comp.report_analysis_phase(AnalysisPhase::BuildingValueNumbers);
                let info = ValueNumberInfo::build(comp.method(), comp.vn_build_kind(), true, false);
                if info.is_valid() {
                    self.caches.set_value_numbers(Some(info));
                }
                cost += 10;
            }
        } else if caps.contains(OptCaps::REQUIRES_LOCAL_VALUE_NUMBERS)
            && self.caches.value_numbers().is_none()
            && !self.caches.cant_build_local_value_numbers
        {
            comp.report_analysis_phase(AnalysisPhase::BuildingValueNumbers);
            let prefers = caps.contains(OptCaps::PREFERS_GLOBAL_VALUE_NUMBERS);
            let info = ValueNumberInfo::build(comp.method(), comp.vn_build_kind(), false, prefers);
            if info.is_valid() {
                self.caches.set_value_numbers(Some(info));
            }
            cost += 10;
        }
        cost
    }

    /// Runs the block and loop census; returns the counts when either is
    /// over its threshold.
    fn check_complexity(&mut self, comp: &Compilation) -> Option<(u32, u32)> {
        let blocks = comp.method().cfg.node_count();
        let loops = comp
            .method()
            .cfg
            .structure()
            .map_or(0, crate::ir::Structure::count_loops);
        self.caches.num_blocks = blocks;
        self.caches.num_loops = loops;

        let mut high_blocks = HIGH_BASIC_BLOCK_COUNT;
        let mut high_loops = if comp.method_hotness() >= Hotness::VeryHot {
            VERY_HOT_HIGH_LOOP_COUNT
        } else {
            HIGH_LOOP_COUNT
        };
        if comp.is_opt_server() {
            high_blocks *= 2;
            high_loops *= 2;
        }

        (blocks >= high_blocks || loops >= high_loops).then_some((blocks, loops))
    }

    fn evaluate_guard(&mut self, comp: &Compilation, entry: StrategyEntry) -> GuardDecision {
        let opt = entry.opt;
        let mut decision = GuardDecision::default();
        let requested = self.requests.is_requested(opt);
        let loops = comp.method().cfg.may_have_loops();
        let multi_block = comp.method().cfg.more_than_one_block();
        let profiling = comp.is_profiling_compilation();

        let mut mark_last_run = false;
        match entry.guard {
            OptGuard::Always => decision.do_this = true,
            OptGuard::IfLoops => decision.do_this = loops,
            OptGuard::IfNoLoops => decision.do_this = !loops,
            OptGuard::IfMoreThanOneBlock => decision.do_this = multi_block,
            OptGuard::IfOneBlock => decision.do_this = !multi_block,
            OptGuard::IfLoopsMarkLastRun => {
                decision.do_this = loops;
                mark_last_run = true;
            }
            OptGuard::IfProfiling => decision.do_this = profiling,
            OptGuard::IfNotProfiling => decision.do_this = !profiling,
            OptGuard::IfNotJitProfiling => {
                decision.do_this =
                    comp.profiling_mode() != crate::optimizer::ProfilingMode::JitProfiling;
            }
            OptGuard::IfNews => decision.do_this = comp.method().has_news(),
            OptGuard::IfOptServer => decision.do_this = comp.is_opt_server(),
            OptGuard::IfMonitors => decision.do_this = comp.method().may_contain_monitors(),
            OptGuard::IfEnabledAndMonitors => {
                decision.do_this = requested && comp.method().may_contain_monitors();
            }
            OptGuard::IfEnabledAndOptServer => {
                if requested && comp.is_opt_server() {
                    decision.do_this = true;
                    decision.if_enabled = true;
                }
            }
            OptGuard::IfNotClassLoadPhase => {
                decision.do_this = !comp.is_class_load_phase()
                    || comp.option(CompileFlags::DONT_DOWNGRADE_TO_COLD);
            }
            OptGuard::IfNotClassLoadPhaseAndNotProfiling => {
                decision.do_this = (!comp.is_class_load_phase()
                    || comp.option(CompileFlags::DONT_DOWNGRADE_TO_COLD))
                    && !profiling;
            }
            OptGuard::IfEnabled => {
                if requested {
                    decision.do_this = true;
                    decision.if_enabled = true;
                }
            }
            OptGuard::IfEnabledMarkLastRun => {
                if requested {
                    decision.do_this = true;
                    decision.if_enabled = true;
                }
                mark_last_run = true;
            }
            OptGuard::IfEnabledAndLoops => {
                if requested && loops {
                    decision.do_this = true;
                    decision.if_enabled = true;
                }
            }
            OptGuard::IfEnabledAndMoreThanOneBlock => {
                if requested && multi_block {
                    decision.do_this = true;
                    decision.if_enabled = true;
                }
            }
            OptGuard::IfEnabledAndMoreThanOneBlockMarkLastRun => {
                if requested && multi_block {
                    decision.do_this = true;
                    decision.if_enabled = true;
                }
                mark_last_run = true;
            }
            OptGuard::IfEnabledAndNoLoops => {
                if requested && !loops {
                    decision.do_this = true;
                    decision.if_enabled = true;
                }
            }
            OptGuard::IfNoLoopsOrEnabledAndLoops => {
                if !loops || requested {
                    if loops {
                        decision.if_enabled = true;
                    }
                    decision.do_this = true;
                }
            }
            OptGuard::IfEnabledAndProfiling => {
                if requested && profiling {
                    decision.do_this = true;
                    decision.if_enabled = true;
                }
            }
            OptGuard::IfEnabledAndNotProfiling => {
                if requested && !profiling {
                    decision.do_this = true;
                    decision.if_enabled = true;
                }
            }
            OptGuard::IfEnabledAndNotJitProfiling => {
                if requested
                    && comp.profiling_mode() != crate::optimizer::ProfilingMode::JitProfiling
                {
                    decision.do_this = true;
                    decision.if_enabled = true;
                }
            }
            OptGuard::IfLoopsAndNotProfiling => decision.do_this = loops && !profiling,
            OptGuard::MustBeDone => {
                decision.do_this = true;
                decision.must_be_done = true;
            }
            OptGuard::IfFullInliningUnderOsrDebug => {
                decision.do_this = comp.option(CompileFlags::FULL_SPEED_DEBUG)
                    && comp.option(CompileFlags::ENABLE_OSR)
                    && comp.option(CompileFlags::FULL_INLINE_UNDER_OSR_DEBUG);
            }
            OptGuard::IfNotFullInliningUnderOsrDebug => {
                decision.do_this = comp.option(CompileFlags::FULL_SPEED_DEBUG)
                    && (!comp.option(CompileFlags::ENABLE_OSR)
                        || !comp.option(CompileFlags::FULL_INLINE_UNDER_OSR_DEBUG));
            }
            OptGuard::IfOsr => decision.do_this = comp.option(CompileFlags::ENABLE_OSR),
            OptGuard::IfVoluntaryOsr => {
                decision.do_this = comp.option(CompileFlags::ENABLE_OSR)
                    && comp.osr_mode() == crate::optimizer::OsrMode::Voluntary;
            }
            OptGuard::IfInvoluntaryOsr => {
                decision.do_this = comp.option(CompileFlags::ENABLE_OSR)
                    && comp.osr_mode() == crate::optimizer::OsrMode::Involuntary;
            }
            OptGuard::IfAotAndEnabled => {
                if comp.option(CompileFlags::COMPILE_RELOCATABLE_CODE) && requested {
                    decision.do_this = true;
                    decision.if_enabled = true;
                }
            }
            OptGuard::IfMethodHandleInvokes => {
                decision.do_this = comp.method().has_method_handle_invokes()
                    && !comp.option(CompileFlags::DISABLE_METHOD_HANDLE_INVOKE_OPTS);
            }
            OptGuard::IfNotQuickStart => {
                decision.do_this = !comp.option(CompileFlags::QUICKSTART_DETECTED);
            }
            OptGuard::IfEAOpportunitiesMarkLastRun => {
                mark_last_run = true;
                decision.do_this = comp.method().has_escape_analysis_opportunities();
            }
            OptGuard::IfEAOpportunities => {
                decision.do_this = comp.method().has_escape_analysis_opportunities();
            }
            OptGuard::IfEAOpportunitiesAndNotOptServer => {
                decision.do_this =
                    comp.method().has_escape_analysis_opportunities() && !comp.is_opt_server();
            }
            OptGuard::IfAggressiveLiveness => {
                decision.do_this = comp.option(CompileFlags::ENABLE_AGGRESSIVE_LIVENESS);
            }
            OptGuard::IfVectorApi => {
                decision.do_this = comp.method().has_vector_api()
                    && !comp.option(CompileFlags::DISABLE_VECTOR_API_EXPANSION);
            }
            OptGuard::MarkLastRun => {
                decision.do_this = true;
                mark_last_run = true;
            }
        }

        if mark_last_run {
            debug_assert!(
                !opt.is_group(),
                "marking groups as last-run is not supported ({})",
                opt.name()
            );
            self.managers[opt as usize].set_last_run(true);
            decision.just_set_last_run = true;
        }
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Method;

    #[test]
    fn ilgen_strategy_members_support_ilgen() {
        let mut comp = Compilation::new(Method::new("ilgen"), Hotness::Warm);
        let optimizer = Optimizer::create(&mut comp, true).unwrap();
        assert!(optimizer.is_il_gen_opt());
    }

    #[test]
    fn ilgen_rejects_unsupported_passes() {
        let mut comp = Compilation::new(Method::new("ilgen-bad"), Hotness::Warm);
        let result = Optimizer::with_source(
            &mut comp,
            StrategySource::Custom(vec![StrategyEntry {
                opt: OptId::LocalCSE,
                guard: OptGuard::Always,
            }]),
            true,
        );
        assert!(matches!(result, Err(Error::InvalidStrategy { .. })));
    }

    #[test]
    fn custom_strategy_from_options() {
        let mut comp = Compilation::new(Method::new("custom"), Hotness::Warm);
        comp.options_mut().custom_strategy =
            Some(vec![OptId::TreeSimplification as i32]);
        let optimizer = Optimizer::create(&mut comp, false).unwrap();
        assert!(matches!(optimizer.strategy, StrategySource::Custom(ref v) if v.len() == 1));
    }

    #[test]
    fn invalid_custom_strategy_refuses_construction() {
        let mut comp = Compilation::new(Method::new("bad"), Hotness::Warm);
        comp.options_mut().custom_strategy = Some(vec![0x7FFF]);
        assert!(Optimizer::create(&mut comp, false).is_err());
    }
}
