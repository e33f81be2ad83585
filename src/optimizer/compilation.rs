//! The compilation: one method working its way through the pipeline.
//!
//! Everything with per-compilation lifetime that is not owned by the
//! optimizer itself lives here — the method and its flow graph, the option
//! set, hotness and profiling state, the global optimization index, visit
//! counts, the cancellation flag, and the event log. Optimizers nest: a
//! pass may spin up an inner optimizer against the same compilation, so
//! the current-optimizer slot is saved and restored around
//! [`crate::optimizer::Optimizer::optimize`].

use std::sync::atomic::{AtomicBool, Ordering};

use bitflags::bitflags;

use crate::ir::{BlockId, Method, SymRefId};
use crate::optimizer::events::{AnalysisPhase, Event, EventLog};
use crate::optimizer::valuenum::VnBuildKind;
use crate::optimizer::OptId;

/// Visit-count high-water mark; reaching it forces a reset after the
/// current pass.
pub(crate) const HIGH_VISIT_COUNT: u32 = 0xFFFF_0000;

/// Optimization level of a compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Hotness {
    /// No optimization at all.
    NoOpt,
    /// Cheap, mostly local optimization.
    Cold,
    /// The default level.
    Warm,
    /// Full strategy.
    Hot,
    /// Full strategy with raised complexity limits.
    VeryHot,
    /// The hottest level; recompilation stops here.
    Scorching,
}

/// How profiling instrumentation is collected, if at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfilingMode {
    /// Not a profiling compilation.
    NotProfiling,
    /// Instrumentation is compiled into the jitted body.
    JitProfiling,
    /// Profiles come from external counters.
    CountersProfiling,
}

/// On-stack-replacement flavor used when OSR is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsrMode {
    /// Transitions happen at the method's request.
    Voluntary,
    /// The runtime may force a transition at any yield point.
    Involuntary,
}

bitflags! {
    /// Boolean compilation options consulted by guards and the driver.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CompileFlags: u32 {
        /// Ignore the block/loop complexity thresholds.
        const PROCESS_HUGE_METHODS = 1 << 0;
        /// Record strategy begin/end markers in the event log.
        const TRACE_OPTS = 1 << 1;
        /// Re-evaluate hotness against inlined bodies after optimizing.
        const DETERMINISTIC_COMPILATION = 1 << 2;
        /// Never downgrade this compilation during class loading.
        const DONT_DOWNGRADE_TO_COLD = 1 << 3;
        /// On-stack replacement is enabled.
        const ENABLE_OSR = 1 << 4;
        /// Debugger requires full-speed debug support.
        const FULL_SPEED_DEBUG = 1 << 5;
        /// Inline fully even under OSR debug.
        const FULL_INLINE_UNDER_OSR_DEBUG = 1 << 6;
        /// The runtime started in quick-start mode.
        const QUICKSTART_DETECTED = 1 << 7;
        /// Run aggressive liveness analyses.
        const ENABLE_AGGRESSIVE_LIVENESS = 1 << 8;
        /// Suppress method-handle invoke optimizations.
        const DISABLE_METHOD_HANDLE_INVOKE_OPTS = 1 << 9;
        /// Suppress vector API expansion.
        const DISABLE_VECTOR_API_EXPANSION = 1 << 10;
        /// Ahead-of-time compilation producing relocatable code.
        const COMPILE_RELOCATABLE_CODE = 1 << 11;
    }
}

/// Matches optimizations by global index or by name, for the enable /
/// disable / trace / break option lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptFilter {
    /// Match the pass dispatched at this global optimization index.
    Index(u32),
    /// Match every dispatch of the named optimization.
    Name(String),
}

impl OptFilter {
    pub(crate) fn matches(&self, index: u32, name: &str) -> bool {
        match self {
            OptFilter::Index(i) => *i == index,
            OptFilter::Name(n) => n == name,
        }
    }
}

/// The full option set of one compilation.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Boolean options.
    pub flags: CompileFlags,
    /// First global optimization index allowed to run.
    pub first_opt_index: u32,
    /// Last global optimization index allowed to run.
    pub last_opt_index: u32,
    /// Packed custom strategy overriding the hotness tables.
    pub custom_strategy: Option<Vec<i32>>,
    /// Optimizations that must not run.
    pub disabled_opts: Vec<OptFilter>,
    /// Optimizations whose trace flag is forced on.
    pub opts_to_trace: Vec<OptFilter>,
    /// Dispatches at which a debugger break is requested.
    pub break_on_opts: Vec<OptFilter>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            flags: CompileFlags::empty(),
            first_opt_index: 0,
            last_opt_index: u32::MAX,
            custom_strategy: None,
            disabled_opts: Vec::new(),
            opts_to_trace: Vec::new(),
            break_on_opts: Vec::new(),
        }
    }
}

/// An induction variable discovered by induction-variable analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InductionVariable {
    /// The storage location stepped by the loop.
    pub symref: SymRefId,
    /// The per-iteration increment.
    pub increment: i64,
    /// Header of the loop stepping it.
    pub header: BlockId,
}

/// One method compilation.
#[derive(Debug)]
pub struct Compilation {
    method: Method,
    options: CompileOptions,
    hotness: Hotness,
    next_opt_level: Option<Hotness>,
    profiling_mode: ProfilingMode,
    osr_mode: OsrMode,
    opt_server: bool,
    class_load_phase: bool,
    outermost: bool,
    opt_index: u32,
    visit_count: u32,
    current_optimizer: Option<u32>,
    next_optimizer_id: u32,
    interrupt: AtomicBool,
    inlined_hotness: Vec<Hotness>,
    vn_kind: VnBuildKind,
    /// Induction variables recorded by the most recent analysis run.
    pub induction_variables: Vec<InductionVariable>,
    /// Structured diagnostics for this compilation.
    pub events: EventLog,
}

impl Compilation {
    /// Creates a compilation of `method` at `hotness` with default options.
    #[must_use]
    pub fn new(method: Method, hotness: Hotness) -> Self {
        Self {
            method,
            options: CompileOptions::default(),
            hotness,
            next_opt_level: None,
            profiling_mode: ProfilingMode::NotProfiling,
            osr_mode: OsrMode::Voluntary,
            opt_server: false,
            class_load_phase: false,
            outermost: true,
            opt_index: 0,
            visit_count: 1,
            current_optimizer: None,
            next_optimizer_id: 0,
            interrupt: AtomicBool::new(false),
            inlined_hotness: Vec::new(),
            vn_kind: VnBuildKind::Partition,
            induction_variables: Vec::new(),
            events: EventLog::new(),
        }
    }

    /// The method under compilation.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Mutable access to the method under compilation.
    pub fn method_mut(&mut self) -> &mut Method {
        &mut self.method
    }

    /// Split borrow used by cache reconciliation: the method read-only,
    /// the event log writable.
    pub(crate) fn method_and_events(&mut self) -> (&Method, &mut EventLog) {
        (&self.method, &mut self.events)
    }

    /// The option set.
    #[must_use]
    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Mutable access to the option set.
    pub fn options_mut(&mut self) -> &mut CompileOptions {
        &mut self.options
    }

    /// Is a boolean option set?
    #[must_use]
    pub fn option(&self, flag: CompileFlags) -> bool {
        self.options.flags.contains(flag)
    }

    /// The compilation's optimization level.
    #[must_use]
    pub fn method_hotness(&self) -> Hotness {
        self.hotness
    }

    /// Level requested for the next compilation of this method, if any.
    #[must_use]
    pub fn next_opt_level(&self) -> Option<Hotness> {
        self.next_opt_level
    }

    /// Requests that the next compilation run at `level`.
    pub fn set_next_opt_level(&mut self, level: Hotness) {
        self.next_opt_level = Some(level);
    }

    /// Is this a profiling compilation?
    #[must_use]
    pub fn is_profiling_compilation(&self) -> bool {
        self.profiling_mode != ProfilingMode::NotProfiling
    }

    /// How profiles are collected.
    #[must_use]
    pub fn profiling_mode(&self) -> ProfilingMode {
        self.profiling_mode
    }

    /// Sets the profiling mode.
    pub fn set_profiling_mode(&mut self, mode: ProfilingMode) {
        self.profiling_mode = mode;
    }

    /// The OSR flavor used when OSR is enabled.
    #[must_use]
    pub fn osr_mode(&self) -> OsrMode {
        self.osr_mode
    }

    /// Sets the OSR flavor.
    pub fn set_osr_mode(&mut self, mode: OsrMode) {
        self.osr_mode = mode;
    }

    /// Is this compilation running on an optimization server?
    #[must_use]
    pub fn is_opt_server(&self) -> bool {
        self.opt_server
    }

    /// Marks this compilation as running on an optimization server.
    pub fn set_opt_server(&mut self, value: bool) {
        self.opt_server = value;
    }

    /// Is the runtime in its class-loading phase?
    #[must_use]
    pub fn is_class_load_phase(&self) -> bool {
        self.class_load_phase
    }

    /// Records whether the runtime is in its class-loading phase.
    pub fn set_class_load_phase(&mut self, value: bool) {
        self.class_load_phase = value;
    }

    /// Is this the outermost method of the compilation?
    #[must_use]
    pub fn is_outermost_method(&self) -> bool {
        self.outermost
    }

    /// Marks this compilation as a peek into an inlined method.
    pub fn set_outermost_method(&mut self, value: bool) {
        self.outermost = value;
    }

    /// The global optimization index: every dispatched strategy entry
    /// counts, including skipped ones.
    #[must_use]
    pub fn opt_index(&self) -> u32 {
        self.opt_index
    }

    pub(crate) fn inc_opt_index(&mut self) {
        self.opt_index += 1;
    }

    /// The current visit count.
    #[must_use]
    pub fn visit_count(&self) -> u32 {
        self.visit_count
    }

    /// Bumps and returns the visit count.
    pub fn inc_visit_count(&mut self) -> u32 {
        self.visit_count += 1;
        self.visit_count
    }

    pub(crate) fn set_visit_count(&mut self, value: u32) {
        self.visit_count = value;
    }

    /// Resets the visit count and every node's visit stamp to `value`.
    pub fn reset_visit_counts(&mut self, value: u32) {
        self.visit_count = value;
        self.method.pool.reset_visits(value);
    }

    /// The optimizer currently driving this compilation, if any.
    #[must_use]
    pub fn current_optimizer(&self) -> Option<u32> {
        self.current_optimizer
    }

    pub(crate) fn set_current_optimizer(&mut self, id: Option<u32>) {
        self.current_optimizer = id;
    }

    pub(crate) fn allocate_optimizer_id(&mut self) -> u32 {
        let id = self.next_optimizer_id;
        self.next_optimizer_id += 1;
        id
    }

    /// Asks the pipeline to stop at the next pass boundary.
    ///
    /// Safe to call from another thread; the driver polls after every pass.
    pub fn request_interruption(&self) {
        self.interrupt.store(true, Ordering::Release);
    }

    /// Has an interruption been requested?
    #[must_use]
    pub fn should_be_interrupted(&self) -> bool {
        self.interrupt.load(Ordering::Acquire)
    }

    /// Records the hotness of a body inlined into this method.
    pub fn record_inlined_body(&mut self, hotness: Hotness) {
        self.inlined_hotness.push(hotness);
    }

    /// Hottest level among this compilation and its inlined bodies.
    #[must_use]
    pub fn max_hotness_of_inlined_bodies(&self) -> Hotness {
        self.inlined_hotness
            .iter()
            .copied()
            .fold(self.hotness, Hotness::max)
    }

    /// Which value-number build flavor this compilation uses.
    #[must_use]
    pub fn vn_build_kind(&self) -> VnBuildKind {
        self.vn_kind
    }

    /// Selects the value-number build flavor.
    pub fn set_vn_build_kind(&mut self, kind: VnBuildKind) {
        self.vn_kind = kind;
    }

    /// Records an analysis phase transition.
    pub fn report_analysis_phase(&mut self, phase: AnalysisPhase) {
        self.events.record(Event::AnalysisPhase { phase });
    }

    /// Records that `opt` is about to execute.
    pub fn report_optimization_phase(&mut self, opt: OptId) {
        let index = self.opt_index;
        self.events.record(Event::OptimizationPhase { opt, index });
    }
}
