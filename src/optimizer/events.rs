//! Structured diagnostics for one compilation.
//!
//! The driver and the passes record what happened — phase transitions,
//! cache invalidations, pass dispatch, transformations — into a
//! per-compilation [`EventLog`] instead of writing free-form trace text.
//! The log is the observable contract of the orchestrator: tests assert
//! against it, and an embedding runtime can render it however it likes.

use crate::optimizer::OptId;

/// Analysis phases reported by the driver around expensive work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisPhase {
    /// Guard evaluation is about to begin for a strategy entry.
    BeforeOptimization,
    /// Alias classes are being rebuilt.
    BuildingAliases,
    /// Region analysis is running.
    BuildingStructure,
    /// Use-def information is being built.
    BuildingUseDefs,
    /// Value-number information is being built.
    BuildingValueNumbers,
    /// The node pool is being recounted exactly.
    BuildingAccurateNodeCount,
    /// Block frequencies are being estimated.
    BuildingFrequencies,
    /// A pass is executing.
    PerformingOptimization,
    /// A pass has finished.
    AfterOptimization,
}

/// Analysis caches the driver can invalidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    /// Symbol-reference alias classes.
    AliasSets,
    /// Use-def information.
    UseDefs,
    /// Value-number information.
    ValueNumbers,
    /// The canonical symbol-reference snapshot.
    SymRefTable,
}

/// One recorded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The driver entered an analysis phase.
    AnalysisPhase {
        /// Which phase.
        phase: AnalysisPhase,
    },
    /// A pass is about to run (reported even for per-block dispatch).
    OptimizationPhase {
        /// The optimization.
        opt: OptId,
        /// Global optimization index at dispatch.
        index: u32,
    },
    /// A group's sub-strategy was entered.
    GroupEntered {
        /// The group.
        opt: OptId,
    },
    /// A group's sub-strategy was exhausted.
    GroupExited {
        /// The group.
        opt: OptId,
        /// How many times the body ran (greater than one only for the
        /// local-analysis group's re-entry protocol).
        iterations: u32,
    },
    /// A pass ran whole-method.
    PassPerformed {
        /// The optimization.
        opt: OptId,
        /// Cost returned by the pass.
        cost: u32,
    },
    /// A pass ran on its requested blocks.
    PassPerformedOnBlocks {
        /// The optimization.
        opt: OptId,
        /// Number of blocks dispatched.
        blocks: u32,
    },
    /// The driver invalidated a cache.
    CacheInvalidated {
        /// Which cache.
        cache: CacheKind,
    },
    /// Block frequencies were computed.
    FrequenciesComputed,
    /// Visit counts hit the high-water mark and were reset.
    VisitCountsReset,
    /// The complexity gate tripped but the huge-method override was set.
    ComplexityOverridden {
        /// Blocks counted.
        blocks: u32,
        /// Loops counted.
        loops: u32,
    },
    /// A break-on-opt filter matched this dispatch.
    BreakRequested {
        /// The optimization.
        opt: OptId,
        /// Global optimization index at dispatch.
        index: u32,
    },
    /// A pass transformed the method.
    Transformation {
        /// The pass that made the change.
        opt: OptId,
        /// Short description of the change.
        detail: &'static str,
    },
}

/// Append-only log of [`Event`]s for one compilation.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event.
    pub fn record(&mut self, event: Event) {
        self.events.push(event);
    }

    /// All events in record order.
    #[must_use]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Number of events matching `predicate`.
    pub fn count_matching(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        self.events.iter().filter(|e| predicate(e)).count()
    }

    /// Number of invalidations recorded for `cache`.
    #[must_use]
    pub fn invalidations(&self, cache: CacheKind) -> usize {
        self.count_matching(|e| matches!(e, Event::CacheInvalidated { cache: c } if *c == cache))
    }
}
