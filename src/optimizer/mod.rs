//! The optimizer orchestrator and strategy engine.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        Optimizer pipeline                        │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  Compilation            method · options · hotness · opt index   │
//! │    └─ EventLog          phases, invalidations, dispatch          │
//! │                                                                  │
//! │  Strategy               ordered {opt, guard} entries;            │
//! │    └─ groups            entries naming sub-strategies            │
//! │                                                                  │
//! │  Optimizer              guard evaluation → analysis              │
//! │    ├─ managers          materialization → dispatch →             │
//! │    ├─ request table     reconciliation → cancellation poll       │
//! │    └─ AnalysisCaches    alias sets · use-defs · value numbers    │
//! │                         · symref snapshot · structure census     │
//! │                                                                  │
//! │  OptimizationPass       the opaque transform contract            │
//! │    └─ passes/           bundled working passes                   │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The driver sequences a strategy over one compilation: for each entry it
//! evaluates the guard, recursing into groups; materializes the analyses
//! the pass declared; gates on the complexity census; dispatches either
//! whole-method or per requested block; then reconciles the caches against
//! what the pass did to the method. Failures — excessive complexity, an
//! insufficient tier, cancellation — abort the compilation as typed
//! errors that the embedding compilation driver handles.

mod caches;
mod compilation;
pub mod events;
mod driver;
mod manager;
mod opts;
mod pass;
pub(crate) mod regions;
mod strategy;
pub mod usedef;
pub mod valuenum;

pub(crate) mod passes;

pub use caches::{AnalysisCaches, PassBaseline};
pub use compilation::{
    CompileFlags, CompileOptions, Compilation, Hotness, InductionVariable, OptFilter, OsrMode,
    ProfilingMode,
};
pub use driver::Optimizer;
pub use manager::{OptCaps, OptimizationManager, RequestTable};
pub use opts::{OptId, FIRST_GROUP};
pub use pass::{OptimizationPass, PassContext, PassFactory};
pub use strategy::{
    decode_custom_strategy, strategy_for_hotness, OptGuard, Strategy, StrategyEntry,
    COLD_STRATEGY, HOT_STRATEGY, ILGEN_STRATEGY, MUST_BE_DONE_FLAG, NO_OPT_STRATEGY, OPT_NUM_MASK,
    WARM_STRATEGY,
};
