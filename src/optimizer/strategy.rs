//! Optimization strategies: ordered recipes of guarded passes.
//!
//! A strategy is a slice of [`StrategyEntry`]s. An entry names either a
//! primitive optimization or a group whose body is another strategy; the
//! guard decides at dispatch time whether the entry runs. Slice extent
//! replaces the sentinel terminators of classic C array strategies, so the
//! empty slice is the valid do-nothing strategy.
//!
//! The built-in tables mirror the tiered shape of a production pipeline:
//! nothing at `NoOpt`, a handful of local passes at `Cold`, local passes
//! plus dead-store removal at `Warm`, and the full grouped pipeline at
//! `Hot` and above. IL generation runs its own fixed strategy restricted
//! to passes that tolerate incomplete IL.

use crate::error::{Error, Result};
use crate::optimizer::{Hotness, OptId};

/// Guard predicate controlling whether a strategy entry runs.
///
/// `IfEnabled*` variants additionally consult the optimization's requested
/// flag (set by earlier passes that exposed an opportunity); the
/// `MarkLastRun` composites set the last-run marker whether or not the
/// entry runs this time; `MustBeDone` exempts the entry from the global
/// optimization index window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)] // predicate names are their documentation
pub enum OptGuard {
    Always,
    IfLoops,
    IfNoLoops,
    IfMoreThanOneBlock,
    IfOneBlock,
    IfLoopsMarkLastRun,
    IfProfiling,
    IfNotProfiling,
    IfNotJitProfiling,
    IfNews,
    IfOptServer,
    IfMonitors,
    IfEnabledAndMonitors,
    IfEnabledAndOptServer,
    IfNotClassLoadPhase,
    IfNotClassLoadPhaseAndNotProfiling,
    IfEnabled,
    IfEnabledMarkLastRun,
    IfEnabledAndLoops,
    IfEnabledAndMoreThanOneBlock,
    IfEnabledAndMoreThanOneBlockMarkLastRun,
    IfEnabledAndNoLoops,
    IfEnabledAndProfiling,
    IfEnabledAndNotProfiling,
    IfEnabledAndNotJitProfiling,
    IfNoLoopsOrEnabledAndLoops,
    IfLoopsAndNotProfiling,
    MustBeDone,
    IfFullInliningUnderOsrDebug,
    IfNotFullInliningUnderOsrDebug,
    IfOsr,
    IfVoluntaryOsr,
    IfInvoluntaryOsr,
    IfAotAndEnabled,
    IfMethodHandleInvokes,
    IfNotQuickStart,
    IfEAOpportunities,
    IfEAOpportunitiesAndNotOptServer,
    IfEAOpportunitiesMarkLastRun,
    IfAggressiveLiveness,
    IfVectorApi,
    MarkLastRun,
}

/// One strategy step: an optimization (or group) and its guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrategyEntry {
    /// The optimization or group to dispatch.
    pub opt: OptId,
    /// When to run it.
    pub guard: OptGuard,
}

/// An ordered recipe of guarded optimizations.
pub type Strategy = &'static [StrategyEntry];

const fn run(opt: OptId, guard: OptGuard) -> StrategyEntry {
    StrategyEntry { opt, guard }
}

use OptGuard::*;
use OptId::*;

/// Body of the local value-propagation group.
pub static LOCAL_VALUE_PROPAGATION_OPTS: Strategy = &[
    run(LocalCSE, Always),
    run(LocalValuePropagation, Always),
    run(LocalCSE, IfEnabled),
    run(LocalValuePropagation, IfEnabled),
];

/// Body of the local-analysis group. The driver re-enters this body while
/// any member still has requested blocks, up to its iteration cap.
pub static EACH_LOCAL_ANALYSIS_PASS_OPTS: Strategy = &[
    run(LocalValuePropagationGroup, IfEnabled),
    run(TreeSimplification, IfEnabled),
    run(LocalCSE, IfEnabled),
    run(LocalDeadStoreElimination, IfEnabled),
    run(DeadTreesElimination, IfEnabled),
];

/// Body of the global dead-store group.
pub static GLOBAL_DEAD_STORE_OPTS: Strategy = &[
    run(GlobalDeadStoreElimination, IfMoreThanOneBlock),
    run(DeadTreesElimination, Always),
];

/// Body of the late local group: a final local cleanup sweep.
pub static LATE_LOCAL_OPTS: Strategy = &[
    run(EachLocalAnalysisPassGroup, Always),
    run(LocalDeadStoreElimination, Always),
    run(DeadTreesElimination, Always),
    run(GlobalDeadStoreGroup, Always),
    run(TreeSimplification, Always),
];

/// Strategy for IL generation; every member must support the IL-gen level.
pub static ILGEN_STRATEGY: Strategy = &[
    run(TreeSimplification, Always),
    run(DeadTreesElimination, Always),
];

/// The empty strategy.
pub static NO_OPT_STRATEGY: Strategy = &[];

/// Cheap local cleanup for cold compilations.
pub static COLD_STRATEGY: Strategy = &[
    run(BasicBlockExtension, Always),
    run(LocalCSE, Always),
    run(TreeSimplification, Always),
    run(LocalCSE, Always),
];

/// The default pipeline.
pub static WARM_STRATEGY: Strategy = &[
    run(BasicBlockExtension, Always),
    run(LocalCSE, Always),
    run(TreeSimplification, Always),
    run(LocalCSE, Always),
    run(LocalDeadStoreElimination, Always),
    run(GlobalDeadStoreGroup, Always),
];

/// The full pipeline for hot compilations and above.
pub static HOT_STRATEGY: Strategy = &[
    run(TreeSimplification, Always),
    run(EachLocalAnalysisPassGroup, Always),
    run(GlobalValuePropagation, IfMoreThanOneBlock),
    run(TreeSimplification, IfEnabled),
    run(InductionVariableAnalysis, IfLoops),
    run(GlobalDeadStoreGroup, Always),
    run(DeadTreesElimination, Always),
    run(BasicBlockExtension, MarkLastRun),
    run(TreeSimplification, Always),
    run(LocalCSE, Always),
    run(GlobalDeadStoreElimination, IfEnabledAndMoreThanOneBlock),
    run(DeadTreesElimination, IfEnabled),
    run(LocalValuePropagation, MarkLastRun),
];

/// The strategy table indexed by hotness; hotter-than-hot levels clamp to
/// the hot strategy.
#[must_use]
pub fn strategy_for_hotness(hotness: Hotness) -> Strategy {
    match hotness {
        Hotness::NoOpt => NO_OPT_STRATEGY,
        Hotness::Cold => COLD_STRATEGY,
        Hotness::Warm => WARM_STRATEGY,
        Hotness::Hot | Hotness::VeryHot | Hotness::Scorching => HOT_STRATEGY,
    }
}

/// Mask isolating the optimization number in a packed strategy word.
pub const OPT_NUM_MASK: i32 = 0xFFFF;

/// Packed-strategy bit requesting the `MustBeDone` guard.
pub const MUST_BE_DONE_FLAG: i32 = 0x2000_0000;

/// Decodes a packed custom strategy into entries.
///
/// Each word carries an optimization number in its low bits and may set
/// [`MUST_BE_DONE_FLAG`]; any other high bit, or an unknown optimization
/// number, refuses the whole strategy.
///
/// # Errors
///
/// Returns [`Error::InvalidStrategy`] if a word cannot be decoded.
pub fn decode_custom_strategy(words: &[i32]) -> Result<Vec<StrategyEntry>> {
    let mut entries = Vec::with_capacity(words.len());
    for &word in words {
        let extra = word & !(OPT_NUM_MASK | MUST_BE_DONE_FLAG);
        if extra != 0 {
            return Err(Error::InvalidStrategy {
                reason: format!("unrecognized guard bits {extra:#x} in strategy word {word:#x}"),
            });
        }
        let number = (word & OPT_NUM_MASK) as u16;
        let opt = OptId::from_repr(number).ok_or_else(|| Error::InvalidStrategy {
            reason: format!("unknown optimization number {number}"),
        })?;
        let guard = if word & MUST_BE_DONE_FLAG != 0 {
            OptGuard::MustBeDone
        } else {
            OptGuard::Always
        };
        entries.push(StrategyEntry { opt, guard });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hotness_table_clamps() {
        assert!(strategy_for_hotness(Hotness::NoOpt).is_empty());
        assert_eq!(
            strategy_for_hotness(Hotness::VeryHot),
            strategy_for_hotness(Hotness::Hot)
        );
    }

    #[test]
    fn custom_strategy_round_trip() {
        let words = vec![
            OptId::TreeSimplification as i32,
            OptId::LocalCSE as i32 | MUST_BE_DONE_FLAG,
        ];
        let entries = decode_custom_strategy(&words).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].opt, OptId::TreeSimplification);
        assert_eq!(entries[0].guard, OptGuard::Always);
        assert_eq!(entries[1].opt, OptId::LocalCSE);
        assert_eq!(entries[1].guard, OptGuard::MustBeDone);
    }

    #[test]
    fn custom_strategy_rejects_unknown_numbers() {
        assert!(decode_custom_strategy(&[0x7FFF]).is_err());
    }

    #[test]
    fn custom_strategy_rejects_stray_bits() {
        assert!(decode_custom_strategy(&[0x4000_0000]).is_err());
    }
}
