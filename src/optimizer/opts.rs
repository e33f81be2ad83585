//! Optimization identities and their static configuration.
//!
//! Every optimization the pipeline can dispatch has a dense identifier.
//! Primitive passes come first, groups after them; [`OptId::is_group`]
//! tests the boundary. The tables below associate each identifier with its
//! human-readable name, default capability set, pass factory (primitives)
//! or sub-strategy (groups).

use strum::{EnumCount, FromRepr, IntoStaticStr};

use crate::optimizer::manager::OptCaps;
use crate::optimizer::pass::PassFactory;
use crate::optimizer::passes;
use crate::optimizer::strategy::{
    Strategy, EACH_LOCAL_ANALYSIS_PASS_OPTS, GLOBAL_DEAD_STORE_OPTS, LATE_LOCAL_OPTS,
    LOCAL_VALUE_PROPAGATION_OPTS,
};

/// Identifier of an optimization or optimization group.
///
/// The discriminants are stable and dense; packed custom strategies encode
/// them directly (see [`crate::optimizer::strategy::decode_custom_strategy`]).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, FromRepr, IntoStaticStr, EnumCount,
)]
#[repr(u16)]
pub enum OptId {
    /// Expression-tree simplification and constant folding.
    #[strum(serialize = "treeSimplification")]
    TreeSimplification,
    /// Removal of side-effect-free anchored trees.
    #[strum(serialize = "deadTreesElimination")]
    DeadTreesElimination,
    /// Common-subexpression elimination within extended blocks.
    #[strum(serialize = "localCSE")]
    LocalCSE,
    /// Constant propagation within extended blocks.
    #[strum(serialize = "localValuePropagation")]
    LocalValuePropagation,
    /// Removal of stores overwritten within their block.
    #[strum(serialize = "localDeadStoreElimination")]
    LocalDeadStoreElimination,
    /// Cross-block constant propagation over use-def chains.
    #[strum(serialize = "globalValuePropagation")]
    GlobalValuePropagation,
    /// Cross-block removal of stores without uses.
    #[strum(serialize = "globalDeadStoreElimination")]
    GlobalDeadStoreElimination,
    /// Marking of fall-through chains as extended blocks.
    #[strum(serialize = "basicBlockExtension")]
    BasicBlockExtension,
    /// Discovery of loop induction variables.
    #[strum(serialize = "inductionVariableAnalysis")]
    InductionVariableAnalysis,
    /// Group: local value propagation with CSE interleaved.
    #[strum(serialize = "localValuePropagationGroup")]
    LocalValuePropagationGroup,
    /// Group: one round of every local analysis pass; re-entered while
    /// members still have requested blocks.
    #[strum(serialize = "eachLocalAnalysisPassGroup")]
    EachLocalAnalysisPassGroup,
    /// Group: global dead-store removal plus cleanup.
    #[strum(serialize = "globalDeadStoreGroup")]
    GlobalDeadStoreGroup,
    /// Group: the late local cleanup sweep.
    #[strum(serialize = "lateLocalGroup")]
    LateLocalGroup,
}

/// First group identifier; everything below it is a primitive pass.
pub const FIRST_GROUP: OptId = OptId::LocalValuePropagationGroup;

impl OptId {
    /// Does this identifier name a group rather than a primitive pass?
    #[must_use]
    pub fn is_group(self) -> bool {
        self as u16 >= FIRST_GROUP as u16
    }

    /// The optimization's human-readable name.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// Default capability flags for this optimization.
    #[must_use]
    pub fn default_caps(self) -> OptCaps {
        match self {
            OptId::TreeSimplification => {
                OptCaps::SUPPORTS_ILGEN_OPT_LEVEL | OptCaps::DOES_NOT_REQUIRE_ALIAS_SETS
            }
            OptId::DeadTreesElimination => {
                OptCaps::SUPPORTS_ILGEN_OPT_LEVEL | OptCaps::DOES_NOT_REQUIRE_ALIAS_SETS
            }
            OptId::LocalCSE => OptCaps::empty(),
            OptId::LocalValuePropagation => OptCaps::empty(),
            OptId::LocalDeadStoreElimination => OptCaps::empty(),
            OptId::GlobalValuePropagation => {
                OptCaps::REQUIRES_GLOBAL_USE_DEFS
                    | OptCaps::REQUIRES_GLOBAL_VALUE_NUMBERS
                    | OptCaps::LOADS_AS_DEFS
            }
            OptId::GlobalDeadStoreElimination => {
                OptCaps::REQUIRES_GLOBAL_USE_DEFS
                    | OptCaps::LOADS_AS_DEFS
                    | OptCaps::CANNOT_OMIT_TRIVIAL_DEFS
            }
            OptId::BasicBlockExtension => {
                OptCaps::DOES_NOT_REQUIRE_ALIAS_SETS
                    | OptCaps::DOES_NOT_REQUIRE_TREES
                    | OptCaps::DO_NOT_SET_FREQUENCIES
            }
            OptId::InductionVariableAnalysis => {
                OptCaps::REQUIRES_STRUCTURE
                    | OptCaps::REQUIRES_LOCAL_USE_DEFS
                    | OptCaps::PREFERS_GLOBAL_USE_DEFS
            }
            _ => OptCaps::empty(),
        }
    }

    /// Factory creating a fresh pass instance; `None` for groups.
    #[must_use]
    pub fn factory(self) -> Option<PassFactory> {
        match self {
            OptId::TreeSimplification => Some(passes::simplifier::create),
            OptId::DeadTreesElimination => Some(passes::dead_trees::create),
            OptId::LocalCSE => Some(passes::local_cse::create),
            OptId::LocalValuePropagation => Some(passes::local_vp::create),
            OptId::LocalDeadStoreElimination => Some(passes::dead_stores::create_local),
            OptId::GlobalValuePropagation => Some(passes::global_vp::create),
            OptId::GlobalDeadStoreElimination => Some(passes::dead_stores::create_global),
            OptId::BasicBlockExtension => Some(passes::block_extension::create),
            OptId::InductionVariableAnalysis => Some(passes::induction::create),
            _ => None,
        }
    }

    /// The group's sub-strategy; `None` for primitive passes.
    #[must_use]
    pub fn group_strategy(self) -> Option<Strategy> {
        match self {
            OptId::LocalValuePropagationGroup => Some(LOCAL_VALUE_PROPAGATION_OPTS),
            OptId::EachLocalAnalysisPassGroup => Some(EACH_LOCAL_ANALYSIS_PASS_OPTS),
            OptId::GlobalDeadStoreGroup => Some(GLOBAL_DEAD_STORE_OPTS),
            OptId::LateLocalGroup => Some(LATE_LOCAL_OPTS),
            _ => None,
        }
    }

    /// A companion group whose request flag is cleared when this group is
    /// entered (the paired-versioner protocol); none of the built-in
    /// groups pair up.
    #[must_use]
    pub fn companion_group(self) -> Option<OptId> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_boundary() {
        assert!(!OptId::TreeSimplification.is_group());
        assert!(OptId::EachLocalAnalysisPassGroup.is_group());
        assert!(OptId::TreeSimplification.factory().is_some());
        assert!(OptId::EachLocalAnalysisPassGroup.factory().is_none());
        assert!(OptId::EachLocalAnalysisPassGroup.group_strategy().is_some());
    }

    #[test]
    fn names_are_stable() {
        assert_eq!(OptId::TreeSimplification.name(), "treeSimplification");
        assert_eq!(OptId::LocalCSE.name(), "localCSE");
    }

    #[test]
    fn repr_round_trip() {
        for index in 0..OptId::COUNT as u16 {
            let opt = OptId::from_repr(index).unwrap();
            assert_eq!(opt as u16, index);
        }
        assert!(OptId::from_repr(OptId::COUNT as u16).is_none());
    }
}
