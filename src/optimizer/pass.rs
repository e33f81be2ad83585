//! The contract between the driver and an optimization pass.
//!
//! Passes are opaque to the orchestrator: it instantiates one through the
//! optimization's factory, asks `should_perform`, and then drives either
//! the whole-method hooks (`pre_perform` / `perform` / `post_perform`) or
//! the per-block hooks when the guard selected only requested blocks. A
//! pass communicates exclusively through its [`PassContext`]: it mutates
//! the method, reads whatever analyses the driver materialized for it, and
//! enqueues follow-on work in the request table.

use crate::error::Result;
use crate::ir::BlockId;
use crate::optimizer::events::Event;
use crate::optimizer::manager::RequestTable;
use crate::optimizer::usedef::UseDefInfo;
use crate::optimizer::valuenum::ValueNumberInfo;
use crate::optimizer::{Compilation, OptId};

/// Everything a running pass may touch.
pub struct PassContext<'a> {
    /// The compilation, including the method being transformed.
    pub comp: &'a mut Compilation,
    /// Request table for enqueuing follow-on optimization work.
    pub requests: &'a mut RequestTable,
    /// Use-def info, present when the pass declared it required.
    pub use_defs: Option<&'a UseDefInfo>,
    /// Value numbers, present when the pass declared them required.
    pub value_numbers: Option<&'a ValueNumberInfo>,
    /// The optimization being run.
    pub opt: OptId,
    /// Is tracing on for this dispatch?
    pub trace: bool,
}

impl PassContext<'_> {
    /// Records a transformation in the compilation's event log.
    pub fn record_transformation(&mut self, detail: &'static str) {
        let opt = self.opt;
        self.comp.events.record(Event::Transformation { opt, detail });
    }
}

/// A single optimization pass instance.
///
/// Instances are created fresh for every dispatch and dropped afterwards;
/// state that must survive between dispatches belongs on the compilation
/// or in the request table, not on the pass.
pub trait OptimizationPass {
    /// Pass-specific veto consulted after the guard admitted the entry.
    fn should_perform(&self, _comp: &Compilation) -> bool {
        true
    }

    /// Whole-method setup.
    fn pre_perform(&mut self, _ctx: &mut PassContext<'_>) {}

    /// Transforms the whole method. Returns a cost estimate proportional
    /// to the work done.
    ///
    /// # Errors
    ///
    /// A typed failure aborts the entire compilation; the driver does not
    /// catch it.
    fn perform(&mut self, ctx: &mut PassContext<'_>) -> Result<u32>;

    /// Whole-method teardown.
    fn post_perform(&mut self, _ctx: &mut PassContext<'_>) {}

    /// Per-block setup, run once before the block loop.
    fn pre_perform_on_blocks(&mut self, _ctx: &mut PassContext<'_>) {}

    /// Transforms one requested block (always the head of its extended
    /// block). Returns a cost estimate.
    ///
    /// # Errors
    ///
    /// A typed failure aborts the entire compilation.
    fn perform_on_block(&mut self, _block: BlockId, _ctx: &mut PassContext<'_>) -> Result<u32> {
        Ok(0)
    }

    /// Per-block teardown, run once after the block loop.
    fn post_perform_on_blocks(&mut self, _ctx: &mut PassContext<'_>) {}
}

/// Creates a fresh pass instance for one dispatch.
pub type PassFactory = fn() -> Box<dyn OptimizationPass>;
