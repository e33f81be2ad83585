//! Signal categories, control bits, options and handler types.
//!
//! Every logical signal constant carries its kind bit (`IS_SYNC` or
//! `IS_ASYNC`) so a set like `SEGV | MAY_RETURN` is self-describing. A
//! non-zero set carrying both kind bits, or neither, is *ambiguous* and is
//! rejected by every entry point before any state changes.

use bitflags::bitflags;

bitflags! {
    /// Logical signal categories plus control bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SigFlags: u32 {
        /// The protected call may be resumed by a non-local return.
        const MAY_RETURN = 1 << 28;
        /// A handler may ask to re-execute the faulting instruction.
        const MAY_CONTINUE_EXECUTION = 1 << 29;
        /// The set names synchronous (fault) signals.
        const IS_SYNC = 1 << 30;
        /// The set names asynchronous signals.
        const IS_ASYNC = 1 << 31;

        /// All control bits; the rest of a set is signal bits.
        const CONTROL_BITS = Self::MAY_RETURN.bits()
            | Self::MAY_CONTINUE_EXECUTION.bits()
            | Self::IS_SYNC.bits()
            | Self::IS_ASYNC.bits();

        /// Invalid memory access.
        const SEGV = Self::IS_SYNC.bits() | (1 << 0);
        /// Bus error.
        const BUS = Self::IS_SYNC.bits() | (1 << 1);
        /// Illegal instruction.
        const ILL = Self::IS_SYNC.bits() | (1 << 2);
        /// Arithmetic fault; sub-codes below refine it.
        const FPE = Self::IS_SYNC.bits() | (1 << 3);
        /// Trap instruction.
        const TRAP = Self::IS_SYNC.bits() | (1 << 4);
        /// Floating divide by zero (refines [`SigFlags::FPE`]).
        const FPE_DIV_BY_ZERO = Self::FPE.bits() | (1 << 5);
        /// Integer divide by zero (refines [`SigFlags::FPE`]).
        const FPE_INT_DIV_BY_ZERO = Self::FPE.bits() | (1 << 6);
        /// Integer overflow (refines [`SigFlags::FPE`]).
        const FPE_INT_OVERFLOW = Self::FPE.bits() | (1 << 7);

        /// Quit request.
        const QUIT = Self::IS_ASYNC.bits() | (1 << 8);
        /// Abort raised elsewhere in the process.
        const ABRT = Self::IS_ASYNC.bits() | (1 << 9);
        /// Termination request.
        const TERM = Self::IS_ASYNC.bits() | (1 << 10);
        /// Interactive interrupt.
        const INT = Self::IS_ASYNC.bits() | (1 << 11);
        /// Hang-up.
        const HUP = Self::IS_ASYNC.bits() | (1 << 12);
        /// File-size limit exceeded.
        const XFSZ = Self::IS_ASYNC.bits() | (1 << 13);
        /// Alarm timer.
        const ALRM = Self::IS_ASYNC.bits() | (1 << 14);
        /// User signal 1.
        const USR1 = Self::IS_ASYNC.bits() | (1 << 15);
        /// User signal 2.
        const USR2 = Self::IS_ASYNC.bits() | (1 << 16);
        /// Broken pipe.
        const PIPE = Self::IS_ASYNC.bits() | (1 << 17);
        /// Child status change.
        const CHLD = Self::IS_ASYNC.bits() | (1 << 18);

        /// Every synchronous signal a protection frame may cover. The FPE
        /// sub-codes are deliberately not included: frames register
        /// interest with the plain FPE bit and receive the sub-code in
        /// their [`crate::signal::SignalInfo`].
        const SIGALLSYNC = Self::SEGV.bits()
            | Self::BUS.bits()
            | Self::ILL.bits()
            | Self::FPE.bits()
            | Self::TRAP.bits();

        /// Every asynchronous signal the dispatcher handles.
        const SIGALLASYNC = Self::QUIT.bits()
            | Self::ABRT.bits()
            | Self::TERM.bits()
            | Self::INT.bits()
            | Self::HUP.bits()
            | Self::XFSZ.bits()
            | Self::ALRM.bits()
            | Self::USR1.bits()
            | Self::USR2.bits()
            | Self::PIPE.bits()
            | Self::CHLD.bits();
    }
}

impl SigFlags {
    /// The signal bits of this set, control bits stripped.
    #[must_use]
    pub fn signal_bits(self) -> SigFlags {
        self.difference(SigFlags::CONTROL_BITS)
    }

    /// Is this set non-empty with both or neither kind bit?
    #[must_use]
    pub fn is_ambiguous(self) -> bool {
        if self.is_empty() {
            return false;
        }
        let sync = self.contains(SigFlags::IS_SYNC);
        let async_ = self.contains(SigFlags::IS_ASYNC);
        sync == async_
    }

    /// Does this set name exactly one signal (or none)?
    #[must_use]
    pub fn is_at_most_one_signal(self) -> bool {
        self.signal_bits().bits().count_ones() <= 1
    }
}

bitflags! {
    /// Process-wide dispatcher options, OR-merged by
    /// [`crate::signal::set_options`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SigOptions: u32 {
        /// Never install synchronous main handlers; `protect` runs its
        /// function unprotected.
        const REDUCED_SIGNALS_SYNCHRONOUS = 1 << 0;
        /// Refuse asynchronous registration (except the XFSZ carve-out).
        const REDUCED_SIGNALS_ASYNCHRONOUS = 1 << 1;
        /// Allow XFSZ registration even under reduced asynchronous mode.
        const SIGXFSZ = 1 << 2;
        /// Never forward unhandled signals to the foreign chain handler.
        const NO_CHAIN = 1 << 3;
        /// Handlers may request an orderly shutdown instead of an abort.
        const COOPERATIVE_SHUTDOWN = 1 << 4;
    }
}

/// What a synchronous handler wants done with the fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerDisposition {
    /// Not mine; keep walking the frame stack.
    ContinueSearch,
    /// Resume the faulting instruction.
    ContinueExecution,
    /// Stop walking and take the orderly-termination path.
    CooperativeShutdown,
    /// Unwind to the protection frame; the protected call reports
    /// [`Protected::ExceptionOccurred`].
    ExceptionReturn,
}

/// Outcome of a protected call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protected {
    /// The function ran to completion with this result.
    Completed(usize),
    /// A fault was dispatched and the frame was unwound.
    ExceptionOccurred,
}

/// Synchronous fault callback, invoked on the faulting thread in signal
/// context. Must be async-signal-safe.
pub type SyncHandler = fn(info: &crate::signal::SignalInfo, arg: usize) -> HandlerDisposition;

/// Asynchronous signal callback, invoked on the reporter thread, never in
/// signal context.
pub type AsyncHandler = fn(category: SigFlags, arg: usize);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_bits_are_baked_into_signal_constants() {
        assert!(SigFlags::SEGV.contains(SigFlags::IS_SYNC));
        assert!(SigFlags::TERM.contains(SigFlags::IS_ASYNC));
        assert!(SigFlags::FPE_INT_OVERFLOW.contains(SigFlags::FPE));
    }

    #[test]
    fn ambiguity() {
        assert!(!(SigFlags::SEGV | SigFlags::MAY_RETURN).is_ambiguous());
        assert!((SigFlags::SEGV | SigFlags::TERM).is_ambiguous());
        assert!(SigFlags::MAY_RETURN.is_ambiguous());
        assert!(!SigFlags::empty().is_ambiguous());
    }

    #[test]
    fn fpe_sub_codes_are_outside_sigallsync() {
        assert!(SigFlags::SIGALLSYNC.contains(SigFlags::FPE.signal_bits()));
        assert!(!SigFlags::SIGALLSYNC.contains(SigFlags::FPE_DIV_BY_ZERO.signal_bits()));
    }
}
