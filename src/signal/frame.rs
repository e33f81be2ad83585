//! Protection frames and per-thread dispatch state.
//!
//! Each call to [`crate::signal::protect`] links a frame into the calling
//! thread's stack of handlers; the main synchronous handler walks that
//! stack when a fault arrives. The frames live on the protected call's
//! stack and are linked through raw pointers, because the walker runs in
//! signal context where nothing may allocate. The currently dispatched
//! signal is likewise a per-thread cell, saved and restored across nested
//! dispatches.

use std::cell::Cell;
use std::ptr;

use libc::c_int;

use crate::signal::flags::{SigFlags, SyncHandler};

/// The fault being dispatched, as seen by a synchronous handler.
#[derive(Debug, Clone, Copy)]
pub struct SignalInfo {
    /// Logical category, sub-code refined for arithmetic faults.
    pub category: SigFlags,
    /// The raw OS signal number.
    pub os_signal: c_int,
    /// The OS sub-code (`si_code`).
    pub si_code: c_int,
    /// Faulting address for memory faults, zero otherwise.
    pub fault_address: usize,
}

/// Per-thread record of the signal currently being dispatched.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CurrentSignal {
    pub(crate) os_signal: c_int,
    pub(crate) category: SigFlags,
    pub(crate) info: *mut libc::siginfo_t,
    pub(crate) context: *mut libc::c_void,
}

/// Saved context for the non-local return out of a fault handler.
///
/// `getcontext` also captures the signal mask, so resuming restores the
/// pre-fault mask — the handler-entry mask imposed by the OS does not
/// leak into the protected caller.
#[cfg(all(target_os = "linux", target_env = "gnu"))]
pub(crate) type JumpEnv = libc::ucontext_t;

/// Placeholder on targets without a usable `ucontext`; `MAY_RETURN` is
/// reported unsupported there.
#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
pub(crate) type JumpEnv = ();

/// Is the non-local return supported on this target?
#[must_use]
pub(crate) fn jump_supported() -> bool {
    cfg!(all(target_os = "linux", target_env = "gnu"))
}

/// One scoped protection frame, stack-allocated by `protect`.
#[repr(C)]
pub(crate) struct ProtectionFrame {
    pub(crate) previous: *mut ProtectionFrame,
    pub(crate) handler: SyncHandler,
    pub(crate) handler_arg: usize,
    pub(crate) flags: SigFlags,
    /// The current-signal cell value at frame entry, restored on unwind.
    pub(crate) saved_signal: *const CurrentSignal,
    /// Written volatile by the dispatcher before resuming the context.
    pub(crate) jumped: bool,
    pub(crate) env: std::mem::MaybeUninit<JumpEnv>,
}

impl ProtectionFrame {
    pub(crate) fn new(
        handler: SyncHandler,
        handler_arg: usize,
        flags: SigFlags,
        previous: *mut ProtectionFrame,
        saved_signal: *const CurrentSignal,
    ) -> Self {
        Self {
            previous,
            handler,
            handler_arg,
            flags,
            saved_signal,
            jumped: false,
            env: std::mem::MaybeUninit::uninit(),
        }
    }
}

thread_local! {
    /// Head of this thread's protection-frame stack.
    static HANDLER_STACK: Cell<*mut ProtectionFrame> = const { Cell::new(ptr::null_mut()) };

    /// The signal currently being dispatched on this thread.
    static CURRENT_SIGNAL: Cell<*const CurrentSignal> = const { Cell::new(ptr::null()) };
}

pub(crate) fn stack_head() -> *mut ProtectionFrame {
    HANDLER_STACK.with(Cell::get)
}

pub(crate) fn set_stack_head(frame: *mut ProtectionFrame) {
    HANDLER_STACK.with(|cell| cell.set(frame));
}

pub(crate) fn current_signal_cell() -> *const CurrentSignal {
    CURRENT_SIGNAL.with(Cell::get)
}

pub(crate) fn set_current_signal_cell(signal: *const CurrentSignal) {
    CURRENT_SIGNAL.with(|cell| cell.set(signal));
}
