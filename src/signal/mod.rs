//! Process-wide signal dispatch and protection.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        Signal dispatcher                         │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  OS signal ───► main handler (installed lazily, one per kind)    │
//! │                                                                  │
//! │  synchronous (SEGV, BUS, ILL, FPE, TRAP)                         │
//! │    walk the per-thread protection-frame stack top→bottom,        │
//! │    unlink the frame, invoke its callback:                        │
//! │      ContinueSearch │ ContinueExecution │ CooperativeShutdown    │
//! │      │ ExceptionReturn (resume the protected call's context)     │
//! │    unhandled → chain to the foreign handler → abort              │
//! │                                                                  │
//! │  asynchronous (QUIT, TERM, INT, HUP, ...)                        │
//! │    atomically count, post the reporter wake-up, return           │
//! │    reporter thread: map signal → category, fan out to the        │
//! │    registered listeners, never in signal context                 │
//! │                                                                  │
//! │  monitors: register (sigaction + bitmasks) · async (handler      │
//! │  list + in-flight counter) · reporter lifecycle                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Lifecycle is attach-counted: the first [`startup`] creates the tools
//! and the reporter thread, the last [`shutdown`] stops the reporter and
//! restores every OS disposition captured at first installation. No OS
//! handler is installed until a caller actually protects against or
//! listens for a signal.
//!
//! # Protection
//!
//! [`protect`] runs a closure under a stack of scoped protection frames.
//! A synchronous fault dispatches to the innermost frame whose flag set
//! covers it; `ExceptionReturn` unwinds back into `protect`, which then
//! reports [`Protected::ExceptionOccurred`]. The non-local return is a
//! saved `ucontext`, whose captured signal mask restores the pre-fault
//! mask exactly like the `sigsetjmp(buf, 1)` form it replaces.

mod dispatcher;
mod flags;
mod frame;
mod map;
mod reporter;
mod sync;

pub use dispatcher::{
    async_handler_count, is_main_signal_handler, is_signal_ignored, options, register_os_handler,
    set_async_signal_handler, set_chain_handler, set_options, set_single_async_signal_handler,
    shutdown, startup, ChainAction, ChainHandler, RawOsHandler,
};
pub use flags::{AsyncHandler, HandlerDisposition, Protected, SigFlags, SigOptions, SyncHandler};
pub use frame::SignalInfo;
pub use map::{map_flags_to_os, map_os_to_flags};
pub use sync::{can_protect, current_signal, protect};
