use thiserror::Error;

use crate::optimizer::Hotness;

/// The generic Error type covering all failures this library can return.
///
/// Two families of errors share the enum. Compilation-fatal failures raised
/// by the optimizer driver ([`Error::ExcessiveComplexity`],
/// [`Error::InsufficientlyAggressiveCompilation`],
/// [`Error::CompilationInterrupted`]) abort a single compilation and are
/// expected to be caught by the compilation driver, which may retry at a
/// different optimization level or simply fall back to the interpreter.
/// Signal-dispatch failures ([`Error::AmbiguousSignalFlags`],
/// [`Error::UnsupportedSignal`], [`Error::OsFailure`], ...) are returned to
/// the caller of the dispatcher entry point with no global state change.
///
/// Programmer errors (a pass running after its last-run marker, a disabled
/// optimization with blocks still queued) are debug assertions, not error
/// values, matching the fatal-assert policy of the pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// A custom optimization strategy could not be decoded.
    ///
    /// Raised during optimizer construction when a packed strategy word
    /// names an unknown optimization, carries unrecognized guard bits, or
    /// selects a pass that does not support the IL-generation level for an
    /// IL-generation optimizer. The optimizer is not constructed.
    #[error("invalid optimization strategy: {reason}")]
    InvalidStrategy {
        /// Why the strategy was rejected.
        reason: String,
    },

    /// The method exceeded the block or loop complexity thresholds.
    ///
    /// Raised by the driver before running a structure-dependent pass when
    /// the basic-block or loop census is over the configured limit and the
    /// huge-method override is not set. Fatal to the compilation, not to
    /// the process.
    #[error("method is too large ({blocks} blocks, {loops} loops)")]
    ExcessiveComplexity {
        /// Number of flow-graph nodes counted.
        blocks: u32,
        /// Number of natural loops counted.
        loops: u32,
    },

    /// The method should be recompiled at a hotter optimization level.
    ///
    /// Raised at the end of [`crate::optimizer::Optimizer::optimize`] when
    /// the deterministic-compilation re-evaluation finds an inlined body
    /// compiled hotter than the present compilation. The requested level is
    /// recorded on the compilation before this is returned.
    #[error("method needs to be compiled at {next:?}")]
    InsufficientlyAggressiveCompilation {
        /// The level the next compilation should use.
        next: Hotness,
    },

    /// An external cancellation request was observed at a pass boundary.
    #[error("compilation interrupted between optimizations")]
    CompilationInterrupted,

    /// A signal flag set had both or neither of the sync/async marker bits.
    ///
    /// Non-zero flag sets must carry exactly one of `IS_SYNC` / `IS_ASYNC`.
    /// No entry point changes any state before this check.
    #[error("ambiguous signal flags")]
    AmbiguousSignalFlags,

    /// A signal flag did not map to an OS signal, or had more than one
    /// signal bit set where exactly one was required.
    #[error("unsupported or malformed signal selection")]
    UnsupportedSignal,

    /// The dispatcher has not been started, or has already been shut down.
    #[error("signal dispatcher is not running")]
    SignalToolsUnavailable,

    /// Handler installation was refused because a reduced-signals mode is
    /// active.
    #[error("refused by reduced-signals mode")]
    ReducedSignals,

    /// A reduced-signals mode was requested after handlers were already
    /// installed.
    #[error("too late to reduce signals: handlers are installed")]
    HandlersAlreadyInstalled,

    /// An OS-level signal call failed.
    ///
    /// Partial bitmask updates are rolled back by never being committed;
    /// the dispatcher state is as it was before the call.
    #[error("OS signal call failed (errno {errno})")]
    OsFailure {
        /// The `errno` value reported by the failing call.
        errno: i32,
    },
}

/// Convenience `Result` type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
