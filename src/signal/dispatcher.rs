//! The process-wide dispatcher context: lifecycle, OS-handler
//! installation, asynchronous registration, options and chaining.
//!
//! Everything process-global lives here: the tools singleton (monitors,
//! wake-up primitive, reporter lifecycle), the captured original
//! dispositions, the signals-with-handlers bitmasks, the option word and
//! the chain hook. Installation is protected by the register monitor and
//! follows a strict protocol: capture the original disposition on first
//! install only, publish with a fence, account the bitmasks, and unblock
//! the signal on the calling thread so an inherited mask cannot suppress
//! the handler.

use std::sync::atomic::{fence, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, OnceLock};
use std::thread::JoinHandle;

use libc::c_int;

use crate::error::{Error, Result};
use crate::signal::flags::{AsyncHandler, SigFlags, SigOptions};
use crate::signal::map::{self, map_flags_to_os, map_os_to_flags, MAX_OS_SIGNAL};
use crate::signal::reporter::{
    main_async_handler, reporter_loop, AsyncRecord, AsyncState, WakeupSem, SHUT_DOWN,
};
use crate::signal::sync::main_sync_handler;

/// A raw OS handler address, as stored in `sigaction.sa_sigaction`.
pub type RawOsHandler = usize;

/// What a foreign chain handler did with a forwarded signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainAction {
    /// The foreign handler dealt with the signal.
    Handled,
    /// The OS default action should run.
    DefaultActionRequired,
}

/// A foreign signal handler cooperating with this dispatcher.
///
/// Synchronous forwarding passes the live signal information and context;
/// asynchronous forwarding passes nulls.
pub type ChainHandler =
    fn(signal: c_int, info: *mut libc::siginfo_t, context: *mut libc::c_void) -> ChainAction;

#[derive(Clone, Copy)]
struct OldAction {
    restore: bool,
    action: libc::sigaction,
}

/// Original dispositions plus install bookkeeping, under the register
/// monitor.
pub(crate) struct RegisterState {
    old_actions: [OldAction; MAX_OS_SIGNAL + 1],
}

impl RegisterState {
    fn new() -> Self {
        Self {
            old_actions: [OldAction {
                restore: false,
                action: unsafe { std::mem::zeroed() },
            }; MAX_OS_SIGNAL + 1],
        }
    }
}

struct Lifecycle {
    attach_count: u32,
    reporter: Option<JoinHandle<()>>,
}

/// The dispatcher's process-wide tools, created lazily and reused across
/// attach cycles.
pub(crate) struct SignalTools {
    register: Mutex<RegisterState>,
    async_state: Mutex<AsyncState>,
    async_cond: Condvar,
    pub(crate) wakeup: WakeupSem,
    lifecycle: Mutex<Lifecycle>,
}

impl SignalTools {
    fn new() -> Self {
        Self {
            register: Mutex::new(RegisterState::new()),
            async_state: Mutex::new(AsyncState::default()),
            async_cond: Condvar::new(),
            wakeup: WakeupSem::new(),
            lifecycle: Mutex::new(Lifecycle {
                attach_count: 0,
                reporter: None,
            }),
        }
    }

    pub(crate) fn lock_async(&self) -> MutexGuard<'_, AsyncState> {
        lock(&self.async_state)
    }

    pub(crate) fn notify_async(&self) {
        self.async_cond.notify_all();
    }
}

static TOOLS: OnceLock<SignalTools> = OnceLock::new();

/// Signals (value bits) that currently have any handler installed.
static SYNC_WITH_HANDLERS: AtomicU32 = AtomicU32::new(0);
static ASYNC_WITH_HANDLERS: AtomicU32 = AtomicU32::new(0);

/// Signals (value bits) whose installed handler is one of the mains.
static SYNC_WITH_MAIN_HANDLERS: AtomicU32 = AtomicU32::new(0);
static ASYNC_WITH_MAIN_HANDLERS: AtomicU32 = AtomicU32::new(0);

static SIGNAL_OPTIONS: AtomicU32 = AtomicU32::new(0);

static CHAIN_HANDLER: AtomicUsize = AtomicUsize::new(0);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn tools() -> &'static SignalTools {
    TOOLS.get_or_init(SignalTools::new)
}

/// The tools, if any startup ever ran. Used from signal context, where
/// initialization must not happen.
pub(crate) fn initialized_tools() -> Option<&'static SignalTools> {
    TOOLS.get()
}

fn running_tools() -> Result<&'static SignalTools> {
    let tools = TOOLS.get().ok_or(Error::SignalToolsUnavailable)?;
    let lifecycle = lock(&tools.lifecycle);
    if lifecycle.attach_count == 0 {
        return Err(Error::SignalToolsUnavailable);
    }
    Ok(tools)
}

/// The current global options word.
#[must_use]
pub fn options() -> SigOptions {
    SigOptions::from_bits_truncate(SIGNAL_OPTIONS.load(Ordering::Acquire))
}

/// OR-merges `new_options` into the global options.
///
/// Switching into a reduced-signals mode is refused once any handler has
/// been installed.
///
/// # Errors
///
/// Returns [`Error::HandlersAlreadyInstalled`] in that case; nothing is
/// merged.
pub fn set_options(new_options: SigOptions) -> Result<()> {
    if new_options.intersects(
        SigOptions::REDUCED_SIGNALS_SYNCHRONOUS | SigOptions::REDUCED_SIGNALS_ASYNCHRONOUS,
    ) {
        let tools = tools();
        let _register = lock(&tools.register);
        if SYNC_WITH_HANDLERS.load(Ordering::Acquire) != 0
            || ASYNC_WITH_HANDLERS.load(Ordering::Acquire) != 0
        {
            return Err(Error::HandlersAlreadyInstalled);
        }
        SIGNAL_OPTIONS.fetch_or(new_options.bits(), Ordering::AcqRel);
        return Ok(());
    }
    SIGNAL_OPTIONS.fetch_or(new_options.bits(), Ordering::AcqRel);
    Ok(())
}

/// Installs (or clears) the foreign chain handler.
pub fn set_chain_handler(handler: Option<ChainHandler>) {
    let raw = handler.map_or(0, |h| h as usize);
    CHAIN_HANDLER.store(raw, Ordering::Release);
}

pub(crate) fn chain_handler() -> Option<ChainHandler> {
    let raw = CHAIN_HANDLER.load(Ordering::Acquire);
    if raw == 0 {
        None
    } else {
        // Stored from a valid fn pointer above.
        Some(unsafe { std::mem::transmute::<usize, ChainHandler>(raw) })
    }
}

/// Attaches to the dispatcher, creating the tools and the reporter thread
/// on the first attach. No OS handler is installed here; installation is
/// lazy.
///
/// # Errors
///
/// Returns [`Error::OsFailure`] when the reporter thread cannot be
/// created; the attach is rolled back.
pub fn startup() -> Result<()> {
    let tools = tools();
    let mut lifecycle = lock(&tools.lifecycle);
    lifecycle.attach_count += 1;
    if lifecycle.attach_count == 1 {
        {
            let mut register = lock(&tools.register);
            for entry in register.old_actions.iter_mut() {
                entry.restore = false;
            }
        }
        SHUT_DOWN.store(false, Ordering::Release);
        match std::thread::Builder::new()
            .name("signal reporter".into())
            .spawn(move || reporter_loop(tools))
        {
            Ok(handle) => lifecycle.reporter = Some(handle),
            Err(_) => {
                lifecycle.attach_count -= 1;
                return Err(Error::OsFailure {
                    errno: libc::EAGAIN,
                });
            }
        }
    }
    Ok(())
}

/// Detaches from the dispatcher. The last detach restores every original
/// OS disposition captured at first installation, removes the
/// asynchronous listeners, and stops the reporter thread.
///
/// # Errors
///
/// Infallible today; the `Result` is part of the lifecycle contract.
pub fn shutdown() -> Result<()> {
    let Some(tools) = TOOLS.get() else {
        return Ok(());
    };
    let mut lifecycle = lock(&tools.lifecycle);
    if lifecycle.attach_count == 0 {
        return Ok(());
    }
    lifecycle.attach_count -= 1;
    if lifecycle.attach_count > 0 {
        return Ok(());
    }

    {
        let mut register = lock(&tools.register);
        for signal in 1..=MAX_OS_SIGNAL {
            if register.old_actions[signal].restore {
                unsafe {
                    libc::sigaction(
                        signal as c_int,
                        &register.old_actions[signal].action,
                        std::ptr::null_mut(),
                    );
                }
                let flags = map_os_to_flags(signal as c_int, None);
                unset_with_handlers(flags);
                unset_with_main_handlers(flags);
                register.old_actions[signal].restore = false;
            }
        }
    }

    {
        let mut state = tools.lock_async();
        while state.in_flight > 0 {
            state = tools
                .async_cond
                .wait(state)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
        state.records.clear();
    }

    SHUT_DOWN.store(true, Ordering::Release);
    tools.wakeup.post();
    let reporter = lifecycle.reporter.take();
    drop(lifecycle);
    if let Some(handle) = reporter {
        let _ = handle.join();
    }
    Ok(())
}

fn mask_for(flags: SigFlags, mains: bool) -> &'static AtomicU32 {
    let async_ = flags.contains(SigFlags::IS_ASYNC);
    match (async_, mains) {
        (false, false) => &SYNC_WITH_HANDLERS,
        (true, false) => &ASYNC_WITH_HANDLERS,
        (false, true) => &SYNC_WITH_MAIN_HANDLERS,
        (true, true) => &ASYNC_WITH_MAIN_HANDLERS,
    }
}

fn set_with_handlers(flags: SigFlags) {
    mask_for(flags, false).fetch_or(flags.signal_bits().bits(), Ordering::AcqRel);
}

fn unset_with_handlers(flags: SigFlags) {
    mask_for(flags, false).fetch_and(!flags.signal_bits().bits(), Ordering::AcqRel);
}

fn set_with_main_handlers(flags: SigFlags) {
    mask_for(flags, true).fetch_or(flags.signal_bits().bits(), Ordering::AcqRel);
}

fn unset_with_main_handlers(flags: SigFlags) {
    mask_for(flags, true).fetch_and(!flags.signal_bits().bits(), Ordering::AcqRel);
}

/// Synchronous signals (value bits) whose main handler is installed. Read
/// lock-free on the protect fast path.
pub(crate) fn sync_main_handler_mask() -> u32 {
    SYNC_WITH_MAIN_HANDLERS.load(Ordering::Acquire)
}

/// Installs the synchronous main handler for every signal in `flags` that
/// lacks one.
pub(crate) fn install_sync_main_handlers(flags: SigFlags) -> Result<()> {
    let tools = tools();
    let mut register = lock(&tools.register);
    register_main_handlers(&mut register, flags, SigFlags::SIGALLSYNC).map(|_| ())
}

/// Registers the main handler for the signals in `flags` that do not have
/// one yet. `allowed` selects the family (all-sync or all-async) and with
/// it the main handler. Callers hold the register monitor.
fn register_main_handlers(
    register: &mut RegisterState,
    flags: SigFlags,
    allowed: SigFlags,
) -> Result<Option<RawOsHandler>> {
    let signal_type = if flags.contains(SigFlags::IS_ASYNC) {
        SigFlags::IS_ASYNC
    } else {
        SigFlags::IS_SYNC
    };
    let (handler, allowed_type) = if allowed == SigFlags::SIGALLSYNC {
        (main_sync_handler as RawOsHandler, SigFlags::IS_SYNC)
    } else if allowed == SigFlags::SIGALLASYNC {
        (main_async_handler as RawOsHandler, SigFlags::IS_ASYNC)
    } else {
        return Err(Error::UnsupportedSignal);
    };

    let mut old = None;
    if signal_type == allowed_type {
        let installed = mask_for(signal_type, true);
        let mut bits = (flags & allowed).signal_bits().bits();
        while bits != 0 {
            let bit = bits & bits.wrapping_neg();
            if installed.load(Ordering::Acquire) & bit == 0 {
                let flag = SigFlags::from_bits_retain(bit) | signal_type;
                register_signal_handler_with_os(register, flag, handler, &mut old)?;
            } else {
                // Already ours; report the main handler as the old one.
                old = Some(handler);
            }
            bits ^= bit;
        }
    }
    Ok(old)
}

/// Installs `handler` for the single signal in `flag` with the OS.
///
/// The first installation per signal captures the original disposition
/// for restoration at shutdown; later installations report the replaced
/// handler without touching the original.
fn register_signal_handler_with_os(
    register: &mut RegisterState,
    flag: SigFlags,
    handler: RawOsHandler,
    old_out: &mut Option<RawOsHandler>,
) -> Result<()> {
    let Some(os_signal) = map_flags_to_os(flag) else {
        return Err(Error::UnsupportedSignal);
    };

    let mut new_action: libc::sigaction = unsafe { std::mem::zeroed() };
    unsafe {
        libc::sigemptyset(&mut new_action.sa_mask);
    }
    // Restart interrupted syscalls, take the three-argument handler, and
    // do not mask the signal against itself.
    new_action.sa_flags = libc::SA_RESTART | libc::SA_SIGINFO | libc::SA_NODEFER;

    if !WakeupSem::COUNTING && flag.contains(SigFlags::IS_ASYNC) {
        // Without a counting wake-up, a nested async dispatch could miss
        // its post; queue the others until the handler returns.
        for (_, os) in map::async_signals() {
            unsafe {
                libc::sigaddset(&mut new_action.sa_mask, os);
            }
        }
    }
    new_action.sa_sigaction = handler;

    let index = os_signal as usize;
    let mut replaced: libc::sigaction = unsafe { std::mem::zeroed() };
    if unsafe { libc::sigaction(os_signal, &new_action, &mut replaced) } != 0 {
        return Err(Error::OsFailure {
            errno: std::io::Error::last_os_error().raw_os_error().unwrap_or(0),
        });
    }
    if !register.old_actions[index].restore {
        register.old_actions[index] = OldAction {
            restore: true,
            action: replaced,
        };
    }
    *old_out = Some(replaced.sa_sigaction);

    fence(Ordering::SeqCst);

    set_with_handlers(flag);
    if handler == main_sync_handler as RawOsHandler || handler == main_async_handler as RawOsHandler
    {
        set_with_main_handlers(flag);
    } else {
        unset_with_main_handlers(flag);
    }

    unblock_signal(os_signal)
}

/// Unblocks `signal` on the calling thread; a mask inherited across fork
/// and exec must not suppress a freshly installed handler.
fn unblock_signal(signal: c_int) -> Result<()> {
    let mut set: libc::sigset_t = unsafe { std::mem::zeroed() };
    unsafe {
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, signal);
        if libc::pthread_sigmask(libc::SIG_UNBLOCK, &set, std::ptr::null_mut()) != 0 {
            return Err(Error::OsFailure {
                errno: std::io::Error::last_os_error().raw_os_error().unwrap_or(0),
            });
        }
    }
    Ok(())
}

/// Registers, updates or removes an asynchronous listener.
///
/// Installs main handlers for the signals in `flags` that lack one, waits
/// until no dispatch is in flight, and then edits the handler list: an
/// existing `(handler, arg)` record has `flags` OR-ed in, or is removed
/// when `flags` is empty; otherwise a fresh record is appended.
///
/// # Errors
///
/// [`Error::AmbiguousSignalFlags`], [`Error::SignalToolsUnavailable`]
/// before [`startup`], [`Error::ReducedSignals`] under reduced
/// asynchronous mode (except the XFSZ carve-out), or an installation
/// failure.
pub fn set_async_signal_handler(
    handler: AsyncHandler,
    handler_arg: usize,
    flags: SigFlags,
) -> Result<()> {
    if flags.is_ambiguous() {
        return Err(Error::AmbiguousSignalFlags);
    }
    let tools = running_tools()?;

    {
        let mut register = lock(&tools.register);
        install_async_mains(&mut register, flags, None)?;
    }

    let mut state = tools.lock_async();
    while state.in_flight > 0 {
        state = tools
            .async_cond
            .wait(state)
            .unwrap_or_else(std::sync::PoisonError::into_inner);
    }

    let position = state
        .records
        .iter()
        .position(|r| r.handler == handler && r.arg == handler_arg);
    match position {
        Some(index) if flags.is_empty() => {
            state.records.remove(index);
        }
        Some(index) => {
            state.records[index].flags |= flags;
        }
        None if !flags.is_empty() => state.records.push(AsyncRecord {
            handler,
            arg: handler_arg,
            flags,
        }),
        None => {}
    }
    Ok(())
}

/// As [`set_async_signal_handler`], restricted to a single signal, with
/// exclusive routing: the signal is cleared from every other record, so
/// one signal maps to exactly one listener afterwards.
///
/// Returns the replaced OS handler when a main handler was installed.
///
/// # Errors
///
/// As [`set_async_signal_handler`], plus [`Error::UnsupportedSignal`]
/// when `single_flag` names more than one signal.
pub fn set_single_async_signal_handler(
    handler: AsyncHandler,
    handler_arg: usize,
    single_flag: SigFlags,
) -> Result<Option<RawOsHandler>> {
    if !single_flag.is_empty() {
        if !single_flag.is_at_most_one_signal() || single_flag.signal_bits().is_empty() {
            return Err(Error::UnsupportedSignal);
        }
        if single_flag.is_ambiguous() {
            return Err(Error::AmbiguousSignalFlags);
        }
    }
    let tools = running_tools()?;

    let mut old = None;
    {
        let mut register = lock(&tools.register);
        install_async_mains(&mut register, single_flag, Some(&mut old))?;
    }

    let mut state = tools.lock_async();
    while state.in_flight > 0 {
        state = tools
            .async_cond
            .wait(state)
            .unwrap_or_else(std::sync::PoisonError::into_inner);
    }

    if single_flag.is_empty() {
        if let Some(index) = state
            .records
            .iter()
            .position(|r| r.handler == handler && r.arg == handler_arg)
        {
            state.records.remove(index);
        }
    } else {
        let single_bits = single_flag.signal_bits();
        let mut found = false;
        for record in state.records.iter_mut() {
            if record.handler == handler && record.arg == handler_arg {
                found = true;
                record.flags |= single_flag;
            } else {
                record.flags = record.flags.difference(single_bits);
            }
        }
        if !found {
            state.records.push(AsyncRecord {
                handler,
                arg: handler_arg,
                flags: single_flag,
            });
        }
    }
    Ok(old)
}

/// The reduced-asynchronous-mode gate shared by both registration paths.
fn install_async_mains(
    register: &mut RegisterState,
    flags: SigFlags,
    old_out: Option<&mut Option<RawOsHandler>>,
) -> Result<()> {
    let current = options();
    let old = if current.contains(SigOptions::REDUCED_SIGNALS_ASYNCHRONOUS) {
        if flags.contains(SigFlags::XFSZ) && current.contains(SigOptions::SIGXFSZ) {
            register_main_handlers(register, SigFlags::XFSZ, SigFlags::SIGALLASYNC)?
        } else {
            return Err(Error::ReducedSignals);
        }
    } else {
        register_main_handlers(register, flags, SigFlags::SIGALLASYNC)?
    };
    if let Some(out) = old_out {
        *out = old;
    }
    Ok(())
}

/// Installs a caller-supplied OS-level handler for exactly one signal,
/// bypassing the main handlers.
///
/// # Errors
///
/// [`Error::UnsupportedSignal`] unless `single_flag` names exactly one
/// mapped signal; [`Error::AmbiguousSignalFlags`]; OS failures.
pub fn register_os_handler(
    single_flag: SigFlags,
    new_os_handler: RawOsHandler,
) -> Result<Option<RawOsHandler>> {
    if single_flag.signal_bits().is_empty() || !single_flag.is_at_most_one_signal() {
        return Err(Error::UnsupportedSignal);
    }
    if single_flag.is_ambiguous() {
        return Err(Error::AmbiguousSignalFlags);
    }
    let tools = tools();
    let mut register = lock(&tools.register);
    let mut old = None;
    register_signal_handler_with_os(&mut register, single_flag, new_os_handler, &mut old)?;
    Ok(old)
}

/// Is `handler` one of the dispatcher's main handlers?
#[must_use]
pub fn is_main_signal_handler(handler: RawOsHandler) -> bool {
    handler == main_sync_handler as RawOsHandler || handler == main_async_handler as RawOsHandler
}

/// Queries the live OS disposition of the single signal in `single_flag`
/// and reports whether it is "ignore".
///
/// # Errors
///
/// [`Error::UnsupportedSignal`] for a malformed selection,
/// [`Error::AmbiguousSignalFlags`], or an OS query failure.
pub fn is_signal_ignored(single_flag: SigFlags) -> Result<bool> {
    if single_flag.signal_bits().is_empty() || !single_flag.is_at_most_one_signal() {
        return Err(Error::UnsupportedSignal);
    }
    if single_flag.is_ambiguous() {
        return Err(Error::AmbiguousSignalFlags);
    }
    let Some(os_signal) = map_flags_to_os(single_flag) else {
        return Err(Error::UnsupportedSignal);
    };
    let mut action: libc::sigaction = unsafe { std::mem::zeroed() };
    if unsafe { libc::sigaction(os_signal, std::ptr::null(), &mut action) } != 0 {
        return Err(Error::OsFailure {
            errno: std::io::Error::last_os_error().raw_os_error().unwrap_or(0),
        });
    }
    Ok(action.sa_sigaction == libc::SIG_IGN)
}

/// Number of registered asynchronous listener records. Zero before the
/// first [`startup`].
#[must_use]
pub fn async_handler_count() -> usize {
    match TOOLS.get() {
        Some(tools) => tools.lock_async().records.len(),
        None => 0,
    }
}
