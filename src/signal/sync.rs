//! Synchronous protection: `protect` and the main fault handler.

use std::ptr;

use libc::c_int;

use crate::error::{Error, Result};
use crate::signal::dispatcher;
use crate::signal::flags::{HandlerDisposition, Protected, SigFlags, SigOptions, SyncHandler};
use crate::signal::frame::{self, CurrentSignal, ProtectionFrame, SignalInfo};
use crate::signal::map::map_os_to_flags;

/// Reports whether the requested protection capabilities are available
/// under the current options and target.
///
/// # Errors
///
/// Returns [`Error::AmbiguousSignalFlags`] for an ambiguous set.
pub fn can_protect(flags: SigFlags) -> Result<bool> {
    if flags.is_ambiguous() {
        return Err(Error::AmbiguousSignalFlags);
    }
    let mut supported = SigFlags::MAY_CONTINUE_EXECUTION | SigFlags::IS_SYNC;
    if frame::jump_supported() {
        supported |= SigFlags::MAY_RETURN;
    }
    if !dispatcher::options().contains(SigOptions::REDUCED_SIGNALS_SYNCHRONOUS) {
        supported |= SigFlags::SIGALLSYNC;
    }
    Ok(supported.contains(flags))
}

/// The logical category being dispatched on this thread, or the empty set.
#[must_use]
pub fn current_signal() -> SigFlags {
    let current = frame::current_signal_cell();
    if current.is_null() {
        SigFlags::empty()
    } else {
        unsafe { (*current).category }
    }
}

/// Runs `f` within a new protection frame.
///
/// Main handlers for the requested synchronous signals are installed
/// lazily before `f` runs. With [`SigFlags::MAY_RETURN`] set, a handler
/// returning [`HandlerDisposition::ExceptionReturn`] unwinds back here
/// and the call reports [`Protected::ExceptionOccurred`]; the frame is
/// unlinked and the thread's current-signal cell is restored before
/// control reaches the caller again.
///
/// Under `REDUCED_SIGNALS_SYNCHRONOUS`, `f` runs with no installation and
/// no frame at all.
///
/// # Errors
///
/// [`Error::AmbiguousSignalFlags`] for an ambiguous set,
/// [`Error::UnsupportedSignal`] when `MAY_RETURN` is unavailable on this
/// target, and any installation failure from the OS.
pub fn protect<F: FnOnce() -> usize>(
    f: F,
    handler: SyncHandler,
    handler_arg: usize,
    flags: SigFlags,
) -> Result<Protected> {
    if flags.is_ambiguous() {
        return Err(Error::AmbiguousSignalFlags);
    }

    if dispatcher::options().contains(SigOptions::REDUCED_SIGNALS_SYNCHRONOUS) {
        return Ok(Protected::Completed(f()));
    }

    let wanted = (flags & SigFlags::SIGALLSYNC).signal_bits().bits();
    if wanted & !dispatcher::sync_main_handler_mask() != 0 {
        dispatcher::install_sync_main_handlers(flags)?;
    }

    if flags.contains(SigFlags::MAY_RETURN) && !frame::jump_supported() {
        return Err(Error::UnsupportedSignal);
    }

    let saved_signal = frame::current_signal_cell();
    let mut frame_storage = ProtectionFrame::new(
        handler,
        handler_arg,
        flags,
        frame::stack_head(),
        saved_signal,
    );
    let frame_ptr: *mut ProtectionFrame = &mut frame_storage;

    if flags.contains(SigFlags::MAY_RETURN) {
        #[cfg(all(target_os = "linux", target_env = "gnu"))]
        {
            unsafe {
                libc::getcontext((*frame_ptr).env.as_mut_ptr());
            }
            // Either the first pass, or the dispatcher resumed us here.
            if unsafe { ptr::read_volatile(ptr::addr_of!((*frame_ptr).jumped)) } {
                frame::set_stack_head(unsafe { (*frame_ptr).previous });
                frame::set_current_signal_cell(saved_signal);
                return Ok(Protected::ExceptionOccurred);
            }
        }
    }

    frame::set_stack_head(frame_ptr);
    let guard = PopGuard {
        previous: frame_storage.previous,
    };
    let value = f();
    drop(guard);
    Ok(Protected::Completed(value))
}

/// Pops the frame even when `f` unwinds.
struct PopGuard {
    previous: *mut ProtectionFrame,
}

impl Drop for PopGuard {
    fn drop(&mut self) {
        frame::set_stack_head(self.previous);
    }
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
unsafe fn resume_frame(record: *mut ProtectionFrame) -> ! {
    ptr::write_volatile(ptr::addr_of_mut!((*record).jumped), true);
    libc::setcontext((*record).env.as_ptr());
    unreachable!("setcontext returned")
}

#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
unsafe fn resume_frame(_record: *mut ProtectionFrame) -> ! {
    libc::abort()
}

/// The main synchronous handler, installed for every protected fault
/// signal. Runs on the faulting thread in signal context.
pub(crate) unsafe extern "C" fn main_sync_handler(
    signal: c_int,
    info: *mut libc::siginfo_t,
    context: *mut libc::c_void,
) {
    let category = map_os_to_flags(signal, info.as_ref());

    // Frames register interest with the plain FPE bit; sub-codes are
    // reported through SignalInfo only.
    let fpe_filter = if category.contains(SigFlags::FPE) {
        SigFlags::FPE
    } else {
        category
    };

    let current = CurrentSignal {
        os_signal: signal,
        category,
        info,
        context,
    };
    let previous = frame::current_signal_cell();
    frame::set_current_signal_cell(&current);

    let si_code = if info.is_null() { 0 } else { (*info).si_code };
    let fault_address = fault_address_of(category, info);
    let signal_info = SignalInfo {
        category,
        os_signal: signal,
        si_code,
        fault_address,
    };

    let mut record = frame::stack_head();
    while !record.is_null() {
        if (*record).flags.contains(fpe_filter) {
            // Unlink before invoking so a crashing callback cannot
            // re-enter its own frame.
            frame::set_stack_head((*record).previous);
            let handler = (*record).handler;
            let handler_arg = (*record).handler_arg;
            let disposition = handler(&signal_info, handler_arg);
            frame::set_stack_head(record);

            match disposition {
                HandlerDisposition::ContinueSearch => {}
                HandlerDisposition::ContinueExecution => {
                    frame::set_current_signal_cell(previous);
                    return;
                }
                HandlerDisposition::CooperativeShutdown => break,
                HandlerDisposition::ExceptionReturn => {
                    frame::set_current_signal_cell(previous);
                    if (*record).flags.contains(SigFlags::MAY_RETURN) {
                        resume_frame(record);
                    }
                    libc::abort();
                }
            }
        }
        record = (*record).previous;
    }
    frame::set_current_signal_cell(previous);

    // No frame handled the signal: chain to the foreign handler if one is
    // installed, then take the default fatal action.
    if !dispatcher::options().contains(SigOptions::NO_CHAIN) {
        if let Some(chain) = dispatcher::chain_handler() {
            let action = chain(signal, info, context);
            let user_raised = si_code <= 0;
            if action == dispatcher::ChainAction::DefaultActionRequired && !user_raised {
                libc::abort();
            }
        }
    }
    libc::abort();
}

fn fault_address_of(category: SigFlags, info: *mut libc::siginfo_t) -> usize {
    let memory_fault = category
        .signal_bits()
        .intersects((SigFlags::SEGV | SigFlags::BUS | SigFlags::ILL | SigFlags::FPE).signal_bits());
    if info.is_null() || !memory_fault {
        return 0;
    }
    #[cfg(target_os = "linux")]
    {
        unsafe { (*info).si_addr() as usize }
    }
    #[cfg(not(target_os = "linux"))]
    {
        0
    }
}
