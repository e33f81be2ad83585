//! Reduced-signals modes.
//!
//! Options merge into process-wide state and cannot be unmerged, so these
//! tests live in their own binary and run as one sequence.

#![cfg(unix)]

use jitport::signal::{self, HandlerDisposition, Protected, SigFlags, SigOptions, SignalInfo};
use jitport::Error;

fn fault_handler(_info: &SignalInfo, _arg: usize) -> HandlerDisposition {
    HandlerDisposition::ExceptionReturn
}

fn xfsz_listener(_category: SigFlags, _arg: usize) {}

fn term_listener(_category: SigFlags, _arg: usize) {}

#[test]
fn reduced_modes_change_protection_and_registration() {
    // Before any option is set, full synchronous protection is on offer.
    assert!(signal::can_protect(SigFlags::SEGV).unwrap());

    signal::set_options(
        SigOptions::REDUCED_SIGNALS_SYNCHRONOUS
            | SigOptions::REDUCED_SIGNALS_ASYNCHRONOUS
            | SigOptions::SIGXFSZ,
    )
    .unwrap();
    assert!(signal::options().contains(SigOptions::REDUCED_SIGNALS_SYNCHRONOUS));

    // B4: protect runs the function without touching any disposition.
    assert!(!signal::can_protect(SigFlags::SEGV).unwrap());
    let before = {
        let mut action: libc::sigaction = unsafe { std::mem::zeroed() };
        unsafe {
            libc::sigaction(libc::SIGSEGV, std::ptr::null(), &mut action);
        }
        action.sa_sigaction
    };
    let outcome = signal::protect(
        || 11,
        fault_handler,
        0,
        SigFlags::SEGV | SigFlags::MAY_RETURN,
    )
    .unwrap();
    assert_eq!(outcome, Protected::Completed(11));
    let after = {
        let mut action: libc::sigaction = unsafe { std::mem::zeroed() };
        unsafe {
            libc::sigaction(libc::SIGSEGV, std::ptr::null(), &mut action);
        }
        action.sa_sigaction
    };
    assert_eq!(before, after);

    signal::startup().unwrap();

    // Asynchronous registration is refused, except the XFSZ carve-out.
    assert!(matches!(
        signal::set_async_signal_handler(term_listener, 0, SigFlags::TERM),
        Err(Error::ReducedSignals)
    ));
    signal::set_async_signal_handler(xfsz_listener, 0, SigFlags::XFSZ).unwrap();

    // Once a handler is installed, reduced modes can no longer be
    // requested.
    assert!(matches!(
        signal::set_options(SigOptions::REDUCED_SIGNALS_SYNCHRONOUS),
        Err(Error::HandlersAlreadyInstalled)
    ));

    // Removal is refused under reduced mode too (the carve-out names
    // XFSZ explicitly); shutdown clears the list instead.
    assert!(matches!(
        signal::set_async_signal_handler(xfsz_listener, 0, SigFlags::empty()),
        Err(Error::ReducedSignals)
    ));
    signal::shutdown().unwrap();
    assert_eq!(signal::async_handler_count(), 0);
}
