//! End-to-end scenarios for the signal dispatcher.
//!
//! Dispatcher state is a process singleton, so every test serializes on
//! one lock and detaches fully before releasing it.

#![cfg(unix)]

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use jitport::signal::{self, HandlerDisposition, Protected, SigFlags, SignalInfo};
use jitport::Error;

static GUARD: Mutex<()> = Mutex::new(());

fn serialized() -> std::sync::MutexGuard<'static, ()> {
    GUARD.lock().unwrap_or_else(|e| e.into_inner())
}

fn wait_until(predicate: impl Fn() -> bool) -> bool {
    for _ in 0..4000 {
        if predicate() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    false
}

fn segv_disposition() -> usize {
    let mut action: libc::sigaction = unsafe { std::mem::zeroed() };
    unsafe {
        libc::sigaction(libc::SIGSEGV, std::ptr::null(), &mut action);
    }
    action.sa_sigaction
}

fn term_disposition() -> usize {
    let mut action: libc::sigaction = unsafe { std::mem::zeroed() };
    unsafe {
        libc::sigaction(libc::SIGTERM, std::ptr::null(), &mut action);
    }
    action.sa_sigaction
}

fn noop_sync(_info: &SignalInfo, _arg: usize) -> HandlerDisposition {
    HandlerDisposition::ContinueSearch
}

#[test]
fn p8_ambiguous_flags_are_rejected_everywhere() {
    let _guard = serialized();
    let ambiguous = SigFlags::SEGV | SigFlags::TERM;
    assert!(matches!(
        signal::can_protect(ambiguous),
        Err(Error::AmbiguousSignalFlags)
    ));
    assert!(matches!(
        signal::protect(|| 0, noop_sync, 0, ambiguous),
        Err(Error::AmbiguousSignalFlags)
    ));
    fn listener(_category: SigFlags, _arg: usize) {}
    assert!(matches!(
        signal::set_async_signal_handler(listener, 0, ambiguous),
        Err(Error::AmbiguousSignalFlags)
    ));
    assert!(matches!(
        signal::register_os_handler(SigFlags::SEGV | SigFlags::IS_ASYNC, 0),
        Err(Error::AmbiguousSignalFlags)
    ));
}

#[test]
fn b1_protect_with_no_flags_installs_nothing() {
    let _guard = serialized();
    let before = segv_disposition();
    let outcome = signal::protect(|| 7, noop_sync, 0, SigFlags::empty()).unwrap();
    assert_eq!(outcome, Protected::Completed(7));
    assert_eq!(segv_disposition(), before);
}

static E4_HANDLER_CALLS: AtomicU32 = AtomicU32::new(0);

fn e4_handler(info: &SignalInfo, _arg: usize) -> HandlerDisposition {
    if info.category.contains(SigFlags::SEGV) {
        E4_HANDLER_CALLS.fetch_add(1, Ordering::SeqCst);
    }
    HandlerDisposition::ExceptionReturn
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
#[test]
fn e4_protected_fault_unwinds_to_the_frame() {
    let _guard = serialized();
    signal::startup().unwrap();

    let outcome = signal::protect(
        || {
            unsafe {
                libc::raise(libc::SIGSEGV);
            }
            unreachable_value()
        },
        e4_handler,
        0,
        SigFlags::SEGV | SigFlags::MAY_RETURN,
    )
    .unwrap();

    assert_eq!(outcome, Protected::ExceptionOccurred);
    assert_eq!(E4_HANDLER_CALLS.load(Ordering::SeqCst), 1);
    assert!(signal::current_signal().is_empty());

    // The frame stack is clean: an unprotected run completes normally.
    let outcome = signal::protect(|| 5, e4_handler, 0, SigFlags::SEGV).unwrap();
    assert_eq!(outcome, Protected::Completed(5));

    signal::shutdown().unwrap();
}

fn unreachable_value() -> usize {
    panic!("the protected function continued past the fault")
}

static P5_OUTER_CALLS: AtomicU32 = AtomicU32::new(0);
static P5_INNER_CALLS: AtomicU32 = AtomicU32::new(0);

fn p5_outer(_info: &SignalInfo, _arg: usize) -> HandlerDisposition {
    P5_OUTER_CALLS.fetch_add(1, Ordering::SeqCst);
    HandlerDisposition::ExceptionReturn
}

fn p5_inner(_info: &SignalInfo, _arg: usize) -> HandlerDisposition {
    P5_INNER_CALLS.fetch_add(1, Ordering::SeqCst);
    HandlerDisposition::ExceptionReturn
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
#[test]
fn p5_only_the_inner_frame_unwinds() {
    let _guard = serialized();
    signal::startup().unwrap();

    let outer = signal::protect(
        || {
            let inner = signal::protect(
                || {
                    unsafe {
                        libc::raise(libc::SIGSEGV);
                    }
                    unreachable_value()
                },
                p5_inner,
                0,
                SigFlags::SEGV | SigFlags::MAY_RETURN,
            )
            .unwrap();
            assert_eq!(inner, Protected::ExceptionOccurred);
            assert!(signal::current_signal().is_empty());
            11
        },
        p5_outer,
        0,
        SigFlags::ILL | SigFlags::MAY_RETURN,
    )
    .unwrap();

    assert_eq!(outer, Protected::Completed(11));
    assert_eq!(P5_INNER_CALLS.load(Ordering::SeqCst), 1);
    assert_eq!(P5_OUTER_CALLS.load(Ordering::SeqCst), 0);

    signal::shutdown().unwrap();
}

static SEARCH_INNER: AtomicU32 = AtomicU32::new(0);
static SEARCH_OUTER: AtomicU32 = AtomicU32::new(0);

fn search_inner(_info: &SignalInfo, _arg: usize) -> HandlerDisposition {
    SEARCH_INNER.fetch_add(1, Ordering::SeqCst);
    HandlerDisposition::ContinueSearch
}

fn search_outer(_info: &SignalInfo, _arg: usize) -> HandlerDisposition {
    SEARCH_OUTER.fetch_add(1, Ordering::SeqCst);
    HandlerDisposition::ExceptionReturn
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
#[test]
fn continue_search_walks_to_the_outer_frame() {
    let _guard = serialized();
    signal::startup().unwrap();

    let outer = signal::protect(
        || {
            // The inner frame declines the fault; the walk reaches the
            // outer frame, which unwinds straight past this closure.
            let _ = signal::protect(
                || {
                    unsafe {
                        libc::raise(libc::SIGSEGV);
                    }
                    unreachable_value()
                },
                search_inner,
                0,
                SigFlags::SEGV,
            );
            unreachable_value()
        },
        search_outer,
        0,
        SigFlags::SEGV | SigFlags::MAY_RETURN,
    )
    .unwrap();

    assert_eq!(outer, Protected::ExceptionOccurred);
    assert_eq!(SEARCH_INNER.load(Ordering::SeqCst), 1);
    assert_eq!(SEARCH_OUTER.load(Ordering::SeqCst), 1);
    assert!(signal::current_signal().is_empty());

    signal::shutdown().unwrap();
}

static CONTINUE_CALLS: AtomicU32 = AtomicU32::new(0);

fn continue_handler(_info: &SignalInfo, _arg: usize) -> HandlerDisposition {
    CONTINUE_CALLS.fetch_add(1, Ordering::SeqCst);
    HandlerDisposition::ContinueExecution
}

#[test]
fn continue_execution_resumes_the_function() {
    let _guard = serialized();
    signal::startup().unwrap();

    let outcome = signal::protect(
        || {
            unsafe {
                libc::raise(libc::SIGSEGV);
            }
            // A raise-originated fault resumes right here.
            7
        },
        continue_handler,
        0,
        SigFlags::SEGV | SigFlags::MAY_CONTINUE_EXECUTION,
    )
    .unwrap();

    assert_eq!(outcome, Protected::Completed(7));
    assert_eq!(CONTINUE_CALLS.load(Ordering::SeqCst), 1);

    signal::shutdown().unwrap();
}

static E5_A: AtomicU32 = AtomicU32::new(0);
static E5_B: AtomicU32 = AtomicU32::new(0);
static E5_C: AtomicU32 = AtomicU32::new(0);
static E5_ON_REPORTER: AtomicBool = AtomicBool::new(true);

fn e5_record(counter: &AtomicU32) {
    counter.fetch_add(1, Ordering::SeqCst);
    let on_reporter = std::thread::current().name() == Some("signal reporter");
    E5_ON_REPORTER.fetch_and(on_reporter, Ordering::SeqCst);
}

fn e5_a(_category: SigFlags, _arg: usize) {
    e5_record(&E5_A);
}

fn e5_b(_category: SigFlags, _arg: usize) {
    e5_record(&E5_B);
}

fn e5_c(_category: SigFlags, _arg: usize) {
    e5_record(&E5_C);
}

#[test]
fn e5_async_fanout_respects_masks() {
    let _guard = serialized();
    signal::startup().unwrap();

    signal::set_async_signal_handler(e5_a, 0, SigFlags::TERM).unwrap();
    signal::set_async_signal_handler(e5_b, 0, SigFlags::TERM | SigFlags::HUP).unwrap();
    signal::set_async_signal_handler(e5_c, 0, SigFlags::HUP).unwrap();

    unsafe {
        libc::raise(libc::SIGTERM);
    }

    assert!(wait_until(|| {
        E5_A.load(Ordering::SeqCst) == 1 && E5_B.load(Ordering::SeqCst) == 1
    }));
    assert_eq!(E5_C.load(Ordering::SeqCst), 0);
    assert!(E5_ON_REPORTER.load(Ordering::SeqCst));

    // Removal blocks until no dispatch is in flight, so returning from it
    // proves the in-flight counter drained back to zero.
    signal::set_async_signal_handler(e5_a, 0, SigFlags::empty()).unwrap();
    signal::set_async_signal_handler(e5_b, 0, SigFlags::empty()).unwrap();
    signal::set_async_signal_handler(e5_c, 0, SigFlags::empty()).unwrap();
    assert_eq!(signal::async_handler_count(), 0);

    signal::shutdown().unwrap();
}

static B2_FIRST: AtomicU32 = AtomicU32::new(0);
static B2_SECOND: AtomicU32 = AtomicU32::new(0);

fn b2_first(_category: SigFlags, _arg: usize) {
    B2_FIRST.fetch_add(1, Ordering::SeqCst);
}

fn b2_second(_category: SigFlags, _arg: usize) {
    B2_SECOND.fetch_add(1, Ordering::SeqCst);
}

#[test]
fn b2_single_async_routing_is_exclusive() {
    let _guard = serialized();
    signal::startup().unwrap();

    signal::set_single_async_signal_handler(b2_first, 0, SigFlags::TERM).unwrap();
    signal::set_single_async_signal_handler(b2_second, 0, SigFlags::TERM).unwrap();

    unsafe {
        libc::raise(libc::SIGTERM);
    }
    assert!(wait_until(|| B2_SECOND.load(Ordering::SeqCst) == 1));
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(B2_FIRST.load(Ordering::SeqCst), 0);

    signal::set_single_async_signal_handler(b2_first, 0, SigFlags::empty()).unwrap();
    signal::set_single_async_signal_handler(b2_second, 0, SigFlags::empty()).unwrap();
    signal::shutdown().unwrap();
}

static R1_CALLS: AtomicU32 = AtomicU32::new(0);

fn r1_listener(_category: SigFlags, _arg: usize) {
    R1_CALLS.fetch_add(1, Ordering::SeqCst);
}

#[test]
fn r1_register_then_remove_round_trips() {
    let _guard = serialized();
    signal::startup().unwrap();

    let before = signal::async_handler_count();
    signal::set_async_signal_handler(r1_listener, 17, SigFlags::TERM).unwrap();
    assert_eq!(signal::async_handler_count(), before + 1);
    signal::set_async_signal_handler(r1_listener, 17, SigFlags::empty()).unwrap();
    assert_eq!(signal::async_handler_count(), before);

    unsafe {
        libc::raise(libc::SIGTERM);
    }
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(R1_CALLS.load(Ordering::SeqCst), 0);

    signal::shutdown().unwrap();
}

static P6_CALLS: AtomicU32 = AtomicU32::new(0);

fn p6_listener(_category: SigFlags, _arg: usize) {
    P6_CALLS.fetch_add(1, Ordering::SeqCst);
}

#[cfg(any(target_os = "linux", target_os = "android", target_os = "macos"))]
#[test]
fn p6_each_raise_is_delivered_exactly_once() {
    let _guard = serialized();
    signal::startup().unwrap();
    signal::set_async_signal_handler(p6_listener, 0, SigFlags::HUP).unwrap();

    for _ in 0..3 {
        unsafe {
            libc::raise(libc::SIGHUP);
        }
    }
    assert!(wait_until(|| P6_CALLS.load(Ordering::SeqCst) == 3));
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(P6_CALLS.load(Ordering::SeqCst), 3);

    signal::set_async_signal_handler(p6_listener, 0, SigFlags::empty()).unwrap();
    signal::shutdown().unwrap();
}

fn e6_listener(_category: SigFlags, _arg: usize) {}

#[test]
fn e6_p7_shutdown_restores_original_dispositions() {
    let _guard = serialized();
    let segv_before = segv_disposition();
    let term_before = term_disposition();

    signal::startup().unwrap();
    let outcome = signal::protect(|| 1, noop_sync, 0, SigFlags::SEGV).unwrap();
    assert_eq!(outcome, Protected::Completed(1));
    signal::set_async_signal_handler(e6_listener, 0, SigFlags::TERM).unwrap();

    // The main handlers are installed now.
    assert!(signal::is_main_signal_handler(segv_disposition()));
    assert!(signal::is_main_signal_handler(term_disposition()));

    signal::set_async_signal_handler(e6_listener, 0, SigFlags::empty()).unwrap();
    signal::shutdown().unwrap();

    assert_eq!(segv_disposition(), segv_before);
    assert_eq!(term_disposition(), term_before);
    assert!(matches!(
        signal::set_async_signal_handler(e6_listener, 0, SigFlags::TERM),
        Err(Error::SignalToolsUnavailable)
    ));
}

fn attach_listener(_category: SigFlags, _arg: usize) {}

#[test]
fn startup_is_attach_counted() {
    let _guard = serialized();
    signal::startup().unwrap();
    signal::startup().unwrap();

    signal::shutdown().unwrap();
    // Still attached once: registration works.
    signal::set_async_signal_handler(attach_listener, 0, SigFlags::TERM).unwrap();
    signal::set_async_signal_handler(attach_listener, 0, SigFlags::empty()).unwrap();

    signal::shutdown().unwrap();
    assert!(matches!(
        signal::set_async_signal_handler(attach_listener, 0, SigFlags::TERM),
        Err(Error::SignalToolsUnavailable)
    ));
}

static OS_HANDLER_CALLS: AtomicUsize = AtomicUsize::new(0);

unsafe extern "C" fn raw_usr1_handler(
    _signal: libc::c_int,
    _info: *mut libc::siginfo_t,
    _context: *mut libc::c_void,
) {
    OS_HANDLER_CALLS.fetch_add(1, Ordering::SeqCst);
}

#[test]
fn register_os_handler_bypasses_the_mains() {
    let _guard = serialized();
    signal::startup().unwrap();

    let old = signal::register_os_handler(SigFlags::USR1, raw_usr1_handler as usize).unwrap();
    assert!(old.is_some());
    assert!(!signal::is_main_signal_handler(raw_usr1_handler as usize));

    unsafe {
        libc::raise(libc::SIGUSR1);
    }
    assert_eq!(OS_HANDLER_CALLS.load(Ordering::SeqCst), 1);

    // Shutdown restores the pre-install disposition for USR1 too.
    signal::shutdown().unwrap();
}

#[test]
fn is_signal_ignored_reads_the_live_disposition() {
    let _guard = serialized();
    assert!(!signal::is_signal_ignored(SigFlags::USR2).unwrap());
    unsafe {
        libc::signal(libc::SIGUSR2, libc::SIG_IGN);
    }
    assert!(signal::is_signal_ignored(SigFlags::USR2).unwrap());
    unsafe {
        libc::signal(libc::SIGUSR2, libc::SIG_DFL);
    }
}
