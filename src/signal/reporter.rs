//! Asynchronous delivery: counters, the wake-up primitive and the
//! reporter thread.
//!
//! The main asynchronous handler does the absolute minimum legal in
//! signal context — one atomic increment and one post — and the reporter
//! thread does everything else. On targets with counting semaphores every
//! post corresponds to exactly one pending signal, so the reporter
//! handles one signal per wake-up; on targets where the wake-up is a
//! condition variable, posts can coalesce and the reporter drains every
//! pending signal per wake-up instead. Listeners must therefore be
//! idempotent with respect to delivery count.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use libc::c_int;

use crate::signal::dispatcher::{self, SignalTools};
use crate::signal::flags::{AsyncHandler, SigFlags, SigOptions};
use crate::signal::map::{map_os_to_flags, MAX_OS_SIGNAL};

/// Pending-delivery counters, indexed by OS signal number. The main
/// asynchronous handler increments; only the reporter decrements.
pub(crate) static SIGNAL_COUNTS: [AtomicUsize; MAX_OS_SIGNAL + 1] =
    [const { AtomicUsize::new(0) }; MAX_OS_SIGNAL + 1];

/// Tells the reporter to exit at its next wake-up.
pub(crate) static SHUT_DOWN: AtomicBool = AtomicBool::new(false);

/// One registered asynchronous listener.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AsyncRecord {
    pub(crate) handler: AsyncHandler,
    pub(crate) arg: usize,
    pub(crate) flags: SigFlags,
}

/// The handler list plus the in-flight dispatch counter guarded by the
/// async monitor. Registration changes wait until `in_flight` is zero, so
/// a dispatch in progress always works on a frozen snapshot.
#[derive(Debug, Default)]
pub(crate) struct AsyncState {
    pub(crate) records: Vec<AsyncRecord>,
    pub(crate) in_flight: u32,
}

/// The main asynchronous handler. Signal-context code: count and post,
/// nothing else.
pub(crate) unsafe extern "C" fn main_async_handler(
    signal: c_int,
    _info: *mut libc::siginfo_t,
    _context: *mut libc::c_void,
) {
    let index = signal as usize;
    if index <= MAX_OS_SIGNAL {
        SIGNAL_COUNTS[index].fetch_add(1, Ordering::AcqRel);
    }
    if let Some(tools) = dispatcher::initialized_tools() {
        tools.wakeup.post();
    }
}

/// Body of the reporter thread.
pub(crate) fn reporter_loop(tools: &'static SignalTools) {
    while !SHUT_DOWN.load(Ordering::Acquire) {
        if WakeupSem::COUNTING {
            // One post per pending signal: wait, handle one, re-wait.
            tools.wakeup.wait();
            for signal in 1..=MAX_OS_SIGNAL {
                if SIGNAL_COUNTS[signal].load(Ordering::Acquire) > 0 {
                    let category = map_os_to_flags(signal as c_int, None);
                    run_handlers(tools, category, signal as c_int);
                    SIGNAL_COUNTS[signal].fetch_sub(1, Ordering::AcqRel);
                    break;
                }
            }
        } else {
            // Posts may coalesce: drain everything, then sleep.
            let mut signal = 1;
            while signal <= MAX_OS_SIGNAL {
                if SIGNAL_COUNTS[signal].load(Ordering::Acquire) > 0 {
                    let category = map_os_to_flags(signal as c_int, None);
                    run_handlers(tools, category, signal as c_int);
                    SIGNAL_COUNTS[signal].fetch_sub(1, Ordering::AcqRel);
                    // Restart the scan so earlier signals are not missed.
                    signal = 0;
                }
                signal += 1;
            }
            if !SHUT_DOWN.load(Ordering::Acquire) {
                tools.wakeup.wait();
            }
        }
    }
}

/// Fans `category` out to every listener whose mask covers it, then
/// forwards the OS signal to the foreign chain handler.
pub(crate) fn run_handlers(tools: &SignalTools, category: SigFlags, os_signal: c_int) {
    let snapshot: Vec<AsyncRecord> = {
        let mut state = tools.lock_async();
        state.in_flight += 1;
        state.records.clone()
    };

    if !category.is_empty() {
        for record in &snapshot {
            if record.flags.contains(category) {
                (record.handler)(category, record.arg);
            }
        }
    }

    {
        let mut state = tools.lock_async();
        state.in_flight -= 1;
        if state.in_flight == 0 {
            tools.notify_async();
        }
    }

    if !dispatcher::options().contains(SigOptions::NO_CHAIN) {
        if let Some(chain) = dispatcher::chain_handler() {
            chain(os_signal, std::ptr::null_mut(), std::ptr::null_mut());
        }
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
pub(crate) use sem_impl::WakeupSem;

#[cfg(any(target_os = "linux", target_os = "android"))]
mod sem_impl {
    use std::cell::UnsafeCell;

    /// Counting-semaphore wake-up over an unnamed POSIX semaphore.
    #[derive(Debug)]
    pub(crate) struct WakeupSem {
        sem: UnsafeCell<libc::sem_t>,
    }

    // sem_t is operated on exclusively through libc, which is the
    // required synchronization.
    unsafe impl Send for WakeupSem {}
    unsafe impl Sync for WakeupSem {}

    impl WakeupSem {
        pub(crate) const COUNTING: bool = true;

        pub(crate) fn new() -> Self {
            let sem = UnsafeCell::new(unsafe { std::mem::zeroed() });
            unsafe {
                libc::sem_init(sem.get(), 0, 0);
            }
            Self { sem }
        }

        /// Async-signal-safe.
        pub(crate) fn post(&self) {
            unsafe {
                libc::sem_post(self.sem.get());
            }
        }

        pub(crate) fn wait(&self) {
            // sem_wait may return early with EINTR under NPTL.
            unsafe { while libc::sem_wait(self.sem.get()) != 0 {} }
        }
    }

    impl Drop for WakeupSem {
        fn drop(&mut self) {
            unsafe {
                libc::sem_destroy(self.sem.get());
            }
        }
    }
}

#[cfg(target_os = "macos")]
pub(crate) use sem_impl::WakeupSem;

#[cfg(target_os = "macos")]
mod sem_impl {
    use std::ffi::CString;

    /// Counting-semaphore wake-up over a named semaphore; the platform
    /// has no unnamed ones. Unlinked immediately, so nothing leaks into
    /// the namespace.
    #[derive(Debug)]
    pub(crate) struct WakeupSem {
        sem: *mut libc::sem_t,
    }

    unsafe impl Send for WakeupSem {}
    unsafe impl Sync for WakeupSem {}

    impl WakeupSem {
        pub(crate) const COUNTING: bool = true;

        pub(crate) fn new() -> Self {
            let name = CString::new(format!("/sigreporter-{:x}", std::process::id()))
                .expect("no interior NUL");
            let sem = unsafe {
                libc::sem_open(
                    name.as_ptr(),
                    libc::O_CREAT | libc::O_EXCL,
                    0o700 as libc::c_uint,
                    0 as libc::c_uint,
                )
            };
            unsafe {
                libc::sem_unlink(name.as_ptr());
            }
            Self { sem }
        }

        pub(crate) fn post(&self) {
            unsafe {
                libc::sem_post(self.sem);
            }
        }

        pub(crate) fn wait(&self) {
            unsafe { while libc::sem_wait(self.sem) != 0 {} }
        }
    }

    impl Drop for WakeupSem {
        fn drop(&mut self) {
            unsafe {
                libc::sem_close(self.sem);
            }
        }
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "macos")))]
pub(crate) use condvar_impl::WakeupSem;

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "macos")))]
mod condvar_impl {
    use std::cell::UnsafeCell;

    /// Condition-variable wake-up for targets without usable counting
    /// semaphores. Posts can coalesce; the reporter compensates by
    /// draining every pending signal per wake-up, and the main handler
    /// install masks all other asynchronous signals to avoid nested
    /// posts.
    #[derive(Debug)]
    pub(crate) struct WakeupSem {
        mutex: UnsafeCell<libc::pthread_mutex_t>,
        cond: UnsafeCell<libc::pthread_cond_t>,
    }

    unsafe impl Send for WakeupSem {}
    unsafe impl Sync for WakeupSem {}

    impl WakeupSem {
        pub(crate) const COUNTING: bool = false;

        pub(crate) fn new() -> Self {
            Self {
                mutex: UnsafeCell::new(libc::PTHREAD_MUTEX_INITIALIZER),
                cond: UnsafeCell::new(libc::PTHREAD_COND_INITIALIZER),
            }
        }

        pub(crate) fn post(&self) {
            unsafe {
                libc::pthread_mutex_lock(self.mutex.get());
                libc::pthread_cond_signal(self.cond.get());
                libc::pthread_mutex_unlock(self.mutex.get());
            }
        }

        pub(crate) fn wait(&self) {
            unsafe {
                libc::pthread_mutex_lock(self.mutex.get());
                libc::pthread_cond_wait(self.cond.get(), self.mutex.get());
                libc::pthread_mutex_unlock(self.mutex.get());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(any(target_os = "linux", target_os = "android", target_os = "macos"))]
    #[test]
    fn wakeup_post_then_wait_does_not_block() {
        let sem = WakeupSem::new();
        sem.post();
        sem.wait();
    }

    #[test]
    fn counts_start_at_zero() {
        for counter in SIGNAL_COUNTS.iter() {
            assert_eq!(counter.load(Ordering::Relaxed), 0);
        }
    }
}
