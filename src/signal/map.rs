//! OS signal ↔ logical category mapping.
//!
//! Keep this module the only place that names `libc::SIG*` constants so
//! the rest of the dispatcher is expressed in logical categories.

use libc::c_int;

use crate::signal::flags::SigFlags;

// `libc` does not expose these SIGFPE si_code values on this target; the
// numeric values are fixed by the platform ABI (bits/siginfo-consts.h).
const FPE_INTDIV: c_int = 1;
const FPE_INTOVF: c_int = 2;
const FPE_FLTDIV: c_int = 3;

/// Highest OS signal number tracked by the dispatcher.
pub(crate) const MAX_OS_SIGNAL: usize = 64;

static SIGNAL_MAP: &[(SigFlags, c_int)] = &[
    (SigFlags::SEGV, libc::SIGSEGV),
    (SigFlags::BUS, libc::SIGBUS),
    (SigFlags::ILL, libc::SIGILL),
    (SigFlags::FPE, libc::SIGFPE),
    (SigFlags::TRAP, libc::SIGTRAP),
    (SigFlags::QUIT, libc::SIGQUIT),
    (SigFlags::ABRT, libc::SIGABRT),
    (SigFlags::TERM, libc::SIGTERM),
    (SigFlags::INT, libc::SIGINT),
    (SigFlags::HUP, libc::SIGHUP),
    (SigFlags::XFSZ, libc::SIGXFSZ),
    (SigFlags::ALRM, libc::SIGALRM),
    (SigFlags::USR1, libc::SIGUSR1),
    (SigFlags::USR2, libc::SIGUSR2),
    (SigFlags::PIPE, libc::SIGPIPE),
    (SigFlags::CHLD, libc::SIGCHLD),
];

/// Maps an OS signal to its logical category.
///
/// With signal information available, SIGFPE sub-codes are refined into
/// the divide-by-zero and overflow categories. Unknown signals map to the
/// empty set.
#[must_use]
pub fn map_os_to_flags(signal: c_int, info: Option<&libc::siginfo_t>) -> SigFlags {
    if signal == libc::SIGFPE {
        if let Some(info) = info {
            // Mask the kernel's high si_code bits before comparing.
            match info.si_code & 0xff {
                FPE_FLTDIV => return SigFlags::FPE_DIV_BY_ZERO,
                FPE_INTDIV => return SigFlags::FPE_INT_DIV_BY_ZERO,
                FPE_INTOVF => return SigFlags::FPE_INT_OVERFLOW,
                _ => return SigFlags::FPE,
            }
        }
    }
    for &(flags, os) in SIGNAL_MAP {
        if os == signal {
            return flags;
        }
    }
    SigFlags::empty()
}

/// Maps a logical category to its OS signal.
///
/// The FPE sub-codes deliberately have no OS mapping of their own; they
/// collapse to nothing here, exactly like any other unknown selection.
#[must_use]
pub fn map_flags_to_os(flags: SigFlags) -> Option<c_int> {
    let wanted = flags.signal_bits();
    for &(candidate, os) in SIGNAL_MAP {
        if candidate.signal_bits() == wanted {
            return Some(os);
        }
    }
    None
}

/// Iterates the asynchronous entries of the map.
pub(crate) fn async_signals() -> impl Iterator<Item = (SigFlags, c_int)> {
    SIGNAL_MAP
        .iter()
        .copied()
        .filter(|(flags, _)| flags.contains(SigFlags::IS_ASYNC))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_over_the_table() {
        for &(flags, os) in SIGNAL_MAP {
            assert_eq!(map_flags_to_os(flags), Some(os));
            assert_eq!(map_os_to_flags(os, None), flags);
        }
    }

    #[test]
    fn fpe_sub_codes_do_not_map_back() {
        assert_eq!(map_flags_to_os(SigFlags::FPE_INT_OVERFLOW), None);
    }

    #[test]
    fn unknown_signals_map_to_empty() {
        assert_eq!(map_os_to_flags(libc::SIGWINCH, None), SigFlags::empty());
    }
}
