//! Signal handling: block the signals every worker thread must ignore on
//! the main thread *before* any worker is spawned, and build the
//! `SignalFd` the main supervisor loop actually waits on.
//!
//! `examples/original_source/mpd.cpp`'s `_startRun` calls `signal(SIG_IGN)`
//! for SIGTSTP/SIGTTOU/SIGTTIN/SIGHUP/SIGINT/SIGQUIT/SIGTERM on every
//! worker thread individually. POSIX signal masks are inherited across
//! `pthread_create`/`std::thread::spawn`, so blocking the same set once on
//! the main thread before any `thread::spawn` call achieves the same
//! effect — every thread spawned afterwards starts with the mask already
//! in place, with no per-thread call needed.

use nix::sys::signal::{SigSet, Signal};
use nix::sys::signalfd::{SfdFlags, SignalFd};

use crate::error::{Error, Result};

const BLOCKED: &[Signal] = &[
    Signal::SIGINT,
    Signal::SIGTERM,
    Signal::SIGQUIT,
    Signal::SIGHUP,
    Signal::SIGTSTP,
    Signal::SIGTTIN,
    Signal::SIGTTOU,
];

const WAITED_ON: &[Signal] = &[Signal::SIGINT, Signal::SIGTERM, Signal::SIGQUIT];

/// Blocks [`BLOCKED`] on the calling thread (the main thread, called before
/// any worker is spawned) and returns a `SignalFd` covering
/// SIGINT/SIGTERM/SIGQUIT for the supervisor's multiplexed wait.
///
/// This is a **fatal** step per the error design (spec.md §7): if it
/// fails, the process has no way to shut down cleanly on SIGINT/SIGTERM,
/// so startup aborts.
pub fn install() -> Result<SignalFd> {
    let mut mask = SigSet::empty();
    for sig in BLOCKED {
        mask.add(*sig);
    }
    mask.thread_block().map_err(|_| Error::Degraded {
        component: "signals",
        reason: "failed to block signals on the main thread".into(),
    })?;

    let mut waited_on = SigSet::empty();
    for sig in WAITED_ON {
        waited_on.add(*sig);
    }
    SignalFd::with_flags(&waited_on, SfdFlags::SFD_NONBLOCK).map_err(|_| Error::Degraded {
        component: "signals",
        reason: "failed to create signalfd".into(),
    })
}
