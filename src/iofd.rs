//! Small shared wrappers around the `nix` timer-fd and poll primitives,
//! used by every worker loop in this crate (button manager, LED blinker,
//! music client). Centralising them keeps the three worker loops reading
//! the same way the original implementation's `fd_utils.cpp` centralised
//! `sendEvent`/`readEvent`/`clearInfoFd`.

use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::timerfd::{ClockId, Expiration, TimerFd, TimerFlags, TimerSetTimeFlags};

use crate::config;
use crate::error::Result;

/// A one-shot or periodic kernel timer, readable for multiplexed waits.
pub struct Timer {
    fd: TimerFd,
}

impl Timer {
    pub fn new() -> Result<Self> {
        Ok(Timer { fd: TimerFd::new(ClockId::CLOCK_MONOTONIC, TimerFlags::empty())? })
    }

    /// Arms a single expiry after `delay`.
    pub fn arm_once(&self, delay: Duration) -> Result<()> {
        self.fd.set(Expiration::OneShot(delay.into()), TimerSetTimeFlags::empty())?;
        Ok(())
    }

    /// Arms a recurring expiry every `period`, first firing after `period`.
    pub fn arm_periodic(&self, period: Duration) -> Result<()> {
        self.fd.set(Expiration::IntervalDelayed(period.into(), period.into()), TimerSetTimeFlags::empty())?;
        Ok(())
    }

    pub fn disarm(&self) -> Result<()> {
        self.fd.unset()?;
        Ok(())
    }

    /// Clears the expiration counter after `poll` reported this fd readable.
    pub fn consume(&self) {
        if let Err(e) = self.fd.wait() {
            log::warn!("timerfd read failed: {e}");
        }
    }
}

impl AsRawFd for Timer {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl AsFd for Timer {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

/// Polls `fds` with no timeout (blocks until one is readable or a signal
/// interrupts the call). Treats `EINTR` as spurious, per the error design's
/// "errors from blocking multiplex calls interrupted by signal are
/// spurious and retried" rule, by asking the caller to just call again.
pub fn poll_forever(fds: &mut [PollFd]) -> Result<()> {
    loop {
        match poll(fds, PollTimeout::NONE) {
            Ok(_) => return Ok(()),
            Err(nix::Error::EINTR) => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

pub fn is_readable(fd: &PollFd) -> bool {
    fd.revents().is_some_and(|r| r.contains(PollFlags::POLLIN))
}

/// Polls `fds` for up to `timeout`, retrying on `EINTR`. Returns whether
/// any fd became readable (`false` on a plain timeout).
pub fn poll_with_timeout(fds: &mut [PollFd], timeout: Duration) -> Result<bool> {
    let millis = timeout.as_millis().min(u16::MAX as u128) as u16;
    loop {
        match poll(fds, PollTimeout::from(millis)) {
            Ok(n) => return Ok(n > 0),
            Err(nix::Error::EINTR) => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Builds a `PollFd` from a descriptor this crate doesn't own a typed
/// wrapper for (e.g. a `TcpStream` borrowed out of an `mpd::Client`).
///
/// # Safety
/// `fd` must stay open and valid for as long as the returned `PollFd` is
/// used in a `poll` call.
pub fn raw_poll_fd(fd: RawFd, events: PollFlags) -> PollFd<'static> {
    let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
    PollFd::new(borrowed, events)
}

/// Spawns a named worker thread and hands back a handle whose `join`
/// enforces the crate-wide `JOIN_TIMEOUT` ceiling (spec.md §5's "destructors
/// post EXIT and join with a 3-second ceiling, logging if the join times
/// out"), instead of blocking indefinitely like a plain `JoinHandle::join`.
pub fn spawn_bounded<F>(name: &str, body: F) -> Result<BoundedWorker>
where
    F: FnOnce() + Send + 'static,
{
    let (done_tx, done_rx) = mpsc::channel();
    let thread = std::thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            body();
            let _ = done_tx.send(());
        })?;
    Ok(BoundedWorker { name: name.to_string(), thread: Some(thread), done_rx })
}

pub struct BoundedWorker {
    name: String,
    thread: Option<JoinHandle<()>>,
    done_rx: mpsc::Receiver<()>,
}

impl BoundedWorker {
    /// Blocks for at most `JOIN_TIMEOUT`. Past that it logs a warning and
    /// lets the thread keep running detached rather than block forever —
    /// a best-effort failure per the error design (spec.md §7).
    pub fn join(mut self) {
        match self.done_rx.recv_timeout(config::JOIN_TIMEOUT) {
            Ok(()) => {
                if let Some(t) = self.thread.take() {
                    let _ = t.join();
                }
            }
            Err(_) => log::warn!("{}: worker did not exit within {:?}", self.name, config::JOIN_TIMEOUT),
        }
    }
}
