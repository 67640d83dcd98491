//! The Device Watcher capability: an external collaborator exposing a
//! readable descriptor and two predicates the supervisor uses to drive
//! the LED's three-state mode (disk-absent → blink-fast; copy-available
//! → blink-slow; otherwise steady on).
//!
//! Real removable-media detection is inotify/udev-monitor backed and is
//! explicitly out of scope (spec.md §1's "removable-media mount policy");
//! [`udev`] documents the shape the real implementation would take.

pub mod mock;
pub mod udev;

use std::os::unix::io::RawFd;

use crate::error::Result;

/// A component watching for a specific removable "big disk" and whether
/// it currently holds data ready to be copied off.
pub trait DeviceWatcher: Send {
    /// Descriptor to include in the supervisor's multiplexed wait.
    fn readable_fd(&self) -> RawFd;
    fn is_big_disk_connected(&self) -> bool;
    fn is_copy_available(&self) -> bool;
    /// Drains whatever made `readable_fd` readable and refreshes the two
    /// predicates above.
    fn handle_readable(&mut self) -> Result<()>;
}
