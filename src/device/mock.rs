//! An in-memory `DeviceWatcher` for supervisor-level tests.

use std::sync::{Arc, Mutex};

use super::DeviceWatcher;
use crate::error::Result;
use crate::notifier::Notifier;

#[derive(Default, Clone, Copy)]
struct Predicates {
    big_disk_connected: bool,
    copy_available: bool,
}

/// A test double a test can drive by calling [`MockDeviceWatcher::set`]
/// from a different handle, then posting a readiness notification that
/// the supervisor under test will observe on `readable_fd`.
pub struct MockDeviceWatcher {
    notifier: Notifier,
    predicates: Arc<Mutex<Predicates>>,
}

impl MockDeviceWatcher {
    pub fn new() -> Result<Self> {
        Ok(MockDeviceWatcher { notifier: Notifier::new()?, predicates: Arc::new(Mutex::new(Predicates::default())) })
    }

    pub fn handle(&self) -> MockDeviceHandle {
        MockDeviceHandle { sender: self.notifier.sender(), predicates: Arc::clone(&self.predicates) }
    }
}

/// The test-side handle used to simulate a device event.
#[derive(Clone)]
pub struct MockDeviceHandle {
    sender: crate::notifier::Sender,
    predicates: Arc<Mutex<Predicates>>,
}

impl MockDeviceHandle {
    pub fn set(&self, big_disk_connected: bool, copy_available: bool) {
        *self.predicates.lock().unwrap() = Predicates { big_disk_connected, copy_available };
        self.sender.send(1);
    }
}

impl DeviceWatcher for MockDeviceWatcher {
    fn readable_fd(&self) -> std::os::unix::io::RawFd {
        use std::os::unix::io::AsRawFd;
        self.notifier.as_raw_fd()
    }

    fn is_big_disk_connected(&self) -> bool {
        self.predicates.lock().unwrap().big_disk_connected
    }

    fn is_copy_available(&self) -> bool {
        self.predicates.lock().unwrap().copy_available
    }

    fn handle_readable(&mut self) -> Result<()> {
        self.notifier.drain();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_updates_predicates_observed_by_the_watcher() {
        let watcher = MockDeviceWatcher::new().unwrap();
        let handle = watcher.handle();
        assert!(!watcher.is_big_disk_connected());

        handle.set(true, false);
        assert!(watcher.is_big_disk_connected());
        assert!(!watcher.is_copy_available());
    }
}
