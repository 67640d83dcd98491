//! Where the real removable-media watcher would live.
//!
//! A production implementation opens a `udev` monitor socket (or an
//! `inotify` watch on `/dev/disk/by-label`) filtered to `block` subsystem
//! events, exposes that socket's fd via [`super::DeviceWatcher::readable_fd`],
//! and on each readable event re-checks whether the distinguished "big
//! disk" label is present and whether it currently holds a marker file
//! indicating a copy is ready. Implementing the udev wire format and mount
//! policy is explicitly out of scope (spec.md §1) — this module exists so
//! the seam is visible in the tree rather than silently missing.
