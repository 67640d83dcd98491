//! The Main Supervisor: composes one LED, three Buttons (next/prev/pause),
//! one Music Client and a device watcher behind a single multiplexed
//! `poll` wait, and dispatches readiness the way
//! `examples/original_source/main.cpp`'s `run()` does.

use nix::poll::PollFlags;
use nix::sys::signalfd::SignalFd;

use crate::button::{Button, Event as ButtonEvent};
use crate::config::Env;
use crate::device::DeviceWatcher;
use crate::error::Result;
use crate::iofd;
use crate::led::Led;
use crate::music::MusicClient;
use crate::pin::{Level, Pin};

/// Which music command, if any, a given button's `PRESS` is wired to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ButtonRole {
    Next,
    Prev,
    Pause,
}

struct BoundButton {
    button: Button,
    role: ButtonRole,
}

/// Owns every long-lived component and the main `poll` loop. Built once at
/// startup from a set of already-constructed `Pin`s and a `DeviceWatcher`;
/// `run` blocks until a shutdown signal arrives, then returns cleanly —
/// every field's destructor posts `EXIT` and joins its worker as it drops.
pub struct Supervisor<W: DeviceWatcher> {
    signal_fd: SignalFd,
    led: Led,
    music: MusicClient,
    buttons: Vec<BoundButton>,
    device: W,
}

impl<W: DeviceWatcher> Supervisor<W> {
    /// `signal_fd` must come from [`crate::signals::install`], called on
    /// the main thread before this constructor — every worker thread
    /// spawned here (the music client, the button manager's first worker)
    /// must inherit the blocked signal mask that call installs.
    pub fn new(
        signal_fd: SignalFd,
        env: &Env,
        led_pin: Box<dyn Pin>,
        next_pin: Box<dyn Pin>,
        prev_pin: Box<dyn Pin>,
        pause_pin: Box<dyn Pin>,
        device: W,
    ) -> Result<Self> {
        let led = Led::new(led_pin)?;
        let music = MusicClient::new(env.mpd_host.clone(), env.mpd_port)?;

        let manager = crate::button::manager::ButtonManager::global();
        let buttons = vec![
            BoundButton {
                button: Button::new(manager.clone(), next_pin, Level::High, false)?,
                role: ButtonRole::Next,
            },
            BoundButton {
                button: Button::new(manager.clone(), prev_pin, Level::High, false)?,
                role: ButtonRole::Prev,
            },
            BoundButton {
                button: Button::new(manager, pause_pin, Level::High, false)?,
                role: ButtonRole::Pause,
            },
        ];

        Ok(Supervisor { signal_fd, led, music, buttons, device })
    }

    /// Runs until a shutdown signal is observed. Establishes the LED's
    /// initial mode from the device watcher's predicates before entering
    /// the wait loop (per `original_source/main.cpp`), then recomputes it
    /// only in response to a device-watcher-readable event — never by
    /// polling the predicates speculatively.
    pub fn run(mut self) -> Result<()> {
        self.apply_led_mode()?;

        loop {
            use std::os::unix::io::AsRawFd;

            let mut fds = vec![iofd::raw_poll_fd(self.signal_fd.as_raw_fd(), PollFlags::POLLIN)];
            fds.push(iofd::raw_poll_fd(self.device.readable_fd(), PollFlags::POLLIN));
            for b in &self.buttons {
                fds.push(iofd::raw_poll_fd(b.button.events().as_raw_fd(), PollFlags::POLLIN));
            }

            iofd::poll_forever(&mut fds)?;

            if iofd::is_readable(&fds[0]) {
                log::info!("supervisor: shutdown signal received, exiting");
                return Ok(());
            }

            if iofd::is_readable(&fds[1]) {
                self.device.handle_readable()?;
                self.apply_led_mode()?;
            }

            for (i, b) in self.buttons.iter().enumerate() {
                if iofd::is_readable(&fds[2 + i]) {
                    if let Some(ButtonEvent::Press) = b.button.read_event() {
                        self.dispatch(b.role);
                    } else {
                        // Drain non-PRESS events too, so the pipe doesn't back up.
                        while b.button.read_event().is_some() {}
                    }
                }
            }
        }
    }

    fn dispatch(&self, role: ButtonRole) {
        match role {
            ButtonRole::Next => self.music.next(),
            ButtonRole::Prev => self.music.prev(),
            ButtonRole::Pause => self.music.play_or_pause(),
        }
    }

    fn apply_led_mode(&self) -> Result<()> {
        if !self.device.is_big_disk_connected() {
            self.led.blink_quickly()
        } else if self.device.is_copy_available() {
            self.led.blink_slowly()
        } else {
            self.led.on()
        }
    }
}
