//! The LED Controller: an output pin with four user-facing commands,
//! where blinking happens on a dedicated worker so callers never block.

use std::sync::{mpsc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use nix::poll::{PollFd, PollFlags};

use crate::config;
use crate::error::{Error, Result};
use crate::iofd;
use crate::notifier::{Notifier, Sender};
use crate::pin::{Level, Mode as PinMode, Pin};

const CODE_QUIT: u8 = 0;
const CODE_SLOW: u8 = 1;
const CODE_QUICK: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlinkMode {
    Slow,
    Quick,
}

impl BlinkMode {
    fn period(self) -> Duration {
        match self {
            BlinkMode::Slow => config::SLOW_TIME,
            BlinkMode::Quick => config::QUICK_TIME,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Off,
    On,
    BlinkSlowly,
    BlinkQuickly,
}

struct Worker {
    control: Sender,
    thread: JoinHandle<Box<dyn Pin>>,
    done_rx: mpsc::Receiver<()>,
}

/// One LED's output pin, mode and (if blinking) worker thread. The pin
/// itself moves into the blink worker while a blink mode is active and
/// moves back out when `on`/`off`/`Drop` stops it — `on`/`off` never touch
/// the pin concurrently with the worker.
pub struct Led {
    pin: Mutex<Option<Box<dyn Pin>>>,
    mode: Mutex<Mode>,
    worker: Mutex<Option<Worker>>,
}

impl Led {
    pub fn new(mut pin: Box<dyn Pin>) -> Result<Self> {
        pin.set_mode(PinMode::Output)?;
        pin.write(Level::Low)?;
        Ok(Led { pin: Mutex::new(Some(pin)), mode: Mutex::new(Mode::Off), worker: Mutex::new(None) })
    }

    pub fn on(&self) -> Result<()> {
        let mut mode = self.mode.lock().unwrap();
        if *mode == Mode::On {
            return Ok(());
        }
        self.stop_worker();
        if let Some(pin) = self.pin.lock().unwrap().as_mut() {
            pin.write(Level::High)?;
        }
        *mode = Mode::On;
        Ok(())
    }

    pub fn off(&self) -> Result<()> {
        let mut mode = self.mode.lock().unwrap();
        if *mode == Mode::Off {
            return Ok(());
        }
        self.stop_worker();
        if let Some(pin) = self.pin.lock().unwrap().as_mut() {
            pin.write(Level::Low)?;
        }
        *mode = Mode::Off;
        Ok(())
    }

    pub fn blink_slowly(&self) -> Result<()> {
        self.blink(Mode::BlinkSlowly, CODE_SLOW)
    }

    pub fn blink_quickly(&self) -> Result<()> {
        self.blink(Mode::BlinkQuickly, CODE_QUICK)
    }

    /// (P4) Idempotent: if already in `target` mode, this is a no-op — no
    /// extra pin toggle, no extra worker spawned.
    fn blink(&self, target: Mode, code: u8) -> Result<()> {
        let mut mode = self.mode.lock().unwrap();
        if *mode == target {
            return Ok(());
        }
        *mode = target;
        drop(mode);

        let sender = self.worker.lock().unwrap().as_ref().map(|w| w.control.clone());
        match sender {
            Some(s) => {
                s.send(code);
                Ok(())
            }
            None => self.spawn_worker(code),
        }
    }

    fn spawn_worker(&self, initial_code: u8) -> Result<()> {
        let pin = self.pin.lock().unwrap().take().ok_or_else(|| Error::Degraded {
            component: "led",
            reason: "pin already owned by a worker".into(),
        })?;
        let control = Notifier::new().map_err(|_| Error::Degraded {
            component: "led",
            reason: "failed to create control notifier".into(),
        })?;
        let sender = control.sender();
        let initial_mode = if initial_code == CODE_SLOW { BlinkMode::Slow } else { BlinkMode::Quick };
        let (done_tx, done_rx) = mpsc::channel();

        let thread = std::thread::Builder::new()
            .name("led-blink".into())
            .spawn(move || {
                let pin = run(pin, control, initial_mode);
                let _ = done_tx.send(());
                pin
            })
            .map_err(|e| Error::Degraded { component: "led", reason: e.to_string() })?;

        *self.worker.lock().unwrap() = Some(Worker { control: sender, thread, done_rx });
        Ok(())
    }

    /// Posts `QUIT` and joins within [`config::JOIN_TIMEOUT`]; past that
    /// it logs and leaves the thread running detached rather than block
    /// forever — the worker will hand the pin back whenever it does exit,
    /// but `self.pin` stays `None` in the meantime.
    fn stop_worker(&self) {
        let worker = self.worker.lock().unwrap().take();
        if let Some(w) = worker {
            w.control.send(CODE_QUIT);
            if w.done_rx.recv_timeout(config::JOIN_TIMEOUT).is_err() {
                log::warn!("led: blink worker did not exit within {:?}", config::JOIN_TIMEOUT);
                return;
            }
            match w.thread.join() {
                Ok(pin) => *self.pin.lock().unwrap() = Some(pin),
                Err(_) => log::warn!("led: blink worker panicked, pin left unowned"),
            }
        }
    }
}

impl Drop for Led {
    fn drop(&mut self) {
        self.stop_worker();
    }
}

/// Toggles `pin` on `mode`'s period, waiting on `control` with that period
/// as the poll timeout. Returns the pin once told to quit, so the caller
/// can keep using it for `on()`/`off()`.
fn run(mut pin: Box<dyn Pin>, control: Notifier, mut mode: BlinkMode) -> Box<dyn Pin> {
    let mut level = Level::Low;
    let mut deadline = Instant::now() + mode.period();

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let mut fds = [PollFd::new(control.as_fd(), PollFlags::POLLIN)];
        let ready = match iofd::poll_with_timeout(&mut fds, remaining) {
            Ok(r) => r,
            Err(e) => {
                log::warn!("led: blink worker poll failed: {e}");
                return pin;
            }
        };

        if !ready {
            level = level.invert();
            if let Err(e) = pin.write(level) {
                log::warn!("led: blink worker pin write failed: {e}");
                return pin;
            }
            deadline = Instant::now() + mode.period();
            continue;
        }

        let mut quit = false;
        for code in control.drain() {
            match code {
                CODE_QUIT => quit = true,
                CODE_SLOW | CODE_QUICK => {
                    let next = if code == CODE_SLOW { BlinkMode::Slow } else { BlinkMode::Quick };
                    let remaining_now = deadline.saturating_duration_since(Instant::now());
                    if remaining_now <= next.period() {
                        level = level.invert();
                        if let Err(e) = pin.write(level) {
                            log::warn!("led: blink worker pin write failed: {e}");
                            quit = true;
                        }
                        deadline = Instant::now() + next.period();
                    }
                    // else: remaining portion of the current interval is
                    // longer than the new period, so it's preserved as-is.
                    mode = next;
                }
                _ => {}
            }
        }
        if quit {
            return pin;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::pin::mock::MockPin;

    #[test]
    fn on_writes_high_and_off_writes_low() {
        let pin = MockPin::new(1, Level::Low);
        let handle = pin.handle();
        let led = Led::new(Box::new(pin)).unwrap();

        led.on().unwrap();
        assert_eq!(handle.written_level(), Level::High);

        led.off().unwrap();
        assert_eq!(handle.written_level(), Level::Low);
    }

    #[test]
    fn calling_the_same_blink_mode_twice_does_not_spawn_a_second_worker() {
        let pin = MockPin::new(1, Level::Low);
        let led = Led::new(Box::new(pin)).unwrap();

        led.blink_quickly().unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert!(led.worker.lock().unwrap().is_some());

        led.blink_quickly().unwrap();
        // Still exactly one worker; off() below proves it joins cleanly.
        led.off().unwrap();
    }

    #[test]
    fn switching_blink_mode_and_then_off_joins_within_budget() {
        let pin = MockPin::new(1, Level::Low);
        let handle = pin.handle();
        let led = Led::new(Box::new(pin)).unwrap();

        led.blink_slowly().unwrap();
        std::thread::sleep(Duration::from_millis(100));
        led.blink_quickly().unwrap();
        std::thread::sleep(Duration::from_millis(200));
        led.off().unwrap();

        assert_eq!(handle.written_level(), Level::Low);
    }
}
