//! The Button capability: a debounced GPIO input with press, release,
//! long-press and (optionally) auto-repeat events, delivered as bytes on
//! a [`Notifier`] so a consumer can multiplex several buttons alongside
//! other readiness sources.
//!
//! Split the way the design notes describe: [`core::ButtonCore`] is the
//! pure debounce/FSM, and [`Button`] is the thin I/O shell that owns the
//! real [`Pin`] and hands registration over to the [`manager::ButtonManager`]
//! worker thread, which actually drives the core against the debounce tick
//! and the personal long-press timer.

pub mod core;
pub mod manager;

use std::sync::atomic::{AtomicU64, Ordering};

use manager::{ButtonManager, RegisteredButton};

use crate::error::Result;
use crate::notifier::Notifier;
use crate::pin::{Level, Mode, Pull, Pin};

pub use core::Event;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// A registered, debounced button. Events ([`Event`] cast to its
/// discriminant) arrive on [`Button::events`]; dropping the handle
/// deregisters it from its manager.
pub struct Button {
    id: u64,
    manager: ButtonManager,
    events: Notifier,
}

impl Button {
    /// Registers a new button against `manager`. `idle_level` is the level
    /// read while the button is not pressed; `rebounce` turns on
    /// auto-repeat while held past the long-press threshold.
    pub fn new(manager: ButtonManager, mut pin: Box<dyn Pin>, idle_level: Level, rebounce: bool) -> Result<Self> {
        pin.set_mode(Mode::Input)?;
        pin.set_pull(if idle_level.is_high() { Pull::Up } else { Pull::Down })?;

        let events = Notifier::new()?;
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);

        manager.register(RegisteredButton {
            id,
            pin,
            core: core::ButtonCore::new(idle_level, rebounce),
            events: events.sender(),
            timer: None,
        })?;

        Ok(Button { id, manager, events })
    }

    /// The readiness source carrying this button's event stream; include
    /// its file descriptor in a multiplexed wait and call
    /// [`Button::read_event`] once it's readable.
    pub fn events(&self) -> &Notifier {
        &self.events
    }

    /// Reads one pending event, if any. `Event`'s discriminant is the byte
    /// written by the manager worker, in declaration order
    /// (`Press` = 0, `Release` = 1, `LongPress` = 2, `LongRelease` = 3).
    pub fn read_event(&self) -> Option<Event> {
        self.events.try_read().map(decode_event)
    }
}

impl Drop for Button {
    fn drop(&mut self) {
        self.manager.deregister(self.id);
    }
}

fn decode_event(byte: u8) -> Event {
    match byte {
        0 => Event::Press,
        1 => Event::Release,
        2 => Event::LongPress,
        _ => Event::LongRelease,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::pin::mock::MockPin;

    fn wait_for_event(button: &Button) -> Event {
        for _ in 0..200 {
            if let Some(e) = button.read_event() {
                return e;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("timed out waiting for button event");
    }

    #[test]
    fn clean_press_and_release_round_trip_through_the_manager() {
        let manager = ButtonManager::isolated();
        let pin = MockPin::new(1, Level::Low);
        let handle = pin.handle();
        let button = Button::new(manager, Box::new(pin), Level::Low, false).unwrap();

        handle.set_level(Level::High);
        assert_eq!(wait_for_event(&button), Event::Press);

        handle.set_level(Level::Low);
        assert_eq!(wait_for_event(&button), Event::Release);
    }
}
