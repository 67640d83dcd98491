//! An in-memory `Pin` used by tests in place of real hardware.

use std::sync::{Arc, Mutex};

use super::{Level, Mode, Pull};
use crate::error::Result;

#[derive(Debug, Default)]
struct State {
    mode: Option<Mode>,
    pull: Option<Pull>,
    level: Level,
}

impl Default for Level {
    fn default() -> Self {
        Level::Low
    }
}

/// A `Pin` backed by a shared in-memory cell, so a test can flip the level
/// the code under test reads from a different handle (`MockPin::handle`)
/// while the component under test only sees the `Pin` trait.
#[derive(Clone)]
pub struct MockPin {
    id: u32,
    state: Arc<Mutex<State>>,
}

impl MockPin {
    pub fn new(id: u32, initial: Level) -> Self {
        MockPin {
            id,
            state: Arc::new(Mutex::new(State { mode: None, pull: None, level: initial })),
        }
    }

    /// A cheap clone the test keeps to drive the pin level independently
    /// of the component under test's handle.
    pub fn handle(&self) -> Self {
        self.clone()
    }

    pub fn set_level(&self, level: Level) {
        self.state.lock().unwrap().level = level;
    }

    pub fn written_level(&self) -> Level {
        self.state.lock().unwrap().level
    }

    pub fn mode(&self) -> Option<Mode> {
        self.state.lock().unwrap().mode
    }
}

impl super::Pin for MockPin {
    fn id(&self) -> u32 {
        self.id
    }

    fn set_mode(&mut self, mode: Mode) -> Result<()> {
        self.state.lock().unwrap().mode = Some(mode);
        Ok(())
    }

    fn set_pull(&mut self, pull: Pull) -> Result<()> {
        self.state.lock().unwrap().pull = Some(pull);
        Ok(())
    }

    fn write(&mut self, level: Level) -> Result<()> {
        self.state.lock().unwrap().level = level;
        Ok(())
    }

    fn read(&self) -> Result<Level> {
        Ok(self.state.lock().unwrap().level)
    }
}

#[cfg(test)]
mod tests {
    use super::super::Pin;
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let mut pin = MockPin::new(1, Level::Low);
        pin.write(Level::High).unwrap();
        assert_eq!(pin.read().unwrap(), Level::High);
    }

    #[test]
    fn handle_observes_writes_from_the_original() {
        let pin = MockPin::new(1, Level::Low);
        let observer = pin.handle();
        let mut pin = pin;
        pin.write(Level::High).unwrap();
        assert_eq!(observer.read().unwrap(), Level::High);
    }
}
