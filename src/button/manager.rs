//! The Button Manager: one worker thread multiplexing every registered
//! button's debounce tick and personal long-press/auto-repeat timer, so a
//! process with N buttons spends one thread on them, not N.
//!
//! Mirrors `GpioButtonManager` from the original implementation (a
//! lazily-created singleton, alive only while at least one button is
//! registered) but the registry is driven by message passing instead of a
//! raw-pointer `map<int, GpioButton*>`: once a button hands its pin, timer
//! and core state machine over via [`ButtonManager::register`], only the
//! worker thread ever touches them again, so no lock is needed on the hot
//! path (I3 in the design notes).

use std::collections::{HashMap, VecDeque};
use std::os::fd::AsFd;
use std::sync::{Arc, Mutex, OnceLock};

use nix::poll::{PollFd, PollFlags};

use crate::button::core::{ButtonCore, Reaction};
use crate::config;
use crate::error::{Error, Result};
use crate::iofd::{self, BoundedWorker, Timer};
use crate::notifier::{Notifier, Sender};
use crate::pin::Pin;

const CTRL_EXIT: u8 = 0;
const CTRL_LIST_CHANGED: u8 = 1;

pub(crate) struct RegisteredButton {
    pub(crate) id: u64,
    pub(crate) pin: Box<dyn Pin>,
    pub(crate) core: ButtonCore,
    pub(crate) events: Sender,
    pub(crate) timer: Option<Timer>,
}

impl Drop for RegisteredButton {
    fn drop(&mut self) {
        if let Some(t) = &self.timer {
            let _ = t.disarm();
        }
    }
}

enum PendingOp {
    Add(RegisteredButton),
    Remove(u64),
}

struct Worker {
    control: Sender,
    handle: BoundedWorker,
}

struct Shared {
    pending: Mutex<VecDeque<PendingOp>>,
    registered: Mutex<usize>,
    worker: Mutex<Option<Worker>>,
    /// Button id → pin id, for rejecting a pin already claimed by another
    /// Button (spec.md §4.2.3's "rejecting duplicate pins"). Kept here
    /// rather than read off the worker-owned `buttons` vec, since
    /// `register`/`deregister` run on the caller's thread and must see an
    /// up-to-date registry synchronously, without waiting for the worker
    /// to drain its pending queue.
    pins: Mutex<HashMap<u64, u32>>,
}

/// A handle to the button manager. Cheap to clone; every clone shares the
/// same worker thread and registry.
#[derive(Clone)]
pub struct ButtonManager {
    shared: Arc<Shared>,
}

static GLOBAL: OnceLock<ButtonManager> = OnceLock::new();

impl ButtonManager {
    /// The process-wide singleton, created on first use.
    pub fn global() -> ButtonManager {
        GLOBAL.get_or_init(ButtonManager::new).clone()
    }

    /// A private instance, independent of the process-wide singleton.
    /// Intended for tests that want full control over the registry's
    /// lifetime without interfering with other tests.
    pub fn isolated() -> ButtonManager {
        ButtonManager::new()
    }

    fn new() -> ButtonManager {
        ButtonManager {
            shared: Arc::new(Shared {
                pending: Mutex::new(VecDeque::new()),
                registered: Mutex::new(0),
                worker: Mutex::new(None),
                pins: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Registers `button`, rejecting it if its pin is already claimed by
    /// another registered Button.
    pub(crate) fn register(&self, button: RegisteredButton) -> Result<()> {
        let pin_id = button.pin.id();
        {
            let mut pins = self.shared.pins.lock().unwrap();
            if pins.values().any(|&claimed| claimed == pin_id) {
                return Err(Error::Other(format!("pin {pin_id} is already registered")));
            }
            pins.insert(button.id, pin_id);
        }

        let mut count = self.shared.registered.lock().unwrap();
        if *count == 0 {
            if let Err(e) = self.spawn_worker() {
                drop(count);
                self.shared.pins.lock().unwrap().remove(&button.id);
                return Err(e);
            }
        }
        *count += 1;
        drop(count);

        self.shared.pending.lock().unwrap().push_back(PendingOp::Add(button));
        self.shared.worker.lock().unwrap().as_ref().expect("worker spawned above").control.send(CTRL_LIST_CHANGED);
        Ok(())
    }

    pub(crate) fn deregister(&self, id: u64) {
        self.shared.pins.lock().unwrap().remove(&id);

        if let Some(worker) = self.shared.worker.lock().unwrap().as_ref() {
            self.shared.pending.lock().unwrap().push_back(PendingOp::Remove(id));
            worker.control.send(CTRL_LIST_CHANGED);
        }

        let mut count = self.shared.registered.lock().unwrap();
        *count = count.saturating_sub(1);
        if *count == 0 {
            drop(count);
            self.teardown_worker();
        }
    }

    fn spawn_worker(&self) -> Result<()> {
        let control = Notifier::new().map_err(|_| Error::Degraded {
            component: "button_manager",
            reason: "failed to create control notifier".into(),
        })?;
        let control_sender = control.sender();
        let pending = Arc::clone(&self.shared.pending);

        let handle = iofd::spawn_bounded("button-manager", move || run(control, pending))
            .map_err(|e| Error::Degraded { component: "button_manager", reason: e.to_string() })?;

        *self.shared.worker.lock().unwrap() = Some(Worker { control: control_sender, handle });
        Ok(())
    }

    fn teardown_worker(&self) {
        let worker = self.shared.worker.lock().unwrap().take();
        if let Some(worker) = worker {
            worker.control.send(CTRL_EXIT);
            worker.handle.join();
        }
    }
}

/// The worker's main loop: owns every registered button outright (no
/// locking needed on `buttons` itself) and wakes on whichever of the
/// control notifier, the shared debounce tick, or a per-button long-press
/// timer goes readable first.
fn run(control: Notifier, pending: Arc<Mutex<VecDeque<PendingOp>>>) {
    let tick = match Timer::new() {
        Ok(t) => t,
        Err(e) => {
            log::error!("button manager: failed to create debounce tick timer: {e}");
            return;
        }
    };
    if let Err(e) = tick.arm_periodic(config::DEBOUNCE_READ_DELAY) {
        log::error!("button manager: failed to arm debounce tick timer: {e}");
        return;
    }

    let mut buttons: Vec<RegisteredButton> = Vec::new();

    'outer: loop {
        let mut fds = vec![
            PollFd::new(control.as_fd(), PollFlags::POLLIN),
            PollFd::new(tick.as_fd(), PollFlags::POLLIN),
        ];
        for b in &buttons {
            if let Some(t) = &b.timer {
                fds.push(PollFd::new(t.as_fd(), PollFlags::POLLIN));
            } else {
                fds.push(PollFd::new(control.as_fd(), PollFlags::empty()));
            }
        }

        if let Err(e) = iofd::poll_forever(&mut fds) {
            log::error!("button manager: poll failed: {e}");
            return;
        }

        if iofd::is_readable(&fds[0]) {
            for code in control.drain() {
                match code {
                    CTRL_EXIT => break 'outer,
                    CTRL_LIST_CHANGED => apply_pending(&pending, &mut buttons),
                    _ => {}
                }
            }
        }

        if iofd::is_readable(&fds[1]) {
            tick.consume();
            for b in &mut buttons {
                let Ok(raw) = b.pin.read() else { continue };
                for reaction in b.core.sample(raw) {
                    apply_reaction(b, reaction);
                }
            }
        }

        for (i, b) in buttons.iter_mut().enumerate() {
            if b.timer.is_some() && iofd::is_readable(&fds[2 + i]) {
                if let Some(t) = &b.timer {
                    t.consume();
                }
                let reactions = b.core.on_timer();
                for reaction in reactions {
                    apply_reaction(b, reaction);
                }
            }
        }
    }
}

fn apply_pending(pending: &Arc<Mutex<VecDeque<PendingOp>>>, buttons: &mut Vec<RegisteredButton>) {
    let mut queue = pending.lock().unwrap();
    while let Some(op) = queue.pop_front() {
        match op {
            PendingOp::Add(b) => buttons.push(b),
            PendingOp::Remove(id) => buttons.retain(|b| b.id != id),
        }
    }
}

fn apply_reaction(button: &mut RegisteredButton, reaction: Reaction) {
    match reaction {
        Reaction::Emit(event) => button.events.send(event as u8),
        Reaction::ArmTimer(delay) => match &button.timer {
            Some(t) => {
                if let Err(e) = t.arm_once(delay) {
                    log::warn!("button manager: failed to arm timer: {e}");
                }
            }
            None => match Timer::new() {
                Ok(t) => {
                    if let Err(e) = t.arm_once(delay) {
                        log::warn!("button manager: failed to arm timer: {e}");
                    }
                    button.timer = Some(t);
                }
                Err(e) => log::warn!("button manager: failed to create timer: {e}"),
            },
        },
        Reaction::DisarmTimer => {
            if let Some(t) = button.timer.take() {
                let _ = t.disarm();
            }
        }
    }
}
