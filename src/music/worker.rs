//! The music client's command-queue state machine: one worker thread, one
//! deque, driven by command bytes arriving on a control [`Notifier`] —
//! the same shape as `Mpd::_run`/`_execCmd` in the original implementation,
//! but with the CONNECT/IDLE/WAIT_RECONNECT handlers expressed against the
//! [`MpdConnection`] trait so they're testable against a scripted fake.

use std::collections::VecDeque;
use std::os::unix::io::AsRawFd;
use std::time::Duration;

use nix::poll::PollFlags;

use crate::config;
use crate::error::{Error, Result};
use crate::iofd;
use crate::iofd::Timer;
use crate::notifier::Notifier;

use super::connection::{ConnStatus, MpdConnection, PlayerState};

pub(crate) const CODE_EXIT: u8 = 1;
pub(crate) const CODE_PLAY_PAUSE: u8 = 2;
pub(crate) const CODE_NEXT: u8 = 3;
pub(crate) const CODE_PREV: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Connect,
    WaitReconnect,
    Idle,
    Status,
    PlayPause,
    Next,
    Prev,
    Exit,
}

fn decode(byte: u8) -> Option<Command> {
    match byte {
        CODE_EXIT => Some(Command::Exit),
        CODE_PLAY_PAUSE => Some(Command::PlayPause),
        CODE_NEXT => Some(Command::Next),
        CODE_PREV => Some(Command::Prev),
        _ => None,
    }
}

struct State {
    player_state: PlayerState,
    queue_length: u32,
    current_index: Option<u32>,
    reconnect_delay: Duration,
    attempt: u32,
}

impl State {
    fn new() -> Self {
        State {
            player_state: PlayerState::Unknown,
            queue_length: 0,
            current_index: None,
            reconnect_delay: config::MPD_RECONNECT_DELAY,
            attempt: 0,
        }
    }
}

fn not_connected() -> Error {
    Error::Mpd("no active connection".into())
}

/// The worker's entry point. `connect` opens a fresh connection each time
/// the `Connect` command runs; it's a closure rather than a fixed host/port
/// pair so tests can hand it a [`super::connection::fake::FakeConnection`]
/// factory instead.
pub(crate) fn run(control: Notifier, connect: Box<dyn Fn() -> Result<Box<dyn MpdConnection>> + Send>) {
    let mut commands: VecDeque<Command> = VecDeque::from([Command::Connect, Command::Status]);
    let mut conn: Option<Box<dyn MpdConnection>> = None;
    let mut state = State::new();

    loop {
        let cmd = commands.pop_front().unwrap_or(Command::Idle);
        if cmd == Command::Exit {
            break;
        }

        let outcome = match cmd {
            Command::Connect => {
                handle_connect(&connect, &mut conn, &mut state, &mut commands);
                continue;
            }
            Command::WaitReconnect => {
                wait_reconnect(&control, &mut commands, state.reconnect_delay);
                continue;
            }
            Command::Idle => run_idle(conn.as_deref_mut(), &control, &mut commands),
            Command::Status => run_status(conn.as_deref_mut(), &mut state),
            Command::Next => run_next(conn.as_deref_mut(), &mut state),
            Command::PlayPause => run_play_pause(conn.as_deref_mut(), state.player_state),
            Command::Prev => run_prev(conn.as_deref_mut(), &mut state),
            Command::Exit => unreachable!("handled above"),
        };

        match outcome {
            Ok(()) => state.attempt = 0,
            Err(e) => {
                log::warn!("music client: command {cmd:?} failed: {e}");
                handle_failure(cmd, &mut commands, &mut state.attempt);
                conn = None;
            }
        }
    }
}

/// CONNECT is handled outside the generic failure path: a failure here
/// drives the reconnect backoff instead of the 3-strikes command-drop rule.
fn handle_connect(
    connect: &dyn Fn() -> Result<Box<dyn MpdConnection>>,
    conn: &mut Option<Box<dyn MpdConnection>>,
    state: &mut State,
    commands: &mut VecDeque<Command>,
) {
    match connect() {
        Ok(c) => {
            log::info!("music client: connection established");
            *conn = Some(c);
            state.reconnect_delay = config::MPD_RECONNECT_DELAY;
        }
        Err(e) => {
            log::warn!("music client: connect failed: {e}");
            state.reconnect_delay =
                state.reconnect_delay.saturating_mul(config::MPD_RECONNECT_ACCEL).min(config::MPD_RECONNECT_MAXDELAY);
            commands.push_front(Command::Connect);
            commands.push_front(Command::WaitReconnect);
        }
    }
}

/// (P5) Backoff grows by `MPD_RECONNECT_ACCEL` per failure, clamped to
/// `MPD_RECONNECT_MAXDELAY`, and resets to `MPD_RECONNECT_DELAY` on the
/// next successful `CONNECT` (handled in `handle_connect` above).
fn wait_reconnect(control: &Notifier, commands: &mut VecDeque<Command>, delay: Duration) -> bool {
    let timer = match Timer::new() {
        Ok(t) => t,
        Err(e) => {
            log::warn!("music client: failed to create reconnect timer: {e}");
            return false;
        }
    };
    if let Err(e) = timer.arm_once(delay) {
        log::warn!("music client: failed to arm reconnect timer: {e}");
        return false;
    }

    loop {
        let mut fds = [
            iofd::raw_poll_fd(control.as_raw_fd(), PollFlags::POLLIN),
            iofd::raw_poll_fd(timer.as_raw_fd(), PollFlags::POLLIN),
        ];
        if let Err(e) = iofd::poll_forever(&mut fds) {
            log::warn!("music client: reconnect wait poll failed: {e}");
            return false;
        }

        if iofd::is_readable(&fds[0]) {
            if let Some(byte) = control.try_read() {
                match decode(byte) {
                    Some(Command::Exit) => {
                        commands.push_front(Command::Exit);
                        return true;
                    }
                    Some(cmd) => commands.push_back(cmd),
                    None => {}
                }
            }
        }
        if iofd::is_readable(&fds[1]) {
            timer.consume();
            return true;
        }
    }
}

fn run_idle(conn: Option<&mut dyn MpdConnection>, control: &Notifier, commands: &mut VecDeque<Command>) -> Result<()> {
    let conn = conn.ok_or_else(not_connected)?;
    conn.begin_idle()?;

    let mut fds = [
        iofd::raw_poll_fd(control.as_raw_fd(), PollFlags::POLLIN),
        iofd::raw_poll_fd(conn.readable_fd(), PollFlags::POLLIN),
    ];
    iofd::poll_forever(&mut fds)?;

    if iofd::is_readable(&fds[0]) {
        if let Some(byte) = control.try_read() {
            match decode(byte) {
                Some(Command::Exit) => {
                    commands.push_front(Command::Exit);
                    return Ok(());
                }
                Some(cmd) => commands.push_back(cmd),
                None => {}
            }
        }
    }

    let changes = conn.recv_idle()?;
    if changes.queue || changes.player {
        commands.push_front(Command::Status);
    }
    Ok(())
}

fn run_status(conn: Option<&mut dyn MpdConnection>, state: &mut State) -> Result<()> {
    let conn = conn.ok_or_else(not_connected)?;
    let ConnStatus { state: player_state, queue_length, current_index } = conn.status()?;
    state.player_state = player_state;
    state.queue_length = queue_length;
    state.current_index = current_index;
    Ok(())
}

/// NEXT, with the saturation condition corrected per the design notes'
/// Q2 (`current_index >= queue_length - 1`, not the source's inverted
/// `queue_length == current_index - 1`).
fn run_next(conn: Option<&mut dyn MpdConnection>, state: &mut State) -> Result<()> {
    let conn = conn.ok_or_else(not_connected)?;
    if state.queue_length == 0 {
        return Ok(());
    }
    let current = state.current_index.unwrap_or(0);
    if current >= state.queue_length - 1 {
        return Ok(());
    }
    let next = (current + 1).min(state.queue_length - 1);
    conn.play_pos(next)?;
    state.current_index = Some(next);
    Ok(())
}

/// PREV, implemented as the natural dual per the design notes' Q3:
/// `max(current_index - 1, 0)`.
fn run_prev(conn: Option<&mut dyn MpdConnection>, state: &mut State) -> Result<()> {
    let conn = conn.ok_or_else(not_connected)?;
    let current = state.current_index.unwrap_or(0);
    let prev = current.saturating_sub(1);
    conn.play_pos(prev)?;
    state.current_index = Some(prev);
    Ok(())
}

fn run_play_pause(conn: Option<&mut dyn MpdConnection>, player_state: PlayerState) -> Result<()> {
    let conn = conn.ok_or_else(not_connected)?;
    conn.toggle_play(player_state == PlayerState::Playing)
}

/// (P6) Three consecutive failures of the same non-`CONNECT` command
/// drops it and resets the attempt counter; this crate's `mpd` client
/// surfaces errors per-call rather than libmpdclient's sticky, clearable
/// connection error, so any failure here simply discards the connection
/// and re-enqueues `CONNECT` rather than attempting a local clear.
fn handle_failure(cmd: Command, commands: &mut VecDeque<Command>, attempt: &mut u32) {
    if *attempt + 1 >= config::MAX_COMMAND_ATTEMPTS {
        log::error!("music client: command {cmd:?} failed {} times, dropping it", config::MAX_COMMAND_ATTEMPTS);
        *attempt = 0;
    } else {
        *attempt += 1;
        commands.push_front(cmd);
    }
    commands.push_front(Command::Connect);
}

#[cfg(test)]
mod tests {
    use super::super::connection::fake::FakeConnection;
    use super::super::connection::IdleChanges;
    use super::*;

    #[test]
    fn next_stops_advancing_at_the_last_track() {
        let mut state = State::new();
        state.queue_length = 3;
        state.current_index = Some(2);
        let mut fake = FakeConnection::new();
        fake.play_pos_results.push_back(Ok(()));
        let mut conn: Box<dyn MpdConnection> = Box::new(fake);
        run_next(Some(conn.as_mut()), &mut state).unwrap();
        assert_eq!(state.current_index, Some(2));
    }

    #[test]
    fn next_advances_by_one_when_not_at_the_end() {
        let mut state = State::new();
        state.queue_length = 3;
        state.current_index = Some(0);
        let mut fake = FakeConnection::new();
        fake.play_pos_results.push_back(Ok(()));
        let mut conn: Box<dyn MpdConnection> = Box::new(fake);
        run_next(Some(conn.as_mut()), &mut state).unwrap();
        assert_eq!(state.current_index, Some(1));
    }

    #[test]
    fn prev_floors_at_zero() {
        let mut state = State::new();
        state.current_index = Some(0);
        let mut fake = FakeConnection::new();
        fake.play_pos_results.push_back(Ok(()));
        let mut conn: Box<dyn MpdConnection> = Box::new(fake);
        run_prev(Some(conn.as_mut()), &mut state).unwrap();
        assert_eq!(state.current_index, Some(0));
    }

    /// (P5) delays double each failure and clamp at the ceiling.
    #[test]
    fn reconnect_backoff_doubles_and_clamps() {
        let mut state = State::new();
        for _ in 0..8 {
            state.reconnect_delay =
                state.reconnect_delay.saturating_mul(config::MPD_RECONNECT_ACCEL).min(config::MPD_RECONNECT_MAXDELAY);
        }
        assert_eq!(state.reconnect_delay, config::MPD_RECONNECT_MAXDELAY);
    }

    /// (P6) three failures drop the command and reset the counter.
    #[test]
    fn command_is_dropped_after_three_failures() {
        let mut commands = VecDeque::new();
        let mut attempt = 0;
        handle_failure(Command::Next, &mut commands, &mut attempt);
        assert_eq!(attempt, 1);
        handle_failure(Command::Next, &mut commands, &mut attempt);
        assert_eq!(attempt, 2);
        handle_failure(Command::Next, &mut commands, &mut attempt);
        assert_eq!(attempt, 0);
    }

    #[test]
    fn idle_pushes_status_on_queue_or_player_change() {
        let control = Notifier::new().unwrap();
        let mut fake = FakeConnection::new();
        fake.idle_results.push_back(Ok(IdleChanges { queue: true, player: false }));
        fake.mark_ready();
        let mut conn: Box<dyn MpdConnection> = Box::new(fake);
        let mut commands = VecDeque::new();
        run_idle(Some(conn.as_mut()), &control, &mut commands).unwrap();
        assert_eq!(commands.front(), Some(&Command::Status));
    }
}
