//! `MpdConnection`: the seam between `music::worker`'s state machine and
//! the actual wire protocol, so the worker's retry/backoff/idle logic is
//! testable against a scripted fake instead of a running `mpd` server.

use std::net::TcpStream;
use std::os::unix::io::{AsRawFd, RawFd};

use mpd::Client;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Playing,
    Paused,
    Stopped,
    Unknown,
}

#[derive(Debug, Clone, Copy)]
pub struct ConnStatus {
    pub state: PlayerState,
    pub queue_length: u32,
    pub current_index: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IdleChanges {
    pub queue: bool,
    pub player: bool,
}

/// Wraps a live connection to the music server: status queries, playback
/// commands, and the idle/notify handshake (`CONNECT`, `IDLE`, `RECV_IDLE`,
/// `SEND_STATUS`, `RECV_STATUS`, `RUN_PLAY_POS` from spec.md §6).
pub trait MpdConnection: Send {
    /// A descriptor safe to include in a `poll` wait alongside the
    /// worker's control `Notifier`.
    fn readable_fd(&self) -> RawFd;
    fn status(&mut self) -> Result<ConnStatus>;
    fn play_pos(&mut self, position: u32) -> Result<()>;
    /// Toggles playback; `currently_playing` comes from the last cached
    /// `ConnStatus` so the worker decides play vs. pause, not the server.
    fn toggle_play(&mut self, currently_playing: bool) -> Result<()>;
    /// Enters idle mode without blocking (`mpd_send_idle`'s analogue).
    fn begin_idle(&mut self) -> Result<()>;
    /// Reads the idle notification once `readable_fd` is ready
    /// (`mpd_recv_idle`'s analogue).
    fn recv_idle(&mut self) -> Result<IdleChanges>;
}

/// The real implementation, over the published `mpd` crate.
pub struct RealConnection {
    client: Client<TcpStream>,
    // A second handle onto the same socket, kept only so `readable_fd` has
    // something to hand to `poll` without needing the crate to expose one:
    // `mpd::Client` owns its stream outright, so we dup it at connect time.
    poll_handle: TcpStream,
}

impl RealConnection {
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        let stream = TcpStream::connect((host, port))?;
        let poll_handle = stream.try_clone()?;
        let client = Client::new(stream).map_err(|e| Error::Mpd(e.to_string()))?;
        Ok(RealConnection { client, poll_handle })
    }
}

impl MpdConnection for RealConnection {
    fn readable_fd(&self) -> RawFd {
        self.poll_handle.as_raw_fd()
    }

    fn status(&mut self) -> Result<ConnStatus> {
        let status = self.client.status().map_err(|e| Error::Mpd(e.to_string()))?;
        let state = match status.state {
            mpd::status::State::Play => PlayerState::Playing,
            mpd::status::State::Pause => PlayerState::Paused,
            mpd::status::State::Stop => PlayerState::Stopped,
        };
        let current_index = status.song.map(|place| place.pos);
        Ok(ConnStatus { state, queue_length: status.queue_len, current_index })
    }

    fn play_pos(&mut self, position: u32) -> Result<()> {
        self.client.switch(position).map_err(|e| Error::Mpd(e.to_string()))
    }

    fn toggle_play(&mut self, currently_playing: bool) -> Result<()> {
        if currently_playing {
            self.client.pause(true).map_err(|e| Error::Mpd(e.to_string()))
        } else {
            self.client.play().map_err(|e| Error::Mpd(e.to_string()))
        }
    }

    fn begin_idle(&mut self) -> Result<()> {
        self.client.send_idle(None).map_err(|e| Error::Mpd(e.to_string()))
    }

    fn recv_idle(&mut self) -> Result<IdleChanges> {
        let subsystems = self.client.read_idle().map_err(|e| Error::Mpd(e.to_string()))?;
        Ok(IdleChanges {
            queue: subsystems.contains(&mpd::idle::Subsystem::Queue),
            player: subsystems.contains(&mpd::idle::Subsystem::Player),
        })
    }
}

#[cfg(test)]
pub mod fake {
    use std::collections::VecDeque;
    use std::os::unix::io::AsRawFd;

    use super::*;
    use crate::notifier::Notifier;

    /// A scriptable `MpdConnection` double: queues of canned responses for
    /// each operation, so `music::worker` tests can script a connect
    /// failure, a status, or an idle notification without a real server.
    pub struct FakeConnection {
        pub statuses: VecDeque<Result<ConnStatus>>,
        pub play_pos_results: VecDeque<Result<()>>,
        pub toggle_results: VecDeque<Result<()>>,
        pub idle_results: VecDeque<Result<IdleChanges>>,
        // Readable whenever the test wants `recv_idle` to look ready;
        // tests drive it with `Notifier::send` from the outside.
        readiness: Notifier,
    }

    impl FakeConnection {
        pub fn new() -> Self {
            FakeConnection {
                statuses: VecDeque::new(),
                play_pos_results: VecDeque::new(),
                toggle_results: VecDeque::new(),
                idle_results: VecDeque::new(),
                readiness: Notifier::new().unwrap(),
            }
        }

        pub fn mark_ready(&self) {
            self.readiness.send(1);
        }
    }

    impl MpdConnection for FakeConnection {
        fn readable_fd(&self) -> RawFd {
            self.readiness.as_raw_fd()
        }

        fn status(&mut self) -> Result<ConnStatus> {
            self.statuses.pop_front().unwrap_or(Err(Error::Other("no scripted status".into())))
        }

        fn play_pos(&mut self, _position: u32) -> Result<()> {
            self.play_pos_results.pop_front().unwrap_or(Ok(()))
        }

        fn toggle_play(&mut self, _currently_playing: bool) -> Result<()> {
            self.toggle_results.pop_front().unwrap_or(Ok(()))
        }

        fn begin_idle(&mut self) -> Result<()> {
            Ok(())
        }

        fn recv_idle(&mut self) -> Result<IdleChanges> {
            let _ = self.readiness.try_read();
            self.idle_results.pop_front().unwrap_or(Ok(IdleChanges::default()))
        }
    }

    impl Default for FakeConnection {
        fn default() -> Self {
            Self::new()
        }
    }
}
