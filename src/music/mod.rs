//! The Music Client capability: a connection to an external music-player
//! server, commands posted from any thread, and a worker thread running
//! the connect/idle/execute loop with exponential reconnect backoff.

pub mod connection;
mod worker;

use std::thread::JoinHandle;

use connection::{MpdConnection, RealConnection};

use crate::config;
use crate::error::{Error, Result};
use crate::notifier::{Notifier, Sender};

/// A handle to the music client worker. `play_or_pause`/`next`/`prev` post
/// a command byte and return immediately; `Drop` posts `EXIT` and joins
/// the worker within [`config::JOIN_TIMEOUT`].
pub struct MusicClient {
    control: Sender,
    thread: Option<JoinHandle<()>>,
    done_rx: std::sync::mpsc::Receiver<()>,
}

impl MusicClient {
    pub fn new(host: String, port: u16) -> Result<Self> {
        let control = Notifier::new()?;
        let sender = control.sender();
        let connect: Box<dyn Fn() -> Result<Box<dyn MpdConnection>> + Send> = Box::new(move || {
            RealConnection::connect(&host, port).map(|c| Box::new(c) as Box<dyn MpdConnection>)
        });

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let thread = std::thread::Builder::new()
            .name("music-client".into())
            .spawn(move || {
                worker::run(control, connect);
                let _ = done_tx.send(());
            })
            .map_err(|e| Error::Degraded { component: "music_client", reason: e.to_string() })?;

        Ok(MusicClient { control: sender, thread: Some(thread), done_rx })
    }

    pub fn play_or_pause(&self) {
        self.control.send(worker::CODE_PLAY_PAUSE);
    }

    pub fn next(&self) {
        self.control.send(worker::CODE_NEXT);
    }

    pub fn prev(&self) {
        self.control.send(worker::CODE_PREV);
    }
}

impl Drop for MusicClient {
    fn drop(&mut self) {
        self.control.send(worker::CODE_EXIT);
        if self.done_rx.recv_timeout(config::JOIN_TIMEOUT).is_err() {
            log::warn!("music client: worker did not exit within {:?}", config::JOIN_TIMEOUT);
            return;
        }
        if let Some(t) = self.thread.take() {
            let _ = t.join();
        }
    }
}
