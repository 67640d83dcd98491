//! Crate-wide error types.
//!
//! Roughly follows the error-kind split from the design notes: `Degraded`
//! covers a component that failed to come up (the owning component marks
//! itself invalid and the supervisor aborts startup), `Io` covers a syscall
//! that failed mid-operation, and the `thiserror` `#[from]` impls let `?`
//! propagate straight out of constructors.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{component} failed to initialise: {reason}")]
    Degraded {
        component: &'static str,
        reason: String,
    },

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("nix error: {0}")]
    Nix(#[from] nix::Error),

    #[error("music server error: {0}")]
    Mpd(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
