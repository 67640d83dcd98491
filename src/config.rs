//! Tunable constants, mirroring `config.h` in the original implementation.
//!
//! Everything here is an observable contract per the component specs: the
//! debounce window, the long-press/auto-repeat timings, the LED blink
//! periods and the MPD reconnect backoff. Pin numbers and the MPD host are
//! read from the environment at startup instead (see [`Env`]), since they
//! describe a particular board/install rather than algorithm behaviour.

use std::env;
use std::time::Duration;

/// Total time a raw level must stay consistent before the debounce
/// integrator reports the corresponding stable level.
pub const DEBOUNCE_TIME: Duration = Duration::from_millis(100);

/// Sampling period of the button manager's tick timer. Together with
/// `DEBOUNCE_TIME` this derives the integrator's clamp `N`.
pub const DEBOUNCE_READ_DELAY: Duration = Duration::from_millis(10);

/// How long a button must stay active before it's considered a long press.
pub const BUTTON_DELAY: Duration = Duration::from_millis(800);

/// Floor for the auto-repeat interval.
pub const BUTTON_MIN_DELAY: Duration = Duration::from_millis(100);

/// Geometric decay factor applied to the auto-repeat interval on each
/// repeat, in `(0, 1)`.
pub const REBOUNCE_ACCEL: f64 = 0.7;

/// Blink period while in [`crate::led::Mode::BlinkSlowly`].
pub const SLOW_TIME: Duration = Duration::from_millis(300);

/// Blink period while in [`crate::led::Mode::BlinkQuickly`].
pub const QUICK_TIME: Duration = Duration::from_millis(50);

/// Bound on how long a destructor waits for a worker thread to join.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(3);

/// Initial and post-success reconnect delay for the music client.
pub const MPD_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Multiplier applied to the reconnect delay on each failed `CONNECT`.
pub const MPD_RECONNECT_ACCEL: u32 = 2;

/// Ceiling on the reconnect delay.
pub const MPD_RECONNECT_MAXDELAY: Duration = Duration::from_secs(30);

/// Timeout for establishing the initial MPD connection.
pub const MPD_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Number of consecutive failures of a non-`CONNECT` command before it is
/// dropped and the attempt counter reset.
pub const MAX_COMMAND_ATTEMPTS: u32 = 3;

/// Returns `DEBOUNCE_TIME / DEBOUNCE_READ_DELAY`, the integrator's clamp.
pub fn integrator_maximum() -> u32 {
    (DEBOUNCE_TIME.as_nanos() / DEBOUNCE_READ_DELAY.as_nanos()) as u32
}

/// Board wiring and deployment knobs, read from the environment once at
/// startup. There is exactly one deployment target, so a config-file
/// parser would be pure overhead; env vars with sane defaults cover it.
#[derive(Debug, Clone)]
pub struct Env {
    pub led_pin: u32,
    pub button_next_pin: u32,
    pub button_prev_pin: u32,
    pub button_pause_pin: u32,
    pub mpd_host: String,
    pub mpd_port: u16,
}

impl Default for Env {
    fn default() -> Self {
        Env {
            led_pin: 11,
            button_next_pin: 5,
            button_prev_pin: 6,
            button_pause_pin: 13,
            mpd_host: "127.0.0.1".to_string(),
            mpd_port: 6600,
        }
    }
}

impl Env {
    /// Reads overrides from the process environment, falling back to
    /// [`Env::default`] for anything unset or unparsable.
    pub fn from_env() -> Self {
        let default = Env::default();
        Env {
            led_pin: read_u32("VSUP_LED_PIN", default.led_pin),
            button_next_pin: read_u32("VSUP_BUTTON_NEXT_PIN", default.button_next_pin),
            button_prev_pin: read_u32("VSUP_BUTTON_PREV_PIN", default.button_prev_pin),
            button_pause_pin: read_u32("VSUP_BUTTON_PAUSE_PIN", default.button_pause_pin),
            mpd_host: env::var("VSUP_MPD_HOST").unwrap_or(default.mpd_host),
            mpd_port: read_u16("VSUP_MPD_PORT", default.mpd_port),
        }
    }
}

fn read_u32(key: &str, default: u32) -> u32 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn read_u16(key: &str, default: u16) -> u16 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
