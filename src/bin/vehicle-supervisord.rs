//! Entry point: initialise logging, read the environment, install the
//! signal mask, build the supervisor and run it to completion.

use vehicle_supervisor::config::Env;
use vehicle_supervisor::device::mock::MockDeviceWatcher;
use vehicle_supervisor::error::Error;
use vehicle_supervisor::pin::mock::MockPin;
use vehicle_supervisor::pin::Level;
use vehicle_supervisor::signals;
use vehicle_supervisor::supervisor::Supervisor;

fn run() -> Result<(), Error> {
    env_logger::init();

    // Must happen before any worker thread is spawned (the music client
    // and the button manager's first worker, both inside `Supervisor::new`
    // below): threads created afterwards inherit the mask this blocks.
    let signal_fd = signals::install()?;

    let env = Env::from_env();
    log::info!(
        "starting with led_pin={} next={} prev={} pause={} mpd={}:{}",
        env.led_pin,
        env.button_next_pin,
        env.button_prev_pin,
        env.button_pause_pin,
        env.mpd_host,
        env.mpd_port
    );

    // The real register-level / sysfs `Pin` driver (`pin::sysfs`) and udev
    // device watcher (`device::udev`) are out of scope for this crate (see
    // `spec.md` §1, §6); `MockPin`/`MockDeviceWatcher` stand in as the
    // external collaborators this binary would otherwise be wired against
    // on real hardware.
    let led_pin = Box::new(MockPin::new(env.led_pin, Level::Low));
    let next_pin = Box::new(MockPin::new(env.button_next_pin, Level::High));
    let prev_pin = Box::new(MockPin::new(env.button_prev_pin, Level::High));
    let pause_pin = Box::new(MockPin::new(env.button_pause_pin, Level::High));
    let device = MockDeviceWatcher::new()?;

    let supervisor = Supervisor::new(signal_fd, &env, led_pin, next_pin, prev_pin, pause_pin, device)?;
    supervisor.run()
}

fn main() {
    match run() {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            log::error!("startup failed: {e}");
            std::process::exit(1);
        }
    }
}
