//! Periodic fault-poll task glue.
//!
//! The firmware image spawns [`fault_poll_loop`] on its executor next to
//! the task that handles user-triggered volume/mute/EQ operations. Both
//! reach the driver through the same `embassy_sync::Mutex`, so a poll tick
//! (which may run a multi-register recovery cycle) can never interleave
//! with a user operation on the bus.
//!
//! The loop is fire-and-forget: a tick that lands late because the mutex
//! was held is simply a late tick, and a tick that observes a bus failure
//! leaves the error absorbed in the device phase for the next tick to
//! retry. Nothing here ever unwinds into the executor.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::{Duration, Ticker};
use embedded_hal::digital::OutputPin;
use embedded_hal_async::i2c::I2c;

use crate::driver::Tas58xx;

/// Default poll cadence.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Drive [`Tas58xx::poll_faults`] forever on a fixed interval.
pub async fn fault_poll_loop<M, I2C, P>(
    driver: &Mutex<M, Tas58xx<I2C, P>>,
    interval: Duration,
) -> !
where
    M: RawMutex,
    I2C: I2c,
    P: OutputPin,
{
    let mut ticker = Ticker::every(interval);
    loop {
        ticker.next().await;
        let mut driver = driver.lock().await;
        // Outcome is absorbed into the device phase; observers read it
        // from there. A bus error here is retried on the next tick.
        let _ = driver.poll_faults().await;
    }
}
