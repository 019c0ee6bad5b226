//! Free-running port for pushed protocols
//!
//! On hardware a pushed protocol (PPM, PXX1 pulses) runs from the timer and
//! the end-of-buffer interrupt asks for the next frame. Here a task sleeps
//! for the slot period and calls [`PulseEngine::refill_pushed`] in its place.
//!
//! [`PulseEngine::refill_pushed`]: txlink_sched::PulseEngine::refill_pushed

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::trace;
use txlink_protocol::ModuleSlot;
use txlink_sched::SharedEngine;

use crate::lock;

/// Poll interval while the slot has no period
pub const IDLE_POLL: Duration = Duration::from_millis(10);

/// Spawn the refill loop of one slot; runs until aborted
pub fn spawn_pushed_port(engine: SharedEngine, slot: ModuleSlot) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let period = lock(&engine).period(slot);
            let wait = if period == 0 {
                IDLE_POLL
            } else {
                Duration::from_micros(u64::from(period))
            };
            sleep(wait).await;

            if lock(&engine).refill_pushed(slot) {
                trace!("{} port: pushed frame", slot);
            }
        }
    })
}
