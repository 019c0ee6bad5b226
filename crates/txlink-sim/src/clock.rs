//! Simulated time sources

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use txlink_sched::{Clock, Heartbeat};

/// Length of one system tick
pub const SYSTEM_TICK: Duration = Duration::from_millis(10);

/// Manually driven clock
///
/// The 10 ms tick counter is advanced by the system tick task, the
/// microsecond counter by whoever simulates work (the mixer computation).
#[derive(Debug, Default)]
pub struct SimClock {
    ticks: AtomicU32,
    micros: AtomicU32,
}

impl SimClock {
    /// Clock at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the 10 ms tick counter
    pub fn advance_ticks(&self, ticks: u32) {
        self.ticks.fetch_add(ticks, Ordering::AcqRel);
    }

    /// Set the 10 ms tick counter
    pub fn set_ticks(&self, ticks: u32) {
        self.ticks.store(ticks, Ordering::Release);
    }

    /// Advance the microsecond counter
    pub fn advance_micros(&self, micros: u32) {
        self.micros.fetch_add(micros, Ordering::AcqRel);
    }
}

impl Clock for SimClock {
    fn ticks_10ms(&self) -> u32 {
        self.ticks.load(Ordering::Acquire)
    }

    fn micros(&self) -> u32 {
        self.micros.load(Ordering::Acquire)
    }
}

/// Spawn the 10 ms system tick
///
/// Every tick advances the clock and marks the timer bit of the heartbeat.
/// Runs until aborted.
pub fn spawn_system_tick(clock: Arc<SimClock>, heartbeat: Arc<Heartbeat>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(SYSTEM_TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            clock.advance_ticks(1);
            heartbeat.mark_timer_tick();
        }
    })
}
