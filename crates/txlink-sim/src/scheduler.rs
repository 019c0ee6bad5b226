//! Simulated mixer scheduler timer
//!
//! Two sources fire the mixer trigger: the timer itself while running, and
//! the heartbeat line of an internal module that paces its own frames. The
//! engine stops the timer when such a module starts, so from then on the
//! heartbeat alone drives the loop.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::sleep;
use txlink_protocol::{ModuleSlot, NUM_MODULES};
use txlink_sched::{MixerTrigger, SchedulerControl};

use crate::lock;

/// Most recent `set_period` calls kept for inspection
pub const HISTORY_CAPACITY: usize = 256;

#[derive(Debug, Default)]
struct SchedulerState {
    initialised: bool,
    running: bool,
    periods: [u32; NUM_MODULES],
    module_heartbeat: Option<u32>,
    history: VecDeque<(ModuleSlot, u32)>,
    starts: u32,
    stops: u32,
    waits: u64,
}

/// Scheduler timer on tokio time
///
/// Clones share state: one clone goes to the engine as [`SchedulerControl`],
/// one to the mixer task as [`MixerTrigger`], and tests keep a third to
/// observe the programmed periods. While running, a trigger fires after the
/// shortest non-zero slot period, or sooner if a module heartbeat is faster.
#[derive(Debug, Clone, Default)]
pub struct SimScheduler {
    inner: Arc<Mutex<SchedulerState>>,
}

impl SimScheduler {
    /// Stopped scheduler with no periods
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether the timer is running
    pub fn is_running(&self) -> bool {
        lock(&self.inner).running
    }

    /// Returns whether `init` was called
    pub fn is_initialised(&self) -> bool {
        lock(&self.inner).initialised
    }

    /// Period last programmed for a slot (µs)
    pub fn period(&self, slot: ModuleSlot) -> u32 {
        lock(&self.inner).periods[slot.index()]
    }

    /// The last [`HISTORY_CAPACITY`] `set_period` calls, oldest first
    pub fn history(&self) -> Vec<(ModuleSlot, u32)> {
        lock(&self.inner).history.iter().copied().collect()
    }

    /// Heartbeat of the internal module (µs), `None` while it is silent
    pub fn set_module_heartbeat(&self, period_us: Option<u32>) {
        lock(&self.inner).module_heartbeat = period_us.filter(|period| *period > 0);
    }

    /// Number of `start` and `stop` calls
    pub fn start_stop_counts(&self) -> (u32, u32) {
        let state = lock(&self.inner);
        (state.starts, state.stops)
    }

    /// Number of trigger waits
    pub fn waits(&self) -> u64 {
        lock(&self.inner).waits
    }

    /// Trigger period in effect, `None` when nothing would fire
    pub fn trigger_period(&self) -> Option<Duration> {
        let state = lock(&self.inner);
        let timer = state
            .periods
            .iter()
            .copied()
            .filter(|period| state.running && *period > 0)
            .min();
        timer
            .into_iter()
            .chain(state.module_heartbeat)
            .min()
            .map(|period| Duration::from_micros(u64::from(period)))
    }
}

impl SchedulerControl for SimScheduler {
    fn init(&mut self) {
        lock(&self.inner).initialised = true;
    }

    fn start(&mut self) {
        let mut state = lock(&self.inner);
        state.running = true;
        state.starts += 1;
    }

    fn stop(&mut self) {
        let mut state = lock(&self.inner);
        state.running = false;
        state.stops += 1;
    }

    fn set_period(&mut self, slot: ModuleSlot, period_us: u32) {
        let mut state = lock(&self.inner);
        state.periods[slot.index()] = period_us;
        if state.history.len() == HISTORY_CAPACITY {
            state.history.pop_front();
        }
        state.history.push_back((slot, period_us));
    }
}

impl MixerTrigger for SimScheduler {
    fn enable_trigger(&mut self) {}

    fn wait_for_trigger(&mut self, timeout: Duration) -> impl Future<Output = bool> + Send {
        lock(&self.inner).waits += 1;
        let period = self.trigger_period();
        async move {
            match period {
                Some(period) if period <= timeout => {
                    sleep(period).await;
                    false
                }
                _ => {
                    sleep(timeout).await;
                    true
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_period_uses_shortest_nonzero() {
        let mut scheduler = SimScheduler::new();
        scheduler.set_period(ModuleSlot::Internal, 9_000);
        scheduler.set_period(ModuleSlot::External, 4_000);
        assert_eq!(scheduler.trigger_period(), None);

        scheduler.start();
        assert_eq!(scheduler.trigger_period(), Some(Duration::from_micros(4_000)));

        scheduler.set_period(ModuleSlot::External, 0);
        assert_eq!(scheduler.trigger_period(), Some(Duration::from_micros(9_000)));
        assert_eq!(scheduler.history().len(), 3);
    }

    #[test]
    fn test_module_heartbeat_fires_while_stopped() {
        let mut scheduler = SimScheduler::new();
        scheduler.set_period(ModuleSlot::External, 22_000);
        scheduler.set_module_heartbeat(Some(9_000));
        assert_eq!(scheduler.trigger_period(), Some(Duration::from_micros(9_000)));

        scheduler.start();
        scheduler.set_period(ModuleSlot::External, 4_000);
        assert_eq!(scheduler.trigger_period(), Some(Duration::from_micros(4_000)));

        scheduler.stop();
        scheduler.set_module_heartbeat(None);
        assert_eq!(scheduler.trigger_period(), None);
        assert_eq!(scheduler.start_stop_counts(), (1, 1));
    }

    #[test]
    fn test_history_keeps_latest_calls() {
        let mut scheduler = SimScheduler::new();
        for period in 0..(HISTORY_CAPACITY as u32 + 10) {
            scheduler.set_period(ModuleSlot::External, period);
        }

        let history = scheduler.history();
        assert_eq!(history.len(), HISTORY_CAPACITY);
        assert_eq!(history.first(), Some(&(ModuleSlot::External, 10)));
        assert_eq!(
            history.last(),
            Some(&(ModuleSlot::External, HISTORY_CAPACITY as u32 + 9))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_without_period() {
        let mut scheduler = SimScheduler::new();
        scheduler.start();
        assert!(scheduler.wait_for_trigger(Duration::from_millis(30)).await);

        scheduler.set_period(ModuleSlot::External, 22_000);
        let started = tokio::time::Instant::now();
        assert!(!scheduler.wait_for_trigger(Duration::from_millis(30)).await);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(22) && elapsed < Duration::from_millis(30));
        assert_eq!(scheduler.waits(), 2);
    }
}
