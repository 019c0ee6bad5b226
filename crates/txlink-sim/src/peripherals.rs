//! Simulated cycle peripherals: computation, telemetry, power, watchdog,
//! module sync status and periodic hooks

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use txlink_protocol::ChannelOutputs;
use txlink_sched::{
    MixerComputation, ModuleSyncStatus, PeriodicHook, PowerControl, PowerState, TelemetryService,
    Watchdog,
};

use crate::clock::SimClock;
use crate::lock;

/// Shared call counter
#[derive(Debug, Clone, Default)]
pub struct Counter(Arc<AtomicU64>);

impl Counter {
    /// Counter at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Current count
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    fn increment(&self) {
        self.0.fetch_add(1, Ordering::AcqRel);
    }
}

/// Stick positions fed into the simulated computation
pub type SimSticks = Arc<Mutex<ChannelOutputs>>;

/// Computation that copies the sticks to the outputs and takes a fixed time
#[derive(Debug)]
pub struct FixedDurationMixer {
    clock: Arc<SimClock>,
    duration_us: u32,
    sticks: SimSticks,
    runs: Counter,
}

impl FixedDurationMixer {
    /// Every run advances `clock` by `duration_us`
    pub fn new(clock: Arc<SimClock>, duration_us: u32, sticks: SimSticks) -> Self {
        Self {
            clock,
            duration_us,
            sticks,
            runs: Counter::new(),
        }
    }

    /// Run counter
    pub fn runs(&self) -> Counter {
        self.runs.clone()
    }
}

impl MixerComputation for FixedDurationMixer {
    fn run_once(&mut self, outputs: &mut ChannelOutputs) {
        *outputs = *lock(&self.sticks);
        self.clock.advance_micros(self.duration_us);
        self.runs.increment();
    }
}

/// Telemetry that counts its polls
#[derive(Debug, Clone, Default)]
pub struct CountingTelemetry(pub Counter);

impl TelemetryService for CountingTelemetry {
    fn wakeup(&mut self) {
        self.0.increment();
    }
}

/// Watchdog that counts its kicks
#[derive(Debug, Clone, Default)]
pub struct CountingWatchdog(pub Counter);

impl Watchdog for CountingWatchdog {
    fn reset(&mut self) {
        self.0.increment();
    }
}

/// Periodic hook that counts its runs
#[derive(Debug, Clone)]
pub struct CountingHook {
    name: String,
    runs: Counter,
}

impl CountingHook {
    /// Hook with a log name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            runs: Counter::new(),
        }
    }

    /// Run counter
    pub fn runs(&self) -> Counter {
        self.runs.clone()
    }
}

impl PeriodicHook for CountingHook {
    fn name(&self) -> &str {
        &self.name
    }

    fn wakeup(&mut self) {
        self.runs.increment();
    }
}

#[derive(Debug)]
struct PowerInner {
    button: AtomicBool,
    state: Mutex<PowerState>,
    shutdowns: Counter,
}

/// Power switch; clones share state
#[derive(Debug, Clone)]
pub struct SimPower {
    inner: Arc<PowerInner>,
}

impl Default for SimPower {
    fn default() -> Self {
        Self::new()
    }
}

impl SimPower {
    /// Powered on, button released
    pub fn new() -> Self {
        Self {
            inner: Arc::new(PowerInner {
                button: AtomicBool::new(false),
                state: Mutex::new(PowerState::On),
                shutdowns: Counter::new(),
            }),
        }
    }

    /// Hold the power button down
    pub fn press_button(&self) {
        self.inner.button.store(true, Ordering::Release);
    }

    /// Release the power button
    pub fn release_button(&self) {
        self.inner.button.store(false, Ordering::Release);
    }

    /// Make the power state machine report `state`
    pub fn set_state(&self, state: PowerState) {
        *lock(&self.inner.state) = state;
    }

    /// Number of board shutdowns
    pub fn shutdowns(&self) -> u64 {
        self.inner.shutdowns.get()
    }
}

impl PowerControl for SimPower {
    fn check(&mut self) -> PowerState {
        *lock(&self.inner.state)
    }

    fn power_button_pressed(&self) -> bool {
        self.inner.button.load(Ordering::Acquire)
    }

    fn shutdown(&mut self) {
        self.inner.shutdowns.increment();
    }
}

/// Module-reported refresh rate; clones share state
#[derive(Debug, Clone, Default)]
pub struct SimSyncStatus(Arc<Mutex<Option<u32>>>);

impl SimSyncStatus {
    /// No report yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Module reports `period_us`
    pub fn report(&self, period_us: u32) {
        *lock(&self.0) = Some(period_us);
    }

    /// Report lost
    pub fn invalidate(&self) {
        *lock(&self.0) = None;
    }
}

impl ModuleSyncStatus for SimSyncStatus {
    fn is_valid(&self) -> bool {
        lock(&self.0).is_some()
    }

    fn adjusted_refresh_rate(&self) -> u32 {
        lock(&self.0).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use txlink_sched::Clock;

    #[test]
    fn test_fixed_duration_mixer_advances_clock() {
        let clock = Arc::new(SimClock::new());
        let sticks = SimSticks::default();
        lock(&sticks).as_mut_slice()[0] = 512;

        let mut mixer = FixedDurationMixer::new(clock.clone(), 700, sticks);
        let runs = mixer.runs();
        let mut outputs = ChannelOutputs::default();
        mixer.run_once(&mut outputs);
        mixer.run_once(&mut outputs);

        assert_eq!(outputs.get(0), Some(512));
        assert_eq!(clock.micros(), 1_400);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn test_hook_counts_wakeups() {
        let mut hook = CountingHook::new("aux-link");
        let runs = hook.runs();
        hook.wakeup();
        hook.wakeup();
        assert_eq!(hook.name(), "aux-link");
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn test_sync_status_report() {
        let status = SimSyncStatus::new();
        assert!(!status.is_valid());
        status.report(6_500);
        assert!(status.is_valid());
        assert_eq!(status.adjusted_refresh_rate(), 6_500);
        status.invalidate();
        assert!(!status.is_valid());
    }
}
