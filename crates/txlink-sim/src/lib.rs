//! Transmitter Link Simulation Library
//!
//! This crate provides simulated hardware for exercising the link scheduler
//! without a radio. It includes:
//!
//! - **SimScheduler**: the mixer scheduler timer on tokio time, plus the
//!   internal module heartbeat line
//! - **SimModuleDriver**: a bay driver that records calls, checks that only one
//!   protocol owns the bay at a time and plays the module side of a bind
//! - **SimClock**: 10 ms tick and microsecond counters, plus the system tick task
//! - **Peripherals**: fixed-duration computation, telemetry, power switch,
//!   watchdog, module sync reports and periodic hooks
//! - **SimLink**: everything above wired to a `PulseEngine` and a `MixerTask`
//!
//! # Example
//!
//! ```rust,no_run
//! use txlink_protocol::{ModelSettings, ModuleSlot, ModuleType};
//! use txlink_sched::LinkConfig;
//! use txlink_sim::SimLinkBuilder;
//!
//! # async fn demo() -> Result<(), txlink_sim::SimError> {
//! let mut model = ModelSettings::default();
//! model.module_mut(ModuleSlot::External).module_type = ModuleType::Crossfire;
//!
//! let mut link = SimLinkBuilder::new(LinkConfig::default()).model(model).build()?;
//! let running = link.start(None)?;
//! link.handle.resume_pulses();
//!
//! tokio::time::sleep(std::time::Duration::from_millis(100)).await;
//! println!("frames sent: {}", link.driver(ModuleSlot::External).frames_sent());
//! running.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod clock;
pub mod driver;
pub mod error;
pub mod link;
pub mod peripherals;
pub mod pushed;
pub mod scheduler;

pub use clock::{spawn_system_tick, SimClock, SYSTEM_TICK};
pub use driver::{DriverCall, SimFrame, SimModuleDriver, CALL_LOG_CAPACITY, SIM_RECEIVERS};
pub use error::SimError;
pub use link::{RunningLink, SimLink, SimLinkBuilder, DEFAULT_MIXER_DURATION_US};
pub use peripherals::{
    Counter, CountingHook, CountingTelemetry, CountingWatchdog, FixedDurationMixer, SimPower,
    SimSticks, SimSyncStatus,
};
pub use pushed::spawn_pushed_port;
pub use scheduler::{SimScheduler, HISTORY_CAPACITY};

/// Lock a mutex, recovering the data if a holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
