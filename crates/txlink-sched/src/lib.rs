//! Module Protocol Scheduler
//!
//! This crate keeps the radio link of a transmitter alive: it decides which
//! pulse protocol each module bay must run, switches drivers when that
//! changes, and paces the mixer computation to the frame period the active
//! protocols need.
//!
//! # Architecture
//!
//! - [`ProtocolResolver`] maps the configured module type to a protocol,
//!   applying the DSM2 bind settle guard and the global pause
//! - [`PulseEngine`] owns the per-slot lifecycle: stop the old driver, start
//!   the new one, program the scheduler period, build frames
//! - [`MixerTask`] is the real-time loop: wait for the trigger, compute the
//!   outputs, kick the watchdog, dispatch the pulled frames
//! - [`LinkHandle`] is the control surface used by the UI (bind, modes,
//!   pause, failsafe capture)
//!
//! Hardware is reached only through the traits in [`hal`].
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::{Arc, Mutex, RwLock};
//! use txlink_sched::{LinkConfig, PulseEngine};
//! use txlink_protocol::{ModelSettings, ModuleSlot};
//!
//! let config = LinkConfig::default();
//! let model = Arc::new(RwLock::new(ModelSettings::default()));
//! let engine = PulseEngine::new(&config, model, scheduler, clock)
//!     .with_driver(ModuleSlot::External, driver);
//! let engine = Arc::new(Mutex::new(engine));
//! ```

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod events;
pub mod failsafe;
pub mod hal;
pub mod handle;
pub mod mixer;
pub mod resolver;
pub mod state;

pub use config::LinkConfig;
pub use engine::{PulseEngine, SlotStatus};
pub use error::LinkError;
pub use events::LinkEvent;
pub use failsafe::capture_failsafe;
pub use hal::{
    Clock, FrameRequest, MixerComputation, MixerTrigger, ModuleDriver, ModuleSyncStatus,
    PeriodicHook, PowerControl, PowerState, SchedulerControl, SystemClock, TelemetryService,
    Watchdog,
};
pub use handle::LinkHandle;
pub use mixer::{
    ForcePowerOff, LinkStatus, MixerDiagnostics, MixerExit, MixerPeripherals, MixerTask,
};
pub use resolver::{map_protocol, ProtocolResolver, Resolution, ResolveInput};
pub use state::{
    BindDestination, BindInformation, BindOutcome, BindTicket, Heartbeat, ModuleState,
    SharedEngine, SharedModel, SharedOutputs,
};
