//! Collaborator contracts
//!
//! The scheduler drives hardware it does not implement. Every board primitive
//! it touches is behind one of these traits: the mixer scheduler timer, the
//! per-bay pulse drivers, module sync status, the mixer computation,
//! telemetry, power, watchdog and the small periodic hooks that must run once
//! per cycle. `txlink-sim` provides host implementations of all of them.

use std::future::Future;
use std::time::{Duration, Instant};

use txlink_protocol::{ChannelOutputs, ModuleSettings, ModuleSlot, PortSetup, ProtocolId};

use crate::state::ModuleState;

/// Time sources used by the scheduler
pub trait Clock: Send + Sync {
    /// System tick counter in 10 ms units (wrapping)
    fn ticks_10ms(&self) -> u32;

    /// Free-running microsecond counter (wrapping)
    fn micros(&self) -> u32;
}

/// [`Clock`] backed by the host monotonic clock
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Start counting from now
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn ticks_10ms(&self) -> u32 {
        (self.origin.elapsed().as_millis() / 10) as u32
    }

    fn micros(&self) -> u32 {
        self.origin.elapsed().as_micros() as u32
    }
}

/// Control side of the mixer scheduler timer
///
/// Period writes are last-writer-wins and take effect for the next trigger.
pub trait SchedulerControl: Send {
    /// Prepare the timer
    fn init(&mut self);

    /// Start firing triggers
    fn start(&mut self);

    /// Stop firing triggers
    fn stop(&mut self);

    /// Program the trigger period requested by a slot (µs, 0 = none)
    fn set_period(&mut self, slot: ModuleSlot, period_us: u32);
}

/// Waiting side of the mixer scheduler timer
pub trait MixerTrigger: Send {
    /// Re-arm the trigger after a wait returned
    fn enable_trigger(&mut self);

    /// Wait for the next trigger; resolves to `true` when `timeout` elapsed first
    fn wait_for_trigger(&mut self, timeout: Duration) -> impl Future<Output = bool> + Send;
}

/// Everything a driver needs to build one outgoing frame
pub struct FrameRequest<'a> {
    /// Slot the frame is for
    pub slot: ModuleSlot,
    /// Protocol to encode
    pub protocol: ProtocolId,
    /// Fine-grained module settings (sub-protocol, channel range, ...)
    pub settings: &'a ModuleSettings,
    /// Latest mixer outputs
    pub channels: &'a ChannelOutputs,
    /// Module record, for mode and bind session handling
    pub module: &'a mut ModuleState,
}

/// Pulse driver of one module bay
pub trait ModuleDriver: Send {
    /// Bring up the bay port for `protocol`
    fn start(&mut self, protocol: ProtocolId, port: &PortSetup);

    /// Stop the bay port; must be safe to call when nothing runs
    fn stop(&mut self);

    /// Build the next frame into the pulse buffer; `true` when it can be sent now
    fn setup_frame(&mut self, frame: FrameRequest<'_>) -> bool;

    /// Hand the prepared buffer to the transmitter
    fn send_next_frame(&mut self);
}

/// Refresh rate negotiated by a module that reports its own timing
pub trait ModuleSyncStatus: Send {
    /// Whether a recent sync report exists
    fn is_valid(&self) -> bool;

    /// Period the module asks for (µs)
    fn adjusted_refresh_rate(&self) -> u32;
}

/// The control-value computation ("mixer")
pub trait MixerComputation: Send {
    /// Recompute every channel output
    fn run_once(&mut self, outputs: &mut ChannelOutputs);
}

/// Telemetry servicing, polled once per cycle
pub trait TelemetryService: Send {
    /// Non-blocking poll
    fn wakeup(&mut self);
}

/// Result of the power state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    /// Running
    On,
    /// Power button held, shutdown not yet confirmed
    OffRequested,
    /// Shutdown confirmed
    OffConfirmed,
}

/// Power switch and board shutdown
pub trait PowerControl: Send {
    /// Advance the normal power state machine
    fn check(&mut self) -> PowerState;

    /// Raw power button state
    fn power_button_pressed(&self) -> bool;

    /// Turn the board off
    fn shutdown(&mut self);
}

/// Hardware watchdog
pub trait Watchdog: Send {
    /// Kick the watchdog
    fn reset(&mut self);
}

/// Bounded work that runs at the top of every mixer cycle
///
/// Used for the auxiliary short-range link, sensor sampling and trainer input.
pub trait PeriodicHook: Send {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Service the hook; must not block
    fn wakeup(&mut self);
}
