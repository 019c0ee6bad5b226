//! Mixer Task
//!
//! The real-time loop that paces the whole link. Each cycle:
//!
//! 1. Run the periodic hooks (aux link, sensors, trainer input)
//! 2. Wait for the scheduler trigger, at most the trigger timeout
//! 3. Re-arm the trigger
//! 4. Check the power switch; an emergency hold or a confirmed power-off ends the task
//! 5. Unless pulses are paused: compute the outputs under the outputs lock,
//!    service telemetry, kick the watchdog if every heartbeat bit is present,
//!    record the cycle duration, then dispatch the synchronous frames.
//!    While paused the synchronous slots only run their lifecycle step, which
//!    stops their drivers.
//!
//! # Architecture
//!
//! The task owns the trigger and the cycle peripherals. The engine and the
//! channel outputs are shared behind mutexes with the pushed-transfer path
//! and the UI ([`LinkHandle`]). No lock is ever held across an await.
//!
//! # Example
//!
//! ```rust,ignore
//! use tokio::sync::{mpsc, oneshot};
//! use txlink_sched::MixerTask;
//!
//! let (event_tx, mut event_rx) = mpsc::channel(config.event_queue_depth);
//! let mixer = MixerTask::new(&config, engine, outputs, trigger, peripherals)
//!     .with_events(event_tx);
//! let handle = mixer.handle();
//!
//! let (shutdown_tx, shutdown_rx) = oneshot::channel();
//! tokio::spawn(mixer.run(shutdown_rx));
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, trace, warn};
use txlink_protocol::{ModuleMode, ModuleSlot, ProtocolId, NUM_MODULES};

use crate::config::LinkConfig;
use crate::engine::SlotStatus;
use crate::events::LinkEvent;
use crate::handle::LinkHandle;
use crate::hal::{
    Clock, MixerComputation, MixerTrigger, PeriodicHook, PowerControl, PowerState,
    TelemetryService, Watchdog,
};
use crate::state::{lock, Heartbeat, SharedEngine, SharedOutputs};

/// Collaborators serviced once per cycle
pub struct MixerPeripherals {
    /// Control-value computation
    pub computation: Box<dyn MixerComputation>,
    /// Telemetry polling
    pub telemetry: Box<dyn TelemetryService>,
    /// Power switch
    pub power: Box<dyn PowerControl>,
    /// Hardware watchdog
    pub watchdog: Box<dyn Watchdog>,
    /// Hooks run at the top of every cycle
    pub hooks: Vec<Box<dyn PeriodicHook>>,
}

/// Counters kept by the mixer task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MixerDiagnostics {
    /// Cycles run
    pub cycles: u64,
    /// Cycles that ran the mixer computation
    pub computed_cycles: u64,
    /// Duration of the last computed cycle (µs)
    pub last_duration_us: u32,
    /// Longest computed cycle since start (µs)
    pub max_duration_us: u32,
    /// Waits that ended on the timeout
    pub trigger_timeouts: u64,
    /// Watchdog kicks
    pub watchdog_resets: u64,
    /// Frames sent from the mixer loop
    pub frames_sent: u64,
}

impl MixerDiagnostics {
    fn record_duration(&mut self, duration_us: u32) {
        self.last_duration_us = duration_us;
        self.max_duration_us = self.max_duration_us.max(duration_us);
    }
}

/// Link status published after every cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkStatus {
    /// Per-slot state
    pub slots: [SlotStatus; NUM_MODULES],
    /// Pulses paused
    pub paused: bool,
    /// Mixer counters
    pub diagnostics: MixerDiagnostics,
}

impl Default for LinkStatus {
    fn default() -> Self {
        Self {
            slots: ModuleSlot::ALL.map(|slot| SlotStatus {
                slot,
                protocol: ProtocolId::None,
                mode: ModuleMode::Normal,
                period_us: 0,
                next_mixer_time_us: 0,
            }),
            paused: false,
            diagnostics: MixerDiagnostics::default(),
        }
    }
}

/// Why the mixer task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixerExit {
    /// Shutdown requested (or the shutdown sender was dropped)
    Shutdown,
    /// The board was turned off
    PowerOff {
        /// Emergency hold rather than the normal power state machine
        forced: bool,
    },
}

/// Emergency power-off: the power button held longer than the threshold
#[derive(Debug, Clone)]
pub struct ForcePowerOff {
    hold_ticks: u32,
    pressed_since: Option<u32>,
}

impl ForcePowerOff {
    /// Trip after `hold_ticks` 10 ms ticks of continuous press
    pub fn new(hold_ticks: u32) -> Self {
        Self {
            hold_ticks,
            pressed_since: None,
        }
    }

    /// Feed the button state; returns `true` once the hold is exceeded
    pub fn update(&mut self, pressed: bool, now_ticks: u32) -> bool {
        if !pressed {
            self.pressed_since = None;
            return false;
        }
        let since = *self.pressed_since.get_or_insert(now_ticks);
        now_ticks.wrapping_sub(since) > self.hold_ticks
    }
}

/// Only the first miss after a trigger, with pulses running, is worth a warning
fn warn_on_timeout(paused: bool, previous_missed: bool) -> bool {
    !paused && !previous_missed
}

/// The mixer loop
pub struct MixerTask<T> {
    trigger_timeout: Duration,
    engine: SharedEngine,
    outputs: SharedOutputs,
    trigger: T,
    clock: Arc<dyn Clock>,
    heartbeat: Arc<Heartbeat>,
    heartbeat_mask: u8,
    peripherals: MixerPeripherals,
    force_off: ForcePowerOff,
    diagnostics: MixerDiagnostics,
    /// The last wait timed out
    trigger_missing: bool,
    event_tx: Option<mpsc::Sender<LinkEvent>>,
    status_tx: watch::Sender<LinkStatus>,
}

impl<T: MixerTrigger> MixerTask<T> {
    /// Create the task; nothing runs until [`run`](Self::run) is awaited
    pub fn new(
        config: &LinkConfig,
        engine: SharedEngine,
        outputs: SharedOutputs,
        trigger: T,
        peripherals: MixerPeripherals,
    ) -> Self {
        let (clock, heartbeat, heartbeat_mask) = {
            let mut engine = lock(&engine);
            // Paused from construction so a resume issued before the first
            // poll of `run` is not undone
            if config.start_paused {
                engine.pause_pulses();
            }
            (
                engine.clock(),
                engine.heartbeat(),
                Heartbeat::expected_mask(engine.has_slot(ModuleSlot::Internal)),
            )
        };
        let (status_tx, _) = watch::channel(LinkStatus::default());

        Self {
            trigger_timeout: config.trigger_timeout(),
            engine,
            outputs,
            trigger,
            clock,
            heartbeat,
            heartbeat_mask,
            peripherals,
            force_off: ForcePowerOff::new(config.force_power_off_ticks),
            diagnostics: MixerDiagnostics::default(),
            trigger_missing: false,
            event_tx: None,
            status_tx,
        }
    }

    /// Forward engine events to `event_tx`
    pub fn with_events(mut self, event_tx: mpsc::Sender<LinkEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    /// Control surface for the UI
    pub fn handle(&self) -> LinkHandle {
        LinkHandle::new(
            self.engine.clone(),
            self.outputs.clone(),
            self.status_tx.subscribe(),
        )
    }

    /// Counters so far
    pub fn diagnostics(&self) -> MixerDiagnostics {
        self.diagnostics
    }

    /// Run until shutdown or power-off
    pub async fn run(mut self, mut shutdown: oneshot::Receiver<()>) -> MixerExit {
        info!("Mixer task started");

        lock(&self.engine).start_scheduler();
        self.forward_events();

        let exit = loop {
            for hook in self.peripherals.hooks.iter_mut() {
                trace!("Periodic hook {}", hook.name());
                hook.wakeup();
            }

            let timed_out = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Mixer task shutting down");
                    break MixerExit::Shutdown;
                }
                timed_out = self.trigger.wait_for_trigger(self.trigger_timeout) => timed_out,
            };

            self.trigger.enable_trigger();

            if let Some(exit) = self.check_power() {
                break exit;
            }

            self.cycle(timed_out);
        };

        info!("Mixer task stopped");
        exit
    }

    fn check_power(&mut self) -> Option<MixerExit> {
        let pressed = self.peripherals.power.power_button_pressed();
        let forced = self.force_off.update(pressed, self.clock.ticks_10ms());
        let confirmed = !forced && self.peripherals.power.check() == PowerState::OffConfirmed;

        if !forced && !confirmed {
            return None;
        }

        if forced {
            warn!("Power button held, forcing power off");
        } else {
            info!("Power off confirmed");
        }
        self.peripherals.power.shutdown();
        lock(&self.engine).pause_pulses();
        self.forward_events();
        self.emit(LinkEvent::PowerOff { forced });
        Some(MixerExit::PowerOff { forced })
    }

    fn cycle(&mut self, timed_out: bool) {
        self.diagnostics.cycles += 1;

        let paused = {
            let mut engine = lock(&self.engine);
            if engine.is_paused() {
                engine.settle_synchronous();
                true
            } else {
                false
            }
        };

        if timed_out {
            self.diagnostics.trigger_timeouts += 1;
            if warn_on_timeout(paused, self.trigger_missing) {
                warn!("Mixer scheduler trigger timed out");
            } else {
                debug!("Mixer scheduler trigger timed out");
            }
            let cycle = self.diagnostics.cycles;
            self.emit(LinkEvent::TriggerTimeout { cycle });
        }
        self.trigger_missing = timed_out;

        if !paused {
            let started = self.clock.micros();

            let snapshot = {
                let mut outputs = lock(&self.outputs);
                self.peripherals.computation.run_once(&mut outputs);
                *outputs
            };

            self.peripherals.telemetry.wakeup();

            if self.heartbeat.check_and_clear(self.heartbeat_mask) {
                self.peripherals.watchdog.reset();
                self.diagnostics.watchdog_resets += 1;
            }

            let elapsed = self.clock.micros().wrapping_sub(started);
            self.diagnostics.record_duration(elapsed);
            self.diagnostics.computed_cycles += 1;

            let sent = {
                let mut engine = lock(&self.engine);
                engine.update_channels(&snapshot);
                engine.dispatch_synchronous()
            };
            self.diagnostics.frames_sent += sent.iter().filter(|sent| **sent).count() as u64;
        }

        self.forward_events();
        self.publish_status();
    }

    fn emit(&self, event: LinkEvent) {
        if let Some(tx) = &self.event_tx {
            if tx.try_send(event).is_err() {
                debug!("Link event dropped, listener slow or gone");
            }
        }
    }

    fn forward_events(&self) {
        let events = lock(&self.engine).drain_events();
        for event in events {
            self.emit(event);
        }
    }

    fn publish_status(&self) {
        let status = {
            let engine = lock(&self.engine);
            LinkStatus {
                slots: engine.slot_status(),
                paused: engine.is_paused(),
                diagnostics: self.diagnostics,
            }
        };
        self.status_tx.send_replace(status);
    }
}
