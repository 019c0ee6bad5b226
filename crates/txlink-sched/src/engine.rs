//! Pulse engine: per-slot protocol lifecycle
//!
//! Once per cycle, for each slot serviced, the engine resolves the required
//! protocol and compares it with the one currently running:
//!
//! - **Changed**: stop the old driver, record the new protocol, start the new
//!   driver and program its start period. Nothing is transmitted this cycle.
//! - **Unchanged**: re-apply the steady-state period and let the driver build
//!   the next frame. The driver's answer says whether it can be sent now.
//!
//! The engine is shared behind a mutex between the mixer loop, the pushed
//! transfer path and the UI surface. It never blocks and never awaits.

use std::sync::Arc;

use tracing::{debug, info};
use txlink_protocol::{
    BoardCapabilities, ChannelOutputs, ModuleMode, ModuleSettings, ModuleSlot, PeriodPolicy,
    ProtocolId, ProtocolProfile, NUM_MODULES,
};

use crate::config::LinkConfig;
use crate::error::LinkError;
use crate::events::LinkEvent;
use crate::hal::{Clock, FrameRequest, ModuleDriver, ModuleSyncStatus, SchedulerControl};
use crate::resolver::{ProtocolResolver, ResolveInput, Resolution};
use crate::state::{read, BindDestination, BindTicket, Heartbeat, ModuleState, SharedModel};

/// Snapshot of one slot for status displays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotStatus {
    /// Slot
    pub slot: ModuleSlot,
    /// Protocol currently running
    pub protocol: ProtocolId,
    /// Current mode
    pub mode: ModuleMode,
    /// Last period programmed for this slot (µs)
    pub period_us: u32,
    /// Microsecond counter value the next trigger is due at
    pub next_mixer_time_us: u32,
}

/// Lifecycle controller of both module slots
pub struct PulseEngine {
    board: BoardCapabilities,
    model: SharedModel,
    clock: Arc<dyn Clock>,
    resolver: ProtocolResolver,
    modules: [ModuleState; NUM_MODULES],
    drivers: [Option<Box<dyn ModuleDriver>>; NUM_MODULES],
    sync_status: [Option<Box<dyn ModuleSyncStatus>>; NUM_MODULES],
    scheduler: Box<dyn SchedulerControl>,
    /// Last period programmed per slot (µs)
    periods: [u32; NUM_MODULES],
    /// Microsecond timestamp the next trigger is expected at, per slot
    next_mixer_time: [u32; NUM_MODULES],
    paused: bool,
    channels: ChannelOutputs,
    heartbeat: Arc<Heartbeat>,
    /// Event buffer for pending events
    events: Vec<LinkEvent>,
}

impl std::fmt::Debug for PulseEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PulseEngine")
            .field("modules", &self.modules)
            .field("periods", &self.periods)
            .field("paused", &self.paused)
            .finish_non_exhaustive()
    }
}

impl PulseEngine {
    /// Create an engine; attach drivers with [`with_driver`](Self::with_driver)
    pub fn new(
        config: &LinkConfig,
        model: SharedModel,
        scheduler: Box<dyn SchedulerControl>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            board: config.board.clone(),
            model,
            clock,
            resolver: ProtocolResolver::new(config.bind_settle_ticks),
            modules: ModuleSlot::ALL.map(ModuleState::new),
            drivers: [None, None],
            sync_status: [None, None],
            scheduler,
            periods: [0; NUM_MODULES],
            next_mixer_time: [0; NUM_MODULES],
            paused: false,
            channels: ChannelOutputs::default(),
            heartbeat: Arc::new(Heartbeat::new()),
            events: Vec::new(),
        }
    }

    /// Attach the pulse driver of a bay
    ///
    /// The internal driver is ignored on boards without an internal module.
    pub fn with_driver(mut self, slot: ModuleSlot, driver: Box<dyn ModuleDriver>) -> Self {
        if slot == ModuleSlot::Internal && !self.board.has_internal_module() {
            debug!("Board has no internal module, ignoring driver");
            return self;
        }
        self.drivers[slot.index()] = Some(driver);
        self
    }

    /// Attach the sync status source of a bay
    pub fn with_sync_status(mut self, slot: ModuleSlot, status: Box<dyn ModuleSyncStatus>) -> Self {
        self.sync_status[slot.index()] = Some(status);
        self
    }

    /// Board link hardware
    pub fn board(&self) -> &BoardCapabilities {
        &self.board
    }

    /// Model settings read every cycle
    pub fn model(&self) -> SharedModel {
        Arc::clone(&self.model)
    }

    /// Clock shared with the mixer task
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Watchdog heartbeat marked by every pulse setup
    pub fn heartbeat(&self) -> Arc<Heartbeat> {
        Arc::clone(&self.heartbeat)
    }

    /// Returns whether a slot has a driver attached
    pub fn has_slot(&self, slot: ModuleSlot) -> bool {
        self.drivers[slot.index()].is_some()
    }

    /// Runtime record of a slot
    pub fn module(&self, slot: ModuleSlot) -> &ModuleState {
        &self.modules[slot.index()]
    }

    /// Protocol currently running on a slot
    pub fn active_protocol(&self, slot: ModuleSlot) -> ProtocolId {
        self.modules[slot.index()].protocol()
    }

    /// Last period programmed for a slot (µs)
    pub fn period(&self, slot: ModuleSlot) -> u32 {
        self.periods[slot.index()]
    }

    /// Status of every slot
    pub fn slot_status(&self) -> [SlotStatus; NUM_MODULES] {
        ModuleSlot::ALL.map(|slot| SlotStatus {
            slot,
            protocol: self.active_protocol(slot),
            mode: self.modules[slot.index()].mode(),
            period_us: self.period(slot),
            next_mixer_time_us: self.next_mixer_time[slot.index()],
        })
    }

    /// Latest channel outputs seen by the drivers
    pub fn channels(&self) -> &ChannelOutputs {
        &self.channels
    }

    /// Hand the latest mixer outputs to the drivers
    pub fn update_channels(&mut self, outputs: &ChannelOutputs) {
        self.channels = *outputs;
    }

    /// Prepare and start the scheduler timer
    pub fn start_scheduler(&mut self) {
        self.scheduler.init();
        self.scheduler.start();
    }

    // -------------------------------------------------------------------------
    // Pause control
    // -------------------------------------------------------------------------

    /// Force every slot to `None` until resumed
    pub fn pause_pulses(&mut self) {
        if !self.paused {
            info!("Pulses paused");
            self.paused = true;
            self.events.push(LinkEvent::PulsesPaused);
        }
    }

    /// Resume pulse generation
    pub fn resume_pulses(&mut self) {
        if self.paused {
            info!("Pulses resumed");
            self.paused = false;
            self.events.push(LinkEvent::PulsesResumed);
        }
    }

    /// Returns whether pulses are paused
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    // -------------------------------------------------------------------------
    // Mode and bind control
    // -------------------------------------------------------------------------

    /// Change the mode of a slot
    pub fn set_mode(&mut self, slot: ModuleSlot, mode: ModuleMode) -> Result<(), LinkError> {
        self.require_slot(slot)?;
        let module = &mut self.modules[slot.index()];
        if module.mode() != mode {
            module.set_mode(mode);
            info!("{} module mode: {:?}", slot, mode);
            self.events.push(LinkEvent::ModeChanged { slot, mode });
        }
        Ok(())
    }

    /// Put a slot into bind mode
    ///
    /// The driver fills `destination` with candidate receivers and reports
    /// the outcome through the returned ticket.
    pub fn start_bind(
        &mut self,
        slot: ModuleSlot,
        destination: BindDestination,
    ) -> Result<BindTicket, LinkError> {
        self.require_slot(slot)?;
        let ticket = self.modules[slot.index()].start_bind(destination);
        info!("{} module: bind started", slot);
        self.events.push(LinkEvent::BindStarted { slot });
        Ok(ticket)
    }

    fn require_slot(&self, slot: ModuleSlot) -> Result<(), LinkError> {
        if self.has_slot(slot) {
            Ok(())
        } else {
            Err(LinkError::SlotUnavailable(slot))
        }
    }

    // -------------------------------------------------------------------------
    // Protocol resolution
    // -------------------------------------------------------------------------

    /// Protocol the slot should run now, without side effects
    pub fn required_protocol(&self, slot: ModuleSlot) -> ProtocolId {
        let settings = self.settings(slot);
        let input = ResolveInput {
            board: &self.board,
            settings: &settings,
            mode: self.modules[slot.index()].mode(),
            paused: self.paused,
            now_ticks: self.clock.ticks_10ms(),
        };
        self.resolver.peek(slot, input)
    }

    fn settings(&self, slot: ModuleSlot) -> ModuleSettings {
        *read(&self.model).module(slot)
    }

    fn resolve(&mut self, slot: ModuleSlot, settings: &ModuleSettings) -> Resolution {
        let input = ResolveInput {
            board: &self.board,
            settings,
            mode: self.modules[slot.index()].mode(),
            paused: self.paused,
            now_ticks: self.clock.ticks_10ms(),
        };
        self.resolver.resolve(slot, input)
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Per-slot setup, run once per serviced cycle
    ///
    /// Returns `true` when a frame is ready to send.
    pub fn run_slot(&mut self, slot: ModuleSlot) -> bool {
        if !self.has_slot(slot) {
            return false;
        }

        self.heartbeat.mark_pulses(slot);

        let settings = self.settings(slot);
        let resolution = self.resolve(slot, &settings);

        if resolution.protocol != self.active_protocol(slot) {
            self.transition(slot, resolution, &settings);
            false
        } else {
            self.setup_frame(slot, resolution.protocol, &settings)
        }
    }

    fn transition(&mut self, slot: ModuleSlot, resolution: Resolution, settings: &ModuleSettings) {
        let index = slot.index();
        let from = self.modules[index].protocol();
        let to = resolution.protocol;

        if let Some(driver) = self.drivers[index].as_mut() {
            driver.stop();
        }
        self.modules[index].set_protocol(to);

        // A disabled slot drops back to normal mode, except while a DSM2
        // bind is settling: the slot must come back in bind mode.
        let reset = to == ProtocolId::None
            && !resolution.settling
            && self.modules[index].mode() != ModuleMode::Normal;
        if reset {
            self.modules[index].reset();
            self.events.push(LinkEvent::ModeChanged {
                slot,
                mode: ModuleMode::Normal,
            });
        }

        info!("{} module: {} -> {}", slot, from, to);
        self.events.push(LinkEvent::ProtocolChanged { slot, from, to });

        self.enable(slot, to, settings);
    }

    fn enable(&mut self, slot: ModuleSlot, protocol: ProtocolId, settings: &ModuleSettings) {
        let profile = ProtocolProfile::lookup(slot, protocol, &self.board);

        if let (Some(port), Some(driver)) = (profile.port, self.drivers[slot.index()].as_mut()) {
            driver.start(protocol, &port);
        }

        match profile.start_period {
            PeriodPolicy::ModuleHeartbeat => {
                if slot == ModuleSlot::Internal {
                    debug!("Internal module heartbeat paces frames, stopping scheduler");
                    self.scheduler.stop();
                }
            }
            policy => {
                if let Some(period) = policy.resolve(settings, None) {
                    self.set_period(slot, period);
                }
                if slot == ModuleSlot::Internal {
                    self.scheduler.start();
                }
            }
        }
    }

    fn setup_frame(
        &mut self,
        slot: ModuleSlot,
        protocol: ProtocolId,
        settings: &ModuleSettings,
    ) -> bool {
        let index = slot.index();
        let profile = ProtocolProfile::lookup(slot, protocol, &self.board);

        let tools_period = profile
            .rf_tools_period
            .filter(|_| self.modules[index].mode().is_rf_tool());
        let period = match tools_period {
            Some(period) => Some(period),
            None => profile
                .steady_period
                .and_then(|policy| policy.resolve(settings, self.synced_rate(slot))),
        };
        if let Some(period) = period {
            self.set_period(slot, period);
        }

        if protocol == ProtocolId::None {
            return false;
        }

        let Some(driver) = self.drivers[index].as_mut() else {
            return false;
        };
        driver.setup_frame(FrameRequest {
            slot,
            protocol,
            settings,
            channels: &self.channels,
            module: &mut self.modules[index],
        })
    }

    fn synced_rate(&self, slot: ModuleSlot) -> Option<u32> {
        self.sync_status[slot.index()]
            .as_ref()
            .filter(|status| status.is_valid())
            .map(|status| status.adjusted_refresh_rate())
    }

    fn set_period(&mut self, slot: ModuleSlot, period_us: u32) {
        let index = slot.index();
        if self.periods[index] != period_us {
            debug!("{} module period: {} us", slot, period_us);
        }
        self.scheduler.set_period(slot, period_us);
        self.periods[index] = period_us;
        self.next_mixer_time[index] = self.clock.micros().wrapping_add(period_us);
    }

    /// Send the frame prepared by the last setup of a slot
    pub(crate) fn send_next_frame(&mut self, slot: ModuleSlot) {
        if let Some(driver) = self.drivers[slot.index()].as_mut() {
            driver.send_next_frame();
        }
    }

    /// Take all pending events
    pub fn drain_events(&mut self) -> Vec<LinkEvent> {
        std::mem::take(&mut self.events)
    }
}
