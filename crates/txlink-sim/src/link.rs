//! A complete simulated link
//!
//! [`SimLinkBuilder`] wires the engine and the mixer task to simulated
//! hardware for both bays and keeps an observer handle on every collaborator.
//! [`SimLink::start`] spawns the mixer task together with the 10 ms system
//! tick and the pushed-port refill loops.

use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::info;
use txlink_protocol::{ModelSettings, ModuleSlot};
use txlink_sched::{
    LinkConfig, LinkEvent, LinkHandle, MixerExit, MixerPeripherals, MixerTask, PulseEngine,
    SharedEngine, SharedModel, SharedOutputs,
};

use crate::clock::{spawn_system_tick, SimClock};
use crate::driver::SimModuleDriver;
use crate::error::SimError;
use crate::lock;
use crate::peripherals::{
    Counter, CountingHook, CountingTelemetry, CountingWatchdog, FixedDurationMixer, SimPower,
    SimSticks, SimSyncStatus,
};
use crate::pushed::spawn_pushed_port;
use crate::scheduler::SimScheduler;

/// Default simulated computation time (µs)
pub const DEFAULT_MIXER_DURATION_US: u32 = 400;

/// Builder for a [`SimLink`]
#[derive(Debug, Clone)]
pub struct SimLinkBuilder {
    config: LinkConfig,
    model: ModelSettings,
    mixer_duration_us: u32,
}

impl SimLinkBuilder {
    /// Link with the given configuration and an empty model
    pub fn new(config: LinkConfig) -> Self {
        Self {
            config,
            model: ModelSettings::default(),
            mixer_duration_us: DEFAULT_MIXER_DURATION_US,
        }
    }

    /// Model to load
    pub fn model(mut self, model: ModelSettings) -> Self {
        self.model = model;
        self
    }

    /// Time every computation run takes on the simulated clock
    pub fn mixer_duration_us(mut self, duration_us: u32) -> Self {
        self.mixer_duration_us = duration_us;
        self
    }

    /// Wire everything up
    pub fn build(self) -> Result<SimLink, SimError> {
        self.model.validate()?;

        let clock = Arc::new(SimClock::new());
        let scheduler = SimScheduler::new();
        let model: SharedModel = Arc::new(RwLock::new(self.model));
        let drivers = ModuleSlot::ALL.map(|slot| {
            let driver = SimModuleDriver::new(slot);
            if slot == ModuleSlot::Internal && self.config.board.internal_heartbeat {
                driver.with_module_heartbeat(scheduler.clone())
            } else {
                driver
            }
        });
        let sync = [SimSyncStatus::new(), SimSyncStatus::new()];

        let mut engine = PulseEngine::new(
            &self.config,
            Arc::clone(&model),
            Box::new(scheduler.clone()),
            clock.clone(),
        );
        for slot in ModuleSlot::ALL {
            engine = engine
                .with_driver(slot, Box::new(drivers[slot.index()].clone()))
                .with_sync_status(slot, Box::new(sync[slot.index()].clone()));
        }
        let engine: SharedEngine = Arc::new(Mutex::new(engine));
        let outputs = SharedOutputs::default();

        let sticks = SimSticks::default();
        let computation =
            FixedDurationMixer::new(clock.clone(), self.mixer_duration_us, sticks.clone());
        let mixer_runs = computation.runs();
        let power = SimPower::new();
        let watchdog = CountingWatchdog::default();
        let telemetry = CountingTelemetry::default();
        let hook = CountingHook::new("aux-link");
        let hook_runs = hook.runs();

        let peripherals = MixerPeripherals {
            computation: Box::new(computation),
            telemetry: Box::new(telemetry.clone()),
            power: Box::new(power.clone()),
            watchdog: Box::new(watchdog.clone()),
            hooks: vec![Box::new(hook)],
        };
        let mixer = MixerTask::new(
            &self.config,
            Arc::clone(&engine),
            outputs,
            scheduler.clone(),
            peripherals,
        );
        let handle = mixer.handle();

        Ok(SimLink {
            handle,
            engine,
            model,
            scheduler,
            clock,
            drivers,
            sync,
            sticks,
            power,
            watchdog: watchdog.0,
            telemetry: telemetry.0,
            hook_runs,
            mixer_runs,
            mixer: Some(mixer),
        })
    }
}

/// Simulated link with observers on every collaborator
pub struct SimLink {
    /// Control surface
    pub handle: LinkHandle,
    /// Engine shared with the mixer task
    pub engine: SharedEngine,
    /// Model read by the engine
    pub model: SharedModel,
    /// Scheduler timer
    pub scheduler: SimScheduler,
    /// Clock
    pub clock: Arc<SimClock>,
    /// Bay drivers, indexed by slot
    pub drivers: [SimModuleDriver; 2],
    /// Module sync reports, indexed by slot
    pub sync: [SimSyncStatus; 2],
    /// Stick positions fed to the computation
    pub sticks: SimSticks,
    /// Power switch
    pub power: SimPower,
    /// Watchdog kicks
    pub watchdog: Counter,
    /// Telemetry polls
    pub telemetry: Counter,
    /// Periodic hook runs
    pub hook_runs: Counter,
    /// Computation runs
    pub mixer_runs: Counter,
    mixer: Option<MixerTask<SimScheduler>>,
}

impl SimLink {
    /// Driver of a bay
    pub fn driver(&self, slot: ModuleSlot) -> &SimModuleDriver {
        &self.drivers[slot.index()]
    }

    /// Sync report source of a bay
    pub fn sync_status(&self, slot: ModuleSlot) -> &SimSyncStatus {
        &self.sync[slot.index()]
    }

    /// Spawn the mixer task, the system tick and the pushed-port loops
    pub fn start(
        &mut self,
        events: Option<mpsc::Sender<LinkEvent>>,
    ) -> Result<RunningLink, SimError> {
        let mut mixer = self.mixer.take().ok_or(SimError::AlreadyStarted)?;
        if let Some(event_tx) = events {
            mixer = mixer.with_events(event_tx);
        }

        let (heartbeat, slots) = {
            let engine = lock(&self.engine);
            let slots: Vec<ModuleSlot> = ModuleSlot::ALL
                .into_iter()
                .filter(|slot| engine.has_slot(*slot))
                .collect();
            (engine.heartbeat(), slots)
        };

        let mut background = vec![spawn_system_tick(self.clock.clone(), heartbeat)];
        for slot in slots {
            background.push(spawn_pushed_port(Arc::clone(&self.engine), slot));
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let mixer = tokio::spawn(mixer.run(shutdown_rx));
        info!("Simulated link started");

        Ok(RunningLink {
            mixer,
            shutdown: Some(shutdown_tx),
            background,
        })
    }
}

/// Tasks of a started [`SimLink`]; dropping it aborts them
pub struct RunningLink {
    mixer: JoinHandle<MixerExit>,
    shutdown: Option<oneshot::Sender<()>>,
    background: Vec<JoinHandle<()>>,
}

impl RunningLink {
    /// Returns whether the mixer task has ended
    pub fn is_finished(&self) -> bool {
        self.mixer.is_finished()
    }

    /// Ask the mixer task to stop and wait for it
    pub async fn stop(mut self) -> Result<MixerExit, SimError> {
        if let Some(shutdown) = self.shutdown.take() {
            // Already gone if the task ended on its own
            let _ = shutdown.send(());
        }
        self.finish().await
    }

    /// Wait for the mixer task to end on its own (power off)
    pub async fn wait(mut self) -> Result<MixerExit, SimError> {
        self.finish().await
    }

    async fn finish(&mut self) -> Result<MixerExit, SimError> {
        let exit = (&mut self.mixer).await?;
        for task in &self.background {
            task.abort();
        }
        info!("Simulated link stopped: {:?}", exit);
        Ok(exit)
    }
}

impl Drop for RunningLink {
    fn drop(&mut self) {
        self.mixer.abort();
        for task in &self.background {
            task.abort();
        }
    }
}
