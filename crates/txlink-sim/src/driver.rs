//! Simulated module bay driver
//!
//! Records every call the engine makes, checks that only one protocol owns
//! the bay at a time, and plays the module side of a bind: two receivers
//! answer, and once the pilot picks one the bind completes.
//!
//! An internal module wired to the heartbeat line raises it at its frame rate
//! while a PXX protocol runs.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};
use txlink_protocol::profile::{PXX2_PERIOD, PXX_PULSES_PERIOD};
use txlink_protocol::{ModuleMode, ModuleSlot, PortSetup, ProtocolId, MAX_OUTPUT_CHANNELS};
use txlink_sched::{BindOutcome, FrameRequest, ModuleDriver};

use crate::lock;
use crate::scheduler::SimScheduler;

/// Receivers that answer a simulated bind
pub const SIM_RECEIVERS: [&str; 2] = ["SimuRX1", "SimuRX2"];

/// Most recent calls kept per driver
pub const CALL_LOG_CAPACITY: usize = 512;

/// Heartbeat interval of a module running `protocol` (µs)
fn heartbeat_interval(protocol: ProtocolId) -> Option<u32> {
    match protocol {
        ProtocolId::Pxx1Pulses | ProtocolId::Pxx1Serial => Some(PXX_PULSES_PERIOD),
        ProtocolId::Pxx2HighSpeed => Some(PXX2_PERIOD),
        _ => None,
    }
}

/// One call made on a driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    /// Port brought up
    Start {
        /// Protocol started
        protocol: ProtocolId,
        /// Port configuration
        port: PortSetup,
    },
    /// Port stopped
    Stop,
    /// Frame built
    Setup {
        /// Protocol of the frame
        protocol: ProtocolId,
        /// Module mode at the time
        mode: ModuleMode,
    },
    /// Frame handed to the transmitter
    Send,
}

/// Last frame built by a driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimFrame {
    /// Protocol of the frame
    pub protocol: ProtocolId,
    /// Channel values carried
    pub channels: Vec<i16>,
}

#[derive(Debug, Default)]
struct DriverState {
    calls: VecDeque<DriverCall>,
    running: Option<ProtocolId>,
    prepared: Option<SimFrame>,
    last_sent: Option<SimFrame>,
    frames_sent: u64,
    not_ready: u32,
    violations: Vec<String>,
}

impl DriverState {
    fn record(&mut self, call: DriverCall) {
        if self.calls.len() == CALL_LOG_CAPACITY {
            self.calls.pop_front();
        }
        self.calls.push_back(call);
    }
}

/// Driver of one bay; clones share state
#[derive(Debug, Clone)]
pub struct SimModuleDriver {
    slot: ModuleSlot,
    inner: Arc<Mutex<DriverState>>,
    heartbeat: Option<SimScheduler>,
}

impl SimModuleDriver {
    /// Idle driver for a bay
    pub fn new(slot: ModuleSlot) -> Self {
        Self {
            slot,
            inner: Arc::default(),
            heartbeat: None,
        }
    }

    /// Drive the heartbeat trigger of `scheduler` while a PXX protocol runs
    pub fn with_module_heartbeat(mut self, scheduler: SimScheduler) -> Self {
        self.heartbeat = Some(scheduler);
        self
    }

    /// Bay of this driver
    pub fn slot(&self) -> ModuleSlot {
        self.slot
    }

    /// Protocol whose port is up
    pub fn running(&self) -> Option<ProtocolId> {
        lock(&self.inner).running
    }

    /// The last [`CALL_LOG_CAPACITY`] calls, oldest first
    pub fn calls(&self) -> Vec<DriverCall> {
        lock(&self.inner).calls.iter().cloned().collect()
    }

    /// Take the recorded calls
    pub fn take_calls(&self) -> Vec<DriverCall> {
        lock(&self.inner).calls.drain(..).collect()
    }

    /// Frames handed to the transmitter
    pub fn frames_sent(&self) -> u64 {
        lock(&self.inner).frames_sent
    }

    /// Last frame handed to the transmitter
    pub fn last_sent(&self) -> Option<SimFrame> {
        lock(&self.inner).last_sent.clone()
    }

    /// Make the next `count` frame setups report "not ready"
    pub fn hold_frames(&self, count: u32) {
        lock(&self.inner).not_ready = count;
    }

    /// Lifecycle rule violations seen (overlapping drivers, frames for a stopped port)
    pub fn violations(&self) -> Vec<String> {
        lock(&self.inner).violations.clone()
    }

    fn violation(state: &mut DriverState, slot: ModuleSlot, message: String) {
        warn!("{} driver: {}", slot, message);
        state.violations.push(message);
    }
}

impl ModuleDriver for SimModuleDriver {
    fn start(&mut self, protocol: ProtocolId, port: &PortSetup) {
        let mut state = lock(&self.inner);
        if let Some(running) = state.running {
            let message = format!("{} started while {} still running", protocol, running);
            Self::violation(&mut state, self.slot, message);
        }
        debug!("{} driver: start {} on {:?}", self.slot, protocol, port);
        state.running = Some(protocol);
        state.record(DriverCall::Start {
            protocol,
            port: *port,
        });
        drop(state);

        if let Some(scheduler) = &self.heartbeat {
            scheduler.set_module_heartbeat(heartbeat_interval(protocol));
        }
    }

    fn stop(&mut self) {
        let mut state = lock(&self.inner);
        state.running = None;
        state.prepared = None;
        state.record(DriverCall::Stop);
        drop(state);

        if let Some(scheduler) = &self.heartbeat {
            scheduler.set_module_heartbeat(None);
        }
    }

    fn setup_frame(&mut self, frame: FrameRequest<'_>) -> bool {
        let mut state = lock(&self.inner);
        state.record(DriverCall::Setup {
            protocol: frame.protocol,
            mode: frame.module.mode(),
        });
        if state.running != Some(frame.protocol) {
            let message = format!(
                "frame for {} while {:?} is running",
                frame.protocol, state.running
            );
            Self::violation(&mut state, self.slot, message);
        }

        if frame.module.mode() == ModuleMode::Bind && frame.module.is_binding() {
            for receiver in SIM_RECEIVERS {
                frame.module.add_bind_candidate(receiver);
            }
            let picked = frame.module.bind_destination().and_then(|destination| {
                let info = lock(destination);
                let picked = info
                    .selected
                    .and_then(|index| info.candidates.get(index).cloned());
                picked
            });
            if let Some(receiver) = picked {
                debug!("{} driver: bound to {}", self.slot, receiver);
                frame.module.finish_bind(BindOutcome::Bound { receiver });
            }
        }

        let range = frame.settings.channel_range();
        let end = range.end.min(MAX_OUTPUT_CHANNELS);
        let start = range.start.min(end);
        state.prepared = Some(SimFrame {
            protocol: frame.protocol,
            channels: frame.channels.as_slice()[start..end].to_vec(),
        });

        if state.not_ready > 0 {
            state.not_ready -= 1;
            return false;
        }
        true
    }

    fn send_next_frame(&mut self) {
        let mut state = lock(&self.inner);
        state.record(DriverCall::Send);
        state.frames_sent += 1;
        state.last_sent = state.prepared.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use txlink_protocol::{ChannelOutputs, ModuleSettings, ModuleType};
    use txlink_sched::{BindDestination, ModuleState};

    fn frame<'a>(
        module: &'a mut ModuleState,
        settings: &'a ModuleSettings,
        channels: &'a ChannelOutputs,
    ) -> FrameRequest<'a> {
        FrameRequest {
            slot: ModuleSlot::External,
            protocol: ProtocolId::Dsm2Dsmx,
            settings,
            channels,
            module,
        }
    }

    #[test]
    fn test_frame_carries_module_channels() {
        let mut driver = SimModuleDriver::new(ModuleSlot::External);
        let mut module = ModuleState::new(ModuleSlot::External);
        let settings = ModuleSettings {
            channels_start: 2,
            channels_count: 3,
            ..ModuleSettings::new(ModuleType::Dsm2)
        };
        let mut channels = ChannelOutputs::default();
        channels.as_mut_slice()[2..5].copy_from_slice(&[10, 20, 30]);

        driver.start(ProtocolId::Dsm2Dsmx, &PortSetup::ModulePower);
        assert!(driver.setup_frame(frame(&mut module, &settings, &channels)));
        driver.send_next_frame();

        assert_eq!(
            driver.last_sent(),
            Some(SimFrame {
                protocol: ProtocolId::Dsm2Dsmx,
                channels: vec![10, 20, 30],
            })
        );
        assert!(driver.violations().is_empty());
    }

    #[test]
    fn test_overlapping_start_is_a_violation() {
        let mut driver = SimModuleDriver::new(ModuleSlot::External);
        driver.start(ProtocolId::Ppm, &PortSetup::ModulePower);
        driver.start(ProtocolId::Sbus, &PortSetup::ModulePower);
        assert_eq!(driver.violations().len(), 1);
    }

    #[test]
    fn test_bind_completes_after_pick() {
        let mut driver = SimModuleDriver::new(ModuleSlot::External);
        let mut module = ModuleState::new(ModuleSlot::External);
        let settings = ModuleSettings::new(ModuleType::Dsm2);
        let channels = ChannelOutputs::default();
        let destination = BindDestination::default();
        let mut ticket = module.start_bind(destination.clone());

        driver.start(ProtocolId::Dsm2Dsmx, &PortSetup::ModulePower);
        driver.setup_frame(frame(&mut module, &settings, &channels));
        assert_eq!(destination.lock().unwrap().candidates, SIM_RECEIVERS.map(String::from));
        assert!(ticket.try_outcome().is_none());

        destination.lock().unwrap().selected = Some(1);
        driver.setup_frame(frame(&mut module, &settings, &channels));
        assert_eq!(module.mode(), ModuleMode::Normal);
        assert_eq!(
            ticket.try_outcome().unwrap().unwrap(),
            BindOutcome::Bound {
                receiver: "SimuRX2".into()
            }
        );
    }

    #[test]
    fn test_call_log_is_bounded() {
        let mut driver = SimModuleDriver::new(ModuleSlot::External);
        driver.start(ProtocolId::Crossfire, &PortSetup::ModulePower);
        for _ in 0..CALL_LOG_CAPACITY {
            driver.send_next_frame();
        }

        let calls = driver.calls();
        assert_eq!(calls.len(), CALL_LOG_CAPACITY);
        assert!(calls.iter().all(|call| *call == DriverCall::Send));
        assert_eq!(driver.frames_sent(), CALL_LOG_CAPACITY as u64);

        assert_eq!(driver.take_calls().len(), CALL_LOG_CAPACITY);
        assert!(driver.calls().is_empty());
    }

    #[test]
    fn test_internal_module_raises_heartbeat() {
        let scheduler = SimScheduler::new();
        let mut driver =
            SimModuleDriver::new(ModuleSlot::Internal).with_module_heartbeat(scheduler.clone());

        driver.start(ProtocolId::Pxx2HighSpeed, &PortSetup::ModulePower);
        assert_eq!(
            scheduler.trigger_period(),
            Some(std::time::Duration::from_micros(u64::from(PXX2_PERIOD)))
        );

        driver.stop();
        assert_eq!(scheduler.trigger_period(), None);

        driver.start(ProtocolId::Ppm, &PortSetup::ModulePower);
        assert_eq!(scheduler.trigger_period(), None);
    }

    #[test]
    fn test_hold_frames() {
        let mut driver = SimModuleDriver::new(ModuleSlot::External);
        let mut module = ModuleState::new(ModuleSlot::External);
        let settings = ModuleSettings::new(ModuleType::Dsm2);
        let channels = ChannelOutputs::default();
        driver.start(ProtocolId::Dsm2Dsmx, &PortSetup::ModulePower);
        driver.hold_frames(1);

        assert!(!driver.setup_frame(frame(&mut module, &settings, &channels)));
        assert!(driver.setup_frame(frame(&mut module, &settings, &channels)));
    }
}
