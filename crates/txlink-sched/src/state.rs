//! Per-slot runtime state and the watchdog heartbeat

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::oneshot;
use txlink_protocol::{ChannelOutputs, ModelSettings, ModuleMode, ModuleSlot, ProtocolId};

use crate::engine::PulseEngine;
use crate::error::LinkError;

/// Engine shared between the mixer task, the pushed-transfer path and the UI
pub type SharedEngine = Arc<Mutex<PulseEngine>>;

/// Channel outputs written by the mixer computation
pub type SharedOutputs = Arc<Mutex<ChannelOutputs>>;

/// Model settings owned by the model store
pub type SharedModel = Arc<RwLock<ModelSettings>>;

/// Lock a mutex, recovering the data if a holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Receivers found during a bind, filled in by the driver
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindInformation {
    /// Names of receivers that answered
    pub candidates: Vec<String>,
    /// Receiver picked by the pilot, index into `candidates`
    pub selected: Option<usize>,
}

/// Where the driver writes bind candidates; shared with the requester
pub type BindDestination = Arc<Mutex<BindInformation>>;

/// How a bind session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindOutcome {
    /// Receiver bound
    Bound {
        /// Receiver name
        receiver: String,
    },
    /// The module reported a failure
    Failed {
        /// Reason given by the driver
        reason: String,
    },
}

struct BindSession {
    destination: BindDestination,
    done: oneshot::Sender<BindOutcome>,
}

/// Requester side of a bind session
///
/// Resolves once the driver reports an outcome. If the session is dropped
/// first (the slot went back to normal mode, the protocol was disabled)
/// waiting yields [`LinkError::BindAbandoned`].
#[derive(Debug)]
pub struct BindTicket {
    slot: ModuleSlot,
    rx: oneshot::Receiver<BindOutcome>,
}

impl BindTicket {
    /// Slot being bound
    pub fn slot(&self) -> ModuleSlot {
        self.slot
    }

    /// Wait for the bind to finish
    pub async fn wait(self) -> Result<BindOutcome, LinkError> {
        self.rx.await.map_err(|_| LinkError::BindAbandoned(self.slot))
    }

    /// Non-blocking check; `None` while the bind is still running
    pub fn try_outcome(&mut self) -> Option<Result<BindOutcome, LinkError>> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(Ok(outcome)),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => {
                Some(Err(LinkError::BindAbandoned(self.slot)))
            }
        }
    }
}

/// Runtime record of one module slot
///
/// The active protocol is only ever changed by the engine's lifecycle
/// controller; drivers see it read-only.
pub struct ModuleState {
    slot: ModuleSlot,
    protocol: ProtocolId,
    mode: ModuleMode,
    bind: Option<BindSession>,
}

impl std::fmt::Debug for ModuleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleState")
            .field("slot", &self.slot)
            .field("protocol", &self.protocol)
            .field("mode", &self.mode)
            .field("binding", &self.bind.is_some())
            .finish()
    }
}

impl ModuleState {
    /// Fresh record: no protocol, normal mode
    pub fn new(slot: ModuleSlot) -> Self {
        Self {
            slot,
            protocol: ProtocolId::None,
            mode: ModuleMode::Normal,
            bind: None,
        }
    }

    /// Slot of this record
    pub fn slot(&self) -> ModuleSlot {
        self.slot
    }

    /// Protocol whose driver currently owns the slot hardware
    pub fn protocol(&self) -> ProtocolId {
        self.protocol
    }

    /// Current operating mode
    pub fn mode(&self) -> ModuleMode {
        self.mode
    }

    pub(crate) fn set_protocol(&mut self, protocol: ProtocolId) {
        self.protocol = protocol;
    }

    /// Change the operating mode
    ///
    /// Leaving bind mode abandons any open bind session.
    pub fn set_mode(&mut self, mode: ModuleMode) {
        if mode != ModuleMode::Bind {
            self.bind = None;
        }
        self.mode = mode;
    }

    /// Enter bind mode with `destination` as the candidate list
    pub fn start_bind(&mut self, destination: BindDestination) -> BindTicket {
        let (done, rx) = oneshot::channel();
        self.bind = Some(BindSession { destination, done });
        self.mode = ModuleMode::Bind;
        BindTicket {
            slot: self.slot,
            rx,
        }
    }

    /// Returns whether a bind session is open
    pub fn is_binding(&self) -> bool {
        self.bind.is_some()
    }

    /// Candidate list of the open bind session
    pub fn bind_destination(&self) -> Option<&BindDestination> {
        self.bind.as_ref().map(|session| &session.destination)
    }

    /// Report a receiver that answered the bind request
    pub fn add_bind_candidate(&self, name: impl Into<String>) {
        if let Some(destination) = self.bind_destination() {
            let mut info = lock(destination);
            let name = name.into();
            if !info.candidates.contains(&name) {
                info.candidates.push(name);
            }
        }
    }

    /// Close the bind session and return to normal mode
    ///
    /// Returns `false` when no session was open.
    pub fn finish_bind(&mut self, outcome: BindOutcome) -> bool {
        let Some(session) = self.bind.take() else {
            return false;
        };
        self.mode = ModuleMode::Normal;
        // The requester may have stopped waiting
        let _ = session.done.send(outcome);
        true
    }

    /// Back to normal mode, dropping any bind session
    pub(crate) fn reset(&mut self) {
        self.set_mode(ModuleMode::Normal);
    }
}

/// 10 ms timer interrupt ran since the last watchdog kick
pub const HEART_TIMER_10MS: u8 = 0x01;

/// Bit set by a slot's pulse setup (shifted by the slot index)
pub const HEART_TIMER_PULSES: u8 = 0x02;

/// Liveness markers checked before the watchdog is kicked
///
/// The 10 ms system tick and every pulse setup set a bit; the mixer only
/// kicks the watchdog once all expected bits are present, then clears them.
#[derive(Debug, Default)]
pub struct Heartbeat(AtomicU8);

impl Heartbeat {
    /// Empty heartbeat
    pub fn new() -> Self {
        Self(AtomicU8::new(0))
    }

    /// Bit of a slot's pulse setup
    pub fn pulses_bit(slot: ModuleSlot) -> u8 {
        HEART_TIMER_PULSES << slot.index()
    }

    /// Mask the mixer waits for
    pub fn expected_mask(has_internal_module: bool) -> u8 {
        let mut mask = HEART_TIMER_10MS | Self::pulses_bit(ModuleSlot::External);
        if has_internal_module {
            mask |= Self::pulses_bit(ModuleSlot::Internal);
        }
        mask
    }

    /// Called from the 10 ms system tick
    pub fn mark_timer_tick(&self) {
        self.0.fetch_or(HEART_TIMER_10MS, Ordering::AcqRel);
    }

    /// Called by every pulse setup of `slot`
    pub fn mark_pulses(&self, slot: ModuleSlot) {
        self.0.fetch_or(Self::pulses_bit(slot), Ordering::AcqRel);
    }

    /// Current bits
    pub fn bits(&self) -> u8 {
        self.0.load(Ordering::Acquire)
    }

    /// If every bit of `mask` is set, clear the heartbeat and return `true`
    ///
    /// The check and the clear are one atomic update, so a mark racing with
    /// it lands either before (and is consumed) or after (and is kept).
    pub fn check_and_clear(&self, mask: u8) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                (bits & mask == mask).then_some(0)
            })
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_ticket_receives_outcome() {
        let destination = BindDestination::default();
        let mut module = ModuleState::new(ModuleSlot::External);
        let mut ticket = module.start_bind(destination.clone());

        assert_eq!(module.mode(), ModuleMode::Bind);
        assert!(ticket.try_outcome().is_none());

        module.add_bind_candidate("RX8R");
        module.add_bind_candidate("RX8R");
        assert_eq!(destination.lock().unwrap().candidates, vec!["RX8R".to_string()]);

        assert!(module.finish_bind(BindOutcome::Bound {
            receiver: "RX8R".into()
        }));
        assert_eq!(module.mode(), ModuleMode::Normal);
        assert_eq!(
            ticket.try_outcome().unwrap().unwrap(),
            BindOutcome::Bound {
                receiver: "RX8R".into()
            }
        );
    }

    #[test]
    fn test_leaving_bind_mode_abandons_session() {
        let mut module = ModuleState::new(ModuleSlot::Internal);
        let mut ticket = module.start_bind(BindDestination::default());

        module.set_mode(ModuleMode::RangeCheck);
        assert!(!module.is_binding());
        assert!(matches!(
            ticket.try_outcome(),
            Some(Err(LinkError::BindAbandoned(ModuleSlot::Internal)))
        ));
        assert!(!module.finish_bind(BindOutcome::Failed {
            reason: "late".into()
        }));
    }

    #[test]
    fn test_heartbeat_requires_all_bits() {
        let heartbeat = Heartbeat::new();
        let mask = Heartbeat::expected_mask(true);
        assert_eq!(mask, 0x07);

        heartbeat.mark_timer_tick();
        heartbeat.mark_pulses(ModuleSlot::External);
        assert!(!heartbeat.check_and_clear(mask));

        heartbeat.mark_pulses(ModuleSlot::Internal);
        assert!(heartbeat.check_and_clear(mask));
        assert_eq!(heartbeat.bits(), 0);
    }

    #[test]
    fn test_heartbeat_marks_from_other_threads() {
        let heartbeat = Arc::new(Heartbeat::new());
        let mask = Heartbeat::expected_mask(true);

        let markers: Vec<_> = (0..4)
            .map(|_| {
                let heartbeat = Arc::clone(&heartbeat);
                std::thread::spawn(move || {
                    for _ in 0..10_000 {
                        heartbeat.mark_timer_tick();
                        heartbeat.mark_pulses(ModuleSlot::Internal);
                    }
                })
            })
            .collect();
        for _ in 0..10_000 {
            heartbeat.mark_pulses(ModuleSlot::External);
            heartbeat.check_and_clear(mask);
        }
        for marker in markers {
            marker.join().unwrap();
        }

        // A failed check leaves the bits alone
        let seen = heartbeat.bits();
        assert!(!heartbeat.check_and_clear(0xff));
        assert_eq!(heartbeat.bits(), seen);

        heartbeat.mark_timer_tick();
        heartbeat.mark_pulses(ModuleSlot::Internal);
        heartbeat.mark_pulses(ModuleSlot::External);
        assert!(heartbeat.check_and_clear(mask));
        assert_eq!(heartbeat.bits(), 0);
    }

    #[test]
    fn test_heartbeat_without_internal_module() {
        let heartbeat = Heartbeat::new();
        let mask = Heartbeat::expected_mask(false);

        heartbeat.mark_timer_tick();
        heartbeat.mark_pulses(ModuleSlot::External);
        assert!(heartbeat.check_and_clear(mask));
    }
}
