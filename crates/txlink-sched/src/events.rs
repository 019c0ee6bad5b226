//! Link events
//!
//! The engine buffers events while it runs inside the real-time cycle; the
//! mixer task drains them after every dispatch and forwards them to whoever
//! listens (the runner's log, tests).

use txlink_protocol::{ModuleMode, ModuleSlot, ProtocolId};

/// Event emitted by the link scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    // -------------------------------------------------------------------------
    // Module lifecycle events
    // -------------------------------------------------------------------------
    /// A slot switched to another pulse driver
    ProtocolChanged {
        /// Slot that changed
        slot: ModuleSlot,
        /// Previous protocol
        from: ProtocolId,
        /// New protocol
        to: ProtocolId,
    },

    /// A slot changed operating mode
    ModeChanged {
        /// Slot that changed
        slot: ModuleSlot,
        /// New mode
        mode: ModuleMode,
    },

    /// A bind session was opened on a slot
    BindStarted {
        /// Slot being bound
        slot: ModuleSlot,
    },

    // -------------------------------------------------------------------------
    // Scheduler events
    // -------------------------------------------------------------------------
    /// Pulse generation was paused
    PulsesPaused,

    /// Pulse generation was resumed
    PulsesResumed,

    /// The scheduler trigger did not fire within the timeout
    TriggerTimeout {
        /// Cycle number at which it happened
        cycle: u64,
    },

    /// The mixer task is turning the board off
    PowerOff {
        /// Triggered by the emergency hold rather than the normal power state machine
        forced: bool,
    },
}

impl LinkEvent {
    /// Slot this event concerns, if any
    pub fn slot(&self) -> Option<ModuleSlot> {
        match self {
            LinkEvent::ProtocolChanged { slot, .. }
            | LinkEvent::ModeChanged { slot, .. }
            | LinkEvent::BindStarted { slot } => Some(*slot),
            _ => None,
        }
    }
}
