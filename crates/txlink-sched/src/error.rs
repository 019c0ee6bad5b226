//! Error types for the link scheduler

use thiserror::Error;
use txlink_protocol::{ModuleSlot, ProtocolError};

/// Errors surfaced to callers of the link scheduler
///
/// Nothing inside the real-time cycle returns these: a misconfigured slot
/// resolves to no protocol instead. They only reach callers of the control
/// surface (bind requests, model updates).
#[derive(Debug, Error)]
pub enum LinkError {
    /// Slot has no hardware on this board
    #[error("{0} module slot has no hardware")]
    SlotUnavailable(ModuleSlot),

    /// Bind session ended without an outcome
    #[error("bind on the {0} module was abandoned")]
    BindAbandoned(ModuleSlot),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Protocol(#[from] ProtocolError),
}
