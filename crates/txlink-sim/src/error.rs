//! Error types for the simulator

use thiserror::Error;
use txlink_protocol::ProtocolError;

/// Errors building or running a simulated link
#[derive(Debug, Error)]
pub enum SimError {
    /// The model does not validate
    #[error("invalid model: {0}")]
    InvalidModel(#[from] ProtocolError),

    /// `start` called twice on the same link
    #[error("simulated link already started")]
    AlreadyStarted,

    /// The mixer task panicked or was cancelled
    #[error("mixer task failed: {0}")]
    MixerTask(#[from] tokio::task::JoinError),
}
