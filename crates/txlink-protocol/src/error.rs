//! Error types for link configuration

use thiserror::Error;

/// Errors raised while interpreting link configuration
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Module slot index out of range
    #[error("invalid module slot: {0}")]
    InvalidSlot(u8),

    /// A module transmits channels past the end of the mixer outputs
    #[error("channel range {start}..{end} exceeds {max} output channels")]
    ChannelRange {
        /// First channel sent
        start: usize,
        /// One past the last channel sent
        end: usize,
        /// Number of mixer outputs
        max: usize,
    },

    /// Module type cannot be used in this bay on this board
    #[error("{module_type} is not available on the {slot} module")]
    Unavailable {
        /// Configured module type
        module_type: String,
        /// Slot name
        slot: &'static str,
    },
}
