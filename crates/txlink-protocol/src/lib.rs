//! Transmitter Link Protocol Vocabulary
//!
//! This crate provides the closed set of identifiers shared by every part of
//! the transmitter link subsystem:
//!
//! - **Slots**: the internal and external module bays
//! - **Module types**: what the pilot configured in a bay (XJT, R9M, DSM2, ...)
//! - **Protocols**: which pulse driver must run to talk to that module
//! - **Board capabilities**: which module types this board can actually drive
//! - **Profiles**: per protocol port setup and frame periods
//!
//! # Architecture
//!
//! Several module types share one driver. The scheduler only cares about the
//! driver, so the mapping collapses, for example, every PXX2 high-speed module
//! onto [`ProtocolId::Pxx2HighSpeed`]. The driver itself still reads the fine
//! grained [`ModuleSettings`] when it builds a frame.
//!
//! # Example
//!
//! ```rust
//! use txlink_protocol::{BoardCapabilities, ModuleSlot, ModuleType, ProtocolId};
//!
//! let board = BoardCapabilities::default();
//! assert!(board.module_type_available(ModuleSlot::External, ModuleType::Crossfire));
//! assert!(ProtocolId::Crossfire.is_pulled());
//! assert!(!ProtocolId::Ppm.is_pulled());
//! ```

pub mod board;
pub mod error;
pub mod module;
pub mod profile;

pub use board::{BoardCapabilities, InternalModuleKind, ProtocolFamily};
pub use error::ProtocolError;
pub use module::{
    ChannelOutputs, Dsm2Variant, ModelSettings, ModuleMode, ModuleSettings, ModuleType,
    FAILSAFE_CHANNEL_HOLD, FAILSAFE_CHANNEL_NOPULSE, FAILSAFE_NEUTRAL,
};
pub use profile::{
    PeriodPolicy, PortSetup, ProtocolProfile, PulseEncoding, UartConfig, UartParity,
};

/// Number of hardware module bays
pub const NUM_MODULES: usize = 2;

/// Number of mixer output channels
pub const MAX_OUTPUT_CHANNELS: usize = 32;

/// One of the two hardware module bays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ModuleSlot {
    /// Module built into the radio
    Internal,
    /// Module plugged into the rear bay
    External,
}

impl ModuleSlot {
    /// All slots, internal first
    pub const ALL: [ModuleSlot; NUM_MODULES] = [ModuleSlot::Internal, ModuleSlot::External];

    /// Array index of this slot
    pub fn index(self) -> usize {
        match self {
            ModuleSlot::Internal => 0,
            ModuleSlot::External => 1,
        }
    }

    /// Returns a human-readable name for the slot
    pub fn name(self) -> &'static str {
        match self {
            ModuleSlot::Internal => "internal",
            ModuleSlot::External => "external",
        }
    }
}

impl TryFrom<u8> for ModuleSlot {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ModuleSlot::Internal),
            1 => Ok(ModuleSlot::External),
            other => Err(ProtocolError::InvalidSlot(other)),
        }
    }
}

impl std::fmt::Display for ModuleSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// How frames of a protocol reach the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    /// Software decides the instant of every frame (sent from the mixer loop)
    Pulled,
    /// Hardware free-runs once started; the DMA/interrupt path refills it
    Pushed,
}

/// Pulse driver that must run on a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ProtocolId {
    /// Link disabled
    #[default]
    None,
    /// Classic PPM pulse train
    Ppm,
    /// PXX1 generated by the pulse timer
    Pxx1Pulses,
    /// PXX1 over a UART
    Pxx1Serial,
    /// PXX2 at 450 kbaud
    Pxx2HighSpeed,
    /// PXX2 at 115.2 kbaud (R9M Lite)
    Pxx2LowSpeed,
    /// SBUS output
    Sbus,
    /// Multi-protocol module
    Multimodule,
    /// DSM2 LP45
    Dsm2Lp45,
    /// DSM2
    Dsm2Dsm2,
    /// DSMX
    Dsm2Dsmx,
    /// TBS Crossfire
    Crossfire,
}

impl ProtocolId {
    /// Returns a human-readable name for the protocol
    pub fn name(&self) -> &'static str {
        match self {
            ProtocolId::None => "none",
            ProtocolId::Ppm => "PPM",
            ProtocolId::Pxx1Pulses => "PXX1 (pulses)",
            ProtocolId::Pxx1Serial => "PXX1 (serial)",
            ProtocolId::Pxx2HighSpeed => "PXX2 (high speed)",
            ProtocolId::Pxx2LowSpeed => "PXX2 (low speed)",
            ProtocolId::Sbus => "SBUS",
            ProtocolId::Multimodule => "Multimodule",
            ProtocolId::Dsm2Lp45 => "DSM2 LP45",
            ProtocolId::Dsm2Dsm2 => "DSM2",
            ProtocolId::Dsm2Dsmx => "DSMX",
            ProtocolId::Crossfire => "Crossfire",
        }
    }

    /// Whether frames are pulled by the mixer loop or pushed by hardware
    ///
    /// `None` counts as pulled so that a slot leaving the disabled state is
    /// always picked up by the synchronous dispatch.
    pub fn transfer(&self) -> Transfer {
        match self {
            ProtocolId::Ppm | ProtocolId::Pxx1Pulses => Transfer::Pushed,
            _ => Transfer::Pulled,
        }
    }

    /// Shorthand for `transfer() == Transfer::Pulled`
    pub fn is_pulled(&self) -> bool {
        self.transfer() == Transfer::Pulled
    }

    /// Returns whether this is one of the DSM2 variants
    pub fn is_dsm2(&self) -> bool {
        matches!(
            self,
            ProtocolId::Dsm2Lp45 | ProtocolId::Dsm2Dsm2 | ProtocolId::Dsm2Dsmx
        )
    }
}

impl std::fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_index_roundtrip() {
        for slot in ModuleSlot::ALL {
            assert_eq!(ModuleSlot::try_from(slot.index() as u8).unwrap(), slot);
        }
        assert_eq!(
            ModuleSlot::try_from(2),
            Err(ProtocolError::InvalidSlot(2))
        );
    }

    #[test]
    fn test_pushed_protocols() {
        assert_eq!(ProtocolId::Ppm.transfer(), Transfer::Pushed);
        assert_eq!(ProtocolId::Pxx1Pulses.transfer(), Transfer::Pushed);
        assert!(ProtocolId::None.is_pulled());
        assert!(ProtocolId::Pxx1Serial.is_pulled());
        assert!(ProtocolId::Dsm2Dsmx.is_pulled());
        assert!(ProtocolId::Sbus.is_pulled());
    }

    #[test]
    fn test_dsm2_classification() {
        assert!(ProtocolId::Dsm2Lp45.is_dsm2());
        assert!(ProtocolId::Dsm2Dsmx.is_dsm2());
        assert!(!ProtocolId::Multimodule.is_dsm2());
    }
}
