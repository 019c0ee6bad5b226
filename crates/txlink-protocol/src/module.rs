//! Model and module configuration
//!
//! These are the pilot-facing settings the scheduler reads every cycle. They
//! are owned by the model store; the scheduler never persists them.

use std::ops::Range;

use crate::board::{BoardCapabilities, ProtocolFamily};
use crate::error::ProtocolError;
use crate::{ModuleSlot, MAX_OUTPUT_CHANNELS, NUM_MODULES};

/// Stored failsafe value meaning "hold the last output"
pub const FAILSAFE_CHANNEL_HOLD: i16 = 2000;

/// Stored failsafe value meaning "stop sending pulses on this channel"
pub const FAILSAFE_CHANNEL_NOPULSE: i16 = 2001;

/// Failsafe value forced onto channels a module does not transmit
pub const FAILSAFE_NEUTRAL: i16 = 0;

/// Module type configured in a bay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ModuleType {
    /// Bay unused
    #[default]
    None,
    /// Generic PPM output
    Ppm,
    /// FrSky XJT (PXX1)
    XjtPxx1,
    /// FrSky ISRM (PXX2, internal only)
    IsrmPxx2,
    /// FrSky R9M (PXX1)
    R9mPxx1,
    /// FrSky R9M (ACCESS / PXX2)
    R9mPxx2,
    /// FrSky R9M Lite (PXX1)
    R9mLitePxx1,
    /// FrSky R9M Lite (ACCESS / PXX2)
    R9mLitePxx2,
    /// FrSky R9M Lite Pro (PXX1)
    R9mLiteProPxx1,
    /// FrSky R9M Lite Pro (ACCESS / PXX2)
    R9mLiteProPxx2,
    /// FrSky XJT Lite (ACCESS / PXX2)
    XjtLitePxx2,
    /// SBUS output
    Sbus,
    /// Multi-protocol module
    Multimodule,
    /// Spektrum DSM2 / DSMX
    Dsm2,
    /// TBS Crossfire
    Crossfire,
}

impl ModuleType {
    /// Returns a human-readable name for the module type
    pub fn name(&self) -> &'static str {
        match self {
            ModuleType::None => "None",
            ModuleType::Ppm => "PPM",
            ModuleType::XjtPxx1 => "XJT",
            ModuleType::IsrmPxx2 => "ISRM",
            ModuleType::R9mPxx1 => "R9M",
            ModuleType::R9mPxx2 => "R9M ACCESS",
            ModuleType::R9mLitePxx1 => "R9M Lite",
            ModuleType::R9mLitePxx2 => "R9M Lite ACCESS",
            ModuleType::R9mLiteProPxx1 => "R9M Lite Pro",
            ModuleType::R9mLiteProPxx2 => "R9M Lite Pro ACCESS",
            ModuleType::XjtLitePxx2 => "XJT Lite",
            ModuleType::Sbus => "SBUS",
            ModuleType::Multimodule => "Multi",
            ModuleType::Dsm2 => "DSM2",
            ModuleType::Crossfire => "Crossfire",
        }
    }

    /// Protocol family this module speaks
    pub fn family(&self) -> Option<ProtocolFamily> {
        match self {
            ModuleType::None => None,
            ModuleType::Ppm => Some(ProtocolFamily::Ppm),
            ModuleType::XjtPxx1
            | ModuleType::R9mPxx1
            | ModuleType::R9mLitePxx1
            | ModuleType::R9mLiteProPxx1 => Some(ProtocolFamily::Pxx1),
            ModuleType::IsrmPxx2
            | ModuleType::R9mPxx2
            | ModuleType::R9mLitePxx2
            | ModuleType::R9mLiteProPxx2
            | ModuleType::XjtLitePxx2 => Some(ProtocolFamily::Pxx2),
            ModuleType::Sbus => Some(ProtocolFamily::Sbus),
            ModuleType::Multimodule => Some(ProtocolFamily::Multimodule),
            ModuleType::Dsm2 => Some(ProtocolFamily::Dsm2),
            ModuleType::Crossfire => Some(ProtocolFamily::Crossfire),
        }
    }

    /// Returns whether this module only fits the small "lite" external bay
    pub fn is_lite(&self) -> bool {
        matches!(
            self,
            ModuleType::R9mLitePxx1
                | ModuleType::R9mLitePxx2
                | ModuleType::R9mLiteProPxx1
                | ModuleType::R9mLiteProPxx2
                | ModuleType::XjtLitePxx2
        )
    }
}

impl std::fmt::Display for ModuleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Operating mode of a module bay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ModuleMode {
    /// Regular channel transmission
    #[default]
    Normal,
    /// RF spectrum scan
    SpectrumAnalyser,
    /// RF power measurement
    PowerMeter,
    /// Reading module hardware information
    GetHardwareInfo,
    /// Reading or writing module settings
    ModuleSettings,
    /// Reading or writing receiver settings
    ReceiverSettings,
    /// Receiver registration
    Register,
    /// Receiver binding
    Bind,
    /// Sharing a receiver with another transmitter
    Share,
    /// Reduced power range test
    RangeCheck,
    /// Receiver reset
    Reset,
    /// Module authentication
    Authentication,
    /// Receiver firmware update over the air
    OtaUpdate,
}

impl ModuleMode {
    /// Returns whether the module is running one of the RF tools
    pub fn is_rf_tool(&self) -> bool {
        matches!(self, ModuleMode::SpectrumAnalyser | ModuleMode::PowerMeter)
    }
}

/// DSM2 sub-protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dsm2Variant {
    /// Low power LP45
    Lp45,
    /// DSM2
    Dsm2,
    /// DSMX
    Dsmx,
}

impl Dsm2Variant {
    /// Clamp a stored RF protocol index onto the DSM2 variants
    pub fn from_rf_protocol(rf_protocol: u8) -> Self {
        match rf_protocol {
            0 => Dsm2Variant::Lp45,
            1 => Dsm2Variant::Dsm2,
            _ => Dsm2Variant::Dsmx,
        }
    }
}

/// Settings of one module bay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ModuleSettings {
    /// Configured module type
    pub module_type: ModuleType,
    /// Sub-protocol index (DSM2 variant, Multi protocol, ...)
    pub rf_protocol: u8,
    /// First mixer channel sent by this module
    pub channels_start: u8,
    /// Number of channels sent by this module
    pub channels_count: u8,
    /// PPM frame length adjustment, in 0.5 ms steps around 22.5 ms
    pub ppm_frame_length: i8,
    /// SBUS refresh adjustment, in 0.5 ms steps around 22.5 ms
    pub sbus_refresh_rate: i8,
}

impl Default for ModuleSettings {
    fn default() -> Self {
        Self {
            module_type: ModuleType::None,
            rf_protocol: 0,
            channels_start: 0,
            channels_count: 8,
            ppm_frame_length: 0,
            sbus_refresh_rate: 0,
        }
    }
}

impl ModuleSettings {
    /// Settings for a module of the given type with default channels
    pub fn new(module_type: ModuleType) -> Self {
        Self {
            module_type,
            ..Default::default()
        }
    }

    /// Mixer channels this module transmits
    pub fn channel_range(&self) -> Range<usize> {
        let start = self.channels_start as usize;
        start..start + self.channels_count as usize
    }
}

/// Mixer output values, one per channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelOutputs(pub [i16; MAX_OUTPUT_CHANNELS]);

impl Default for ChannelOutputs {
    fn default() -> Self {
        Self([0; MAX_OUTPUT_CHANNELS])
    }
}

impl ChannelOutputs {
    /// Output value of a channel
    pub fn get(&self, channel: usize) -> Option<i16> {
        self.0.get(channel).copied()
    }

    /// All channels
    pub fn as_slice(&self) -> &[i16] {
        &self.0
    }

    /// All channels, mutable
    pub fn as_mut_slice(&mut self) -> &mut [i16] {
        &mut self.0
    }
}

/// Link-related part of a model
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ModelSettings {
    /// Per-slot module settings, indexed by [`ModuleSlot::index`]
    pub modules: [ModuleSettings; NUM_MODULES],
    /// Stored failsafe value per channel
    pub failsafe_channels: [i16; MAX_OUTPUT_CHANNELS],
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            modules: [ModuleSettings::default(); NUM_MODULES],
            failsafe_channels: [FAILSAFE_NEUTRAL; MAX_OUTPUT_CHANNELS],
        }
    }
}

impl ModelSettings {
    /// Settings of one slot
    pub fn module(&self, slot: ModuleSlot) -> &ModuleSettings {
        &self.modules[slot.index()]
    }

    /// Settings of one slot, mutable
    pub fn module_mut(&mut self, slot: ModuleSlot) -> &mut ModuleSettings {
        &mut self.modules[slot.index()]
    }

    /// Check that every module sends channels that exist
    pub fn validate(&self) -> Result<(), ProtocolError> {
        for module in &self.modules {
            let range = module.channel_range();
            if range.end > MAX_OUTPUT_CHANNELS {
                return Err(ProtocolError::ChannelRange {
                    start: range.start,
                    end: range.end,
                    max: MAX_OUTPUT_CHANNELS,
                });
            }
        }
        Ok(())
    }

    /// [`validate`](Self::validate), and every module must fit its bay on `board`
    pub fn validate_for(&self, board: &BoardCapabilities) -> Result<(), ProtocolError> {
        self.validate()?;
        for slot in ModuleSlot::ALL {
            board.ensure_available(slot, self.module(slot).module_type)?;
        }
        Ok(())
    }
}
