//! Board capability table
//!
//! Which module types a board can drive depends on how its bays are wired:
//! whether an internal module exists and what it is, whether the bay pins go
//! to a UART or to the pulse timer, and which protocol families were built in.
//! The table is resolved once at start-up and queried by the resolver instead
//! of scattering per-board conditionals through the scheduler.

use crate::error::ProtocolError;
use crate::module::ModuleType;
use crate::ModuleSlot;

/// Protocol family, the unit a board build includes or leaves out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ProtocolFamily {
    /// PPM pulse train
    Ppm,
    /// FrSky PXX1
    Pxx1,
    /// FrSky PXX2 (ACCESS)
    Pxx2,
    /// SBUS output
    Sbus,
    /// Multi-protocol module
    Multimodule,
    /// Spektrum DSM2
    Dsm2,
    /// TBS Crossfire
    Crossfire,
}

impl ProtocolFamily {
    /// Every family
    pub const ALL: [ProtocolFamily; 7] = [
        ProtocolFamily::Ppm,
        ProtocolFamily::Pxx1,
        ProtocolFamily::Pxx2,
        ProtocolFamily::Sbus,
        ProtocolFamily::Multimodule,
        ProtocolFamily::Dsm2,
        ProtocolFamily::Crossfire,
    ];
}

/// Hardware fitted in the internal bay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InternalModuleKind {
    /// No internal module
    None,
    /// FrSky XJT (PXX1)
    #[default]
    Xjt,
    /// FrSky ISRM (PXX2)
    Isrm,
    /// Multi-protocol module
    Multi,
    /// Internal PPM output
    Ppm,
}

/// Link hardware capabilities of one board build
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BoardCapabilities {
    /// Hardware in the internal bay
    pub internal_module: InternalModuleKind,
    /// Internal bay is wired to a UART rather than the pulse timer
    pub internal_uart: bool,
    /// Internal module paces frames with its own heartbeat line
    pub internal_heartbeat: bool,
    /// External bay is the small "lite" form factor
    pub external_lite_bay: bool,
    /// External bay has a UART for serial protocols
    pub external_uart: bool,
    /// Protocol families included in this build
    pub families: Vec<ProtocolFamily>,
}

impl Default for BoardCapabilities {
    fn default() -> Self {
        Self {
            internal_module: InternalModuleKind::Xjt,
            internal_uart: false,
            internal_heartbeat: false,
            external_lite_bay: false,
            external_uart: true,
            families: ProtocolFamily::ALL.to_vec(),
        }
    }
}

impl BoardCapabilities {
    /// A board without an internal module
    pub fn external_only() -> Self {
        Self {
            internal_module: InternalModuleKind::None,
            ..Default::default()
        }
    }

    /// Returns whether the internal bay exists
    pub fn has_internal_module(&self) -> bool {
        self.internal_module != InternalModuleKind::None
    }

    /// Returns whether a protocol family is built in
    pub fn supports(&self, family: ProtocolFamily) -> bool {
        self.families.contains(&family)
    }

    /// Returns whether a module type can run in a slot on this board
    pub fn module_type_available(&self, slot: ModuleSlot, module_type: ModuleType) -> bool {
        let Some(family) = module_type.family() else {
            return false;
        };
        if !self.supports(family) {
            return false;
        }

        match slot {
            ModuleSlot::Internal => matches!(
                (self.internal_module, module_type),
                (InternalModuleKind::Xjt, ModuleType::XjtPxx1)
                    | (InternalModuleKind::Isrm, ModuleType::IsrmPxx2)
                    | (InternalModuleKind::Multi, ModuleType::Multimodule)
                    | (InternalModuleKind::Ppm, ModuleType::Ppm)
            ),
            ModuleSlot::External => match module_type {
                ModuleType::IsrmPxx2 => false,
                t if t.is_lite() => self.external_lite_bay,
                ModuleType::R9mPxx2 => self.external_uart,
                ModuleType::Sbus | ModuleType::Multimodule | ModuleType::Dsm2 => {
                    self.external_uart
                }
                _ => true,
            },
        }
    }

    /// Like [`module_type_available`](Self::module_type_available), as a `Result`
    pub fn ensure_available(
        &self,
        slot: ModuleSlot,
        module_type: ModuleType,
    ) -> Result<(), ProtocolError> {
        if module_type == ModuleType::None || self.module_type_available(slot, module_type) {
            Ok(())
        } else {
            Err(ProtocolError::Unavailable {
                module_type: module_type.name().to_string(),
                slot: slot.name(),
            })
        }
    }
}
