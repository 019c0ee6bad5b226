//! Required-protocol resolution
//!
//! Maps a slot's configured module type onto the pulse driver that must run,
//! then applies two overrides in order:
//!
//! 1. **DSM2 bind settle**: when a DSM2 module enters bind mode it is held
//!    off (protocol `None`) for a settle period so the module sees a clean
//!    power cycle before binding.
//! 2. **Pause**: while pulses are paused every slot resolves to `None`.

use tracing::debug;
use txlink_protocol::{
    BoardCapabilities, Dsm2Variant, ModuleMode, ModuleSettings, ModuleSlot, ModuleType,
    ProtocolId, NUM_MODULES,
};

/// Inputs of one resolution
#[derive(Debug, Clone, Copy)]
pub struct ResolveInput<'a> {
    /// Board link hardware
    pub board: &'a BoardCapabilities,
    /// Settings of the slot
    pub settings: &'a ModuleSettings,
    /// Current mode of the slot
    pub mode: ModuleMode,
    /// Pulses paused
    pub paused: bool,
    /// System tick (10 ms)
    pub now_ticks: u32,
}

/// Result of a resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    /// Protocol that must run
    pub protocol: ProtocolId,
    /// The slot is held off while a DSM2 bind settles
    pub settling: bool,
}

/// Module type of a slot after the availability check
pub fn effective_module_type(
    slot: ModuleSlot,
    board: &BoardCapabilities,
    settings: &ModuleSettings,
) -> ModuleType {
    if board.module_type_available(slot, settings.module_type) {
        settings.module_type
    } else {
        ModuleType::None
    }
}

/// Driver for a slot's configured module, without the bind and pause overrides
pub fn map_protocol(
    slot: ModuleSlot,
    board: &BoardCapabilities,
    settings: &ModuleSettings,
) -> ProtocolId {
    match effective_module_type(slot, board, settings) {
        ModuleType::None => ProtocolId::None,
        ModuleType::Ppm => ProtocolId::Ppm,
        ModuleType::XjtPxx1 if slot == ModuleSlot::Internal && board.internal_uart => {
            ProtocolId::Pxx1Serial
        }
        ModuleType::XjtPxx1 | ModuleType::R9mPxx1 => ProtocolId::Pxx1Pulses,
        ModuleType::R9mLitePxx1 | ModuleType::R9mLiteProPxx1 => ProtocolId::Pxx1Serial,
        ModuleType::R9mLitePxx2 => ProtocolId::Pxx2LowSpeed,
        ModuleType::IsrmPxx2
        | ModuleType::R9mPxx2
        | ModuleType::XjtLitePxx2
        | ModuleType::R9mLiteProPxx2 => ProtocolId::Pxx2HighSpeed,
        ModuleType::Sbus => ProtocolId::Sbus,
        ModuleType::Multimodule => ProtocolId::Multimodule,
        ModuleType::Dsm2 => match Dsm2Variant::from_rf_protocol(settings.rf_protocol) {
            Dsm2Variant::Lp45 => ProtocolId::Dsm2Lp45,
            Dsm2Variant::Dsm2 => ProtocolId::Dsm2Dsm2,
            Dsm2Variant::Dsmx => ProtocolId::Dsm2Dsmx,
        },
        ModuleType::Crossfire => ProtocolId::Crossfire,
    }
}

/// Resolves the protocol each slot must run
///
/// Owns the per-slot bind settle timestamps, so it must be the only place
/// the settle guard is evaluated.
#[derive(Debug, Clone)]
pub struct ProtocolResolver {
    settle_ticks: u32,
    bind_started: [Option<u32>; NUM_MODULES],
}

impl ProtocolResolver {
    /// Resolver with the given DSM2 settle time (10 ms ticks)
    pub fn new(settle_ticks: u32) -> Self {
        Self {
            settle_ticks,
            bind_started: [None; NUM_MODULES],
        }
    }

    /// Resolve and update the settle timestamp
    pub fn resolve(&mut self, slot: ModuleSlot, input: ResolveInput<'_>) -> Resolution {
        let mut protocol = map_protocol(slot, input.board, input.settings);
        let mut settling = false;

        let started = &mut self.bind_started[slot.index()];
        if input.mode != ModuleMode::Bind {
            *started = None;
        } else if protocol.is_dsm2() {
            let since = *started.get_or_insert_with(|| {
                debug!("{} module: DSM2 bind settle started", slot);
                input.now_ticks
            });
            if input.now_ticks.wrapping_sub(since) < self.settle_ticks {
                protocol = ProtocolId::None;
                settling = true;
            }
        }

        if input.paused {
            protocol = ProtocolId::None;
        }

        Resolution { protocol, settling }
    }

    /// Resolve without touching any state
    pub fn peek(&self, slot: ModuleSlot, input: ResolveInput<'_>) -> ProtocolId {
        let mut protocol = map_protocol(slot, input.board, input.settings);

        if input.mode == ModuleMode::Bind && protocol.is_dsm2() {
            let held = match self.bind_started[slot.index()] {
                Some(since) => input.now_ticks.wrapping_sub(since) < self.settle_ticks,
                None => self.settle_ticks > 0,
            };
            if held {
                protocol = ProtocolId::None;
            }
        }

        if input.paused {
            ProtocolId::None
        } else {
            protocol
        }
    }
}
