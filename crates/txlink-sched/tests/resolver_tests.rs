//! Integration tests for protocol resolution and failsafe capture
//!
//! These tests exercise the public resolver and failsafe API across the whole
//! module-type space:
//! - Pause always wins
//! - Outside bind mode the resolver is the plain family mapping
//! - The DSM2 settle window lasts exactly the configured ticks
//! - Failsafe capture never touches hold/no-pulse entries of sent channels

use txlink_protocol::{
    BoardCapabilities, ChannelOutputs, InternalModuleKind, ModelSettings, ModuleMode,
    ModuleSettings, ModuleSlot, ModuleType, ProtocolId, FAILSAFE_CHANNEL_HOLD,
    FAILSAFE_CHANNEL_NOPULSE, FAILSAFE_NEUTRAL, MAX_OUTPUT_CHANNELS,
};
use txlink_sched::{capture_failsafe, map_protocol, ProtocolResolver, ResolveInput};

// ============================================================================
// Helper Functions
// ============================================================================

mod helpers {
    use super::*;

    pub const ALL_TYPES: [ModuleType; 15] = [
        ModuleType::None,
        ModuleType::Ppm,
        ModuleType::XjtPxx1,
        ModuleType::IsrmPxx2,
        ModuleType::R9mPxx1,
        ModuleType::R9mPxx2,
        ModuleType::R9mLitePxx1,
        ModuleType::R9mLitePxx2,
        ModuleType::R9mLiteProPxx1,
        ModuleType::R9mLiteProPxx2,
        ModuleType::XjtLitePxx2,
        ModuleType::Sbus,
        ModuleType::Multimodule,
        ModuleType::Dsm2,
        ModuleType::Crossfire,
    ];

    pub const ALL_MODES: [ModuleMode; 13] = [
        ModuleMode::Normal,
        ModuleMode::SpectrumAnalyser,
        ModuleMode::PowerMeter,
        ModuleMode::GetHardwareInfo,
        ModuleMode::ModuleSettings,
        ModuleMode::ReceiverSettings,
        ModuleMode::Register,
        ModuleMode::Bind,
        ModuleMode::Share,
        ModuleMode::RangeCheck,
        ModuleMode::Reset,
        ModuleMode::Authentication,
        ModuleMode::OtaUpdate,
    ];

    pub const ALL_INTERNAL: [InternalModuleKind; 5] = [
        InternalModuleKind::None,
        InternalModuleKind::Xjt,
        InternalModuleKind::Isrm,
        InternalModuleKind::Multi,
        InternalModuleKind::Ppm,
    ];

    pub fn board(internal: InternalModuleKind, lite: bool, uart: bool) -> BoardCapabilities {
        BoardCapabilities {
            internal_module: internal,
            internal_uart: uart,
            external_lite_bay: lite,
            external_uart: uart,
            ..Default::default()
        }
    }
}

// ============================================================================
// Resolution Tests
// ============================================================================

mod resolution_tests {
    use super::*;

    #[test]
    fn test_every_available_type_maps_to_a_driver() {
        let board = helpers::board(InternalModuleKind::Xjt, true, true);
        for module_type in helpers::ALL_TYPES {
            let settings = ModuleSettings::new(module_type);
            let protocol = map_protocol(ModuleSlot::External, &board, &settings);
            let available = board.module_type_available(ModuleSlot::External, module_type);
            assert_eq!(
                protocol != ProtocolId::None,
                available,
                "{:?} mapped to {:?}",
                module_type,
                protocol
            );
        }
    }

    #[test]
    fn test_internal_slot_without_module_is_always_none() {
        let board = BoardCapabilities::external_only();
        for module_type in helpers::ALL_TYPES {
            let settings = ModuleSettings::new(module_type);
            assert_eq!(
                map_protocol(ModuleSlot::Internal, &board, &settings),
                ProtocolId::None
            );
        }
    }

    #[test]
    fn test_serial_types_need_external_uart() {
        let board = helpers::board(InternalModuleKind::None, false, false);
        for module_type in [ModuleType::Sbus, ModuleType::Multimodule, ModuleType::Dsm2] {
            let settings = ModuleSettings::new(module_type);
            assert_eq!(
                map_protocol(ModuleSlot::External, &board, &settings),
                ProtocolId::None
            );
        }
        let settings = ModuleSettings::new(ModuleType::Ppm);
        assert_eq!(
            map_protocol(ModuleSlot::External, &board, &settings),
            ProtocolId::Ppm
        );
    }
}

// ============================================================================
// Failsafe Tests
// ============================================================================

mod failsafe_tests {
    use super::*;

    #[test]
    fn test_two_modules_capture_independently() {
        let mut model = ModelSettings::default();
        {
            let internal = model.module_mut(ModuleSlot::Internal);
            internal.channels_start = 0;
            internal.channels_count = 8;
        }
        {
            let external = model.module_mut(ModuleSlot::External);
            external.channels_start = 8;
            external.channels_count = 8;
        }
        let mut outputs = ChannelOutputs::default();
        for (channel, value) in outputs.as_mut_slice().iter_mut().enumerate() {
            *value = channel as i16 * 10;
        }

        capture_failsafe(&mut model, &outputs, ModuleSlot::External);
        assert_eq!(model.failsafe_channels[3], FAILSAFE_NEUTRAL);
        assert_eq!(model.failsafe_channels[8], 80);
        assert_eq!(model.failsafe_channels[15], 150);
        assert_eq!(model.failsafe_channels[16], FAILSAFE_NEUTRAL);

        // Capturing the internal module resets the external channels
        capture_failsafe(&mut model, &outputs, ModuleSlot::Internal);
        assert_eq!(model.failsafe_channels[3], 30);
        assert_eq!(model.failsafe_channels[8], FAILSAFE_NEUTRAL);
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    fn module_type() -> impl Strategy<Value = ModuleType> {
        prop::sample::select(helpers::ALL_TYPES.to_vec())
    }

    fn module_mode() -> impl Strategy<Value = ModuleMode> {
        prop::sample::select(helpers::ALL_MODES.to_vec())
    }

    fn internal_kind() -> impl Strategy<Value = InternalModuleKind> {
        prop::sample::select(helpers::ALL_INTERNAL.to_vec())
    }

    fn slot() -> impl Strategy<Value = ModuleSlot> {
        prop_oneof![Just(ModuleSlot::Internal), Just(ModuleSlot::External)]
    }

    fn failsafe_value() -> impl Strategy<Value = i16> {
        prop_oneof![
            -1024i16..=1024i16,
            Just(FAILSAFE_CHANNEL_HOLD),
            Just(FAILSAFE_CHANNEL_NOPULSE),
        ]
    }

    proptest! {
        #[test]
        fn pause_always_resolves_to_none(
            module_type in module_type(),
            rf_protocol in 0u8..8,
            mode in module_mode(),
            internal in internal_kind(),
            lite: bool,
            uart: bool,
            slot in slot(),
            now_ticks: u32,
        ) {
            let board = helpers::board(internal, lite, uart);
            let settings = ModuleSettings { rf_protocol, ..ModuleSettings::new(module_type) };
            let input = ResolveInput { board: &board, settings: &settings, mode, paused: true, now_ticks };

            let mut resolver = ProtocolResolver::new(100);
            prop_assert_eq!(resolver.peek(slot, input), ProtocolId::None);
            prop_assert_eq!(resolver.resolve(slot, input).protocol, ProtocolId::None);
        }

        #[test]
        fn outside_bind_resolution_is_the_family_mapping(
            module_type in module_type(),
            rf_protocol in 0u8..8,
            mode in module_mode(),
            internal in internal_kind(),
            slot in slot(),
            now_ticks: u32,
        ) {
            prop_assume!(mode != ModuleMode::Bind);
            let board = helpers::board(internal, true, true);
            let settings = ModuleSettings { rf_protocol, ..ModuleSettings::new(module_type) };
            let input = ResolveInput { board: &board, settings: &settings, mode, paused: false, now_ticks };

            let mut resolver = ProtocolResolver::new(100);
            let resolution = resolver.resolve(slot, input);
            prop_assert_eq!(resolution.protocol, map_protocol(slot, &board, &settings));
            prop_assert!(!resolution.settling);
        }

        #[test]
        fn dsm2_settle_lasts_exactly_the_window(
            start: u32,
            settle in 1u32..500,
            rf_protocol in 0u8..4,
        ) {
            let board = BoardCapabilities::default();
            let settings = ModuleSettings { rf_protocol, ..ModuleSettings::new(ModuleType::Dsm2) };
            let mut resolver = ProtocolResolver::new(settle);
            let at = |now_ticks| ResolveInput {
                board: &board,
                settings: &settings,
                mode: ModuleMode::Bind,
                paused: false,
                now_ticks,
            };

            prop_assert_eq!(resolver.resolve(ModuleSlot::External, at(start)).protocol, ProtocolId::None);
            let last_held = start.wrapping_add(settle - 1);
            prop_assert_eq!(resolver.resolve(ModuleSlot::External, at(last_held)).protocol, ProtocolId::None);
            let released = resolver.resolve(ModuleSlot::External, at(start.wrapping_add(settle)));
            prop_assert!(released.protocol.is_dsm2());
            prop_assert!(!released.settling);
        }

        #[test]
        fn failsafe_capture_respects_range_and_sentinels(
            start in 0u8..32,
            count in 0u8..32,
            stored in prop::collection::vec(failsafe_value(), MAX_OUTPUT_CHANNELS),
            live in prop::collection::vec(-1024i16..=1024i16, MAX_OUTPUT_CHANNELS),
            slot in slot(),
        ) {
            let mut model = ModelSettings::default();
            model.module_mut(slot).channels_start = start;
            model.module_mut(slot).channels_count = count;
            model.failsafe_channels.copy_from_slice(&stored);
            let mut outputs = ChannelOutputs::default();
            outputs.as_mut_slice().copy_from_slice(&live);

            capture_failsafe(&mut model, &outputs, slot);

            let range = start as usize..start as usize + count as usize;
            for channel in 0..MAX_OUTPUT_CHANNELS {
                let after = model.failsafe_channels[channel];
                if !range.contains(&channel) {
                    prop_assert_eq!(after, FAILSAFE_NEUTRAL);
                } else if stored[channel] >= FAILSAFE_CHANNEL_HOLD {
                    prop_assert_eq!(after, stored[channel]);
                } else {
                    prop_assert_eq!(after, live[channel]);
                }
            }
        }
    }
}
