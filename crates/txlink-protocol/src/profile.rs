//! Per-protocol port setup and frame timing
//!
//! Each `(slot, protocol)` pair maps to a [`ProtocolProfile`]: how the bay port
//! must be configured when the driver starts, which scheduler period to program
//! on start, and which period to re-apply on every steady-state cycle.

use crate::board::BoardCapabilities;
use crate::module::ModuleSettings;
use crate::{ModuleSlot, ProtocolId};

/// PXX1 pulse train period (µs)
pub const PXX_PULSES_PERIOD: u32 = 9_000;
/// PXX1 serial period on either bay (µs)
pub const PXX1_SERIAL_PERIOD: u32 = 4_000;
/// PXX2 period (µs)
pub const PXX2_PERIOD: u32 = 4_000;
/// PXX2 period while the spectrum analyser or power meter runs (µs)
pub const PXX2_TOOLS_PERIOD: u32 = 1_000;
/// DSM2 period (µs)
pub const DSM2_PERIOD: u32 = 22_000;
/// Crossfire period until the module reports its own rate (µs)
pub const CROSSFIRE_PERIOD: u32 = 4_000;
/// Multimodule period until the module reports its own rate (µs)
pub const MULTIMODULE_PERIOD: u32 = 7_000;

/// PXX2 high-speed baud rate
pub const PXX2_HIGHSPEED_BAUDRATE: u32 = 450_000;
/// PXX2 low-speed baud rate
pub const PXX2_LOWSPEED_BAUDRATE: u32 = 115_200;
/// PXX1 serial baud rate on the external lite bay
pub const EXTMODULE_PXX1_SERIAL_BAUDRATE: u32 = 420_000;
/// PXX1 serial baud rate on the internal bay
pub const INTMODULE_PXX1_SERIAL_BAUDRATE: u32 = 450_000;
/// Multimodule baud rate
pub const MULTIMODULE_BAUDRATE: u32 = 100_000;
/// SBUS baud rate
pub const SBUS_BAUDRATE: u32 = 100_000;
/// DSM2 serial baud rate
pub const DSM2_BAUDRATE: u32 = 125_000;

/// PPM frame period for the given frame length setting (µs)
pub fn ppm_period(settings: &ModuleSettings) -> u32 {
    half_ms_adjusted_period(settings.ppm_frame_length)
}

/// SBUS frame period for the given refresh setting (µs)
pub fn sbus_period(settings: &ModuleSettings) -> u32 {
    half_ms_adjusted_period(settings.sbus_refresh_rate)
}

// 22.5 ms plus the setting in 0.5 ms steps
fn half_ms_adjusted_period(steps: i8) -> u32 {
    let period = (i32::from(steps) * 5 + 225) * 100;
    period.max(0) as u32
}

/// UART parity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UartParity {
    /// No parity bit
    None,
    /// Even parity
    Even,
}

/// UART line settings for serial protocols
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UartConfig {
    /// Baud rate
    pub baud_rate: u32,
    /// Parity
    pub parity: UartParity,
    /// Stop bits
    pub stop_bits: u8,
    /// Word length including parity
    pub word_length: u8,
    /// Line is inverted
    pub inverted: bool,
}

impl UartConfig {
    /// 8N1 at the given baud rate
    pub fn new_8n1(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            parity: UartParity::None,
            stop_bits: 1,
            word_length: 8,
            inverted: false,
        }
    }

    /// 8E2 at the given baud rate (9-bit words with parity)
    pub fn new_8e2(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            parity: UartParity::Even,
            stop_bits: 2,
            word_length: 9,
            inverted: false,
        }
    }

    /// Same settings on an inverted line
    pub fn inverted(mut self) -> Self {
        self.inverted = true;
        self
    }
}

/// Pulse train shape generated by the bay timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseEncoding {
    /// PPM
    Ppm,
    /// PXX1 bit stream
    Pxx1,
}

/// How the bay port is brought up for a protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortSetup {
    /// Pulse timer output
    PulseTrain(PulseEncoding),
    /// UART output
    Uart(UartConfig),
    /// Only power the module; it owns its own link
    ModulePower,
}

/// How the scheduler period is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodPolicy {
    /// Period 0 (no trigger for this slot)
    Off,
    /// Constant period (µs)
    Fixed(u32),
    /// PPM frame length setting
    PpmFrame,
    /// SBUS refresh setting
    SbusRefresh,
    /// Rate reported by the module; `fallback` applies while the report is invalid,
    /// and `None` leaves the period untouched
    Synced {
        /// Period used without a valid report
        fallback: Option<u32>,
    },
    /// Scheduler stopped; the module heartbeat paces frames
    ModuleHeartbeat,
}

impl PeriodPolicy {
    /// Period to program, or `None` to leave the scheduler period alone
    ///
    /// `synced` is the module-reported refresh period when a valid report exists.
    pub fn resolve(&self, settings: &ModuleSettings, synced: Option<u32>) -> Option<u32> {
        match *self {
            PeriodPolicy::Off => Some(0),
            PeriodPolicy::Fixed(period) => Some(period),
            PeriodPolicy::PpmFrame => Some(ppm_period(settings)),
            PeriodPolicy::SbusRefresh => Some(sbus_period(settings)),
            PeriodPolicy::Synced { fallback } => synced.or(fallback),
            PeriodPolicy::ModuleHeartbeat => None,
        }
    }
}

/// Capability table entry for one protocol on one slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolProfile {
    /// Protocol this profile describes
    pub protocol: ProtocolId,
    /// Port setup on start, `None` when nothing is started
    pub port: Option<PortSetup>,
    /// Period programmed when the driver starts
    pub start_period: PeriodPolicy,
    /// Period re-applied on every steady-state cycle
    pub steady_period: Option<PeriodPolicy>,
    /// Period while the module runs an RF tool (spectrum analyser, power meter)
    pub rf_tools_period: Option<u32>,
}

impl ProtocolProfile {
    const fn idle(protocol: ProtocolId) -> Self {
        Self {
            protocol,
            port: None,
            start_period: PeriodPolicy::Off,
            steady_period: Some(PeriodPolicy::Off),
            rf_tools_period: None,
        }
    }

    const fn started(protocol: ProtocolId, port: PortSetup, start_period: PeriodPolicy) -> Self {
        Self {
            protocol,
            port: Some(port),
            start_period,
            steady_period: None,
            rf_tools_period: None,
        }
    }

    /// Look up the profile of `protocol` on `slot` for this board
    pub fn lookup(slot: ModuleSlot, protocol: ProtocolId, board: &BoardCapabilities) -> Self {
        match slot {
            ModuleSlot::Internal => Self::internal(protocol, board),
            ModuleSlot::External => Self::external(protocol),
        }
    }

    fn internal(protocol: ProtocolId, board: &BoardCapabilities) -> Self {
        let paced = if board.internal_heartbeat {
            PeriodPolicy::ModuleHeartbeat
        } else {
            PeriodPolicy::Fixed(PXX1_SERIAL_PERIOD)
        };

        match protocol {
            ProtocolId::Pxx1Pulses => {
                Self::started(protocol, PortSetup::PulseTrain(PulseEncoding::Pxx1), paced)
            }
            ProtocolId::Pxx1Serial => Self::started(
                protocol,
                PortSetup::Uart(UartConfig::new_8n1(INTMODULE_PXX1_SERIAL_BAUDRATE)),
                paced,
            ),
            ProtocolId::Pxx2HighSpeed => {
                let (start_period, steady) = if board.internal_heartbeat {
                    (PeriodPolicy::ModuleHeartbeat, PeriodPolicy::Off)
                } else {
                    (PeriodPolicy::Fixed(PXX2_PERIOD), PeriodPolicy::Fixed(PXX2_PERIOD))
                };
                Self {
                    steady_period: Some(steady),
                    rf_tools_period: Some(PXX2_TOOLS_PERIOD),
                    ..Self::started(
                        protocol,
                        PortSetup::Uart(UartConfig::new_8n1(PXX2_HIGHSPEED_BAUDRATE)),
                        start_period,
                    )
                }
            }
            ProtocolId::Ppm => Self {
                steady_period: Some(PeriodPolicy::PpmFrame),
                ..Self::started(
                    protocol,
                    PortSetup::PulseTrain(PulseEncoding::Ppm),
                    PeriodPolicy::PpmFrame,
                )
            },
            ProtocolId::Multimodule => Self {
                steady_period: Some(PeriodPolicy::Fixed(MULTIMODULE_PERIOD)),
                ..Self::started(
                    protocol,
                    PortSetup::Uart(UartConfig::new_8e2(MULTIMODULE_BAUDRATE)),
                    PeriodPolicy::Fixed(MULTIMODULE_PERIOD),
                )
            },
            _ => Self::idle(protocol),
        }
    }

    fn external(protocol: ProtocolId) -> Self {
        match protocol {
            ProtocolId::None => Self::idle(protocol),
            ProtocolId::Ppm => Self::started(
                protocol,
                PortSetup::PulseTrain(PulseEncoding::Ppm),
                PeriodPolicy::PpmFrame,
            ),
            ProtocolId::Pxx1Pulses => Self::started(
                protocol,
                PortSetup::PulseTrain(PulseEncoding::Pxx1),
                PeriodPolicy::Fixed(PXX_PULSES_PERIOD),
            ),
            ProtocolId::Pxx1Serial => Self::started(
                protocol,
                PortSetup::Uart(UartConfig::new_8n1(EXTMODULE_PXX1_SERIAL_BAUDRATE)),
                PeriodPolicy::Fixed(PXX1_SERIAL_PERIOD),
            ),
            ProtocolId::Pxx2HighSpeed => Self::started(
                protocol,
                PortSetup::Uart(UartConfig::new_8n1(PXX2_HIGHSPEED_BAUDRATE).inverted()),
                PeriodPolicy::Fixed(PXX2_PERIOD),
            ),
            ProtocolId::Pxx2LowSpeed => Self::started(
                protocol,
                PortSetup::Uart(UartConfig::new_8n1(PXX2_LOWSPEED_BAUDRATE).inverted()),
                PeriodPolicy::Fixed(PXX2_PERIOD),
            ),
            ProtocolId::Sbus => Self {
                steady_period: Some(PeriodPolicy::SbusRefresh),
                ..Self::started(
                    protocol,
                    PortSetup::Uart(UartConfig::new_8e2(SBUS_BAUDRATE).inverted()),
                    PeriodPolicy::SbusRefresh,
                )
            },
            ProtocolId::Multimodule => Self {
                steady_period: Some(PeriodPolicy::Synced {
                    fallback: Some(MULTIMODULE_PERIOD),
                }),
                ..Self::started(
                    protocol,
                    PortSetup::Uart(UartConfig::new_8e2(MULTIMODULE_BAUDRATE)),
                    PeriodPolicy::Fixed(MULTIMODULE_PERIOD),
                )
            },
            ProtocolId::Dsm2Lp45 | ProtocolId::Dsm2Dsm2 | ProtocolId::Dsm2Dsmx => Self::started(
                protocol,
                PortSetup::Uart(UartConfig::new_8n1(DSM2_BAUDRATE)),
                PeriodPolicy::Fixed(DSM2_PERIOD),
            ),
            ProtocolId::Crossfire => Self {
                steady_period: Some(PeriodPolicy::Synced { fallback: None }),
                ..Self::started(
                    protocol,
                    PortSetup::ModulePower,
                    PeriodPolicy::Fixed(CROSSFIRE_PERIOD),
                )
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ModuleType;

    #[test]
    fn test_ppm_period_follows_frame_length() {
        let mut settings = ModuleSettings::new(ModuleType::Ppm);
        assert_eq!(ppm_period(&settings), 22_500);

        settings.ppm_frame_length = 4;
        assert_eq!(ppm_period(&settings), 24_500);

        settings.ppm_frame_length = -20;
        assert_eq!(ppm_period(&settings), 12_500);
    }

    #[test]
    fn test_synced_policy_prefers_module_rate() {
        let settings = ModuleSettings::new(ModuleType::Multimodule);
        let policy = PeriodPolicy::Synced {
            fallback: Some(MULTIMODULE_PERIOD),
        };
        assert_eq!(policy.resolve(&settings, Some(6_500)), Some(6_500));
        assert_eq!(policy.resolve(&settings, None), Some(MULTIMODULE_PERIOD));

        let crossfire = PeriodPolicy::Synced { fallback: None };
        assert_eq!(crossfire.resolve(&settings, None), None);
    }

    #[test]
    fn test_external_profiles() {
        let board = BoardCapabilities::default();

        let pxx1 = ProtocolProfile::lookup(ModuleSlot::External, ProtocolId::Pxx1Pulses, &board);
        assert_eq!(pxx1.start_period, PeriodPolicy::Fixed(PXX_PULSES_PERIOD));
        assert_eq!(pxx1.steady_period, None);

        let dsm = ProtocolProfile::lookup(ModuleSlot::External, ProtocolId::Dsm2Dsmx, &board);
        assert_eq!(dsm.start_period, PeriodPolicy::Fixed(DSM2_PERIOD));

        let none = ProtocolProfile::lookup(ModuleSlot::External, ProtocolId::None, &board);
        assert_eq!(none.port, None);
        assert_eq!(none.start_period, PeriodPolicy::Off);

        let pxx2 = ProtocolProfile::lookup(ModuleSlot::External, ProtocolId::Pxx2LowSpeed, &board);
        match pxx2.port {
            Some(PortSetup::Uart(uart)) => {
                assert_eq!(uart.baud_rate, PXX2_LOWSPEED_BAUDRATE);
                assert!(uart.inverted);
            }
            other => panic!("Expected UART port, got {:?}", other),
        }
    }

    #[test]
    fn test_internal_heartbeat_stops_scheduler() {
        let board = BoardCapabilities {
            internal_heartbeat: true,
            ..Default::default()
        };
        let profile = ProtocolProfile::lookup(ModuleSlot::Internal, ProtocolId::Pxx2HighSpeed, &board);
        assert_eq!(profile.start_period, PeriodPolicy::ModuleHeartbeat);
        assert_eq!(profile.steady_period, Some(PeriodPolicy::Off));
        assert_eq!(profile.rf_tools_period, Some(PXX2_TOOLS_PERIOD));

        let paced = ProtocolProfile::lookup(
            ModuleSlot::Internal,
            ProtocolId::Pxx2HighSpeed,
            &BoardCapabilities::default(),
        );
        assert_eq!(paced.start_period, PeriodPolicy::Fixed(PXX2_PERIOD));
    }
}
