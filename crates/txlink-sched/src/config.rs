//! Scheduler configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use txlink_protocol::BoardCapabilities;

/// Default mixer trigger timeout (ms)
pub const DEFAULT_TRIGGER_TIMEOUT_MS: u64 = 30;

/// Default emergency power-off hold (10 ms ticks)
pub const DEFAULT_FORCE_POWER_OFF_TICKS: u32 = 1000;

/// Default DSM2 bind settle time (10 ms ticks)
pub const DEFAULT_BIND_SETTLE_TICKS: u32 = 100;

/// Configuration of the link scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// How long the mixer waits for a scheduler trigger before running anyway (ms)
    pub trigger_timeout_ms: u64,
    /// Power button hold that forces the board off, in 10 ms ticks
    pub force_power_off_ticks: u32,
    /// Time a DSM2 module is kept off before binding starts, in 10 ms ticks
    pub bind_settle_ticks: u32,
    /// Start with pulse generation paused (the model is still loading)
    pub start_paused: bool,
    /// Depth of the event channel created by callers
    pub event_queue_depth: usize,
    /// Link hardware of the board
    pub board: BoardCapabilities,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            trigger_timeout_ms: DEFAULT_TRIGGER_TIMEOUT_MS,
            force_power_off_ticks: DEFAULT_FORCE_POWER_OFF_TICKS,
            bind_settle_ticks: DEFAULT_BIND_SETTLE_TICKS,
            start_paused: true,
            event_queue_depth: 64,
            board: BoardCapabilities::default(),
        }
    }
}

impl LinkConfig {
    /// Trigger timeout as a [`Duration`]
    pub fn trigger_timeout(&self) -> Duration {
        Duration::from_millis(self.trigger_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: LinkConfig = serde_json::from_str(r#"{"start_paused": false}"#).unwrap();
        assert!(!config.start_paused);
        assert_eq!(config.trigger_timeout(), Duration::from_millis(30));
        assert_eq!(config.bind_settle_ticks, 100);
        assert!(config.board.has_internal_module());
    }
}
