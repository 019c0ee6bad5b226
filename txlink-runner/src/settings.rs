//! Runner settings

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use txlink_protocol::{ModelSettings, ModuleSlot, ModuleType};
use txlink_sched::LinkConfig;
use txlink_sim::DEFAULT_MIXER_DURATION_US;

/// Everything a run needs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunnerSettings {
    /// Scheduler configuration, including the board
    #[serde(default)]
    pub link: LinkConfig,
    /// Model to load
    #[serde(default = "default_model")]
    pub model: ModelSettings,
    /// How long to run (ms)
    #[serde(default = "default_run_ms")]
    pub run_ms: u64,
    /// Simulated computation time per cycle (µs)
    #[serde(default = "default_mixer_duration")]
    pub mixer_duration_us: u32,
    /// Bind this slot after start, picking the first receiver that answers
    #[serde(default)]
    pub bind: Option<ModuleSlot>,
}

fn default_model() -> ModelSettings {
    let mut model = ModelSettings::default();
    model.module_mut(ModuleSlot::Internal).module_type = ModuleType::XjtPxx1;
    model.module_mut(ModuleSlot::External).module_type = ModuleType::Multimodule;
    model
}

fn default_run_ms() -> u64 {
    2_000
}

fn default_mixer_duration() -> u32 {
    DEFAULT_MIXER_DURATION_US
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            link: LinkConfig::default(),
            model: default_model(),
            run_ms: default_run_ms(),
            mixer_duration_us: default_mixer_duration(),
            bind: None,
        }
    }
}

impl RunnerSettings {
    /// Get the XDG config directory for txlink
    /// Uses $XDG_CONFIG_HOME/txlink, falls back to ~/.config/txlink
    fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("txlink"));
            }
        }

        dirs::home_dir().map(|h| h.join(".config").join("txlink"))
    }

    /// Settings file used when no path is given
    pub fn default_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.json"))
    }

    /// Load settings; a missing file gives the defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        let settings: Self = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse settings in {}", path.display()))?;
        settings
            .model
            .validate_for(&settings.link.board)
            .with_context(|| format!("Invalid model in {}", path.display()))?;
        Ok(settings)
    }

    /// Save settings to disk
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create settings directory {}", parent.display())
            })?;
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write settings to {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use txlink_protocol::BoardCapabilities;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("txlink-test-{}", std::process::id()))
            .join(name)
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let settings = RunnerSettings::load(&temp_path("absent.json")).unwrap();
        assert_eq!(settings, RunnerSettings::default());
    }

    #[test]
    fn test_save_then_load() {
        let path = temp_path("saved.json");
        let mut settings = RunnerSettings::default();
        settings.run_ms = 750;
        settings.bind = Some(ModuleSlot::External);
        settings.link.start_paused = false;

        settings.save(&path).unwrap();
        let loaded = RunnerSettings::load(&path).unwrap();
        assert_eq!(loaded, settings);

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let path = temp_path("partial.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{ "run_ms": 100, "link": { "bind_settle_ticks": 5 } }"#)
            .unwrap();

        let settings = RunnerSettings::load(&path).unwrap();
        assert_eq!(settings.run_ms, 100);
        assert_eq!(settings.link.bind_settle_ticks, 5);
        assert_eq!(settings.link.trigger_timeout_ms, 30);
        assert_eq!(settings.model, default_model());

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_module_missing_from_board_is_an_error() {
        let path = temp_path("unfitted.json");
        let mut settings = RunnerSettings::default();
        settings.link.board = BoardCapabilities::external_only();
        settings.save(&path).unwrap();

        let err = RunnerSettings::load(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid model"));

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_invalid_model_is_an_error() {
        let path = temp_path("invalid.json");
        let mut settings = RunnerSettings::default();
        settings.model.module_mut(ModuleSlot::External).channels_start = 30;
        settings.save(&path).unwrap();

        let err = RunnerSettings::load(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid model"));

        let _ = std::fs::remove_file(path);
    }
}
