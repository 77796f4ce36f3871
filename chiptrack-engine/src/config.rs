//! Sequencer configuration (config.toml)
//!
//! Timing and history settings, stored as TOML in the platform-specific
//! config directory. Every field has a default so partial files load.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scheduler::Timing;

/// Config file name inside [`config_dir`]
pub const CONFIG_FILE: &str = "config.toml";

/// Errors from reading or writing a config file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("config file is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config could not be serialized: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Sequencer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencerConfig {
    /// How far ahead of the audio clock rows are scheduled (default: 0.1)
    #[serde(default = "default_lookahead_secs")]
    pub lookahead_secs: f64,
    /// Delay before the first row after play/seek (default: 0.05)
    #[serde(default = "default_lead_in_secs")]
    pub lead_in_secs: f64,
    /// Host timer interval between ticks in ms (default: 25)
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Maximum undo/redo entries per stack (default: 100)
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_lookahead_secs() -> f64 {
    0.1
}
fn default_lead_in_secs() -> f64 {
    0.05
}
fn default_tick_interval_ms() -> u64 {
    25
}
fn default_history_limit() -> usize {
    100
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            lookahead_secs: default_lookahead_secs(),
            lead_in_secs: default_lead_in_secs(),
            tick_interval_ms: default_tick_interval_ms(),
            history_limit: default_history_limit(),
        }
    }
}

impl SequencerConfig {
    /// Scheduler timing, with out-of-range values replaced by defaults
    ///
    /// The lookahead must cover at least one tick interval or rows would be
    /// scheduled late.
    pub fn timing(&self) -> Timing {
        let tick = self.tick_interval().as_secs_f64();
        let lookahead = if self.lookahead_secs.is_finite() && self.lookahead_secs > 0.0 {
            self.lookahead_secs.max(tick)
        } else {
            default_lookahead_secs().max(tick)
        };
        let lead_in = if self.lead_in_secs.is_finite() && self.lead_in_secs >= 0.0 {
            self.lead_in_secs
        } else {
            default_lead_in_secs()
        };
        Timing { lookahead, lead_in }
    }

    /// Host tick interval (at least 1 ms)
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

/// Returns the platform-specific configuration directory.
///
/// On Linux: `~/.config/chiptrack`
///
/// Returns `None` if the home directory cannot be determined.
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("io", "chiptrack", "chiptrack")
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Loads the configuration from the platform config directory.
///
/// Returns default values if the file doesn't exist or cannot be parsed.
pub fn load() -> SequencerConfig {
    let Some(path) = config_dir().map(|dir| dir.join(CONFIG_FILE)) else {
        return SequencerConfig::default();
    };
    match load_from(&path) {
        Ok(config) => config,
        Err(ConfigError::Io(_)) => SequencerConfig::default(),
        Err(err) => {
            tracing::warn!(path = %path.display(), %err, "ignoring invalid config");
            SequencerConfig::default()
        }
    }
}

/// Load a config file from an explicit path
pub fn load_from(path: impl AsRef<Path>) -> Result<SequencerConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Write a config file, creating parent directories
pub fn save_to(config: &SequencerConfig, path: impl AsRef<Path>) -> Result<(), ConfigError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string_pretty(config)?)?;
    Ok(())
}
