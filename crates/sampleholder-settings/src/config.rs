//! Configuration and settings management for SampleHolder
//!
//! Provides configuration file handling and validation. Supports JSON and
//! TOML file formats stored in the platform configuration directory.
//!
//! Configuration is organized into two sections:
//! - Connection settings (port, baud rate, timeouts)
//! - Holder settings (sample count, fallback SPR, occupied samples)

use crate::error::{ConfigError, ConfigResult, SettingsError, SettingsResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory under the platform config dir holding our files
pub const CONFIG_DIR_NAME: &str = "sampleholder";

/// Default config file name
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Serial port name, empty when not chosen yet
    pub port: String,
    /// Baud rate for the serial connection
    pub baud_rate: u32,
    /// Per-byte read timeout in milliseconds
    pub timeout_ms: u64,
    /// Consecutive idle reads before a response times out
    pub read_attempts: u32,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: 9600,
            timeout_ms: 10_000,
            read_attempts: 3,
        }
    }
}

impl ConnectionSettings {
    /// Read timeout as a duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Sample holder settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HolderSettings {
    /// Number of sample slots
    pub sample_count: u32,
    /// Steps per revolution used when the device can not be queried
    pub default_spr: u32,
    /// Wait after opening the port before the first command, in milliseconds
    pub settle_delay_ms: u64,
    /// Slots that currently hold a sample
    pub occupied: Vec<u32>,
}

impl Default for HolderSettings {
    fn default() -> Self {
        Self {
            sample_count: 10,
            default_spr: 200,
            settle_delay_ms: 3000,
            occupied: Vec::new(),
        }
    }
}

impl HolderSettings {
    /// Settle delay as a duration
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Connection settings
    pub connection: ConnectionSettings,
    /// Holder geometry and occupancy
    pub holder: HolderSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Toml,
}

impl Format {
    fn of(path: &Path) -> ConfigResult<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(Self::Json),
            Some("toml") => Ok(Self::Toml),
            other => Err(ConfigError::UnsupportedFormat(
                other.unwrap_or("(none)").to_string(),
            )),
        }
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let format = Format::of(path)?;
        let content = std::fs::read_to_string(path).map_err(|e| SettingsError::LoadError {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let config: Self = match format {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise return defaults
    pub fn load_or_default(path: &Path) -> SettingsResult<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to file (JSON or TOML), creating parent directories
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match Format::of(path)? {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)?,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content).map_err(|e| SettingsError::SaveError {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.connection.baud_rate == 0 {
            return Err(ConfigError::out_of_range("connection.baud_rate", 0));
        }
        if self.connection.timeout_ms == 0 {
            return Err(ConfigError::out_of_range("connection.timeout_ms", 0));
        }
        if self.connection.read_attempts == 0 {
            return Err(ConfigError::out_of_range("connection.read_attempts", 0));
        }
        if self.holder.sample_count == 0 {
            return Err(ConfigError::out_of_range("holder.sample_count", 0));
        }
        if self.holder.default_spr == 0 {
            return Err(ConfigError::out_of_range("holder.default_spr", 0));
        }
        if let Some(slot) = self
            .holder
            .occupied
            .iter()
            .find(|slot| **slot >= self.holder.sample_count)
        {
            return Err(ConfigError::out_of_range("holder.occupied", slot));
        }
        Ok(())
    }

    /// Mark `slot` occupied or free, keeping the list sorted
    pub fn set_occupied(&mut self, slot: u32, occupied: bool) -> ConfigResult<()> {
        if slot >= self.holder.sample_count {
            return Err(ConfigError::out_of_range("holder.occupied", slot));
        }
        self.holder.occupied.retain(|s| *s != slot);
        if occupied {
            self.holder.occupied.push(slot);
            self.holder.occupied.sort_unstable();
        }
        Ok(())
    }
}

/// `<config dir>/sampleholder/config.toml`
pub fn default_config_path() -> ConfigResult<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
        .ok_or_else(|| {
            ConfigError::UnsupportedPlatform("no configuration directory".to_string())
        })
}
