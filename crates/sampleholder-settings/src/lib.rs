//! SampleHolder Settings Crate
//!
//! Handles the connection and holder configuration file.

pub mod config;
pub mod error;

pub use config::{default_config_path, Config, ConnectionSettings, HolderSettings};
pub use error::{ConfigError, ConfigResult, SettingsError, SettingsResult};
