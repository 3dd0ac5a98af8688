//! Device configuration loaded from TOML.
//!
//! Covers the full configuration surface the service consumes: broker
//! address, device identity fields, the device-scoped subscribe filter, the
//! announce-topic prefix, publish pacing delays, and the networked flag.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceConfig {
    pub device: DeviceSection,
    pub mqtt: MqttSection,
}

/// Device section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSection {
    /// Device identifier (must match [a-zA-Z0-9._-]+); used in announce
    /// topics and payloads.
    pub id: String,
    /// Network-assigned identifier; path separators are stripped to form the
    /// unique device identifier. Empty means "derive one".
    #[serde(default)]
    pub network_id: String,
    /// When false the service never touches the network and every publish
    /// returns immediately.
    #[serde(default = "default_networked")]
    pub networked: bool,
}

/// MQTT section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// Broker URL with protocol and optional port, e.g. `mqtt://broker:1883`.
    pub broker_url: String,
    /// Topic filter for inbound device commands.
    #[serde(default = "default_subscribe_filter")]
    pub subscribe_filter: String,
    /// Prefix of the announce topic; the device id is appended.
    #[serde(default = "default_announce_prefix")]
    pub announce_prefix: String,
    /// Delay before each outbound publish, in milliseconds.
    #[serde(default = "default_publish_delay_ms")]
    pub pre_publish_delay_ms: u64,
    /// Delay after each outbound publish, in milliseconds.
    #[serde(default = "default_publish_delay_ms")]
    pub post_publish_delay_ms: u64,
}

fn default_networked() -> bool {
    true
}

fn default_subscribe_filter() -> String {
    "gbcmd/#".to_string()
}

fn default_announce_prefix() -> String {
    "gbdevice/".to_string()
}

fn default_publish_delay_ms() -> u64 {
    50
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid device id: {0}")]
    InvalidDeviceId(String),
}

impl ServiceConfig {
    /// Load configuration from a TOML file and validate it.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: ServiceConfig = toml::from_str(&content)?;
        validate_device_id(&config.device.id)?;
        Ok(config)
    }

    /// Pacing delay applied before each outbound publish.
    pub fn pre_publish_delay(&self) -> Duration {
        Duration::from_millis(self.mqtt.pre_publish_delay_ms)
    }

    /// Pacing delay applied after each outbound publish.
    pub fn post_publish_delay(&self) -> Duration {
        Duration::from_millis(self.mqtt.post_publish_delay_ms)
    }

}

fn validate_device_id(device_id: &str) -> Result<(), ConfigError> {
    let valid_chars = device_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');

    if device_id.is_empty() || !valid_chars {
        return Err(ConfigError::InvalidDeviceId(format!(
            "Device id '{device_id}' must match pattern [a-zA-Z0-9._-]+"
        )));
    }

    Ok(())
}
