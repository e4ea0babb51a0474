//! Gateway configuration: TOML file with serde defaults.
//!
//! The core pipeline consumes only the `[tracking]` knobs; `[mqtt]` belongs
//! to the sink. Every field has a default so a minimal config is just the
//! broker host.

use crate::registry::{RegistryConfig, Thresholds};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Deserialize, Debug, Clone)]
pub struct GatewayConfig {
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
}

impl GatewayConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::de::from_str(&contents)?)
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_seconds: u64,
}

fn default_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "beacon-gateway".to_string()
}

fn default_topic() -> String {
    "v1/gateway/telemetry".to_string()
}

fn default_keep_alive() -> u64 {
    60
}

/// Change-detection and cadence knobs.
#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(default)]
pub struct TrackingConfig {
    /// °C
    pub temperature_threshold: f64,
    /// %RH
    pub humidity_threshold: f64,
    /// raw per-type battery units
    pub battery_threshold: i32,
    pub keepalive_seconds: u64,
    pub retention_seconds: u64,
    pub sweep_interval_seconds: u64,
    pub publish_interval_seconds: u64,
    pub lock_timeout_ms: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        TrackingConfig {
            temperature_threshold: 0.1,
            humidity_threshold: 0.5,
            battery_threshold: 5,
            keepalive_seconds: 6 * 60 * 60,
            retention_seconds: 6 * 60 * 60,
            sweep_interval_seconds: 60,
            publish_interval_seconds: 60,
            lock_timeout_ms: 1000,
        }
    }
}

impl TrackingConfig {
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            thresholds: Thresholds {
                temperature: self.temperature_threshold,
                humidity: self.humidity_threshold,
                battery: self.battery_threshold,
            },
            keepalive: Duration::from_secs(self.keepalive_seconds),
            retention: Duration::from_secs(self.retention_seconds),
            lock_timeout: Duration::from_millis(self.lock_timeout_ms),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }

    pub fn publish_interval(&self) -> Duration {
        Duration::from_secs(self.publish_interval_seconds)
    }
}

/// Parse a human-readable duration: `500ms`, `90s`, `15m`, `6h`; a bare
/// number is seconds.
pub fn parse_duration(src: &str) -> Result<Duration, String> {
    let src = src.trim();
    if src.is_empty() {
        return Err("empty duration string".to_string());
    }

    let (number, unit_ms) = if let Some(num) = src.strip_suffix("ms") {
        (num, 1u64)
    } else if let Some(num) = src.strip_suffix('h') {
        (num, 3_600_000)
    } else if let Some(num) = src.strip_suffix('m') {
        (num, 60_000)
    } else if let Some(num) = src.strip_suffix('s') {
        (num, 1_000)
    } else {
        (src, 1_000)
    };

    let value: u64 = number
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration: {src}"))?;
    Ok(Duration::from_millis(value * unit_ms))
}
