//! `beacon-gateway` library.
//!
//! The binary (`src/main.rs`) is responsible for CLI parsing and process exit codes.
//! The core pipeline lives in [`crate::gateway`] where it can be tested
//! deterministically with injected advertisement sources and batch sinks.

pub mod advertisement;
pub mod config;
pub mod decoder;
pub mod fingerprint;
pub mod gateway;
pub mod mac_address;
pub mod publisher;
pub mod registry;
pub mod report;
pub mod sink;
pub mod source;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types at the crate root
pub use advertisement::RawAdvertisement;
pub use config::{ConfigError, GatewayConfig, MqttConfig, TrackingConfig, parse_duration};
pub use decoder::{DeviceType, ParsedReading, SensorReading, decode};
pub use fingerprint::fingerprint;
pub use gateway::{Gateway, GatewayFlags, Options, RunError};
pub use mac_address::MacAddress;
pub use publisher::BatchPublisher;
pub use registry::{
    DeviceRegistry, ObserveOutcome, RegistryConfig, RegistryError, Thresholds, TrackedDevice,
};
pub use report::{Batch, ReportEntry, render_batch};
pub use sink::BatchSink;
pub use sink::mqtt::MqttSink;
pub use source::{AdvertisementSource, SourceError};
