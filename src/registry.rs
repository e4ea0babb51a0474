//! Shared device registry with change detection, keepalive and expiry.
//!
//! This is the stateful heart of the gateway. One record exists per distinct
//! address; the ingestion, sweep and publish paths all mutate the map under a
//! single exclusive lock acquired with a bounded wait. A lock wait that
//! exceeds the budget abandons that one operation (it is counted and logged,
//! never retried inline) so no path can stall the radio callback or a
//! publish cycle indefinitely.

use crate::advertisement::RawAdvertisement;
use crate::decoder::{DeviceType, ParsedReading, SensorReading};
use crate::fingerprint::fingerprint;
use crate::mac_address::MacAddress;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};

/// Minimum per-field deltas for a change to count as significant.
///
/// The battery threshold applies to raw per-type units (mV or %); no
/// cross-type scaling is attempted.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    /// °C
    pub temperature: f64,
    /// %RH
    pub humidity: f64,
    /// per-type battery units
    pub battery: i32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds {
            temperature: 0.1,
            humidity: 0.5,
            battery: 5,
        }
    }
}

/// Tuning knobs for the registry, all externally supplied.
#[derive(Debug, Clone, Copy)]
pub struct RegistryConfig {
    pub thresholds: Thresholds,
    /// Maximum duration a device may go unreported despite unchanged data.
    pub keepalive: Duration,
    /// Silence duration after which a record is evicted.
    pub retention: Duration,
    /// Bounded wait for the registry lock.
    pub lock_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            thresholds: Thresholds::default(),
            keepalive: Duration::from_secs(6 * 60 * 60),
            retention: Duration::from_secs(6 * 60 * 60),
            lock_timeout: Duration::from_secs(1),
        }
    }
}

/// Last known good state for one device.
///
/// `prev_*` hold the values as of the last accepted significant change (the
/// last-reported baseline), not the last observed values.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedDevice {
    pub address: MacAddress,
    pub name: Option<String>,
    pub device_type: Option<DeviceType>,
    pub is_sensor: bool,
    pub temperature: f64,
    pub humidity: f64,
    pub battery: i32,
    pub prev_temperature: f64,
    pub prev_humidity: f64,
    pub prev_battery: i32,
    pub rssi: i16,
    pub last_seen_ms: u64,
    pub last_reported_ms: u64,
    pub last_changed_ms: u64,
    pub needs_report: bool,
    pub changed_since_report: bool,
    payload_fingerprint: u32,
}

impl TrackedDevice {
    fn new(adv: &RawAdvertisement, payload_fingerprint: u32) -> Self {
        TrackedDevice {
            address: adv.address,
            name: adv.name.clone(),
            device_type: None,
            is_sensor: false,
            temperature: 0.0,
            humidity: 0.0,
            battery: 0,
            prev_temperature: 0.0,
            prev_humidity: 0.0,
            prev_battery: 0,
            rssi: adv.rssi,
            last_seen_ms: adv.received_at_ms,
            last_reported_ms: 0,
            last_changed_ms: adv.received_at_ms,
            needs_report: true,
            changed_since_report: false,
            payload_fingerprint,
        }
    }

    /// Install a reading as both current and previous values, so the next
    /// change check compares against a neutral baseline.
    fn seed(&mut self, reading: &SensorReading) {
        self.is_sensor = true;
        self.device_type = Some(reading.device_type);
        self.temperature = reading.temperature;
        self.humidity = reading.humidity;
        self.battery = reading.battery;
        self.prev_temperature = reading.temperature;
        self.prev_humidity = reading.humidity;
        self.prev_battery = reading.battery;
    }

    /// Roll current values into previous and install the new reading.
    fn accept_change(&mut self, reading: &SensorReading, now_ms: u64) {
        self.prev_temperature = self.temperature;
        self.prev_humidity = self.humidity;
        self.prev_battery = self.battery;
        self.temperature = reading.temperature;
        self.humidity = reading.humidity;
        self.battery = reading.battery;
        self.device_type = Some(reading.device_type);
        self.last_changed_ms = now_ms;
        self.needs_report = true;
        self.changed_since_report = true;
    }
}

/// What an observation did to the registry, mainly for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserveOutcome {
    /// First observation of this address; record created.
    Created,
    /// Identical payload fingerprint; RSSI/last-seen refreshed only.
    Duplicate,
    /// New payload but no significant delta and keepalive not yet due.
    Refreshed,
    /// A significant change was accepted.
    SignificantChange,
    /// Unchanged data but the keepalive window elapsed; heartbeat queued.
    Keepalive,
}

#[derive(Error, Debug, PartialEq)]
pub enum RegistryError {
    #[error("registry lock wait exceeded {0:?}; operation dropped")]
    LockTimeout(Duration),
}

/// The shared address → [`TrackedDevice`] map.
///
/// Owned explicitly and passed by handle to each task; nothing here is a
/// module-level singleton.
pub struct DeviceRegistry {
    devices: Mutex<HashMap<MacAddress, TrackedDevice>>,
    thresholds: Thresholds,
    keepalive_ms: u64,
    retention_ms: u64,
    lock_timeout: Duration,
    dropped_ops: AtomicU64,
}

impl DeviceRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        DeviceRegistry {
            devices: Mutex::new(HashMap::new()),
            thresholds: config.thresholds,
            keepalive_ms: config.keepalive.as_millis() as u64,
            retention_ms: config.retention.as_millis() as u64,
            lock_timeout: config.lock_timeout,
            dropped_ops: AtomicU64::new(0),
        }
    }

    /// Operations abandoned because the lock wait budget ran out.
    pub fn dropped_operations(&self) -> u64 {
        self.dropped_ops.load(Ordering::Relaxed)
    }

    async fn lock(&self) -> Result<MutexGuard<'_, HashMap<MacAddress, TrackedDevice>>, RegistryError> {
        match tokio::time::timeout(self.lock_timeout, self.devices.lock()).await {
            Ok(guard) => Ok(guard),
            Err(_) => {
                self.dropped_ops.fetch_add(1, Ordering::Relaxed);
                Err(RegistryError::LockTimeout(self.lock_timeout))
            }
        }
    }

    fn is_significant(&self, device: &TrackedDevice, reading: &SensorReading) -> bool {
        (reading.temperature - device.temperature).abs() >= self.thresholds.temperature
            || (reading.humidity - device.humidity).abs() >= self.thresholds.humidity
            || (reading.battery - device.battery).abs() >= self.thresholds.battery
    }

    /// Apply one observation: create, refresh or update the record for
    /// `adv.address` per the significant-change and keepalive policy.
    pub async fn observe(
        &self,
        adv: &RawAdvertisement,
        reading: &ParsedReading,
    ) -> Result<ObserveOutcome, RegistryError> {
        let payload_fingerprint = fingerprint(adv.payload());
        let now_ms = adv.received_at_ms;
        let mut devices = self.lock().await?;

        let Some(device) = devices.get_mut(&adv.address) else {
            let mut device = TrackedDevice::new(adv, payload_fingerprint);
            if let ParsedReading::SensorData(reading) = reading {
                device.seed(reading);
                info!(
                    "new sensor {} ({}) T={:.2}C H={:.2}% batt={} rssi={}",
                    adv.address,
                    reading.device_type.as_str(),
                    reading.temperature,
                    reading.humidity,
                    reading.battery,
                    adv.rssi
                );
            } else {
                debug!("new beacon {} rssi={}", adv.address, adv.rssi);
            }
            devices.insert(adv.address, device);
            return Ok(ObserveOutcome::Created);
        };

        // Presence evidence is refreshed on every observation, duplicate or not.
        device.rssi = adv.rssi;
        device.last_seen_ms = now_ms;
        if adv.name.is_some() {
            device.name = adv.name.clone();
        }

        if device.payload_fingerprint == payload_fingerprint {
            return Ok(ObserveOutcome::Duplicate);
        }
        device.payload_fingerprint = payload_fingerprint;

        let ParsedReading::SensorData(reading) = reading else {
            return Ok(ObserveOutcome::Refreshed);
        };

        if !device.is_sensor {
            // A beacon that started presenting decodable sensor data.
            device.seed(reading);
            device.last_changed_ms = now_ms;
            device.needs_report = true;
            device.changed_since_report = true;
            info!(
                "device {} upgraded to sensor ({})",
                adv.address,
                reading.device_type.as_str()
            );
            return Ok(ObserveOutcome::SignificantChange);
        }

        if self.is_significant(device, reading) {
            debug!(
                "device {} changed: T {:.2}->{:.2} H {:.2}->{:.2} batt {}->{}",
                adv.address,
                device.temperature,
                reading.temperature,
                device.humidity,
                reading.humidity,
                device.battery,
                reading.battery
            );
            device.accept_change(reading, now_ms);
            return Ok(ObserveOutcome::SignificantChange);
        }

        if now_ms.saturating_sub(device.last_reported_ms) >= self.keepalive_ms {
            debug!("keepalive due for {}", adv.address);
            device.needs_report = true;
            device.changed_since_report = false;
            return Ok(ObserveOutcome::Keepalive);
        }

        Ok(ObserveOutcome::Refreshed)
    }

    /// Evict every record silent for at least the retention window.
    /// Unpublished pending state is dropped with the record. Idempotent.
    pub async fn sweep_expired(&self, now_ms: u64) -> Result<usize, RegistryError> {
        let mut devices = self.lock().await?;
        let before = devices.len();
        devices.retain(|address, device| {
            let expired = now_ms.saturating_sub(device.last_seen_ms) >= self.retention_ms;
            if expired {
                info!("expiring device {} (last seen {}ms ago)", address, now_ms - device.last_seen_ms);
            }
            !expired
        });
        Ok(before - devices.len())
    }

    /// Snapshot every record flagged for reporting. The clones let the
    /// publisher render and transmit without holding the lock.
    pub async fn collect_pending(&self) -> Result<Vec<TrackedDevice>, RegistryError> {
        let devices = self.lock().await?;
        Ok(devices.values().filter(|d| d.needs_report).cloned().collect())
    }

    /// Clear the report flags for the given addresses after a successful
    /// publish. Addresses swept away in the meantime are skipped.
    pub async fn mark_reported(
        &self,
        addresses: &[MacAddress],
        now_ms: u64,
    ) -> Result<(), RegistryError> {
        let mut devices = self.lock().await?;
        for address in addresses {
            if let Some(device) = devices.get_mut(address) {
                device.last_reported_ms = now_ms;
                device.needs_report = false;
                device.changed_since_report = false;
            } else {
                warn!("published device {} no longer tracked", address);
            }
        }
        Ok(())
    }

    pub async fn device_count(&self) -> Result<usize, RegistryError> {
        Ok(self.lock().await?.len())
    }

    /// Read one record, for tests and diagnostics.
    pub async fn get(&self, address: &MacAddress) -> Result<Option<TrackedDevice>, RegistryError> {
        Ok(self.lock().await?.get(address).cloned())
    }

    #[cfg(test)]
    pub(crate) async fn hold_lock(
        &self,
    ) -> MutexGuard<'_, HashMap<MacAddress, TrackedDevice>> {
        self.devices.lock().await
    }
}
