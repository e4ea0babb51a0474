//! Rendering tracked devices into transport-agnostic report batches.
//!
//! A batch is keyed by device address; each entry carries the current values
//! and the changed flag. Sensor fields are present only for devices that
//! decoded as sensors, and battery is omitted entirely when the device type
//! has no battery channel (non-positive value).

use crate::mac_address::MacAddress;
use crate::registry::TrackedDevice;
use serde::Serialize;
use std::collections::BTreeMap;

/// One rendered report for one device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportEntry {
    /// Wall-clock milliseconds, best effort (0 before time sync).
    #[serde(rename = "ts")]
    pub timestamp_ms: u64,
    pub rssi: i16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery: Option<i32>,
    /// Whether this report carries a significant change (false for the
    /// first-seen report and for keepalive heartbeats).
    pub changed: bool,
}

/// One outbound payload: address → report entries for that device.
pub type Batch = BTreeMap<MacAddress, Vec<ReportEntry>>;

/// Render one device into a report entry.
pub fn render_entry(device: &TrackedDevice, wall_ms: u64) -> ReportEntry {
    let sensor = device.is_sensor;
    ReportEntry {
        timestamp_ms: wall_ms,
        rssi: device.rssi,
        name: device.name.clone(),
        temperature: sensor.then_some(device.temperature),
        humidity: sensor.then_some(device.humidity),
        battery: (sensor && device.battery > 0).then_some(device.battery),
        changed: device.changed_since_report,
    }
}

/// Group rendered entries into one batch keyed by device address.
pub fn render_batch(devices: &[TrackedDevice], wall_ms: u64) -> Batch {
    let mut batch = Batch::new();
    for device in devices {
        batch
            .entry(device.address)
            .or_default()
            .push(render_entry(device, wall_ms));
    }
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::DeviceType;
    use crate::test_utils::TEST_MAC;
    use serde_json::json;

    fn sensor_device() -> TrackedDevice {
        let adv = crate::test_utils::lop001_advertisement(TEST_MAC, 22.0, 55.0, 0);
        let mut device = device_from(&adv);
        device.is_sensor = true;
        device.device_type = Some(DeviceType::Lop001);
        device.temperature = 22.0;
        device.humidity = 55.0;
        device
    }

    fn device_from(adv: &crate::advertisement::RawAdvertisement) -> TrackedDevice {
        // Build through the registry so the struct stays in sync with
        // creation semantics.
        let registry = crate::registry::DeviceRegistry::new(Default::default());
        tokio_test::block_on(async {
            registry.observe(adv, &crate::decoder::decode(adv)).await.unwrap();
            registry.get(&adv.address).await.unwrap().unwrap()
        })
    }

    #[test]
    fn sensor_entry_includes_values() {
        let mut device = sensor_device();
        device.battery = 3000;
        device.changed_since_report = true;
        device.rssi = -70;

        let entry = render_entry(&device, 1_700_000_000_000);
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            value,
            json!({
                "ts": 1_700_000_000_000u64,
                "rssi": -70,
                "name": "LOP001",
                "temperature": 22.0,
                "humidity": 55.0,
                "battery": 3000,
                "changed": true,
            })
        );
    }

    #[test]
    fn battery_omitted_when_non_positive() {
        let device = sensor_device();
        assert_eq!(device.battery, 0);
        let value = serde_json::to_value(render_entry(&device, 0)).unwrap();
        assert!(value.get("battery").is_none());
        assert!(value.get("temperature").is_some());
    }

    #[test]
    fn beacon_entry_omits_sensor_fields() {
        let adv = crate::test_utils::advertisement(TEST_MAC, None);
        let device = device_from(&adv);
        assert!(!device.is_sensor);

        let value = serde_json::to_value(render_entry(&device, 42)).unwrap();
        assert!(value.get("temperature").is_none());
        assert!(value.get("humidity").is_none());
        assert!(value.get("battery").is_none());
        assert!(value.get("name").is_none());
        assert_eq!(value["rssi"], json!(-60));
        assert_eq!(value["changed"], json!(false));
    }

    #[test]
    fn batch_is_keyed_by_canonical_address() {
        let a = device_from(&crate::test_utils::lop001_advertisement(
            crate::mac_address::MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0x01]),
            22.0,
            55.0,
            0,
        ));
        let b = device_from(&crate::test_utils::advertisement(
            crate::mac_address::MacAddress([0x11, 0x22, 0x33, 0x44, 0x55, 0x66]),
            None,
        ));

        let batch = render_batch(&[a, b], 7);
        assert_eq!(batch.len(), 2);

        let value = serde_json::to_value(&batch).unwrap();
        assert!(value.get("AA:BB:CC:DD:EE:01").is_some());
        assert!(value.get("11:22:33:44:55:66").is_some());
        assert_eq!(value["AA:BB:CC:DD:EE:01"][0]["ts"], json!(7));
    }
}
