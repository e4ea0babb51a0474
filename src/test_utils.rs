//! Shared helpers for unit tests.

use crate::advertisement::RawAdvertisement;
use crate::decoder::{UUID_ENVIRONMENTAL_SENSING, UUID_MOKO};
use crate::mac_address::MacAddress;

/// A stable address for unit tests.
pub const TEST_MAC: MacAddress = MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0x01]);

/// Build a bare advertisement; tests override the fields they care about.
pub fn advertisement(address: MacAddress, service_data: Option<Vec<u8>>) -> RawAdvertisement {
    RawAdvertisement {
        address,
        rssi: -60,
        name: None,
        service_uuid: None,
        service_data,
        manufacturer_data: None,
        received_at_ms: 0,
    }
}

/// A LOP001 advertisement encoding the given reading.
pub fn lop001_advertisement(
    address: MacAddress,
    temperature_c: f64,
    humidity_pct: f64,
    received_at_ms: u64,
) -> RawAdvertisement {
    let temp_raw = (temperature_c * 100.0).round() as i16;
    let hum_raw = (humidity_pct * 100.0).round() as u16;
    let mut data = Vec::with_capacity(4);
    data.extend_from_slice(&temp_raw.to_le_bytes());
    data.extend_from_slice(&hum_raw.to_le_bytes());

    let mut adv = advertisement(address, Some(data));
    adv.name = Some("LOP001".to_string());
    adv.service_uuid = Some(UUID_ENVIRONMENTAL_SENSING);
    adv.received_at_ms = received_at_ms;
    adv
}

/// A MOKO T&H advertisement encoding the given reading.
pub fn moko_advertisement(
    address: MacAddress,
    temperature_c: f64,
    humidity_pct: f64,
    battery_mv: u16,
    received_at_ms: u64,
) -> RawAdvertisement {
    let mut data = vec![0u8; 18];
    data[0..2].copy_from_slice(&UUID_MOKO.to_le_bytes());
    data[2] = 0x70;
    data[5..7].copy_from_slice(&((temperature_c * 10.0).round() as i16).to_le_bytes());
    data[7..9].copy_from_slice(&((humidity_pct * 10.0).round() as u16).to_le_bytes());
    data[9..11].copy_from_slice(&battery_mv.to_le_bytes());
    data[11] = 0x02;

    let mut adv = advertisement(address, Some(data));
    adv.received_at_ms = received_at_ms;
    adv
}
