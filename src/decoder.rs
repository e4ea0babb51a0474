//! Vendor payload recognizers for supported sensor beacons.
//!
//! Each recognizer is a pure function: it inspects an advertisement and
//! either rejects it (wrong signature, short payload, out-of-range values)
//! or produces a reading in engineering units. Recognizers are tried in a
//! fixed priority order and the first match wins; payload layouts from
//! different vendors can be structurally ambiguous at short lengths, so the
//! order is part of the contract, not an accident.

use crate::advertisement::RawAdvertisement;

/// Environmental Sensing Service, used by the LOP001 beacon.
pub const UUID_ENVIRONMENTAL_SENSING: u16 = 0x181A;
/// Hoptech / MOKO L02S proprietary service.
pub const UUID_L02S: u16 = 0xEA01;
/// MOKO T&H family service UUID, embedded little-endian in the payload.
pub const UUID_MOKO: u16 = 0xFEAB;
/// MOKO frame type carrying temperature/humidity data.
const MOKO_TH_FRAME: u8 = 0x70;

/// Plausible range for decoded temperatures (SHT4x-class sensors), °C.
const TEMPERATURE_RANGE: std::ops::RangeInclusive<f64> = -40.0..=125.0;
/// Plausible range for relative humidity, %RH.
const HUMIDITY_RANGE: std::ops::RangeInclusive<f64> = 0.0..=100.0;

/// Sensor model identified by a recognizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    Lop001,
    L02s,
    MokoThreeAxis,
    MokoTh,
    MokoThreeAxisTh,
    MokoUnknown,
}

impl DeviceType {
    /// Stable tag used in report payloads and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceType::Lop001 => "LOP001",
            DeviceType::L02s => "L02S",
            DeviceType::MokoThreeAxis => "MOKO_3AXIS",
            DeviceType::MokoTh => "MOKO_TH",
            DeviceType::MokoThreeAxisTh => "MOKO_3AXIS_TH",
            DeviceType::MokoUnknown => "MOKO_UNKNOWN",
        }
    }
}

/// A decoded sensor reading in engineering units.
///
/// `battery` is in raw per-type units (millivolts for MOKO/L02S devices,
/// zero for the battery-less LOP001); values are not comparable across
/// device types without per-type scaling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    pub device_type: DeviceType,
    /// Temperature in °C.
    pub temperature: f64,
    /// Relative humidity in %RH.
    pub humidity: f64,
    /// Battery level in per-type units; non-positive means "no channel".
    pub battery: i32,
}

/// Outcome of running the recognizer chain over one advertisement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParsedReading {
    /// No recognizer claimed the payload; the device is a plain beacon.
    NoSensorData,
    SensorData(SensorReading),
}

type Recognizer = fn(&RawAdvertisement) -> Option<SensorReading>;

/// Priority order: LOP001 (name + standard UUID, the most specific match),
/// then L02S (proprietary UUID), then MOKO (signature inside the payload).
const RECOGNIZERS: [Recognizer; 3] = [recognize_lop001, recognize_l02s, recognize_moko_th];

/// Run the recognizer chain. Never fails: an unclaimed or malformed payload
/// is simply `NoSensorData`.
pub fn decode(adv: &RawAdvertisement) -> ParsedReading {
    for recognize in RECOGNIZERS {
        if let Some(reading) = recognize(adv) {
            return ParsedReading::SensorData(reading);
        }
    }
    ParsedReading::NoSensorData
}

fn in_range(temperature: f64, humidity: f64) -> bool {
    TEMPERATURE_RANGE.contains(&temperature) && HUMIDITY_RANGE.contains(&humidity)
}

fn u16_le(data: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([data[at], data[at + 1]])
}

fn u16_be(data: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([data[at], data[at + 1]])
}

/// LOP001 temperature beacon.
///
/// Advertised name `LOP001`, service data under UUID 0x181A with the UUID
/// prefix already stripped: temperature (i16 LE, 0.01 °C) then humidity
/// (u16 LE, 0.01 %RH). No battery channel.
fn recognize_lop001(adv: &RawAdvertisement) -> Option<SensorReading> {
    if adv.name.as_deref() != Some("LOP001") {
        return None;
    }
    if adv.service_uuid != Some(UUID_ENVIRONMENTAL_SENSING) {
        return None;
    }
    let data = adv.service_data.as_deref()?;
    if data.len() < 4 {
        return None;
    }

    let temperature = f64::from(u16_le(data, 0) as i16) * 0.01;
    let humidity = f64::from(u16_le(data, 2)) * 0.01;
    if !in_range(temperature, humidity) {
        return None;
    }

    Some(SensorReading {
        device_type: DeviceType::Lop001,
        temperature,
        humidity,
        battery: 0,
    })
}

/// Hoptech / MOKO L02S sensor.
///
/// Service data under UUID 0xEA01, at least 21 bytes: temperature (i16 BE,
/// 0.1 °C) at offset 12, humidity (u16 BE, 0.1 %RH) at 14, battery
/// millivolts (u16 BE) at 16.
fn recognize_l02s(adv: &RawAdvertisement) -> Option<SensorReading> {
    if adv.service_uuid != Some(UUID_L02S) {
        return None;
    }
    let data = adv.service_data.as_deref()?;
    if data.len() < 21 {
        return None;
    }

    let temperature = f64::from(u16_be(data, 12) as i16) * 0.1;
    let humidity = f64::from(u16_be(data, 14)) * 0.1;
    if !in_range(temperature, humidity) {
        return None;
    }

    Some(SensorReading {
        device_type: DeviceType::L02s,
        temperature,
        humidity,
        battery: i32::from(u16_be(data, 16)),
    })
}

/// MOKO T&H family.
///
/// The service UUID (0xFEAB little-endian) and frame type (0x70) live inside
/// the payload itself; at least 18 bytes: temperature (i16 LE, 0.1 °C) at
/// offset 5, humidity (u16 LE, 0.1 %RH) at 7, battery millivolts (u16 LE)
/// at 9, device subtype at 11.
fn recognize_moko_th(adv: &RawAdvertisement) -> Option<SensorReading> {
    let data = adv.service_data.as_deref()?;
    if data.len() < 18 {
        return None;
    }
    if u16_le(data, 0) != UUID_MOKO || data[2] != MOKO_TH_FRAME {
        return None;
    }

    let temperature = f64::from(u16_le(data, 5) as i16) * 0.1;
    let humidity = f64::from(u16_le(data, 7)) * 0.1;
    if !in_range(temperature, humidity) {
        return None;
    }

    let device_type = match data[11] {
        0x01 => DeviceType::MokoThreeAxis,
        0x02 => DeviceType::MokoTh,
        0x03 => DeviceType::MokoThreeAxisTh,
        _ => DeviceType::MokoUnknown,
    };

    Some(SensorReading {
        device_type,
        temperature,
        humidity,
        battery: i32::from(u16_le(data, 9)),
    })
}
