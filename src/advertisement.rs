//! Raw BLE advertisement as delivered by a scanning backend.

use crate::mac_address::MacAddress;

/// One observed advertisement, before any vendor decoding.
///
/// `received_at_ms` is a monotonic millisecond timestamp supplied by the
/// source; the registry never reads the wall clock on the ingestion path.
#[derive(Debug, Clone, PartialEq)]
pub struct RawAdvertisement {
    pub address: MacAddress,
    /// Signal strength in dBm.
    pub rssi: i16,
    /// Advertised local name, if present.
    pub name: Option<String>,
    /// 16-bit service-data UUID, if the advertisement carried service data
    /// under a standard short UUID.
    pub service_uuid: Option<u16>,
    /// Vendor-defined service-data payload (UUID prefix stripped).
    pub service_data: Option<Vec<u8>>,
    /// Manufacturer-specific data, if present. Not decoded by this gateway,
    /// but carried so sinks can forward it raw.
    pub manufacturer_data: Option<Vec<u8>>,
    /// Monotonic arrival time in milliseconds.
    pub received_at_ms: u64,
}

impl RawAdvertisement {
    /// The service-data bytes, or an empty slice for payload-less beacons.
    /// Fingerprinting treats "no payload" and "empty payload" alike.
    pub fn payload(&self) -> &[u8] {
        self.service_data.as_deref().unwrap_or_default()
    }
}
