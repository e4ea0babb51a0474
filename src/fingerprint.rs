//! Content fingerprinting for advertisement deduplication.
//!
//! Beacons retransmit the same service-data payload far more often than the
//! underlying sensor values change (advertising intervals of seconds against
//! value changes of minutes). The registry stores the fingerprint of the last
//! payload per device; an identical fingerprint means a retransmission, which
//! refreshes RSSI and last-seen time without running change detection.

/// Order-sensitive djb2 hash over the raw service-data bytes.
///
/// Collisions are tolerable here: a collision only suppresses one change
/// check until the next differing payload arrives.
pub fn fingerprint(data: &[u8]) -> u32 {
    let mut hash: u32 = 5381;
    for &byte in data {
        hash = hash.wrapping_shl(5).wrapping_add(hash).wrapping_add(u32::from(byte));
    }
    hash
}
