//! Compact 48-bit Bluetooth device address.
//!
//! Tracked devices are keyed by address, and outbound report batches use the
//! canonical uppercase colon-separated form, so the type implements both
//! cheap hashing (6-byte array) and serde serialization as a string.

use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A Bluetooth device address stored as a 6-byte array.
///
/// Displays in canonical form (`AA:BB:CC:DD:EE:01`). Any 48-bit address is
/// accepted at face value; no public/random or OUI validation is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl Serialize for MacAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Errors returned when parsing an address string.
#[derive(Error, Debug, PartialEq)]
pub enum ParseMacError {
    #[error("invalid address: expected 6 octets, got {0}")]
    OctetCount(usize),
    #[error("invalid address: octet {0} is not two hex digits")]
    BadOctet(usize),
}

impl FromStr for MacAddress {
    type Err = ParseMacError;

    /// Accepts colon or hyphen separated octets, any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 6];
        let mut count = 0;
        for (i, part) in s.split(['-', ':']).enumerate() {
            if i >= 6 {
                return Err(ParseMacError::OctetCount(i + 1));
            }
            if part.len() != 2 {
                return Err(ParseMacError::BadOctet(i));
            }
            bytes[i] = u8::from_str_radix(part, 16).map_err(|_| ParseMacError::BadOctet(i))?;
            count = i + 1;
        }
        if count != 6 {
            return Err(ParseMacError::OctetCount(count));
        }
        Ok(MacAddress(bytes))
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }
}

#[cfg(feature = "bluer")]
impl From<bluer::Address> for MacAddress {
    fn from(addr: bluer::Address) -> Self {
        Self(addr.0)
    }
}

#[cfg(feature = "bluer")]
impl From<MacAddress> for bluer::Address {
    fn from(addr: MacAddress) -> Self {
        bluer::Address(addr.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_uppercase_colon_form() {
        let addr = MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0x01]);
        assert_eq!(addr.to_string(), "AA:BB:CC:DD:EE:01");
        assert_eq!(
            MacAddress([0x00, 0x01, 0x02, 0x03, 0x04, 0x05]).to_string(),
            "00:01:02:03:04:05"
        );
    }

    #[test]
    fn parses_colon_and_hyphen_any_case() {
        let expected = MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
        assert_eq!("AA:BB:CC:DD:EE:FF".parse::<MacAddress>().unwrap(), expected);
        assert_eq!("aa-bb-cc-dd-ee-ff".parse::<MacAddress>().unwrap(), expected);
    }

    #[test]
    fn rejects_malformed_strings() {
        assert_eq!(
            "AA:BB:CC".parse::<MacAddress>(),
            Err(ParseMacError::OctetCount(3))
        );
        assert_eq!(
            "AA:BB:CC:DD:EE:FF:00".parse::<MacAddress>(),
            Err(ParseMacError::OctetCount(7))
        );
        assert_eq!(
            "AA:BB:CC:DD:EE:GG".parse::<MacAddress>(),
            Err(ParseMacError::BadOctet(5))
        );
        assert_eq!(
            "AABB:CC:DD:EE:FF".parse::<MacAddress>(),
            Err(ParseMacError::BadOctet(0))
        );
    }

    #[test]
    fn serializes_as_display_string() {
        let addr = MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0x01]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"AA:BB:CC:DD:EE:01\"");
    }

    #[test]
    fn usable_as_map_key() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(MacAddress([1, 2, 3, 4, 5, 6]), "beacon");
        assert_eq!(map.get(&MacAddress([1, 2, 3, 4, 5, 6])), Some(&"beacon"));
    }
}
