//! Stable identities for transient BLE advertisements.
//!
//! A beacon is keyed by its hardware address. When the advertisement carries a
//! recognized iBeacon manufacturer payload, the proximity UUID is appended so
//! that two profiles broadcast from the same radio stay distinct.
//!
//! Payload layout (25 bytes, as delivered by the scanner with the company id
//! still in front):
//!
//! ```text
//! 0..2   company id, 0x4C 0x00
//! 2..4   frame type / length (0x02 0x15)
//! 4..20  proximity UUID
//! 20..22 major  (big-endian)
//! 22..24 minor  (big-endian)
//! 24     measured power at 1 m (i8)
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Exact length of a recognized profile payload.
pub const PROFILE_PAYLOAD_LEN: usize = 25;

/// Leading vendor signature of a recognized profile payload.
pub const PROFILE_SIGNATURE: [u8; 2] = [0x4C, 0x00];

/// Separator between the address and the proximity UUID in an identity.
pub const IDENTITY_SEPARATOR: char = '_';

const UUID_RANGE: std::ops::Range<usize> = 4..20;
const MAJOR_RANGE: std::ops::Range<usize> = 20..22;
const MINOR_RANGE: std::ops::Range<usize> = 22..24;
const MEASURED_POWER_OFFSET: usize = 24;

/// Opaque key identifying one physical beacon within a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct BeaconIdentity(String);

impl BeaconIdentity {
    /// Wraps an already-derived identity string.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BeaconIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BeaconIdentity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Structured fields decoded from a recognized profile payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ProfileFields {
    /// 16-byte proximity identifier.
    pub proximity_uuid: Uuid,
    /// Profile major number, host order.
    pub major: u16,
    /// Profile minor number, host order.
    pub minor: u16,
    /// Calibrated signal power at one metre, in dBm.
    pub measured_power: i8,
}

/// Returns the payload if it has the exact length and vendor signature of a
/// recognized profile.
fn recognized(payload: Option<&[u8]>) -> Option<&[u8; PROFILE_PAYLOAD_LEN]> {
    let bytes: &[u8; PROFILE_PAYLOAD_LEN] = payload?.try_into().ok()?;
    (bytes[..2] == PROFILE_SIGNATURE).then_some(bytes)
}

fn proximity_uuid(bytes: &[u8; PROFILE_PAYLOAD_LEN]) -> Uuid {
    let mut raw = [0u8; 16];
    raw.copy_from_slice(&bytes[UUID_RANGE]);
    Uuid::from_bytes(raw)
}

/// Derives the identity of an advertisement.
///
/// Never fails: a missing, short or foreign payload yields the address alone.
#[must_use]
pub fn resolve(address: &str, manufacturer_payload: Option<&[u8]>) -> BeaconIdentity {
    match recognized(manufacturer_payload) {
        Some(bytes) => BeaconIdentity(format!(
            "{address}{IDENTITY_SEPARATOR}{}",
            proximity_uuid(bytes).hyphenated()
        )),
        None => BeaconIdentity(address.to_string()),
    }
}

/// Extracts profile fields under the same precondition as [`resolve`].
#[must_use]
pub fn parse_profile(manufacturer_payload: Option<&[u8]>) -> Option<ProfileFields> {
    let bytes = recognized(manufacturer_payload)?;
    Some(ProfileFields {
        proximity_uuid: proximity_uuid(bytes),
        major: u16::from_be_bytes([bytes[MAJOR_RANGE.start], bytes[MAJOR_RANGE.start + 1]]),
        minor: u16::from_be_bytes([bytes[MINOR_RANGE.start], bytes[MINOR_RANGE.start + 1]]),
        measured_power: i8::from_ne_bytes([bytes[MEASURED_POWER_OFFSET]]),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub const TEST_UUID: &str = "e2c56db5-dffb-48d2-b060-d0f5a71096e0";

    /// Builds a profile payload in wire order.
    pub fn profile_payload(uuid: Uuid, major: u16, minor: u16, power: i8) -> Vec<u8> {
        let mut payload = Vec::with_capacity(PROFILE_PAYLOAD_LEN);
        payload.extend_from_slice(&PROFILE_SIGNATURE);
        payload.extend_from_slice(&[0x02, 0x15]);
        payload.extend_from_slice(uuid.as_bytes());
        payload.extend_from_slice(&major.to_be_bytes());
        payload.extend_from_slice(&minor.to_be_bytes());
        payload.extend_from_slice(&power.to_be_bytes());
        payload
    }

    fn test_uuid() -> Uuid {
        Uuid::parse_str(TEST_UUID).unwrap()
    }

    #[test]
    fn test_resolve_without_payload_is_address() {
        let id = resolve("AA:BB:CC:DD:EE:FF", None);
        assert_eq!(id.as_str(), "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn test_resolve_with_profile_appends_uuid() {
        let payload = profile_payload(test_uuid(), 1, 2, -59);
        let id = resolve("AA:BB:CC:DD:EE:FF", Some(&payload));
        assert_eq!(id.to_string(), format!("AA:BB:CC:DD:EE:FF_{TEST_UUID}"));
    }

    #[test]
    fn test_resolve_is_stable() {
        let payload = profile_payload(test_uuid(), 7, 9, -60);
        assert_eq!(
            resolve("11:22:33:44:55:66", Some(&payload)),
            resolve("11:22:33:44:55:66", Some(&payload))
        );
    }

    #[test]
    fn test_distinct_addresses_give_distinct_identities() {
        let payload = profile_payload(test_uuid(), 7, 9, -60);
        assert_ne!(
            resolve("11:22:33:44:55:66", Some(&payload)),
            resolve("11:22:33:44:55:67", Some(&payload))
        );
    }

    #[test]
    fn test_parse_profile_decodes_major_minor_and_power() {
        let cases = [(0u16, 0u16, 0i8), (1, 2, -59), (0x1234, 0xABCD, -128), (u16::MAX, 256, 127)];
        for (major, minor, power) in cases {
            let payload = profile_payload(test_uuid(), major, minor, power);
            let fields = parse_profile(Some(&payload)).expect("recognized payload");
            assert_eq!(fields.major, major);
            assert_eq!(fields.minor, minor);
            assert_eq!(fields.measured_power, power);
            assert_eq!(fields.proximity_uuid, test_uuid());
        }
    }

    #[test]
    fn test_major_is_read_big_endian() {
        let mut payload = profile_payload(test_uuid(), 0, 0, 0);
        payload[20] = 0x01;
        payload[21] = 0x02;
        assert_eq!(parse_profile(Some(&payload)).unwrap().major, 0x0102);
    }

    #[test]
    fn test_malformed_payloads_fall_back() {
        let good = profile_payload(test_uuid(), 1, 2, -59);

        let short = &good[..24];
        let mut long = good.clone();
        long.push(0);
        let mut wrong_vendor = good.clone();
        wrong_vendor[0] = 0x4D;
        let mut swapped_vendor = good.clone();
        swapped_vendor[0] = 0x00;
        swapped_vendor[1] = 0x4C;

        for payload in [short, &long[..], &wrong_vendor[..], &swapped_vendor[..], &[][..]] {
            assert_eq!(resolve("AA:BB:CC:DD:EE:FF", Some(payload)).as_str(), "AA:BB:CC:DD:EE:FF");
            assert!(parse_profile(Some(payload)).is_none());
        }
        assert!(parse_profile(None).is_none());
    }
}
