//! Shared types and OpenAPI schemas.
//!
//! Types that cross module boundaries live here: the raw advertisement record
//! handed over by the scanner, and the summaries the control loop publishes.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A single advertisement observed during a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AdvertisementRecord {
    /// Hardware address, `AA:BB:CC:DD:EE:FF` form.
    #[schema(example = "AA:BB:CC:DD:EE:FF")]
    pub address: String,

    /// Advertised local name, if any.
    pub name: Option<String>,

    /// First advertised service UUID, if any.
    pub service_id: Option<String>,

    /// Received signal strength in dBm.
    #[schema(example = -67)]
    pub rssi: i16,

    /// Manufacturer payload with the 2-byte company id in front.
    pub manufacturer_payload: Option<Vec<u8>>,
}

impl AdvertisementRecord {
    /// Record with only an address and signal strength.
    pub fn new(address: impl Into<String>, rssi: i16) -> Self {
        Self {
            address: address.into(),
            name: None,
            service_id: None,
            rssi,
            manufacturer_payload: None,
        }
    }

    /// Sets the advertised name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the advertised service id.
    #[must_use]
    pub fn with_service_id(mut self, service_id: impl Into<String>) -> Self {
        self.service_id = Some(service_id.into());
        self
    }

    /// Sets the manufacturer payload.
    #[must_use]
    pub fn with_manufacturer_payload(mut self, payload: Vec<u8>) -> Self {
        self.manufacturer_payload = Some(payload);
        self
    }
}

/// Outcome of one control-loop iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ScanSummary {
    /// Uptime at the end of the scan, `HH:MM:SS.mmm`.
    #[schema(example = "00:12:03.417")]
    pub finished_at: String,

    /// Advertisements returned by the scanner.
    pub devices_found: usize,

    /// Beacons arriving during this scan.
    pub arrivals: usize,

    /// Beacons that timed out before this scan.
    pub departures: usize,

    /// Identities ever seen.
    pub known_beacons: usize,

    /// Identities currently present.
    pub present_beacons: usize,

    /// Link state after the connectivity check.
    pub connected: bool,

    /// Events waiting for delivery.
    pub queue_size: usize,
}

/// Snapshot of the control loop, published after every iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AgentStatus {
    /// Whether the backend link is considered up.
    #[schema(example = true)]
    pub connected: bool,

    /// Events waiting for delivery.
    #[schema(example = 0)]
    pub queue_size: usize,

    /// Maximum number of queued events.
    #[schema(example = 50)]
    pub queue_capacity: usize,

    /// Identities ever seen.
    #[schema(example = 4)]
    pub known_beacons: usize,

    /// Identities currently present.
    #[schema(example = 2)]
    pub present_beacons: usize,

    /// Uptime in milliseconds.
    #[schema(example = 720_000)]
    pub uptime_ms: u64,
}
