//! Presence tracking for observed beacons.
//!
//! Each identity moves through `Unknown -> Present -> Absent -> Present -> ...`.
//! Absence is declared only after a full timeout without observation, since a
//! single scan routinely misses beacons. Absent entries are kept so a return
//! is reported as a fresh arrival without losing the identity.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::identity::{parse_profile, BeaconIdentity, ProfileFields};
use crate::types::AdvertisementRecord;

/// Name reported for beacons that do not advertise one.
pub const UNKNOWN_NAME: &str = "Unknown";

/// Service id reported for beacons that do not advertise one.
pub const NO_SERVICE_ID: &str = "N/A";

/// Last-known state of a beacon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BeaconState {
    /// Display name.
    pub name: String,
    /// Advertised service identifier.
    pub service_id: String,
    /// Last observed signal strength in dBm.
    pub rssi: i16,
    /// Uptime of the last observation, in milliseconds.
    pub last_seen_ms: u64,
    /// Whether the beacon is currently considered nearby.
    pub present: bool,
    /// Decoded profile fields, when the payload was recognized.
    pub profile: Option<ProfileFields>,
}

/// Mutable fields carried by one observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    /// Display name.
    pub name: String,
    /// Advertised service identifier.
    pub service_id: String,
    /// Signal strength in dBm.
    pub rssi: i16,
    /// Decoded profile fields.
    pub profile: Option<ProfileFields>,
}

impl Observation {
    /// Extracts the observed fields from a raw advertisement.
    #[must_use]
    pub fn from_record(record: &AdvertisementRecord) -> Self {
        Self {
            name: record
                .name
                .clone()
                .unwrap_or_else(|| UNKNOWN_NAME.to_string()),
            service_id: record
                .service_id
                .clone()
                .unwrap_or_else(|| NO_SERVICE_ID.to_string()),
            rssi: record.rssi,
            profile: parse_profile(record.manufacturer_payload.as_deref()),
        }
    }

    fn into_state(self, now_ms: u64) -> BeaconState {
        BeaconState {
            name: self.name,
            service_id: self.service_id,
            rssi: self.rssi,
            last_seen_ms: now_ms,
            present: true,
            profile: self.profile,
        }
    }
}

/// Result of feeding one observation into the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservationResult {
    /// The identity was unknown or absent and is now present.
    Arrived,
    /// The identity was already present; its fields were refreshed.
    Updated,
}

/// A beacon that timed out during a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departed {
    /// Identity of the departed beacon.
    pub identity: BeaconIdentity,
    /// State at the time of departure, presence flag already cleared.
    pub state: BeaconState,
}

/// Table of every identity seen during the process lifetime.
#[derive(Debug, Default)]
pub struct PresenceTable {
    beacons: HashMap<BeaconIdentity, BeaconState>,
}

impl PresenceTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an observation of `identity` at `now_ms`.
    pub fn observe(
        &mut self,
        identity: &BeaconIdentity,
        observation: Observation,
        now_ms: u64,
    ) -> ObservationResult {
        match self.beacons.get_mut(identity) {
            Some(state) if state.present => {
                state.name = observation.name;
                state.service_id = observation.service_id;
                state.rssi = observation.rssi;
                state.profile = observation.profile;
                state.last_seen_ms = now_ms;
                ObservationResult::Updated
            }
            Some(state) => {
                *state = observation.into_state(now_ms);
                ObservationResult::Arrived
            }
            None => {
                self.beacons
                    .insert(identity.clone(), observation.into_state(now_ms));
                ObservationResult::Arrived
            }
        }
    }

    /// Marks every present beacon unseen for longer than `timeout_ms` as absent
    /// and returns them, oldest sighting first.
    ///
    /// Already-absent entries are skipped, so repeated sweeps report each
    /// departure once.
    pub fn sweep(&mut self, now_ms: u64, timeout_ms: u64) -> Vec<Departed> {
        let mut departed: Vec<Departed> = self
            .beacons
            .iter_mut()
            .filter(|(_, state)| state.present && now_ms.saturating_sub(state.last_seen_ms) > timeout_ms)
            .map(|(identity, state)| {
                state.present = false;
                Departed {
                    identity: identity.clone(),
                    state: state.clone(),
                }
            })
            .collect();

        departed.sort_by(|a, b| {
            a.state
                .last_seen_ms
                .cmp(&b.state.last_seen_ms)
                .then_with(|| a.identity.cmp(&b.identity))
        });
        departed
    }

    /// Current state of `identity`, if it was ever seen.
    #[must_use]
    pub fn get(&self, identity: &BeaconIdentity) -> Option<&BeaconState> {
        self.beacons.get(identity)
    }

    /// Number of identities ever seen.
    #[must_use]
    pub fn len(&self) -> usize {
        self.beacons.len()
    }

    /// Whether no beacon was ever seen.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.beacons.is_empty()
    }

    /// Number of identities currently present.
    #[must_use]
    pub fn present_count(&self) -> usize {
        self.beacons.values().filter(|state| state.present).count()
    }
}
