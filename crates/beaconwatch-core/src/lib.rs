//! # beaconwatch-core
//!
//! Core logic for the beaconwatch BLE beacon presence tracker.
//!
//! This crate provides:
//! - Stable identities for transient beacon advertisements
//! - Presence tracking with timeout-based departure detection
//! - A bounded retry queue that survives connectivity outages
//! - Event delivery and link monitoring behind injectable seams
//!
//! ## Architecture
//!
//! - [`identity`] - Identity derivation and profile payload decoding
//! - [`presence`] - Per-beacon state machine (arrival / departure)
//! - [`queue`] - Bounded FIFO of undelivered events
//! - [`delivery`] - Single-attempt event delivery over a [`Transport`]
//! - [`connectivity`] - Periodic link checks over a [`Link`]
//! - [`agent`] - The control loop owning all of the above
//! - [`bluetooth`] - Scanner seam and the BlueZ scanner
//! - [`clock`] - Injectable monotonic clock
//! - [`device`] - Device id derivation
//! - [`config`] - Configuration loading and validation
//! - [`error`] - Unified error types for the crate
//! - [`types`] - Shared types and OpenAPI schemas

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod agent;
pub mod bluetooth;
pub mod clock;
pub mod config;
pub mod connectivity;
pub mod delivery;
pub mod device;
pub mod error;
pub mod identity;
pub mod presence;
pub mod queue;
pub mod types;

// Re-export primary types for convenience
pub use agent::{Agent, AgentSettings, ControlCommand};
#[cfg(feature = "bluetooth")]
pub use bluetooth::BluerScanner;
#[cfg(any(feature = "mock-bluetooth", not(feature = "bluetooth")))]
pub use bluetooth::MockScanner;
pub use bluetooth::{BluetoothError, BluetoothResult, Scanner};
pub use clock::{format_uptime, Clock, ManualClock, MonotonicClock};
pub use config::{is_valid_mac_address, Config, ConfigError, ConfigResult};
pub use connectivity::{
    ConnectivityMonitor, ConnectivityState, Link, LinkError, LinkTransition, ReconnectPolicy,
};
pub use delivery::{
    DeliveryClient, DeliveryError, Disposition, Endpoints, EventPayload, Transport,
    TransportError, TransportResponse,
};
pub use device::{device_id_for_interface, device_id_from_mac};
pub use error::{BeaconError, Result};
pub use identity::{parse_profile, resolve, BeaconIdentity, ProfileFields};
pub use presence::{BeaconState, Departed, Observation, ObservationResult, PresenceTable};
pub use queue::{DrainReport, EventKind, EventQueue, PendingEvent};
pub use types::{AdvertisementRecord, AgentStatus, ScanSummary};
