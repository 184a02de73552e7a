//! Bluetooth Low Energy scanning.
//!
//! This module provides:
//! - The [`Scanner`] seam: one bounded scan returning the advertisements seen
//! - [`BluerScanner`], the BlueZ implementation (feature `bluetooth`)
//! - [`MockScanner`], a scripted scanner for tests and hardware-less runs

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::AdvertisementRecord;

/// Default duration of one scan.
pub const DEFAULT_SCAN_DURATION: Duration = Duration::from_secs(5);

/// Errors raised by the scanning collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BluetoothError {
    /// No adapter is present.
    #[error("No Bluetooth adapter found. Ensure Bluetooth hardware is present and drivers are loaded.")]
    AdapterNotFound,

    /// The adapter exists but could not be powered on.
    #[error("Bluetooth adapter is powered off. Run 'bluetoothctl power on' to enable.")]
    AdapterPoweredOff,

    /// The scan did not complete in time.
    #[error("Bluetooth scan timed out after {duration_secs} seconds")]
    ScanTimeout {
        /// Scan duration that elapsed.
        duration_secs: u64,
    },

    /// Connecting to the Bluetooth daemon failed.
    #[error("Failed to open Bluetooth session: {message}")]
    SessionInitFailed {
        /// Underlying error text.
        message: String,
    },

    /// Starting or running discovery failed.
    #[error("Bluetooth discovery failed: {message}")]
    DiscoveryFailed {
        /// Underlying error text.
        message: String,
    },

    /// Any other adapter error.
    #[error("Bluetooth error: {message}")]
    Internal {
        /// Underlying error text.
        message: String,
    },
}

/// Result alias for scanning operations.
pub type BluetoothResult<T> = std::result::Result<T, BluetoothError>;

/// Source of advertisement records.
#[async_trait]
pub trait Scanner: Send {
    /// Scans for `duration` and returns every advertisement seen, in order of
    /// first sighting.
    async fn scan(&mut self, duration: Duration) -> BluetoothResult<Vec<AdvertisementRecord>>;
}

/// Advertisements gathered during one scan window, one per address.
///
/// Devices keep the position of their first sighting. Later sightings
/// refresh the signal strength and fill in fields the earlier ones lacked.
#[cfg(any(test, feature = "bluetooth"))]
#[derive(Debug, Default)]
pub(crate) struct ScanCollector {
    records: Vec<AdvertisementRecord>,
    index: std::collections::HashMap<String, usize>,
}

#[cfg(any(test, feature = "bluetooth"))]
impl ScanCollector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn observe(&mut self, record: AdvertisementRecord) {
        let Some(&slot) = self.index.get(&record.address) else {
            self.index.insert(record.address.clone(), self.records.len());
            self.records.push(record);
            return;
        };

        let known = &mut self.records[slot];
        known.rssi = record.rssi;
        if record.name.is_some() {
            known.name = record.name;
        }
        if record.service_id.is_some() {
            known.service_id = record.service_id;
        }
        if record.manufacturer_payload.is_some() {
            known.manufacturer_payload = record.manufacturer_payload;
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn into_records(self) -> Vec<AdvertisementRecord> {
        self.records
    }
}

/// Company id of the recognized beacon profile.
#[cfg(feature = "bluetooth")]
const PROFILE_COMPANY_ID: u16 = 0x004C;

#[cfg(feature = "bluetooth")]
pub use bluez::BluerScanner;

#[cfg(feature = "bluetooth")]
mod bluez {
    use std::collections::HashMap;
    use std::time::Duration;

    use async_trait::async_trait;
    use bluer::{Adapter, AdapterEvent, Address, DiscoveryFilter, DiscoveryTransport, Session};
    use futures::{pin_mut, StreamExt};
    use tracing::{debug, info};

    use super::{BluetoothError, BluetoothResult, ScanCollector, Scanner, PROFILE_COMPANY_ID};
    use crate::types::AdvertisementRecord;

    /// Scanner backed by BlueZ through `bluer`.
    pub struct BluerScanner {
        _session: Session,
        adapter: Adapter,
    }

    impl BluerScanner {
        /// Opens the default adapter, powering it on if needed.
        ///
        /// # Errors
        ///
        /// Fails if the daemon is unreachable, no adapter exists, or the
        /// adapter cannot be powered on.
        pub async fn new() -> BluetoothResult<Self> {
            let session = Session::new()
                .await
                .map_err(|e| BluetoothError::SessionInitFailed {
                    message: e.to_string(),
                })?;
            let adapter = session
                .default_adapter()
                .await
                .map_err(|_| BluetoothError::AdapterNotFound)?;

            let powered = adapter.is_powered().await.map_err(internal)?;
            if !powered {
                adapter
                    .set_powered(true)
                    .await
                    .map_err(|_| BluetoothError::AdapterPoweredOff)?;
            }

            adapter
                .set_discovery_filter(DiscoveryFilter {
                    transport: DiscoveryTransport::Le,
                    duplicate_data: true,
                    ..DiscoveryFilter::default()
                })
                .await
                .map_err(|e| BluetoothError::DiscoveryFailed {
                    message: e.to_string(),
                })?;

            info!(adapter = %adapter.name(), "Bluetooth adapter ready");
            Ok(Self {
                _session: session,
                adapter,
            })
        }

        async fn record(&self, address: Address) -> bluer::Result<Option<AdvertisementRecord>> {
            let device = self.adapter.device(address)?;
            let Some(rssi) = device.rssi().await? else {
                // Cached device not heard during this scan.
                return Ok(None);
            };

            let name = device.name().await?;
            let service_id = device
                .uuids()
                .await?
                .and_then(|uuids| uuids.into_iter().min())
                .map(|uuid| uuid.to_string());
            let manufacturer_payload = device.manufacturer_data().await?.and_then(payload_with_company_id);

            Ok(Some(AdvertisementRecord {
                address: address.to_string(),
                name,
                service_id,
                rssi,
                manufacturer_payload,
            }))
        }
    }

    /// Re-attaches the little-endian company id BlueZ strips off, preferring
    /// the beacon profile's company when several are advertised.
    fn payload_with_company_id(data: HashMap<u16, Vec<u8>>) -> Option<Vec<u8>> {
        let company = if data.contains_key(&PROFILE_COMPANY_ID) {
            PROFILE_COMPANY_ID
        } else {
            *data.keys().min()?
        };
        let body = data.get(&company)?;

        let mut payload = Vec::with_capacity(body.len() + 2);
        payload.extend_from_slice(&company.to_le_bytes());
        payload.extend_from_slice(body);
        Some(payload)
    }

    fn internal(e: bluer::Error) -> BluetoothError {
        BluetoothError::Internal {
            message: e.to_string(),
        }
    }

    #[async_trait]
    impl Scanner for BluerScanner {
        async fn scan(&mut self, duration: Duration) -> BluetoothResult<Vec<AdvertisementRecord>> {
            let events = self
                .adapter
                .discover_devices_with_changes()
                .await
                .map_err(|e| BluetoothError::DiscoveryFailed {
                    message: e.to_string(),
                })?;
            pin_mut!(events);

            let mut sightings = ScanCollector::new();
            let deadline = tokio::time::sleep(duration);
            tokio::pin!(deadline);

            // Properties are read while discovery runs. Once the stream is
            // dropped BlueZ clears RSSI and forgets non-connectable devices.
            loop {
                tokio::select! {
                    () = &mut deadline => break,
                    event = events.next() => match event {
                        Some(AdapterEvent::DeviceAdded(address)) => match self.record(address).await {
                            Ok(Some(record)) => sightings.observe(record),
                            Ok(None) => {}
                            Err(e) => debug!(%address, error = %e, "Skipping device with unreadable properties"),
                        },
                        Some(_) => {}
                        None => break,
                    },
                }
            }

            debug!(devices = sightings.len(), "Scan window closed");
            Ok(sightings.into_records())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_payload_prefers_profile_company() {
            let mut data = HashMap::new();
            data.insert(0x0006, vec![1, 2]);
            data.insert(PROFILE_COMPANY_ID, vec![0x02, 0x15]);
            assert_eq!(payload_with_company_id(data), Some(vec![0x4C, 0x00, 0x02, 0x15]));
        }

        #[test]
        fn test_payload_empty_map() {
            assert_eq!(payload_with_company_id(HashMap::new()), None);
        }
    }
}

/// Scripted scanner: each call returns the next queued batch, then empty scans.
#[cfg(any(test, feature = "mock-bluetooth", not(feature = "bluetooth")))]
#[derive(Debug, Default)]
pub struct MockScanner {
    batches: std::collections::VecDeque<BluetoothResult<Vec<AdvertisementRecord>>>,
    scans: usize,
}

#[cfg(any(test, feature = "mock-bluetooth", not(feature = "bluetooth")))]
impl MockScanner {
    /// Creates a scanner with nothing scripted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the records returned by a future scan.
    pub fn push_batch(&mut self, records: Vec<AdvertisementRecord>) {
        self.batches.push_back(Ok(records));
    }

    /// Queues a failing scan.
    pub fn push_failure(&mut self, error: BluetoothError) {
        self.batches.push_back(Err(error));
    }

    /// Number of scans performed.
    #[must_use]
    pub const fn scans(&self) -> usize {
        self.scans
    }
}

#[cfg(any(test, feature = "mock-bluetooth", not(feature = "bluetooth")))]
#[async_trait]
impl Scanner for MockScanner {
    async fn scan(&mut self, _duration: Duration) -> BluetoothResult<Vec<AdvertisementRecord>> {
        self.scans += 1;
        self.batches.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_scanner_replays_batches() {
        let mut scanner = MockScanner::new();
        scanner.push_batch(vec![AdvertisementRecord::new("AA:BB:CC:DD:EE:FF", -40)]);
        scanner.push_failure(BluetoothError::AdapterPoweredOff);

        assert_eq!(scanner.scan(DEFAULT_SCAN_DURATION).await.unwrap().len(), 1);
        assert_eq!(
            scanner.scan(DEFAULT_SCAN_DURATION).await,
            Err(BluetoothError::AdapterPoweredOff)
        );
        assert!(scanner.scan(DEFAULT_SCAN_DURATION).await.unwrap().is_empty());
        assert_eq!(scanner.scans(), 3);
    }

    #[test]
    fn test_collector_keeps_first_sighting_order() {
        let mut sightings = ScanCollector::new();
        sightings.observe(AdvertisementRecord::new("AA:AA:AA:AA:AA:AA", -70));
        sightings.observe(AdvertisementRecord::new("BB:BB:BB:BB:BB:BB", -50));
        sightings.observe(AdvertisementRecord::new("AA:AA:AA:AA:AA:AA", -65));

        assert_eq!(sightings.len(), 2);
        let records = sightings.into_records();
        assert_eq!(records[0].address, "AA:AA:AA:AA:AA:AA");
        assert_eq!(records[0].rssi, -65);
        assert_eq!(records[1].address, "BB:BB:BB:BB:BB:BB");
    }

    #[test]
    fn test_collector_later_sighting_fills_missing_fields() {
        let mut sightings = ScanCollector::new();
        sightings.observe(AdvertisementRecord::new("AA:AA:AA:AA:AA:AA", -70).with_name("tag"));
        sightings.observe(
            AdvertisementRecord::new("AA:AA:AA:AA:AA:AA", -60)
                .with_manufacturer_payload(vec![0x4C, 0x00, 0x02, 0x15]),
        );

        let records = sightings.into_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name.as_deref(), Some("tag"));
        assert_eq!(records[0].manufacturer_payload, Some(vec![0x4C, 0x00, 0x02, 0x15]));
        assert_eq!(records[0].rssi, -60);
    }

    #[test]
    fn test_collector_empty_window() {
        let sightings = ScanCollector::new();
        assert_eq!(sightings.len(), 0);
        assert!(sightings.into_records().is_empty());
    }

    #[test]
    fn test_error_messages() {
        let err = BluetoothError::ScanTimeout { duration_secs: 5 };
        assert!(err.to_string().contains("5 seconds"));
        assert!(BluetoothError::AdapterNotFound
            .to_string()
            .contains("No Bluetooth adapter"));
    }
}
