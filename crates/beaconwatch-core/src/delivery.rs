//! Event delivery to the backend.
//!
//! [`DeliveryClient`] performs exactly one send attempt per call and never
//! retries on its own; buffering and replay go through the [`EventQueue`].
//! The network itself sits behind the [`Transport`] trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use url::Url;
use utoipa::ToSchema;

use crate::clock::format_uptime;
use crate::config::BackendConfig;
use crate::connectivity::ConnectivityState;
use crate::queue::{DrainReport, EventKind, EventQueue, PendingEvent};

/// A response received from the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body as text.
    pub body: String,
}

impl TransportResponse {
    /// Whether the status is in the 2xx range.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Transport-level failures: no usable response was received.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The request did not complete before its deadline.
    #[error("request timed out")]
    Timeout,

    /// The backend could not be reached.
    #[error("connection failed: {0}")]
    Connect(String),

    /// Any other failure while building or sending the request.
    #[error("request failed: {0}")]
    Request(String),
}

/// Network collaborator used to reach the backend.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POSTs `body` as JSON to `url`.
    async fn post_json(
        &self,
        url: &Url,
        body: &serde_json::Value,
    ) -> Result<TransportResponse, TransportError>;

    /// GETs `url`.
    async fn get(&self, url: &Url) -> Result<TransportResponse, TransportError>;
}

/// Reasons a single delivery attempt failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// No response was received.
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    /// The backend answered with a non-2xx status.
    #[error("backend rejected event with status {status}")]
    Rejected {
        /// HTTP status code returned.
        status: u16,
        /// Response body returned.
        body: String,
    },

    /// An endpoint URL could not be built from the configured base.
    #[error("invalid endpoint URL '{url}': {message}")]
    InvalidEndpoint {
        /// The offending URL.
        url: String,
        /// Parser message.
        message: String,
    },
}

/// JSON body posted for every event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    /// Uptime when the event was raised, `HH:MM:SS.mmm`.
    #[schema(example = "00:04:12.508")]
    pub timestamp: String,
    /// Beacon identity.
    #[schema(example = "aa:bb:cc:dd:ee:ff_e2c56db5-dffb-48d2-b060-d0f5a71096e0")]
    pub beacon_id: String,
    /// Beacon display name.
    pub name: String,
    /// Advertised service id.
    pub uuid: String,
    /// Signal strength in dBm.
    pub rssi: i16,
    /// `arrival` or `departure`.
    pub event_type: EventKind,
    /// Identifier of this scanner.
    #[schema(example = "PI_B827EB123456")]
    pub device_id: String,
}

impl EventPayload {
    /// Builds the wire body for `event` sent by `device_id`.
    #[must_use]
    pub fn from_event(event: &PendingEvent, device_id: &str) -> Self {
        Self {
            timestamp: format_uptime(event.timestamp_ms),
            beacon_id: event.beacon_id.to_string(),
            name: event.beacon.name.clone(),
            uuid: event.beacon.service_id.clone(),
            rssi: event.beacon.rssi,
            event_type: event.kind,
            device_id: device_id.to_string(),
        }
    }
}

/// Absolute URLs of the backend endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Receives arrival events.
    pub arrival: Url,
    /// Receives departure events.
    pub departure: Url,
    /// Answers liveness probes.
    pub ping: Url,
}

impl Endpoints {
    /// Appends each path to `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::InvalidEndpoint`] if a joined URL does not parse.
    pub fn new(
        base_url: &str,
        arrival_path: &str,
        departure_path: &str,
        ping_path: &str,
    ) -> Result<Self, DeliveryError> {
        let join = |path: &str| {
            let raw = format!("{}{}", base_url.trim_end_matches('/'), path);
            Url::parse(&raw).map_err(|e| DeliveryError::InvalidEndpoint {
                url: raw.clone(),
                message: e.to_string(),
            })
        };
        Ok(Self {
            arrival: join(arrival_path)?,
            departure: join(departure_path)?,
            ping: join(ping_path)?,
        })
    }

    /// Builds the endpoints described by the backend configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::InvalidEndpoint`] if a joined URL does not parse.
    pub fn from_config(backend: &BackendConfig) -> Result<Self, DeliveryError> {
        Self::new(
            &backend.base_url,
            &backend.arrival_path,
            &backend.departure_path,
            &backend.ping_path,
        )
    }

    /// Endpoint receiving events of `kind`.
    #[must_use]
    pub const fn for_kind(&self, kind: EventKind) -> &Url {
        match kind {
            EventKind::Arrival => &self.arrival,
            EventKind::Departure => &self.departure,
        }
    }
}

/// What [`DeliveryClient::send_or_queue`] did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The backend accepted the event.
    Delivered,
    /// The event was buffered for a later drain.
    Queued {
        /// Whether an older event was dropped to make room.
        evicted: bool,
    },
}

/// Sends events to the backend, one attempt per call.
#[derive(Debug)]
pub struct DeliveryClient<T> {
    transport: T,
    endpoints: Endpoints,
    device_id: String,
}

impl<T: Transport> DeliveryClient<T> {
    /// Creates a client posting to `endpoints` on behalf of `device_id`.
    pub fn new(transport: T, endpoints: Endpoints, device_id: impl Into<String>) -> Self {
        Self {
            transport,
            endpoints,
            device_id: device_id.into(),
        }
    }

    /// Identifier reported in every event.
    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// The underlying transport.
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Attempts to deliver `event` once.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Transport`] when no response arrives and
    /// [`DeliveryError::Rejected`] on a non-2xx status.
    pub async fn send(&self, event: &PendingEvent) -> Result<u16, DeliveryError> {
        let url = self.endpoints.for_kind(event.kind);
        let payload = EventPayload::from_event(event, &self.device_id);
        let body = serde_json::to_value(&payload).map_err(|e| {
            DeliveryError::Transport(TransportError::Request(e.to_string()))
        })?;

        match self.transport.post_json(url, &body).await {
            Ok(response) if response.is_success() => {
                info!(
                    kind = %event.kind,
                    beacon_id = %event.beacon_id,
                    status = response.status,
                    response = %response.body,
                    "Event delivered"
                );
                Ok(response.status)
            }
            Ok(response) => {
                warn!(
                    kind = %event.kind,
                    beacon_id = %event.beacon_id,
                    status = response.status,
                    "Backend rejected event"
                );
                Err(DeliveryError::Rejected {
                    status: response.status,
                    body: response.body,
                })
            }
            Err(e) => {
                warn!(
                    kind = %event.kind,
                    beacon_id = %event.beacon_id,
                    error = %e,
                    "Event delivery failed"
                );
                Err(e.into())
            }
        }
    }

    /// Delivers `event` now if the link is up, otherwise (or on failure)
    /// buffers it in `queue`.
    pub async fn send_or_queue(
        &self,
        event: PendingEvent,
        queue: &mut EventQueue,
        connectivity: &ConnectivityState,
    ) -> Disposition {
        if connectivity.is_connected() && self.send(&event).await.is_ok() {
            return Disposition::Delivered;
        }
        let evicted = queue.enqueue(event).is_some();
        Disposition::Queued { evicted }
    }

    /// Replays `queue` through [`send`](Self::send), stopping at the first failure.
    ///
    /// Failed replays stay at the front of the queue rather than being
    /// re-enqueued, so no event is duplicated.
    pub async fn drain(&self, queue: &mut EventQueue) -> DrainReport {
        let client = self;
        queue
            .drain(move |event| async move { client.send(&event).await.is_ok() })
            .await
    }

    /// Probes the backend liveness endpoint. Only HTTP 200 counts as alive.
    pub async fn ping(&self, connectivity: &ConnectivityState) -> bool {
        if !connectivity.is_connected() {
            return false;
        }
        matches!(
            self.transport.get(&self.endpoints.ping).await,
            Ok(TransportResponse { status: 200, .. })
        )
    }
}
