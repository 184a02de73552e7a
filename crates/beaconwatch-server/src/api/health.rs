//! Status probe at `GET /`.

use axum::extract::State;
use axum::Json;
use beaconwatch_core::format_uptime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::SharedState;

/// Status probe response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "status": "running",
    "version": "0.1.0",
    "led_pin": 18,
    "led": "off",
    "connected": true,
    "queue_size": 0,
    "queue_capacity": 50,
    "known_beacons": 3,
    "present_beacons": 2,
    "uptime": "00:12:03.417",
    "started_at_utc": "2025-01-15T04:30:00Z"
}))]
pub struct StatusResponse {
    /// Service status.
    #[schema(example = "running")]
    pub status: String,

    /// Service version from Cargo.toml.
    #[schema(example = "0.1.0")]
    pub version: String,

    /// Pin the status LED is wired to.
    #[schema(example = 18)]
    pub led_pin: u8,

    /// `on` or `off`.
    #[schema(example = "off")]
    pub led: String,

    /// Whether the backend link is up.
    pub connected: bool,

    /// Events waiting for delivery.
    pub queue_size: usize,

    /// Maximum number of queued events.
    pub queue_capacity: usize,

    /// Beacons seen since start.
    pub known_beacons: usize,

    /// Beacons currently present.
    pub present_beacons: usize,

    /// Uptime as `HH:MM:SS.mmm`, as of the last loop iteration.
    #[schema(example = "00:12:03.417")]
    pub uptime: String,

    /// When the service started (ISO 8601).
    pub started_at_utc: String,
}

/// Status probe.
///
/// Reports the LED and the state published by the control loop after its
/// most recent iteration.
#[utoipa::path(
    get,
    path = "/",
    tag = "system",
    operation_id = "getStatus",
    summary = "Get scanner status",
    responses(
        (status = 200, description = "Scanner is running", body = StatusResponse)
    )
)]
pub async fn get_status(State(state): State<SharedState>) -> Json<StatusResponse> {
    let guard = state.read().await;
    let agent = guard.status.borrow().clone();

    Json(StatusResponse {
        status: "running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        led_pin: guard.led.pin(),
        led: guard.led.state_name().to_string(),
        connected: agent.connected,
        queue_size: agent.queue_size,
        queue_capacity: agent.queue_capacity,
        known_beacons: agent.known_beacons,
        present_beacons: agent.present_beacons,
        uptime: format_uptime(agent.uptime_ms),
        started_at_utc: guard.started_at.to_rfc3339(),
    })
}
