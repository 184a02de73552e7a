//! Operator access to the retry queue.

use axum::extract::State;
use axum::Json;
use beaconwatch_core::ControlCommand;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use utoipa::ToSchema;

use crate::api::error::{ApiError, ApiResult};
use crate::state::SharedState;

/// Result of clearing the queue.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "success": true,
    "dropped": 4,
    "message": "Dropped 4 queued events"
}))]
pub struct ClearQueueResponse {
    /// Always `true` on success.
    pub success: bool,
    /// Number of events discarded.
    pub dropped: usize,
    /// Human-readable confirmation.
    pub message: String,
}

/// Discard every undelivered event.
///
/// The request is applied by the scan loop at the start of its next
/// iteration, so the response may take up to one scan to arrive.
#[utoipa::path(
    post,
    path = "/queue/clear",
    tag = "queue",
    operation_id = "clearQueue",
    responses(
        (status = 200, description = "Queue cleared", body = ClearQueueResponse),
        (status = 503, description = "Scan loop not running", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn clear_queue(State(state): State<SharedState>) -> ApiResult<Json<ClearQueueResponse>> {
    let commands = state.read().await.commands.clone();

    let (reply, dropped) = oneshot::channel();
    commands
        .send(ControlCommand::ClearQueue { reply })
        .await
        .map_err(|_| ApiError::loop_unavailable())?;
    let dropped = dropped.await.map_err(|_| ApiError::loop_unavailable())?;

    Ok(Json(ClearQueueResponse {
        success: true,
        dropped,
        message: format!("Dropped {dropped} queued events"),
    }))
}
