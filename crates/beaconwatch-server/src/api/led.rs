//! LED control endpoints.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::error::ApiResult;
use crate::state::SharedState;

/// Acknowledgment of an LED switch.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "success": true,
    "state": "on",
    "message": "LED turned on"
}))]
pub struct LedResponse {
    /// Whether the LED was switched.
    pub success: bool,
    /// New state, `on` or `off`.
    pub state: String,
    /// Human-readable confirmation.
    pub message: String,
}

async fn switch(state: &SharedState, on: bool) -> ApiResult<Json<LedResponse>> {
    let mut guard = state.write().await;
    guard.led.set(on).await?;
    let name = guard.led.state_name();

    Ok(Json(LedResponse {
        success: true,
        state: name.to_string(),
        message: format!("LED turned {name}"),
    }))
}

/// Turn the LED on.
#[utoipa::path(
    post,
    path = "/led/on",
    tag = "led",
    operation_id = "ledOn",
    responses(
        (status = 200, description = "LED switched on", body = LedResponse),
        (status = 500, description = "LED device not writable", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn led_on(State(state): State<SharedState>) -> ApiResult<Json<LedResponse>> {
    switch(&state, true).await
}

/// Turn the LED off.
#[utoipa::path(
    post,
    path = "/led/off",
    tag = "led",
    operation_id = "ledOff",
    responses(
        (status = 200, description = "LED switched off", body = LedResponse),
        (status = 500, description = "LED device not writable", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn led_off(State(state): State<SharedState>) -> ApiResult<Json<LedResponse>> {
    switch(&state, false).await
}
