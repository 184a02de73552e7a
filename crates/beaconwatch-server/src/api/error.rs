//! API error types and response handling.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type.
///
/// Each variant maps to a specific HTTP status code and produces a
/// consistent JSON error response.
#[derive(Debug, Clone)]
pub enum ApiError {
    /// 500 Internal Server Error - Unexpected server-side error.
    InternalError {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 503 Service Unavailable - Control loop, radio or link unavailable.
    ServiceUnavailable {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },
}

impl ApiError {
    /// The control loop stopped accepting commands.
    #[must_use]
    pub fn loop_unavailable() -> Self {
        Self::ServiceUnavailable {
            error_code: "control_loop_unavailable".to_string(),
            message: "The scan loop is not running".to_string(),
        }
    }
}

/// Standard JSON error response body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "success": false,
    "error": "peripheral_error",
    "message": "Peripheral error: /sys/class/leds/led0/brightness: Permission denied"
}))]
pub struct ErrorResponse {
    /// Always `false`.
    pub success: bool,

    /// Machine-readable error code.
    #[schema(example = "peripheral_error")]
    pub error: String,

    /// Human-readable error message.
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            Self::InternalError {
                error_code,
                message,
            } => {
                tracing::error!(error_code = %error_code, message = %message, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, error_code, message)
            }
            Self::ServiceUnavailable {
                error_code,
                message,
            } => (StatusCode::SERVICE_UNAVAILABLE, error_code, message),
        };

        let body = ErrorResponse {
            success: false,
            error,
            message,
        };
        (status, Json(body)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InternalError { message, .. } => write!(f, "Internal Error: {message}"),
            Self::ServiceUnavailable { message, .. } => {
                write!(f, "Service Unavailable: {message}")
            }
        }
    }
}

impl std::error::Error for ApiError {}

/// Convert from beaconwatch_core errors.
impl From<beaconwatch_core::BeaconError> for ApiError {
    fn from(err: beaconwatch_core::BeaconError) -> Self {
        let error_code = err.error_code().to_ascii_lowercase();
        let message = err.to_string();

        match err.http_status_code() {
            503 => Self::ServiceUnavailable {
                error_code,
                message,
            },
            _ => Self::InternalError {
                error_code,
                message,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beaconwatch_core::BeaconError;

    #[test]
    fn test_from_peripheral_error() {
        let err = ApiError::from(BeaconError::Peripheral("gpio busy".to_string()));
        assert!(matches!(
            err,
            ApiError::InternalError { ref error_code, .. } if error_code == "peripheral_error"
        ));
        assert!(err.to_string().contains("gpio busy"));
    }

    #[test]
    fn test_from_delivery_and_bluetooth_errors() {
        assert!(matches!(
            ApiError::from(BeaconError::BackendRejected { status: 500 }),
            ApiError::InternalError { ref error_code, .. } if error_code == "backend_rejected"
        ));
        assert!(matches!(
            ApiError::from(BeaconError::BluetoothAdapterNotFound),
            ApiError::ServiceUnavailable { .. }
        ));
    }

    #[test]
    fn test_status_codes() {
        let response = ApiError::loop_unavailable().into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = ApiError::from(BeaconError::Peripheral("x".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_response_serialization() {
        let response = ErrorResponse {
            success: false,
            error: "test_error".to_string(),
            message: "Test message".to_string(),
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"success\":false"));
        assert!(json.contains("test_error"));
    }
}
