//! OpenAPI specification for the control surface.
//!
//! Also documents the JSON body the scanner posts to the backend
//! (`EventPayload`), so backend implementers can work from the same file.

use axum::Json;
use beaconwatch_core::{AgentStatus, EventKind, EventPayload};
use utoipa::OpenApi;

use super::error::ErrorResponse;
use super::health::StatusResponse;
use super::led::LedResponse;
use super::queue::ClearQueueResponse;

/// Serve the OpenAPI specification as JSON.
pub async fn get_openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Main OpenAPI document structure for beaconwatch.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "beaconwatch API",
        version = "0.1.0",
        description = r#"
# beaconwatch API

Local control surface of a BLE beacon scanner.

The scanner reports beacon arrivals and departures to a backend over HTTP,
buffering events while the link is down. This API only exposes status and a
few operator actions; beacon data itself flows to the backend.
"#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local scanner")
    ),
    tags(
        (name = "system", description = "Scanner status"),
        (name = "led", description = "Status LED control"),
        (name = "queue", description = "Undelivered event queue")
    ),
    paths(
        super::health::get_status,
        super::led::led_on,
        super::led::led_off,
        super::queue::clear_queue,
    ),
    components(
        schemas(
            ErrorResponse,
            StatusResponse,
            LedResponse,
            ClearQueueResponse,
            AgentStatus,
            EventPayload,
            EventKind,
        )
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_generation() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "beaconwatch API");
        assert!(spec.paths.paths.contains_key("/led/on"));
        assert!(spec.paths.paths.contains_key("/queue/clear"));
    }

    #[test]
    fn test_openapi_documents_event_payload() {
        let json = ApiDoc::openapi().to_json().unwrap();
        assert!(json.contains("EventPayload"));
        assert!(json.contains("beaconId"));
    }
}
