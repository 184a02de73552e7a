//! HTTP control surface.
//!
//! - `health` - Status probe
//! - `led` - Status LED switching
//! - `queue` - Operator reset of the retry queue
//! - `error` - API error types
//! - `openapi` - OpenAPI specification generation

use std::fmt::Write as _;

use axum::extract::RawQuery;
use axum::http::{header, Method, StatusCode, Uri};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::SharedState;

pub mod error;
pub mod health;
pub mod led;
pub mod openapi;
pub mod queue;

pub use error::{ApiError, ApiResult, ErrorResponse};

/// Creates the control-surface router.
///
/// # Route Structure
///
/// ```text
/// GET  /              - Status probe
/// POST /led/on        - Switch the LED on
/// POST /led/off       - Switch the LED off
/// POST /queue/clear   - Drop undelivered events
/// GET  /openapi.json  - OpenAPI specification
/// *                   - 404 with request diagnostics
/// ```
pub fn create_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(health::get_status))
        .route("/led/on", post(led::led_on))
        .route("/led/off", post(led::led_off))
        .route("/queue/clear", post(queue::clear_queue))
        .route("/openapi.json", get(openapi::get_openapi_spec))
        .fallback(not_found)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Plain-text 404 listing what was requested.
async fn not_found(method: Method, uri: Uri, RawQuery(query): RawQuery) -> (StatusCode, String) {
    let args: Vec<(String, String)> = query
        .as_deref()
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default();

    let mut body = format!(
        "File Not Found\n\nURI: {}\nMethod: {}\nArguments: {}\n",
        uri.path(),
        method,
        args.len()
    );
    for (name, value) in &args {
        let _ = writeln!(body, " {name}: {value}");
    }

    (StatusCode::NOT_FOUND, body)
}
