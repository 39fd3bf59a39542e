//! HTTP front door.
//!
//! - POST /api/generate (SSE relay), OPTIONS for CORS preflight
//! - GET /health
//! - everything else: static files

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::relay::{PromptRequest, Relay, RelayError};
use crate::server::streaming::sse_response;

/// Application state shared across handlers.
pub struct AppState {
    pub relay: Relay,
    pub static_dir: PathBuf,
}

/// Build the axum router with all routes and the CORS header decoration.
pub fn build_router(state: Arc<AppState>) -> Router {
    let static_files = ServeDir::new(&state.static_dir);

    Router::new()
        .route(
            "/api/generate",
            post(generate).options(preflight).fallback(method_not_allowed),
        )
        .route("/health", get(health))
        .fallback_service(static_files)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
                .layer(cors_header(
                    header::ACCESS_CONTROL_ALLOW_METHODS,
                    "POST, OPTIONS",
                ))
                .layer(cors_header(
                    header::ACCESS_CONTROL_ALLOW_HEADERS,
                    "Content-Type",
                )),
        )
        .with_state(state)
}

fn cors_header(name: HeaderName, value: &'static str) -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::overriding(name, HeaderValue::from_static(value))
}

// ─── Route Handlers ────────────────────────────────────────────────────────

async fn generate(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, RelayError> {
    let request = PromptRequest::from_json(&body)?;
    let rx = state.relay.start(request);
    Ok(sse_response(rx))
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn method_not_allowed() -> impl IntoResponse {
    (
        [(header::ALLOW, "POST, OPTIONS")],
        RelayError::MethodNotAllowed,
    )
}

async fn health() -> &'static str {
    "Server is running"
}
