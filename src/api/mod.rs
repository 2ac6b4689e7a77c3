//! HTTP API
//!
//! - `POST /write/:thing` with `field=value` pairs in the query string or a
//!   form-encoded body
//! - `GET /read/:thing/:year/:month/:day.json` returning the day's samples
//! - `GET /health`

mod read;
mod telemetry;
mod write;

pub use read::read_shard;
pub use write::write_sample;

use crate::ingester::Ingester;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use std::sync::Arc;

/// Route template of the shard read endpoint
const READ_ROUTE: &str = "/read/:thing/:year/:month/:day";

/// Build the HTTP API router
pub fn build_http_router(ingester: Arc<Ingester>) -> Router {
    use axum::middleware;
    use axum::routing::{get, post};
    use tower_http::cors::{Any, CorsLayer};

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/write/:thing", post(write_sample))
        .route(READ_ROUTE, get(read_shard))
        .with_state(ApiState { ingester })
        .layer(middleware::from_fn(telemetry::http_observability_middleware))
        .layer(cors)
}

/// Shared API state
#[derive(Clone)]
pub struct ApiState {
    pub ingester: Arc<Ingester>,
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

/// `{"error": message}` with the given status
fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}
