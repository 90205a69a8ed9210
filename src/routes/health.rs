// src/routes/health.rs
//! Liveness endpoints for the LeakGuard backend.
//!
//! `GET /` is what the dashboard and Cloud Run style health checks hit; `GET /health`
//! is kept for container orchestrators and CI. Both follow the Explicit Module
//! Boundary Pattern (EMBP): the handler is internal to this file and only the
//! subrouter is exported to the gateway (`mod.rs`).

use axum::{routing::get, Json, Router};
use serde::Serialize;

/// JSON response body for the liveness endpoints.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    message: &'static str,
}

/// Handle `GET /` and `GET /health`.
///
/// Deliberately lightweight: does not touch the database, the classifier or
/// the language model provider.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        message: "LeakGuard API running",
    })
}

/// Create a subrouter containing the liveness routes.
///
/// Generic over the application state so it merges cleanly with the gateway
/// router.
pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
}
