// src/routes/agent.rs
//! Assistant endpoint.
//!
//! `POST /agent` runs one orchestrator turn for `{"query": ...}`. It always
//! answers 200: a missing or unreadable query gets the guidance answer and
//! provider failures are reported in the body's `error` field. Follows the
//! Explicit Module Boundary Pattern (EMBP): only the subrouter is exported to
//! the gateway (`mod.rs`).

use axum::{
    extract::{rejection::JsonRejection, State},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use tracing::{debug, info};

use super::AppState;
use crate::AgentResponse;

// ---

#[derive(Debug, Default, Deserialize)]
struct AgentRequest {
    #[serde(default)]
    query: Option<String>,
}

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/agent", post(handler))
}

/// Always answers 200; failures are reported in the body's `error` field.
async fn handler(
    State(state): State<AppState>,
    body: Result<Json<AgentRequest>, JsonRejection>,
) -> impl IntoResponse {
    // ---
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            debug!("POST /agent - unreadable body treated as empty query: {}", rejection.body_text());
            AgentRequest::default()
        }
    };
    let query = request.query.unwrap_or_default();
    info!("POST /agent - {} chars", query.chars().count());

    let turn = state.agent.run_turn(&query).await;
    Json(AgentResponse::from(turn))
}
