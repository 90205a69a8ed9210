// src/routes/predict.rs
//! Leak-risk scoring endpoint.
//!
//! `POST /predict` takes one sensor reading and returns the classifier's
//! flag, probability and risk tier. Unreadable or invalid readings answer
//! 422 and scoring failures answer 500, both with a `{"detail": ...}` body.
//! Follows the Explicit Module Boundary Pattern (EMBP): the handler is
//! internal to this file and only the subrouter is exported to the gateway
//! (`mod.rs`).

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde::Serialize;
use tracing::{error, info, warn};

use super::AppState;
use crate::{PredictError, SensorReading};

// ---

#[derive(Serialize)]
struct ErrorDetail {
    detail: String,
}

fn error_response(status: StatusCode, detail: impl Into<String>) -> axum::response::Response {
    (
        status,
        Json(ErrorDetail {
            detail: detail.into(),
        }),
    )
        .into_response()
}

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/predict", post(handler))
}

async fn handler(
    State(state): State<AppState>,
    body: Result<Json<SensorReading>, JsonRejection>,
) -> impl IntoResponse {
    // ---
    let Json(reading) = match body {
        Ok(reading) => reading,
        Err(rejection) => {
            warn!("POST /predict - rejected body: {}", rejection.body_text());
            return error_response(StatusCode::UNPROCESSABLE_ENTITY, rejection.body_text());
        }
    };

    info!(zone = %reading.zone, pipe = %reading.pipe, "POST /predict");

    match state.predictor.predict(reading).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(e @ PredictError::Validation(_)) => {
            warn!("POST /predict - {}", e);
            error_response(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
        }
        Err(e) => {
            error!("POST /predict - {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
