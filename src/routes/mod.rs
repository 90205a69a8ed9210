// src/routes/mod.rs
//! Routes gateway for the LeakGuard API.
//!
//! Merges the per-endpoint subrouters and attaches the shared [`AppState`].
//! Part of the Explicit Module Boundary Pattern (EMBP): `main.rs` only sees
//! [`router`] and [`AppState`].

use std::sync::Arc;

use axum::Router;

use crate::{AgentOrchestrator, RiskPredictor};

mod agent;
mod health;
mod predict;

// ---

/// Shared handler state. Both services are stateless behind their `Arc`s.
#[derive(Clone)]
pub struct AppState {
    pub predictor: Arc<dyn RiskPredictor>,
    pub agent: Arc<AgentOrchestrator>,
}

pub fn router(state: AppState) -> Router {
    // ---
    Router::new()
        .merge(predict::router())
        .merge(agent::router())
        .merge(health::router())
        .with_state(state)
}
