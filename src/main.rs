//! Application entry point for the `leakguard` backend service.
//!
//! This binary owns the full lifecycle of the leak-risk API:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Loading the classifier artifact
//! - Establishing the PostgreSQL pool behind the telemetry log and creating
//!   its schema if it does not exist
//! - Wiring the prediction service, language model client and agent
//!   orchestrator by constructor injection
//! - Mounting all API routes via the `routes` gateway (EMBP pattern)
//! - Serving until Ctrl-C / SIGTERM, then closing the pool
//!
//! # Environment Variables
//! - `DATABASE_URL` (**required**) – PostgreSQL connection string
//! - `GEMINI_API_KEY` (**required**) – language model provider key
//! - `AXUM_LOG_LEVEL` (optional) – log verbosity (default: `debug`)
//! - `AXUM_SPAN_EVENTS` (optional) – span event mode for tracing
//! - see [`config::load_from_env`] for the rest
//!
//! This module follows the Explicit Module Boundary Pattern (EMBP) by
//! delegating schema setup to `schema`, configuration parsing to `config`,
//! and route registration to `routes`.
use std::{env, net::SocketAddr, str::FromStr, sync::Arc};

use axum::Router;
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use anyhow::Result;

mod agent;
mod classifier;
mod config;
mod error;
mod llm;
mod models;
mod prediction;
mod routes;
mod schema;
mod telemetry;
mod tools;

pub use config::Config;

// Re-exported so sibling modules depend on the crate root rather than on
// each other's file layout.
pub use agent::{AgentOrchestrator, AgentResponse};
pub use error::{ClassifierError, LlmError, PredictError, TelemetryError};
pub use models::{
    LeakageSummary, LoggedPrediction, PredictionResult, RiskLevel, SensorReading, ZoneSummary,
};
pub use prediction::{PredictionService, RiskPredictor};
pub use tools::ToolRegistry;

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    init_tracing();
    dotenv().ok();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    let classifier = Arc::new(classifier::LogisticClassifier::load(&cfg.model_path)?);

    tracing::info!("Attempting to connect to telemetry database");

    let statement_timeout_ms = cfg.db_statement_timeout.as_millis().to_string();
    let connect_options = PgConnectOptions::from_str(&cfg.db_url)?
        .options([("statement_timeout", statement_timeout_ms.as_str())]);

    let pool = PgPoolOptions::new()
        .max_connections(cfg.db_pool_max)
        .acquire_timeout(cfg.db_acquire_timeout)
        .connect_with(connect_options)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to telemetry database: {}", e))?;

    tracing::info!("Successfully connected to database");

    schema::create_schema(&pool).await?;

    let log: Arc<dyn telemetry::TelemetryLog> = Arc::new(telemetry::PgTelemetryLog::new(
        pool.clone(),
        cfg.db_statement_timeout,
    ));
    let local: Arc<dyn RiskPredictor> = Arc::new(
        PredictionService::new(classifier, log.clone())
            .with_log_timeout(cfg.db_statement_timeout),
    );

    // The agent's prediction tool may target a separately deployed /predict.
    let tool_predictor: Arc<dyn RiskPredictor> = match &cfg.predict_url {
        Some(url) => {
            tracing::info!("predict_leak_risk tool will call {}/predict", url);
            Arc::new(prediction::RemotePredictor::new(url, cfg.predict_timeout)?)
        }
        None => local.clone(),
    };

    let llm = Arc::new(llm::GeminiClient::new(
        &cfg.gemini_api_key,
        &cfg.gemini_model,
        &cfg.gemini_api_url,
        cfg.llm_timeout,
    )?);
    let agent = Arc::new(AgentOrchestrator::new(
        llm,
        ToolRegistry::leak_tools(),
        tool_predictor,
        log,
    ));

    // Build app from routes gateway (EMBP)
    let app: Router = routes::router(routes::AppState {
        predictor: local,
        agent,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down, closing database pool");
    pool.close().await;

    Ok(())
}

// ---

/// Resolve when the process receives Ctrl-C or (on Unix) SIGTERM.
async fn shutdown_signal() {
    // ---
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl-C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

/// Initialize the global tracing subscriber for structured logging.
///
/// This function configures the [`tracing_subscriber`] with:
/// - Log target, file, and line number output enabled
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY
/// - Span event emission mode controlled by the `AXUM_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level controlled by `RUST_LOG`, else the `AXUM_LOG_LEVEL` env var
///
/// This should be called once at application startup before any logging
/// or tracing macros are invoked. It installs the subscriber globally
/// for the lifetime of the process.
fn init_tracing() {
    // ---
    let span_events = match env::var("AXUM_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("AXUM_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "debug",
        };
        EnvFilter::new(format!("{level},sqlx::query=warn,hyper=info,reqwest=info"))
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
