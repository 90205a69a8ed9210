//! Database schema management for `leakguard`.
//!
//! Ensures the telemetry log table and its indexes exist before serving
//! requests. Applied once on startup from `main.rs` (EMBP: single gateway call).

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create or update the database schema (idempotent).
///
/// Creates the append-only `leak_predictions` table: the flattened sensor
/// reading, the prediction outcome, a UTC timestamp and the request id.
/// Safe to call on every startup; no-op if objects already exist.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS leak_predictions (
            id                BIGSERIAL PRIMARY KEY,
            pressure          DOUBLE PRECISION NOT NULL,
            flow_rate         DOUBLE PRECISION NOT NULL,
            temperature       DOUBLE PRECISION NOT NULL,
            vibration         DOUBLE PRECISION NOT NULL,
            rpm               DOUBLE PRECISION NOT NULL,
            operational_hours DOUBLE PRECISION NOT NULL,
            latitude          DOUBLE PRECISION NOT NULL,
            longitude         DOUBLE PRECISION NOT NULL,
            zone              TEXT             NOT NULL,
            block             TEXT             NOT NULL,
            pipe              TEXT             NOT NULL,
            location_code     TEXT             NOT NULL,
            "timestamp"       TIMESTAMPTZ      NOT NULL,
            leakage_flag      SMALLINT         NOT NULL CHECK (leakage_flag IN (0, 1)),
            leakage_prob      DOUBLE PRECISION NOT NULL,
            risk_level        TEXT             NOT NULL,
            request_id        UUID             NOT NULL UNIQUE
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Trailing-window aggregation scans by time, then groups by zone
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_leak_predictions_timestamp
            ON leak_predictions ("timestamp");
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_leak_predictions_zone
            ON leak_predictions (zone);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
