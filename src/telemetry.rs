//! Telemetry log: append-only store of past predictions.
//!
//! The log is an external collaborator. This module defines the seam
//! ([`TelemetryLog`]), the Postgres-backed implementation, and the zone
//! ranking shared by every implementation so ordering and the result cap
//! live in exactly one place.

use std::{cmp::Ordering, future::Future, time::Duration};

use async_trait::async_trait;
use sqlx::PgPool;

use crate::{LeakageSummary, LoggedPrediction, TelemetryError, ZoneSummary};

// ---

/// Maximum number of zones returned by a leakage summary.
pub const TOP_ZONES_LIMIT: usize = 10;

/// Default trailing window for leakage summaries.
pub const DEFAULT_SUMMARY_HOURS: u32 = 24;

#[async_trait]
pub trait TelemetryLog: Send + Sync {
    /// Append one prediction row. Rows are never updated or deleted.
    async fn append(&self, entry: &LoggedPrediction) -> Result<(), TelemetryError>;

    /// Per-zone aggregates over the trailing `hours`, in no particular order.
    async fn zone_activity(&self, hours: u32) -> Result<Vec<ZoneSummary>, TelemetryError>;
}

/// Order zones by leak events, then mean probability (both descending), and
/// keep the top [`TOP_ZONES_LIMIT`].
pub fn rank_zones(mut zones: Vec<ZoneSummary>) -> Vec<ZoneSummary> {
    // ---
    zones.sort_by(|a, b| {
        b.leak_events
            .cmp(&a.leak_events)
            .then_with(|| {
                b.avg_leakage_prob
                    .partial_cmp(&a.avg_leakage_prob)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.zone.cmp(&b.zone))
    });
    zones.truncate(TOP_ZONES_LIMIT);
    zones
}

/// Aggregate the trailing window and rank the zones.
pub async fn summarize_recent_leakage(
    log: &dyn TelemetryLog,
    hours: u32,
) -> Result<LeakageSummary, TelemetryError> {
    // ---
    let zones = log.zone_activity(hours).await?;
    tracing::debug!("Aggregated {} zones over the last {}h", zones.len(), hours);

    Ok(LeakageSummary {
        hours,
        top_zones: rank_zones(zones),
    })
}

// ---

/// Telemetry log stored in the `leak_predictions` Postgres table.
///
/// Every query is bounded by `query_timeout` on the client side, on top of
/// the `statement_timeout` the pool sets per connection.
#[derive(Clone)]
pub struct PgTelemetryLog {
    pool: PgPool,
    query_timeout: Duration,
}

impl PgTelemetryLog {
    pub fn new(pool: PgPool, query_timeout: Duration) -> Self {
        PgTelemetryLog {
            pool,
            query_timeout,
        }
    }

    async fn bounded<T, F>(&self, query: F) -> Result<T, TelemetryError>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        // ---
        match tokio::time::timeout(self.query_timeout, query).await {
            Ok(rows) => Ok(rows?),
            Err(_) => Err(TelemetryError::Timeout(self.query_timeout)),
        }
    }
}

#[async_trait]
impl TelemetryLog for PgTelemetryLog {
    async fn append(&self, entry: &LoggedPrediction) -> Result<(), TelemetryError> {
        // ---
        let reading = &entry.reading;
        let result = &entry.result;

        let insert = sqlx::query(
            r#"
            INSERT INTO leak_predictions (
                pressure, flow_rate, temperature, vibration, rpm,
                operational_hours, latitude, longitude,
                zone, block, pipe, location_code,
                "timestamp", leakage_flag, leakage_prob, risk_level, request_id
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(reading.pressure)
        .bind(reading.flow_rate)
        .bind(reading.temperature)
        .bind(reading.vibration)
        .bind(reading.rpm)
        .bind(reading.operational_hours)
        .bind(reading.latitude)
        .bind(reading.longitude)
        .bind(&reading.zone)
        .bind(&reading.block)
        .bind(&reading.pipe)
        .bind(&reading.location_code)
        .bind(entry.timestamp)
        .bind(i16::from(result.leakage_flag))
        .bind(result.leakage_prob)
        .bind(result.risk_level.as_str())
        .bind(entry.request_id)
        .execute(&self.pool);

        self.bounded(insert).await?;

        Ok(())
    }

    async fn zone_activity(&self, hours: u32) -> Result<Vec<ZoneSummary>, TelemetryError> {
        // ---
        let aggregate = sqlx::query_as::<_, ZoneSummary>(
            r#"
            SELECT
                zone,
                COUNT(*)::BIGINT                      AS total_events,
                COALESCE(SUM(leakage_flag), 0)::BIGINT AS leak_events,
                AVG(leakage_prob)::DOUBLE PRECISION    AS avg_leakage_prob
            FROM leak_predictions
            WHERE "timestamp" >= NOW() - ($1::BIGINT * INTERVAL '1 hour')
            GROUP BY zone
            "#,
        )
        .bind(i64::from(hours))
        .fetch_all(&self.pool);

        self.bounded(aggregate).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    // ---
    use std::{collections::BTreeMap, sync::Mutex};

    use chrono::{Duration, Utc};

    use super::*;

    /// In-process telemetry log. Optionally fails every call.
    #[derive(Default)]
    pub struct MemoryTelemetryLog {
        rows: Mutex<Vec<LoggedPrediction>>,
        unavailable: bool,
    }

    impl MemoryTelemetryLog {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn unavailable() -> Self {
            MemoryTelemetryLog {
                rows: Mutex::new(Vec::new()),
                unavailable: true,
            }
        }

        pub fn rows(&self) -> Vec<LoggedPrediction> {
            self.rows.lock().unwrap().clone()
        }

        pub fn push(&self, entry: LoggedPrediction) {
            self.rows.lock().unwrap().push(entry);
        }
    }

    #[async_trait]
    impl TelemetryLog for MemoryTelemetryLog {
        async fn append(&self, entry: &LoggedPrediction) -> Result<(), TelemetryError> {
            if self.unavailable {
                return Err(TelemetryError::Unavailable("connection refused".into()));
            }
            self.push(entry.clone());
            Ok(())
        }

        async fn zone_activity(&self, hours: u32) -> Result<Vec<ZoneSummary>, TelemetryError> {
            if self.unavailable {
                return Err(TelemetryError::Unavailable("connection refused".into()));
            }
            let cutoff = Utc::now() - Duration::hours(i64::from(hours));

            let mut groups: BTreeMap<String, (i64, i64, f64)> = BTreeMap::new();
            for row in self.rows().iter().filter(|r| r.timestamp >= cutoff) {
                let g = groups.entry(row.reading.zone.clone()).or_default();
                g.0 += 1;
                g.1 += i64::from(row.result.leakage_flag);
                g.2 += row.result.leakage_prob;
            }

            Ok(groups
                .into_iter()
                .map(|(zone, (total, leaks, prob_sum))| ZoneSummary {
                    zone,
                    total_events: total,
                    leak_events: leaks,
                    avg_leakage_prob: prob_sum / total as f64,
                })
                .collect())
        }
    }

    /// A store that accepts the call and never answers.
    pub struct StalledTelemetryLog;

    #[async_trait]
    impl TelemetryLog for StalledTelemetryLog {
        async fn append(&self, _entry: &LoggedPrediction) -> Result<(), TelemetryError> {
            std::future::pending().await
        }

        async fn zone_activity(&self, _hours: u32) -> Result<Vec<ZoneSummary>, TelemetryError> {
            std::future::pending().await
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use chrono::{Duration, Utc};

    use super::testing::MemoryTelemetryLog;
    use super::*;
    use crate::{models::fixtures, PredictionResult};

    fn zone(name: &str, leak_events: i64, avg: f64) -> ZoneSummary {
        ZoneSummary {
            zone: name.to_string(),
            total_events: leak_events + 3,
            leak_events,
            avg_leakage_prob: avg,
        }
    }

    fn logged(zone: &str, p: f64, age_hours: i64) -> LoggedPrediction {
        let mut entry = LoggedPrediction::new(
            fixtures::reading_in_zone(zone),
            PredictionResult::from_probability(p),
        );
        entry.timestamp = Utc::now() - Duration::hours(age_hours);
        entry
    }

    #[test]
    fn test_rank_breaks_leak_ties_on_probability() {
        // ---
        let ranked = rank_zones(vec![zone("A", 5, 0.6), zone("B", 5, 0.8)]);
        assert_eq!(ranked[0].zone, "B");
        assert_eq!(ranked[1].zone, "A");
    }

    #[test]
    fn test_rank_orders_by_leak_events_first() {
        // ---
        let ranked = rank_zones(vec![zone("A", 1, 0.99), zone("B", 7, 0.51), zone("C", 3, 0.7)]);
        let order: Vec<_> = ranked.iter().map(|z| z.zone.as_str()).collect();
        assert_eq!(order, vec!["B", "C", "A"]);
    }

    #[test]
    fn test_rank_caps_result() {
        // ---
        let zones = (0..25).map(|i| zone(&format!("Zone_{i}"), i, 0.5)).collect();
        let ranked = rank_zones(zones);
        assert_eq!(ranked.len(), TOP_ZONES_LIMIT);
        assert_eq!(ranked[0].zone, "Zone_24");
    }

    #[test]
    fn test_summary_respects_window() {
        // ---
        let log = MemoryTelemetryLog::new();
        log.push(logged("Zone_1", 0.9, 1));
        log.push(logged("Zone_1", 0.2, 2));
        log.push(logged("Zone_2", 0.7, 3));
        log.push(logged("Zone_3", 0.95, 72));

        let summary = tokio_test::block_on(summarize_recent_leakage(&log, 24)).unwrap();

        assert_eq!(summary.hours, 24);
        assert_eq!(summary.top_zones.len(), 2);
        assert_eq!(summary.top_zones[0].zone, "Zone_2");
        assert_eq!(summary.top_zones[0].leak_events, 1);
        assert_eq!(summary.top_zones[1].zone, "Zone_1");
        assert_eq!(summary.top_zones[1].total_events, 2);
        assert!((summary.top_zones[1].avg_leakage_prob - 0.55).abs() < 1e-9);
    }

    #[test]
    fn test_summary_of_empty_log() {
        // ---
        let log = MemoryTelemetryLog::new();
        let summary = tokio_test::block_on(summarize_recent_leakage(&log, 24)).unwrap();
        assert!(summary.top_zones.is_empty());
    }
}
