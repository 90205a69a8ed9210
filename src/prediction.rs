//! Prediction service: validate, score, log, respond.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::Deserialize;

use crate::{
    classifier::LeakClassifier, telemetry::TelemetryLog, ClassifierError, LoggedPrediction,
    PredictError, PredictionResult, SensorReading, TelemetryError,
};

// ---

/// Default upper bound on a telemetry write made on the request path.
pub const LOG_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Anything that can turn a reading into a prediction, local or remote.
#[async_trait]
pub trait RiskPredictor: Send + Sync {
    async fn predict(&self, reading: SensorReading) -> Result<PredictionResult, PredictError>;
}

/// In-process prediction service.
///
/// Stateless apart from its injected collaborators; safe to share across
/// concurrent requests behind an `Arc`.
pub struct PredictionService {
    classifier: Arc<dyn LeakClassifier>,
    log: Arc<dyn TelemetryLog>,
    log_timeout: Duration,
}

impl PredictionService {
    pub fn new(classifier: Arc<dyn LeakClassifier>, log: Arc<dyn TelemetryLog>) -> Self {
        PredictionService {
            classifier,
            log,
            log_timeout: LOG_WRITE_TIMEOUT,
        }
    }

    /// Override how long a prediction may wait on its telemetry write.
    pub fn with_log_timeout(mut self, log_timeout: Duration) -> Self {
        self.log_timeout = log_timeout;
        self
    }
}

#[async_trait]
impl RiskPredictor for PredictionService {
    async fn predict(&self, reading: SensorReading) -> Result<PredictionResult, PredictError> {
        // ---
        reading.validate()?;

        let p = self.classifier.score(&reading)?;
        if !(0.0..=1.0).contains(&p) {
            return Err(ClassifierError::InvalidProbability(p).into());
        }
        let result = PredictionResult::from_probability(p);

        let entry = LoggedPrediction::new(reading, result.clone());
        tracing::debug!(
            request_id = %entry.request_id,
            zone = %entry.reading.zone,
            risk_level = %result.risk_level,
            "Scored reading p={:.4}",
            p
        );

        // Best effort: the caller gets the prediction even when the log is
        // down or stalled.
        let write = tokio::time::timeout(self.log_timeout, self.log.append(&entry)).await;
        let failure = match write {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(_) => Some(TelemetryError::Timeout(self.log_timeout)),
        };
        if let Some(e) = failure {
            tracing::warn!(
                request_id = %entry.request_id,
                "Failed to append prediction to telemetry log: {}",
                e
            );
        }

        Ok(result)
    }
}

// ---

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    detail: String,
}

/// Calls a `/predict` endpoint deployed as a separate process.
pub struct RemotePredictor {
    client: reqwest::Client,
    predict_url: String,
}

impl RemotePredictor {
    /// `base_url` is the service root; `/predict` is appended.
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        // ---
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(RemotePredictor {
            client,
            predict_url: format!("{}/predict", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl RiskPredictor for RemotePredictor {
    async fn predict(&self, reading: SensorReading) -> Result<PredictionResult, PredictError> {
        // ---
        tracing::debug!("POST {}", self.predict_url);

        let response = self
            .client
            .post(&self.predict_url)
            .json(&reading)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PredictError::Remote(format!("request to {} timed out", self.predict_url))
                } else {
                    PredictError::Remote(format!("cannot reach {}: {}", self.predict_url, e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorDetail>(&body)
                .map(|d| d.detail)
                .unwrap_or(body);
            return Err(PredictError::Remote(format!(
                "HTTP {} - {}",
                status.as_u16(),
                detail
            )));
        }

        response
            .json::<PredictionResult>()
            .await
            .map_err(|e| PredictError::Remote(format!("invalid prediction response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::{
        classifier::testing::{FixedClassifier, RejectingClassifier},
        models::fixtures,
        telemetry::testing::{MemoryTelemetryLog, StalledTelemetryLog},
        RiskLevel,
    };

    fn service(p: f64, log: Arc<MemoryTelemetryLog>) -> PredictionService {
        PredictionService::new(Arc::new(FixedClassifier(p)), log)
    }

    #[tokio::test]
    async fn test_prediction_is_logged() {
        // ---
        let log = Arc::new(MemoryTelemetryLog::new());
        let result = service(0.8, log.clone())
            .predict(fixtures::reading())
            .await
            .unwrap();

        assert_eq!(result.leakage_flag, 1);
        assert_eq!(result.risk_level, RiskLevel::Critical);

        let rows = log.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].result, result);
        assert_eq!(rows[0].reading, fixtures::reading());
    }

    #[tokio::test]
    async fn test_log_failure_does_not_change_result() {
        // ---
        let healthy = service(0.42, Arc::new(MemoryTelemetryLog::new()));
        let broken = service(0.42, Arc::new(MemoryTelemetryLog::unavailable()));

        let a = healthy.predict(fixtures::reading()).await.unwrap();
        let b = broken.predict(fixtures::reading()).await.unwrap();

        assert_eq!(a, b);
        assert_eq!(b.leakage_flag, 0);
        assert_eq!(b.leakage_prob, 0.42);
        assert_eq!(b.risk_level, RiskLevel::Medium);
    }

    #[tokio::test]
    async fn test_stalled_log_does_not_hold_the_response() {
        // ---
        let svc = PredictionService::new(
            Arc::new(FixedClassifier(0.42)),
            Arc::new(StalledTelemetryLog),
        )
        .with_log_timeout(Duration::from_millis(50));

        let pending = svc.predict(fixtures::reading());
        let result = tokio::time::timeout(Duration::from_secs(2), pending)
            .await
            .expect("predict must not wait on a stalled log")
            .unwrap();

        assert_eq!(result, PredictionResult::from_probability(0.42));
        assert_eq!(result.risk_level, RiskLevel::Medium);
    }

    #[tokio::test]
    async fn test_repeat_prediction_is_identical_but_logged_twice() {
        // ---
        let log = Arc::new(MemoryTelemetryLog::new());
        let svc = service(0.61, log.clone());

        let first = svc.predict(fixtures::reading()).await.unwrap();
        let second = svc.predict(fixtures::reading()).await.unwrap();
        assert_eq!(first, second);

        let rows = log.rows();
        assert_eq!(rows.len(), 2);
        assert_ne!(rows[0].request_id, rows[1].request_id);
    }

    #[tokio::test]
    async fn test_invalid_reading_never_reaches_classifier_or_log() {
        // ---
        let log = Arc::new(MemoryTelemetryLog::new());
        let svc = PredictionService::new(Arc::new(RejectingClassifier), log.clone());

        let reading = SensorReading {
            flow_rate: f64::INFINITY,
            ..fixtures::reading()
        };
        let err = svc.predict(reading).await.unwrap_err();

        assert!(matches!(err, PredictError::Validation(_)));
        assert!(log.rows().is_empty());
    }

    #[tokio::test]
    async fn test_scoring_failure_is_surfaced() {
        // ---
        let log = Arc::new(MemoryTelemetryLog::new());
        let svc = PredictionService::new(Arc::new(RejectingClassifier), log.clone());

        let err = svc
            .predict(fixtures::reading_in_zone("Zone_404"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PredictError::Scoring(ClassifierError::UnseenCategory { .. })
        ));
        assert!(log.rows().is_empty());
    }

    #[tokio::test]
    async fn test_out_of_range_probability_is_a_scoring_error() {
        // ---
        let svc = service(1.7, Arc::new(MemoryTelemetryLog::new()));
        let err = svc.predict(fixtures::reading()).await.unwrap_err();
        assert!(matches!(
            err,
            PredictError::Scoring(ClassifierError::InvalidProbability(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_remote_predictor() {
        // ---
        // Port 9 (discard) is closed on loopback in test environments.
        let remote = RemotePredictor::new("http://127.0.0.1:9/", Duration::from_secs(2)).unwrap();
        assert_eq!(remote.predict_url, "http://127.0.0.1:9/predict");

        let err = remote.predict(fixtures::reading()).await.unwrap_err();
        assert!(matches!(err, PredictError::Remote(_)));
    }
}
