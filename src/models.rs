//! Data models for the leak-risk service.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::PredictError;

// ---

/// Probability at or above which a reading is flagged as a leak.
pub const LEAK_THRESHOLD: f64 = 0.5;

/// Numeric feature names in model order.
pub const NUMERIC_FEATURES: [&str; 8] = [
    "Pressure",
    "Flow_Rate",
    "Temperature",
    "Vibration",
    "RPM",
    "Operational_Hours",
    "Latitude",
    "Longitude",
];

/// Categorical feature names in model order.
pub const CATEGORICAL_FEATURES: [&str; 4] = ["Zone", "Block", "Pipe", "Location_Code"];

/// One sensor reading submitted for inference.
///
/// Wire names follow the dashboard form (`Pressure`, `Flow_Rate`, ...). The
/// snake_case aliases let tool arguments proposed by the language model
/// deserialize into the same type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    // ---
    #[serde(rename = "Pressure", alias = "pressure")]
    pub pressure: f64,
    #[serde(rename = "Flow_Rate", alias = "flow_rate")]
    pub flow_rate: f64,
    #[serde(rename = "Temperature", alias = "temperature")]
    pub temperature: f64,
    #[serde(rename = "Vibration", alias = "vibration")]
    pub vibration: f64,
    #[serde(rename = "RPM", alias = "rpm")]
    pub rpm: f64,
    #[serde(rename = "Operational_Hours", alias = "operational_hours")]
    pub operational_hours: f64,
    #[serde(rename = "Latitude", alias = "latitude")]
    pub latitude: f64,
    #[serde(rename = "Longitude", alias = "longitude")]
    pub longitude: f64,
    #[serde(rename = "Zone", alias = "zone")]
    pub zone: String,
    #[serde(rename = "Block", alias = "block")]
    pub block: String,
    #[serde(rename = "Pipe", alias = "pipe")]
    pub pipe: String,
    #[serde(rename = "Location_Code", alias = "location_code")]
    pub location_code: String,
}

impl SensorReading {
    // ---
    /// Numeric features in model order, keyed by wire name.
    pub fn numeric_features(&self) -> [(&'static str, f64); 8] {
        let [pressure, flow_rate, temperature, vibration, rpm, hours, latitude, longitude] =
            NUMERIC_FEATURES;
        [
            (pressure, self.pressure),
            (flow_rate, self.flow_rate),
            (temperature, self.temperature),
            (vibration, self.vibration),
            (rpm, self.rpm),
            (hours, self.operational_hours),
            (latitude, self.latitude),
            (longitude, self.longitude),
        ]
    }

    /// Categorical features in model order, keyed by wire name.
    pub fn categorical_features(&self) -> [(&'static str, &str); 4] {
        let [zone, block, pipe, location_code] = CATEGORICAL_FEATURES;
        [
            (zone, self.zone.as_str()),
            (block, self.block.as_str()),
            (pipe, self.pipe.as_str()),
            (location_code, self.location_code.as_str()),
        ]
    }

    /// Reject readings the classifier must never see.
    pub fn validate(&self) -> Result<(), PredictError> {
        // ---
        for (name, value) in self.numeric_features() {
            if !value.is_finite() {
                return Err(PredictError::validation(format!(
                    "{name} must be a finite number"
                )));
            }
        }
        for (name, value) in self.categorical_features() {
            if value.trim().is_empty() {
                return Err(PredictError::validation(format!("{name} must not be empty")));
            }
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(PredictError::validation("Latitude must be within [-90, 90]"));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(PredictError::validation(
                "Longitude must be within [-180, 180]",
            ));
        }
        Ok(())
    }
}

/// Discretized leak-probability bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Bucket a probability using half-open intervals
    /// `[0,0.25) [0.25,0.5) [0.5,0.75) [0.75,1]`.
    pub fn from_probability(p: f64) -> Self {
        // ---
        if p < 0.25 {
            RiskLevel::Low
        } else if p < 0.5 {
            RiskLevel::Medium
        } else if p < 0.75 {
            RiskLevel::High
        } else {
            RiskLevel::Critical
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of scoring one reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    // ---
    pub leakage_flag: u8,
    pub leakage_prob: f64,
    pub risk_level: RiskLevel,
}

impl PredictionResult {
    /// Derive flag and tier from a probability in `[0, 1]`.
    pub fn from_probability(p: f64) -> Self {
        PredictionResult {
            leakage_flag: u8::from(p >= LEAK_THRESHOLD),
            leakage_prob: p,
            risk_level: RiskLevel::from_probability(p),
        }
    }
}

/// Row appended to the telemetry log for every prediction.
#[derive(Debug, Clone, Serialize)]
pub struct LoggedPrediction {
    // ---
    #[serde(flatten)]
    pub reading: SensorReading,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub result: PredictionResult,
    pub request_id: Uuid,
}

impl LoggedPrediction {
    /// Stamp a prediction with the current UTC time and a fresh request id.
    pub fn new(reading: SensorReading, result: PredictionResult) -> Self {
        LoggedPrediction {
            reading,
            timestamp: Utc::now(),
            result,
            request_id: Uuid::new_v4(),
        }
    }
}

/// Per-zone aggregate over a trailing window of the telemetry log.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct ZoneSummary {
    // ---
    pub zone: String,
    pub total_events: i64,
    pub leak_events: i64,
    pub avg_leakage_prob: f64,
}

/// Result of the `summarize_recent_leakage` tool.
#[derive(Debug, Clone, Serialize)]
pub struct LeakageSummary {
    pub hours: u32,
    pub top_zones: Vec<ZoneSummary>,
}
