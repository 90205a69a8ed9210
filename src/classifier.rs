//! Risk classifier adapter.
//!
//! The trained model is treated as an opaque scoring function behind the
//! [`LeakClassifier`] trait. The production implementation loads a one-hot
//! logistic model exported to JSON: standardized numeric coefficients plus a
//! weight table for every categorical feature. The adapter owns the feature
//! encoding; callers only ever hand it a [`SensorReading`].

use std::{collections::HashMap, fs, path::Path};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::{
    models::{CATEGORICAL_FEATURES, NUMERIC_FEATURES},
    ClassifierError, SensorReading,
};

// ---

/// Maps a sensor reading to a leak probability in `[0, 1]`.
pub trait LeakClassifier: Send + Sync {
    fn score(&self, reading: &SensorReading) -> Result<f64, ClassifierError>;
}

#[derive(Debug, Deserialize)]
struct NumericCoefficient {
    feature: String,
    mean: f64,
    scale: f64,
    weight: f64,
}

#[derive(Debug, Deserialize)]
struct CategoricalWeights {
    feature: String,
    weights: HashMap<String, f64>,
}

/// On-disk layout of the exported model.
#[derive(Debug, Deserialize)]
struct ModelArtifact {
    intercept: f64,
    numeric: Vec<NumericCoefficient>,
    categorical: Vec<CategoricalWeights>,
}

/// Standardized term for one numeric feature.
#[derive(Debug, Clone, Copy)]
struct Standardized {
    mean: f64,
    scale: f64,
    weight: f64,
}

/// One-hot logistic regression classifier.
#[derive(Debug)]
pub struct LogisticClassifier {
    intercept: f64,
    numeric: HashMap<String, Standardized>,
    categorical: HashMap<String, HashMap<String, f64>>,
}

impl LogisticClassifier {
    /// Load and validate a model artifact from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        // ---
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read model artifact '{}'", path.display()))?;
        let classifier = Self::from_json(&raw)
            .with_context(|| format!("Invalid model artifact '{}'", path.display()))?;

        tracing::info!(
            "Loaded classifier from {} ({} numeric, {} categorical features)",
            path.display(),
            classifier.numeric.len(),
            classifier.categorical.len()
        );
        Ok(classifier)
    }

    /// Parse an artifact and check it covers every feature of a reading.
    pub fn from_json(raw: &str) -> Result<Self> {
        // ---
        let artifact: ModelArtifact = serde_json::from_str(raw)?;

        if !artifact.intercept.is_finite() {
            return Err(anyhow!("intercept must be finite"));
        }

        let mut numeric = HashMap::new();
        for c in artifact.numeric {
            if !(c.scale.is_finite() && c.scale > 0.0) {
                return Err(anyhow!("feature {} has invalid scale {}", c.feature, c.scale));
            }
            if !(c.mean.is_finite() && c.weight.is_finite()) {
                return Err(anyhow!("feature {} has non-finite coefficients", c.feature));
            }
            numeric.insert(
                c.feature,
                Standardized {
                    mean: c.mean,
                    scale: c.scale,
                    weight: c.weight,
                },
            );
        }

        let categorical: HashMap<_, _> = artifact
            .categorical
            .into_iter()
            .map(|c| (c.feature, c.weights))
            .collect();

        for name in NUMERIC_FEATURES {
            if !numeric.contains_key(name) {
                return Err(anyhow!("missing numeric feature {}", name));
            }
        }
        for name in CATEGORICAL_FEATURES {
            if !categorical.contains_key(name) {
                return Err(anyhow!("missing categorical feature {}", name));
            }
        }

        Ok(LogisticClassifier {
            intercept: artifact.intercept,
            numeric,
            categorical,
        })
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl LeakClassifier for LogisticClassifier {
    fn score(&self, reading: &SensorReading) -> Result<f64, ClassifierError> {
        // ---
        let mut z = self.intercept;

        for (name, value) in reading.numeric_features() {
            // Presence is checked at load time.
            if let Some(term) = self.numeric.get(name) {
                z += term.weight * (value - term.mean) / term.scale;
            }
        }

        for (name, value) in reading.categorical_features() {
            let weight = self
                .categorical
                .get(name)
                .and_then(|vocab| vocab.get(value))
                .ok_or_else(|| ClassifierError::UnseenCategory {
                    feature: name,
                    value: value.to_string(),
                })?;
            z += weight;
        }

        let p = sigmoid(z);
        if p.is_finite() && (0.0..=1.0).contains(&p) {
            Ok(p)
        } else {
            Err(ClassifierError::InvalidProbability(p))
        }
    }
}
