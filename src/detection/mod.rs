//! Anomaly classification
//!
//! A [`Classifier`] labels each observation `Normal` or `Anomalous` and gives
//! it a continuous score. Classifiers are stateful and owned by exactly one
//! consumer at a time, so methods take `&mut self`. They never do I/O.

pub mod baseline;
pub mod indicators;
pub mod threshold;

use thiserror::Error;

use crate::config::{ClassifierConfig, ClassifierKind};
use crate::types::{ClassificationResult, FeatureObservation, Label};

pub use baseline::BaselineClassifier;
pub use indicators::{technique_for, Indicator, Technique};
pub use threshold::ThresholdClassifier;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClassificationFault {
    #[error("predict failed: {0}")]
    Predict(String),

    #[error("score failed: {0}")]
    Score(String),

    #[error("classifier panicked: {0}")]
    Panicked(String),
}

pub trait Classifier: Send + 'static {
    fn name(&self) -> &str {
        "classifier"
    }

    fn predict(&mut self, observation: &FeatureObservation) -> Result<Label, ClassificationFault>;

    /// Continuous score, only comparable across calls on the same instance.
    fn score(&mut self, observation: &FeatureObservation) -> Result<f64, ClassificationFault>;

    /// Opaque model output for the presentation layer.
    fn artifact(&self) -> Option<serde_json::Value> {
        None
    }

    /// `predict` then `score`.
    fn classify(
        &mut self,
        observation: &FeatureObservation,
    ) -> Result<ClassificationResult, ClassificationFault> {
        let label = self.predict(observation)?;
        let score = self.score(observation)?;
        Ok(ClassificationResult::new(label, score))
    }
}

/// Build the configured classifier.
pub fn build_classifier(config: &ClassifierConfig) -> Box<dyn Classifier> {
    match config.kind {
        ClassifierKind::Threshold => Box::new(ThresholdClassifier::new(config.limits.clone())),
        ClassifierKind::Baseline => {
            Box::new(BaselineClassifier::new(config.sigma, config.warmup_samples))
        }
    }
}
