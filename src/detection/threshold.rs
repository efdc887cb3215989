//! Fixed-limit classifier.
//!
//! `Anomalous` as soon as any limited feature is strictly above its limit.
//! The score is the largest `value / limit` ratio over the limited features
//! present, so anything at or above 1.0 has breached.

use serde_json::json;
use std::collections::BTreeMap;

use super::indicators::Indicator;
use super::{ClassificationFault, Classifier};
use crate::types::{FeatureObservation, Label};

#[derive(Debug, Clone)]
pub struct ThresholdClassifier {
    limits: BTreeMap<String, f64>,
    last_indicators: Vec<Indicator>,
    evaluated: u64,
}

impl ThresholdClassifier {
    /// Non-positive limits are ignored.
    pub fn new(limits: BTreeMap<String, f64>) -> Self {
        let limits = limits.into_iter().filter(|(_, l)| *l > 0.0).collect();
        Self {
            limits,
            last_indicators: Vec::new(),
            evaluated: 0,
        }
    }

    pub fn limits(&self) -> &BTreeMap<String, f64> {
        &self.limits
    }

    /// Highest ratio plus every breached indicator.
    fn evaluate(&self, observation: &FeatureObservation) -> (f64, Vec<Indicator>) {
        let mut max_ratio = 0.0_f64;
        let mut breached = Vec::new();

        for (feature, limit) in &self.limits {
            let Some(value) = observation.get(feature).and_then(|v| v.as_f64()) else {
                continue;
            };
            let indicator = Indicator::new(feature, value, *limit);
            max_ratio = max_ratio.max(indicator.ratio);
            if value > *limit {
                breached.push(indicator);
            }
        }

        (max_ratio, breached)
    }

    fn check(observation: &FeatureObservation) -> Result<(), String> {
        if observation.is_empty() {
            return Err(format!("{} observation has no features", observation.source()));
        }
        if let Some((name, _)) = observation.numeric_features().find(|(_, v)| !v.is_finite()) {
            return Err(format!("feature {} is not finite", name));
        }
        Ok(())
    }
}

impl Classifier for ThresholdClassifier {
    fn name(&self) -> &str {
        "threshold"
    }

    fn predict(&mut self, observation: &FeatureObservation) -> Result<Label, ClassificationFault> {
        Self::check(observation).map_err(ClassificationFault::Predict)?;
        let (_, breached) = self.evaluate(observation);
        self.evaluated += 1;

        let label = if breached.is_empty() {
            Label::Normal
        } else {
            Label::Anomalous
        };
        self.last_indicators = breached;
        Ok(label)
    }

    fn score(&mut self, observation: &FeatureObservation) -> Result<f64, ClassificationFault> {
        Self::check(observation).map_err(ClassificationFault::Score)?;
        Ok(self.evaluate(observation).0)
    }

    fn artifact(&self) -> Option<serde_json::Value> {
        if self.evaluated == 0 {
            return None;
        }
        Some(json!({
            "classifier": "threshold",
            "evaluated": self.evaluated,
            "limits": self.limits,
            "indicators": self.last_indicators,
        }))
    }
}
