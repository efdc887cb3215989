//! Online baseline classifier.
//!
//! Keeps a running mean/variance (Welford) per `source:feature`. Once a
//! feature has `warmup` samples, an observation whose z-score on that feature
//! reaches `sigma` is anomalous. Only normal observations are learned, so an
//! attack in progress does not drag the baseline towards itself.

use serde_json::json;
use std::collections::HashMap;

use super::{ClassificationFault, Classifier};
use crate::config::defaults::BASELINE_MIN_STD;
use crate::types::{FeatureObservation, Label};

/// Identifiers, not measurements.
const SKIPPED_FEATURES: &[&str] = &["pid"];

#[derive(Debug, Clone, Copy, Default)]
struct Welford {
    count: u64,
    mean: f64,
    m2: f64,
}

impl Welford {
    fn update(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    fn std(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        (self.m2 / (self.count - 1) as f64).sqrt()
    }
}

#[derive(Debug, Clone)]
pub struct BaselineClassifier {
    sigma: f64,
    warmup: u64,
    stats: HashMap<String, Welford>,
    /// Last predicted observation and its score, so `score()` agrees with
    /// the `predict()` that just learned from it.
    last: Option<(FeatureObservation, f64)>,
    last_peak: Option<(String, f64)>,
    learned: u64,
    flagged: u64,
}

impl BaselineClassifier {
    pub fn new(sigma: f64, warmup_samples: usize) -> Self {
        Self {
            sigma: if sigma > 0.0 { sigma } else { 3.0 },
            warmup: warmup_samples.max(2) as u64,
            stats: HashMap::new(),
            last: None,
            last_peak: None,
            learned: 0,
            flagged: 0,
        }
    }

    fn key(source: &str, feature: &str) -> String {
        format!("{}:{}", source, feature)
    }

    fn tracked(observation: &FeatureObservation) -> impl Iterator<Item = (&str, f64)> {
        observation
            .numeric_features()
            .filter(|(name, _)| !SKIPPED_FEATURES.contains(name))
    }

    /// Max |z| over warmed-up features, with the feature that produced it.
    fn peak(&self, observation: &FeatureObservation) -> Result<(f64, Option<String>), String> {
        let mut peak = 0.0_f64;
        let mut feature = None;

        for (name, value) in Self::tracked(observation) {
            if !value.is_finite() {
                return Err(format!("feature {} is not finite", name));
            }
            let Some(stat) = self.stats.get(&Self::key(observation.source(), name)) else {
                continue;
            };
            let std = stat.std();
            if stat.count < self.warmup || std < BASELINE_MIN_STD {
                continue;
            }
            let z = ((value - stat.mean) / std).abs();
            if z > peak {
                peak = z;
                feature = Some(name.to_string());
            }
        }

        Ok((peak, feature))
    }

    fn learn(&mut self, observation: &FeatureObservation) {
        let source = observation.source().to_string();
        for (name, value) in Self::tracked(observation) {
            self.stats
                .entry(Self::key(&source, name))
                .or_default()
                .update(value);
        }
        self.learned += 1;
    }
}

impl Classifier for BaselineClassifier {
    fn name(&self) -> &str {
        "baseline"
    }

    fn predict(&mut self, observation: &FeatureObservation) -> Result<Label, ClassificationFault> {
        let (peak, feature) = self.peak(observation).map_err(ClassificationFault::Predict)?;

        let label = if peak >= self.sigma {
            self.flagged += 1;
            Label::Anomalous
        } else {
            self.learn(observation);
            Label::Normal
        };

        self.last_peak = feature.map(|f| (f, peak));
        self.last = Some((observation.clone(), peak));
        Ok(label)
    }

    fn score(&mut self, observation: &FeatureObservation) -> Result<f64, ClassificationFault> {
        if let Some((last, peak)) = &self.last {
            if last == observation {
                return Ok(*peak);
            }
        }
        self.peak(observation)
            .map(|(peak, _)| peak)
            .map_err(ClassificationFault::Score)
    }

    fn artifact(&self) -> Option<serde_json::Value> {
        if self.learned == 0 && self.flagged == 0 {
            return None;
        }
        let mut features: Vec<_> = self
            .stats
            .iter()
            .map(|(key, s)| {
                json!({
                    "feature": key,
                    "samples": s.count,
                    "mean": s.mean,
                    "std": s.std(),
                    "warmed_up": s.count >= self.warmup,
                })
            })
            .collect();
        features.sort_by(|a, b| a["feature"].as_str().cmp(&b["feature"].as_str()));

        Some(json!({
            "classifier": "baseline",
            "sigma": self.sigma,
            "learned": self.learned,
            "flagged": self.flagged,
            "last_peak": self.last_peak.as_ref().map(|(f, z)| json!({ "feature": f, "z": z })),
            "features": features,
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn cpu(value: f64) -> FeatureObservation {
        FeatureObservation::new("process").with("cpu", value).with("pid", 4242)
    }

    fn warmed() -> BaselineClassifier {
        let mut clf = BaselineClassifier::new(3.0, 10);
        for i in 0..20 {
            let value = 10.0 + f64::from(i % 5);
            assert_eq!(clf.predict(&cpu(value)).unwrap(), Label::Normal);
        }
        clf
    }

    #[test]
    fn test_nothing_flagged_during_warmup() {
        let mut clf = BaselineClassifier::new(3.0, 10);
        clf.predict(&cpu(10.0)).unwrap();
        clf.predict(&cpu(11.0)).unwrap();
        assert_eq!(clf.predict(&cpu(10_000.0)).unwrap(), Label::Normal);
        assert_eq!(clf.score(&cpu(10_000.0)).unwrap(), 0.0);
    }

    #[test]
    fn test_outlier_flagged_after_warmup() {
        let mut clf = warmed();
        let spike = cpu(95.0);
        assert_eq!(clf.predict(&spike).unwrap(), Label::Anomalous);
        assert!(clf.score(&spike).unwrap() >= 3.0);
        assert_eq!(clf.predict(&cpu(12.0)).unwrap(), Label::Normal);
    }

    #[test]
    fn test_anomalies_not_learned() {
        let mut clf = warmed();
        let before = clf.stats["process:cpu"].count;
        clf.predict(&cpu(500.0)).unwrap();
        assert_eq!(clf.stats["process:cpu"].count, before);
    }

    #[test]
    fn test_pid_never_tracked() {
        let clf = warmed();
        assert!(!clf.stats.contains_key("process:pid"));
    }

    #[test]
    fn test_score_matches_preceding_predict() {
        let mut clf = warmed();
        let obs = cpu(13.0);
        clf.predict(&obs).unwrap();
        let cached = clf.score(&obs).unwrap();
        assert!(cached < 3.0);
    }

    #[test]
    fn test_artifact_reports_features() {
        let mut clf = warmed();
        clf.predict(&cpu(95.0)).unwrap();
        let artifact = clf.artifact().unwrap();
        assert_eq!(artifact["classifier"], "baseline");
        assert_eq!(artifact["flagged"], 1);
        assert_eq!(artifact["last_peak"]["feature"], "cpu");
        assert_eq!(artifact["features"][0]["feature"], "process:cpu");
    }
}
