//! Feature observations: the unit of work flowing through the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single named attribute value.
///
/// Serialized untagged so an observation renders as a plain JSON object
/// (`{"cpu": 95.0, "name": "evil.exe"}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Flag(bool),
    Number(f64),
    Text(String),
}

impl FeatureValue {
    /// Numeric view of the value. Flags map to 0.0 / 1.0, text has none.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FeatureValue::Number(v) => Some(*v),
            FeatureValue::Flag(b) => Some(if *b { 1.0 } else { 0.0 }),
            FeatureValue::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FeatureValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<f64> for FeatureValue {
    fn from(v: f64) -> Self {
        FeatureValue::Number(v)
    }
}

impl From<f32> for FeatureValue {
    fn from(v: f32) -> Self {
        FeatureValue::Number(f64::from(v))
    }
}

impl From<u32> for FeatureValue {
    fn from(v: u32) -> Self {
        FeatureValue::Number(f64::from(v))
    }
}

impl From<u64> for FeatureValue {
    fn from(v: u64) -> Self {
        FeatureValue::Number(v as f64)
    }
}

impl From<i32> for FeatureValue {
    fn from(v: i32) -> Self {
        FeatureValue::Number(f64::from(v))
    }
}

impl From<bool> for FeatureValue {
    fn from(v: bool) -> Self {
        FeatureValue::Flag(v)
    }
}

impl From<&str> for FeatureValue {
    fn from(v: &str) -> Self {
        FeatureValue::Text(v.to_string())
    }
}

impl From<String> for FeatureValue {
    fn from(v: String) -> Self {
        FeatureValue::Text(v)
    }
}

impl std::fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeatureValue::Flag(b) => write!(f, "{}", b),
            FeatureValue::Number(v) => write!(f, "{}", v),
            FeatureValue::Text(s) => write!(f, "{:?}", s),
        }
    }
}

/// One sampled data point describing system or network state.
///
/// Built once by a sensor and never mutated afterwards: fields are private
/// and only exposed through accessors. Attribute order is stable (sorted by
/// name) so rendered alerts are deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureObservation {
    source: String,
    observed_at: DateTime<Utc>,
    features: BTreeMap<String, FeatureValue>,
}

impl FeatureObservation {
    /// Start an observation for `source`, stamped with the current time.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            observed_at: Utc::now(),
            features: BTreeMap::new(),
        }
    }

    /// Add (or replace) an attribute. Builder-style; consumes `self`.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FeatureValue>) -> Self {
        self.features.insert(name.into(), value.into());
        self
    }

    /// Override the observation timestamp (replayed data).
    pub fn observed_at(mut self, at: DateTime<Utc>) -> Self {
        self.observed_at = at;
        self
    }

    /// Name of the sensor that produced this observation.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.observed_at
    }

    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.features.get(name)
    }

    /// Numeric attribute lookup; `None` when missing or non-numeric.
    pub fn number(&self, name: &str) -> Option<f64> {
        self.features.get(name).and_then(FeatureValue::as_f64)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.features.get(name).and_then(FeatureValue::as_str)
    }

    pub fn features(&self) -> impl Iterator<Item = (&str, &FeatureValue)> {
        self.features.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Numeric attributes only, in name order.
    pub fn numeric_features(&self) -> impl Iterator<Item = (&str, f64)> {
        self.features
            .iter()
            .filter_map(|(k, v)| v.as_f64().map(|n| (k.as_str(), n)))
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

impl std::fmt::Display for FeatureObservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {{", self.source)?;
        for (i, (name, value)) in self.features.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", name, value)?;
        }
        write!(f, "}}")
    }
}
