//! Classifier output types.

use serde::{Deserialize, Serialize};

/// Normal / anomalous verdict for one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    Normal,
    Anomalous,
}

impl Label {
    pub fn is_anomalous(self) -> bool {
        matches!(self, Label::Anomalous)
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Label::Normal => write!(f, "NORMAL"),
            Label::Anomalous => write!(f, "ANOMALOUS"),
        }
    }
}

/// Label plus continuous score.
///
/// Scores are only comparable between calls to the same classifier
/// instance; no `[0, 1]` range is implied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub label: Label,
    pub score: f64,
}

impl ClassificationResult {
    pub fn new(label: Label, score: f64) -> Self {
        Self { label, score }
    }

    /// Result substituted when the classifier faults.
    pub fn fallback(label: Label) -> Self {
        Self { label, score: 0.0 }
    }

    pub fn is_anomalous(&self) -> bool {
        self.label.is_anomalous()
    }
}
