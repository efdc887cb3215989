//! Mitigation triggered on anomalous classifications
//!
//! A [`MitigationTrigger`] is shared across tasks behind an `Arc` and must be
//! safe to call concurrently. Its outcome is reported, never fed back into
//! classification.

pub mod process;

use serde::Serialize;
use thiserror::Error;

use crate::types::FeatureObservation;

pub use process::ProcessMitigator;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MitigationOutcome {
    /// The offending process was terminated.
    Terminated { pid: u32, name: String },
    /// Dry-run: the process would have been terminated.
    WouldTerminate { pid: u32, name: String },
    /// A target was identified but deliberately left alone.
    Skipped { reason: String },
    /// The observation names nothing actionable.
    NoAction,
}

impl MitigationOutcome {
    /// True if something was (or would have been) acted on.
    pub fn is_applied(&self) -> bool {
        matches!(
            self,
            MitigationOutcome::Terminated { .. } | MitigationOutcome::WouldTerminate { .. }
        )
    }
}

impl std::fmt::Display for MitigationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MitigationOutcome::Terminated { pid, name } => {
                write!(f, "terminated {} (pid {})", name, pid)
            }
            MitigationOutcome::WouldTerminate { pid, name } => {
                write!(f, "would terminate {} (pid {}) [dry-run]", name, pid)
            }
            MitigationOutcome::Skipped { reason } => write!(f, "skipped: {}", reason),
            MitigationOutcome::NoAction => write!(f, "no action"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MitigationFault {
    #[error("{0}")]
    Failed(String),

    #[error("mitigation panicked: {0}")]
    Panicked(String),
}

pub trait MitigationTrigger: Send + Sync + 'static {
    fn apply(&self, observation: &FeatureObservation) -> Result<MitigationOutcome, MitigationFault>;
}

/// Does nothing; for pipelines that only observe.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMitigator;

impl MitigationTrigger for NoopMitigator {
    fn apply(&self, _: &FeatureObservation) -> Result<MitigationOutcome, MitigationFault> {
        Ok(MitigationOutcome::NoAction)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_display_and_applied() {
        let would = MitigationOutcome::WouldTerminate { pid: 7, name: "miner".to_string() };
        assert!(would.is_applied());
        assert_eq!(would.to_string(), "would terminate miner (pid 7) [dry-run]");
        assert!(!MitigationOutcome::NoAction.is_applied());
    }

    #[test]
    fn test_outcome_serializes_tagged() {
        let json = serde_json::to_value(MitigationOutcome::Skipped { reason: "protected".to_string() }).unwrap();
        assert_eq!(json["outcome"], "skipped");
        assert_eq!(json["reason"], "protected");
    }
}
