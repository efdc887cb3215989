//! Alert log entries exposed to the presentation layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of event a log entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    /// One classified observation.
    Alert,
    /// One caught fault (sensor, classifier, mitigation).
    Error,
}

impl std::fmt::Display for LogKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogKind::Alert => write!(f, "ALERT"),
            LogKind::Error => write!(f, "ERROR"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub kind: LogKind,
    pub message: String,
}

impl LogEntry {
    pub fn alert(message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            kind: LogKind::Alert,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            kind: LogKind::Error,
            message: message.into(),
        }
    }

    pub fn is_alert(&self) -> bool {
        self.kind == LogKind::Alert
    }

    pub fn is_error(&self) -> bool {
        self.kind == LogKind::Error
    }
}

impl std::fmt::Display for LogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.kind,
            self.message
        )
    }
}
