//! threatwatch: real-time host threat monitoring
//!
//! Independent sensors sample the host, one consumer classifies every
//! observation and triggers mitigation on anomalies, and an orchestrator
//! keeps the whole thing running when any single piece fails.
//!
//! ## Architecture
//!
//! - **Acquisition**: `Sensor` implementations (process table, network
//!   interfaces, scripted replay) driven by a shared cancellable loop
//! - **Pipeline**: feature queue, cancellation signal, consumer, per-task
//!   supervision and the append-only alert log
//! - **Detection**: threshold and online-baseline classifiers
//! - **Mitigation**: process termination, dry-run by default

pub mod acquisition;
pub mod config;
pub mod detection;
pub mod mitigation;
pub mod pipeline;
pub mod types;

// Re-export configuration
pub use config::{ConfigError, SentinelConfig};

// Re-export commonly used types
pub use types::{ClassificationResult, FeatureObservation, FeatureValue, Label, LogEntry, LogKind};

// Re-export the pipeline surface
pub use pipeline::{
    AlertLog, CancellationSignal, FeatureQueue, OverflowPolicy, PipelineOrchestrator,
    PipelineReport, PipelineState, PipelineStats, StartupError,
};

// Re-export collaborator traits
pub use acquisition::{Sensor, SensorFactory, SensorFault};
pub use detection::{ClassificationFault, Classifier};
pub use mitigation::{MitigationFault, MitigationOutcome, MitigationTrigger};
