//! Monitoring Pipeline Module
//!
//! ```text
//! ProcessSensor ─┐
//! NetworkSensor ─┼─> FeatureQueue ─> consumer ─> Classifier ─(anomalous)─> MitigationTrigger
//!   (supervised) ┘                      │
//!                                       └──> AlertLog (alerts + errors, append-only)
//! ```
//!
//! One orchestrator owns one pipeline. A failing sensor, classifier call or
//! mitigation becomes an `Error` entry in the log; only `stop()` ends a run.

mod consumer;
mod error;
mod log;
mod orchestrator;
mod queue;
mod signal;
pub mod state;
mod supervisor;

pub use error::StartupError;
pub use log::AlertLog;
pub use orchestrator::PipelineOrchestrator;
pub use queue::{FeatureQueue, OverflowPolicy, PushOutcome, QueueError, QueueStats};
pub use signal::CancellationSignal;
pub use state::{PipelineReport, PipelineState, PipelineStats};
