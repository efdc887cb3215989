use thiserror::Error;

use super::state::PipelineState;

/// Why `start()` refused to start a run. Nothing is spawned in any case.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StartupError {
    #[error("pipeline is already {0}")]
    AlreadyRunning(PipelineState),

    #[error("no tokio runtime available to spawn pipeline tasks")]
    NoRuntime,

    #[error("sensor factory produced no sensors")]
    NoSensors,
}
