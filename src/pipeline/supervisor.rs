//! Per-task failure isolation.
//!
//! Each sensor runs in its own task, awaited by a supervisor task. A fatal
//! fault or a panic in the sensor becomes one `Error` log entry; nothing
//! propagates to the other tasks.

use std::any::Any;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::log::AlertLog;
use super::state::PipelineCounters;
use crate::acquisition::{run_sensor, Sensor, SensorContext};

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Spawn `sensor` plus a supervisor awaiting it. The returned handle is the
/// supervisor's; it always completes normally.
pub(crate) fn spawn_supervised(
    sensor: Box<dyn Sensor>,
    ctx: SensorContext,
    counters: Arc<PipelineCounters>,
) -> JoinHandle<()> {
    let name = sensor.name().to_string();
    let log = Arc::clone(&ctx.log);
    let worker = tokio::spawn(run_sensor(sensor, ctx.with_counters(Arc::clone(&counters))));

    tokio::spawn(async move {
        let reason = match worker.await {
            Ok(Ok(())) => {
                info!(sensor = %name, "[Supervisor] Sensor exited cleanly");
                return;
            }
            Ok(Err(fault)) => fault.to_string(),
            Err(join_err) if join_err.is_panic() => {
                format!("panicked: {}", panic_message(&*join_err.into_panic()))
            }
            Err(join_err) => format!("task aborted: {}", join_err),
        };

        PipelineCounters::bump(&counters.sensors_crashed);
        error!(sensor = %name, "[Supervisor] Sensor task ended abnormally, not restarting");
        log.record_error(format!("Sensor {} crashed: {}", name, reason));
    })
}

/// Await the consumer task. It only ends abnormally on a panic outside the
/// per-observation guards; that is logged once and the run keeps its state
/// until `stop()`.
pub(crate) fn supervise_consumer(worker: JoinHandle<()>, log: Arc<AlertLog>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(join_err) = worker.await {
            let reason = if join_err.is_panic() {
                format!("panicked: {}", panic_message(&*join_err.into_panic()))
            } else {
                format!("task aborted: {}", join_err)
            };
            error!("[Supervisor] Consumer task ended abnormally");
            log.record_error(format!("Consumer crashed: {}", reason));
        }
    })
}
