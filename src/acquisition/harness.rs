//! Shared sensor loop.
//!
//! Drives one [`Sensor`] until the run's cancellation signal fires:
//! sample, push, sleep. Transient sample faults are logged and the loop
//! carries on; a fatal fault is returned to the supervisor, which ends the
//! task.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{Sensor, SensorFault};
use crate::pipeline::{AlertLog, CancellationSignal, FeatureQueue, PushOutcome, QueueError};
use crate::pipeline::state::PipelineCounters;

/// Handles a sensor task is spawned with.
#[derive(Clone)]
pub struct SensorContext {
    pub queue: Arc<FeatureQueue>,
    pub signal: CancellationSignal,
    pub log: Arc<AlertLog>,
    pub(crate) counters: Arc<PipelineCounters>,
}

impl SensorContext {
    pub fn new(queue: Arc<FeatureQueue>, signal: CancellationSignal, log: Arc<AlertLog>) -> Self {
        Self {
            queue,
            signal,
            log,
            counters: Arc::new(PipelineCounters::default()),
        }
    }

    pub(crate) fn with_counters(mut self, counters: Arc<PipelineCounters>) -> Self {
        self.counters = counters;
        self
    }
}

/// Run `sensor` until cancellation.
///
/// Returns `Ok(())` on cancellation (or when the queue is closed under it),
/// `Err` only for [`SensorFault::Fatal`].
pub async fn run_sensor(mut sensor: Box<dyn Sensor>, ctx: SensorContext) -> Result<(), SensorFault> {
    let name = sensor.name().to_string();
    let interval = sensor.interval();
    info!(sensor = %name, interval_ms = interval.as_millis() as u64, "Sensor started");

    let mut cycles = 0u64;
    while !ctx.signal.is_cancelled() {
        let sampled = tokio::select! {
            _ = ctx.signal.cancelled() => break,
            result = sensor.sample() => result,
        };
        cycles += 1;

        match sampled {
            Ok(observations) => {
                let count = observations.len();
                for observation in observations {
                    if ctx.signal.is_cancelled() {
                        break;
                    }
                    match ctx.queue.push(observation).await {
                        Ok(PushOutcome::Enqueued) => {}
                        Ok(PushOutcome::DisplacedOldest) => {
                            debug!(sensor = %name, "Queue full, displaced oldest observation");
                        }
                        Err(QueueError::Full(waited)) => {
                            warn!(sensor = %name, waited_ms = waited.as_millis() as u64, "Queue full, observation rejected");
                        }
                        Err(QueueError::Closed) => {
                            info!(sensor = %name, "Queue closed, sensor exiting");
                            return Ok(());
                        }
                    }
                }
                debug!(sensor = %name, cycle = cycles, observations = count, "Sample cycle complete");
            }
            Err(SensorFault::Sample(reason)) => {
                PipelineCounters::bump(&ctx.counters.sensor_faults);
                ctx.log
                    .record_error(format!("Sensor {} sample failed: {}", name, reason));
            }
            Err(fatal @ SensorFault::Fatal(_)) => return Err(fatal),
        }

        if !ctx.signal.sleep(interval).await {
            break;
        }
    }

    info!(sensor = %name, cycles, "Sensor stopped");
    Ok(())
}
