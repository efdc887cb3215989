//! Pipeline Orchestrator - owns one monitoring pipeline end to end
//!
//! ```text
//! Sensor tasks --push--> FeatureQueue --pop--> consumer --> Classifier
//!   (supervised)          (per run)                 |
//!                                                   +--(anomalous)--> MitigationTrigger
//!                                                   v
//!                                                AlertLog <-- polled by the presentation layer
//! ```
//!
//! Every run gets a fresh queue and cancellation signal. The log, the
//! classifier and the counters live as long as the orchestrator, so they
//! carry over a stop/start cycle.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::consumer::{ConsumeLoop, SharedArtifact, SharedClassifier};
use super::error::StartupError;
use super::log::AlertLog;
use super::queue::FeatureQueue;
use super::signal::CancellationSignal;
use super::state::{PipelineCounters, PipelineReport, PipelineState, PipelineStats};
use super::supervisor::{spawn_supervised, supervise_consumer};
use crate::acquisition::{HostSensorFactory, SensorContext, SensorFactory};
use crate::config::{PipelineConfig, SentinelConfig};
use crate::detection::{build_classifier, Classifier};
use crate::mitigation::{MitigationTrigger, ProcessMitigator};
use crate::types::{LogEntry, LogKind};

/// Task handles of the run in progress.
struct ActiveRun {
    signal: CancellationSignal,
    consumer: JoinHandle<()>,
    supervisors: Vec<JoinHandle<()>>,
}

struct Inner {
    state: PipelineState,
    run: Option<ActiveRun>,
    /// Kept until `stop()` has folded its counters into the totals.
    queue: Option<Arc<FeatureQueue>>,
    started_at: Option<DateTime<Utc>>,
}

pub struct PipelineOrchestrator {
    config: PipelineConfig,
    sensors: Box<dyn SensorFactory>,
    classifier: SharedClassifier,
    mitigator: Arc<dyn MitigationTrigger>,
    log: Arc<AlertLog>,
    artifact: SharedArtifact,
    counters: Arc<PipelineCounters>,
    inner: Mutex<Inner>,
    /// Serialises concurrent `stop()` calls.
    stop_lock: tokio::sync::Mutex<()>,
}

impl PipelineOrchestrator {
    pub fn new(
        config: PipelineConfig,
        sensors: impl SensorFactory,
        classifier: Box<dyn Classifier>,
        mitigator: Arc<dyn MitigationTrigger>,
    ) -> Self {
        Self {
            config,
            sensors: Box::new(sensors),
            classifier: Arc::new(tokio::sync::Mutex::new(classifier)),
            mitigator,
            log: Arc::new(AlertLog::new()),
            artifact: Arc::new(RwLock::new(None)),
            counters: Arc::new(PipelineCounters::default()),
            inner: Mutex::new(Inner {
                state: PipelineState::Idle,
                run: None,
                queue: None,
                started_at: None,
            }),
            stop_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Host sensors, configured classifier and process mitigator.
    pub fn from_config(config: &SentinelConfig) -> Self {
        Self::new(
            config.pipeline.clone(),
            HostSensorFactory::new(config.sensors.clone()),
            build_classifier(&config.classifier),
            Arc::new(ProcessMitigator::from_config(&config.mitigation)),
        )
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start a run. Returns as soon as every task is spawned.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<(), StartupError> {
        let mut inner = self.lock_inner();
        if inner.state != PipelineState::Idle {
            return Err(StartupError::AlreadyRunning(inner.state));
        }

        let runtime = Handle::try_current().map_err(|_| StartupError::NoRuntime)?;
        let sensors = self.sensors.create();
        if sensors.is_empty() {
            return Err(StartupError::NoSensors);
        }

        let queue = Arc::new(FeatureQueue::with_capacity(
            self.config.capacity(),
            self.config.overflow(),
        ));
        let signal = CancellationSignal::new();

        let consumer = runtime.spawn(
            ConsumeLoop {
                queue: Arc::clone(&queue),
                signal: signal.clone(),
                log: Arc::clone(&self.log),
                classifier: Arc::clone(&self.classifier),
                mitigator: Arc::clone(&self.mitigator),
                artifact: Arc::clone(&self.artifact),
                counters: Arc::clone(&self.counters),
                timeout: self.config.consume_timeout(),
                fault_policy: self.config.on_classifier_fault,
            }
            .run(),
        );
        // try_current() succeeded, so tokio::spawn below has a runtime.
        let consumer = supervise_consumer(consumer, Arc::clone(&self.log));

        let sensor_names: Vec<String> = sensors.iter().map(|s| s.name().to_string()).collect();
        let supervisors = sensors
            .into_iter()
            .map(|sensor| {
                let ctx = SensorContext::new(Arc::clone(&queue), signal.clone(), Arc::clone(&self.log));
                spawn_supervised(sensor, ctx, Arc::clone(&self.counters))
            })
            .collect();

        inner.state = PipelineState::Running;
        inner.queue = Some(queue);
        inner.started_at = Some(Utc::now());
        inner.run = Some(ActiveRun {
            signal,
            consumer,
            supervisors,
        });

        info!(
            sensors = ?sensor_names,
            capacity = ?self.config.capacity(),
            "[Orchestrator] Pipeline started"
        );
        Ok(())
    }

    /// Stop the current run and wait for its tasks.
    ///
    /// In-flight classification and mitigation finish first. Observations
    /// still queued afterwards are discarded and counted. No-op unless
    /// `Running`; concurrent calls run one after another.
    pub async fn stop(&self) {
        let _serial = self.stop_lock.lock().await;

        let (run, queue) = {
            let mut inner = self.lock_inner();
            if inner.state != PipelineState::Running {
                return;
            }
            inner.state = PipelineState::Stopping;
            (inner.run.take(), inner.queue.clone())
        };

        info!("[Orchestrator] Stopping pipeline");
        if let Some(run) = run {
            run.signal.cancel();
            // Wakes sensors waiting for queue space.
            if let Some(queue) = &queue {
                queue.close();
            }
            if let Err(e) = run.consumer.await {
                warn!(error = %e, "[Orchestrator] Consumer supervisor did not finish cleanly");
            }
            for result in futures::future::join_all(run.supervisors).await {
                if let Err(e) = result {
                    warn!(error = %e, "[Orchestrator] Sensor supervisor did not finish cleanly");
                }
            }
        }

        let mut inner = self.lock_inner();
        if let Some(queue) = inner.queue.take() {
            let discarded = queue.drain().len() as u64;
            PipelineCounters::add(&self.counters.discarded_at_stop, discarded);
            self.counters.absorb_queue(queue.stats());
            if discarded > 0 {
                info!(discarded, "[Orchestrator] Discarded queued observations at stop");
            }
        }
        inner.started_at = None;
        inner.state = PipelineState::Idle;
        info!("[Orchestrator] Pipeline stopped");
    }

    pub fn state(&self) -> PipelineState {
        self.lock_inner().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == PipelineState::Running
    }

    /// Shared handle to the alert log.
    pub fn log(&self) -> Arc<AlertLog> {
        Arc::clone(&self.log)
    }

    pub fn log_snapshot(&self) -> Vec<LogEntry> {
        self.log.snapshot()
    }

    /// See [`AlertLog::since`].
    pub fn log_since(&self, cursor: usize) -> (Vec<LogEntry>, usize) {
        self.log.since(cursor)
    }

    /// Most recent classifier artifact, if the classifier produces one.
    pub fn last_artifact(&self) -> Option<serde_json::Value> {
        self.artifact.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn stats(&self) -> PipelineStats {
        let inner = self.lock_inner();
        PipelineStats::collect(
            inner.state,
            inner.started_at,
            &self.counters,
            inner.queue.as_ref().map(|q| q.stats()),
            self.log.count(LogKind::Alert),
            self.log.count(LogKind::Error),
        )
    }

    pub fn report(&self) -> PipelineReport {
        let stats = self.stats();
        PipelineReport {
            generated_at: Utc::now(),
            state: stats.state,
            stats,
            entries: self.log_snapshot(),
            artifact: self.last_artifact(),
        }
    }
}

impl Drop for PipelineOrchestrator {
    fn drop(&mut self) {
        // Tasks cannot be awaited here; make sure they at least wind down.
        if let Some(run) = self.lock_inner().run.as_ref() {
            run.signal.cancel();
        }
    }
}

impl std::fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("state", &self.state())
            .field("config", &self.config)
            .field("log_entries", &self.log.len())
            .finish_non_exhaustive()
    }
}
