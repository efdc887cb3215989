//! The single consumer: queue -> classifier -> (anomalous) mitigation -> log.
//!
//! One observation at a time, in queue order. Classifier (artifact included)
//! and mitigation faults, panics too, become one `Error` entry each and never
//! end the loop; only cancellation does.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::log::AlertLog;
use super::queue::FeatureQueue;
use super::signal::CancellationSignal;
use super::state::PipelineCounters;
use super::supervisor::panic_message;
use crate::config::defaults::SCORE_PRECISION;
use crate::config::FaultPolicy;
use crate::detection::{ClassificationFault, Classifier};
use crate::mitigation::{MitigationFault, MitigationOutcome, MitigationTrigger};
use crate::types::{ClassificationResult, FeatureObservation};

pub(crate) type SharedClassifier = Arc<Mutex<Box<dyn Classifier>>>;
pub(crate) type SharedArtifact = Arc<RwLock<Option<serde_json::Value>>>;

pub(crate) struct ConsumeLoop {
    pub queue: Arc<FeatureQueue>,
    pub signal: CancellationSignal,
    pub log: Arc<AlertLog>,
    pub classifier: SharedClassifier,
    pub mitigator: Arc<dyn MitigationTrigger>,
    pub artifact: SharedArtifact,
    pub counters: Arc<PipelineCounters>,
    pub timeout: Duration,
    pub fault_policy: FaultPolicy,
}

impl ConsumeLoop {
    /// Run until the signal is cancelled.
    ///
    /// The classifier stays locked for the whole run, so a second consumer
    /// could never interleave with this one.
    pub async fn run(self) {
        let mut classifier = self.classifier.lock().await;
        info!(classifier = classifier.name(), timeout_ms = self.timeout.as_millis() as u64, "[Consumer] Started");

        let mut handled = 0u64;
        loop {
            if self.signal.is_cancelled() {
                break;
            }

            let next = tokio::select! {
                biased;
                _ = self.signal.cancelled() => break,
                next = self.queue.pop_timeout(self.timeout) => next,
            };

            // Timeout: loop around and re-check the signal.
            let Some(observation) = next else { continue };

            self.handle(classifier.as_mut(), &observation);
            handled += 1;
        }

        info!(handled, "[Consumer] Shutdown signal received, exiting");
    }

    fn handle(&self, classifier: &mut dyn Classifier, observation: &FeatureObservation) {
        PipelineCounters::bump(&self.counters.classified);

        let result = match Self::classify(classifier, observation) {
            Ok(result) => result,
            Err(fault) => {
                PipelineCounters::bump(&self.counters.classifier_faults);
                self.log.record_error(format!(
                    "Classifier failed on {} observation: {}",
                    observation.source(),
                    fault
                ));
                ClassificationResult::fallback(self.fault_policy.label())
            }
        };

        match Self::snapshot_artifact(classifier) {
            Ok(Some(artifact)) => {
                *self.artifact.write().unwrap_or_else(|e| e.into_inner()) = Some(artifact);
            }
            Ok(None) => {}
            Err(fault) => {
                PipelineCounters::bump(&self.counters.classifier_faults);
                self.log.record_error(format!("Classifier artifact unavailable: {}", fault));
            }
        }

        self.log.record_alert(format!(
            "{} -> {}, score={:.*}",
            observation, result.label, SCORE_PRECISION, result.score
        ));

        if !result.is_anomalous() {
            return;
        }
        PipelineCounters::bump(&self.counters.anomalies);

        match self.mitigate(observation) {
            Ok(outcome) => {
                if outcome.is_applied() {
                    PipelineCounters::bump(&self.counters.mitigations_applied);
                }
                match &outcome {
                    MitigationOutcome::Skipped { .. } => {
                        warn!(source = observation.source(), "[Consumer] Mitigation {}", outcome);
                    }
                    _ => debug!(source = observation.source(), "[Consumer] Mitigation {}", outcome),
                }
            }
            Err(fault) => {
                PipelineCounters::bump(&self.counters.mitigation_faults);
                self.log.record_error(format!("Mitigation failed: {}", fault));
            }
        }
    }

    fn classify(
        classifier: &mut dyn Classifier,
        observation: &FeatureObservation,
    ) -> Result<ClassificationResult, ClassificationFault> {
        catch_unwind(AssertUnwindSafe(|| classifier.classify(observation)))
            .unwrap_or_else(|payload| Err(ClassificationFault::Panicked(panic_message(&*payload))))
    }

    fn snapshot_artifact(classifier: &dyn Classifier) -> Result<Option<serde_json::Value>, ClassificationFault> {
        catch_unwind(AssertUnwindSafe(|| classifier.artifact()))
            .map_err(|payload| ClassificationFault::Panicked(panic_message(&*payload)))
    }

    fn mitigate(&self, observation: &FeatureObservation) -> Result<MitigationOutcome, MitigationFault> {
        catch_unwind(AssertUnwindSafe(|| self.mitigator.apply(observation)))
            .unwrap_or_else(|payload| Err(MitigationFault::Panicked(panic_message(&*payload))))
    }
}
