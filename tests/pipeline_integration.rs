//! Pipeline Integration Tests
//!
//! Drives full orchestrator runs with scripted sensors and in-test
//! classifiers/mitigators, and checks the alert log, state machine and
//! failure isolation from the outside.

#![allow(clippy::unwrap_used, clippy::panic)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use threatwatch::acquisition::{ReplaySensor, ReplayStep, Sensor};
use threatwatch::config::PipelineConfig;
use threatwatch::mitigation::NoopMitigator;
use threatwatch::{
    ClassificationFault, Classifier, FeatureObservation, Label, LogKind, MitigationFault,
    MitigationOutcome, MitigationTrigger, PipelineOrchestrator, PipelineState, StartupError,
};

// ============================================================================
// Test collaborators
// ============================================================================

/// `cpu > 90` => Anomalous(0.9), otherwise Normal(0.1).
struct CpuRule;

impl Classifier for CpuRule {
    fn predict(&mut self, obs: &FeatureObservation) -> Result<Label, ClassificationFault> {
        Ok(if obs.number("cpu").unwrap_or(0.0) > 90.0 {
            Label::Anomalous
        } else {
            Label::Normal
        })
    }

    fn score(&mut self, obs: &FeatureObservation) -> Result<f64, ClassificationFault> {
        Ok(if obs.number("cpu").unwrap_or(0.0) > 90.0 { 0.9 } else { 0.1 })
    }
}

struct AlwaysFails;

impl Classifier for AlwaysFails {
    fn predict(&mut self, _: &FeatureObservation) -> Result<Label, ClassificationFault> {
        Err(ClassificationFault::Predict("model not loaded".to_string()))
    }

    fn score(&mut self, _: &FeatureObservation) -> Result<f64, ClassificationFault> {
        Err(ClassificationFault::Score("model not loaded".to_string()))
    }
}

/// Normal verdicts, but the artifact export always panics.
struct BrokenArtifact;

impl Classifier for BrokenArtifact {
    fn predict(&mut self, _: &FeatureObservation) -> Result<Label, ClassificationFault> {
        Ok(Label::Normal)
    }

    fn score(&mut self, _: &FeatureObservation) -> Result<f64, ClassificationFault> {
        Ok(0.2)
    }

    fn artifact(&self) -> Option<serde_json::Value> {
        panic!("artifact serialisation bug")
    }
}

/// Blocks inside `predict` long enough for a test to call `stop()` mid-call.
struct SlowRule {
    delay: Duration,
    entered: Arc<AtomicUsize>,
}

impl SlowRule {
    fn new(delay: Duration) -> (Self, Arc<AtomicUsize>) {
        let entered = Arc::new(AtomicUsize::new(0));
        (Self { delay, entered: Arc::clone(&entered) }, entered)
    }
}

impl Classifier for SlowRule {
    fn predict(&mut self, obs: &FeatureObservation) -> Result<Label, ClassificationFault> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        CpuRule.predict(obs)
    }

    fn score(&mut self, obs: &FeatureObservation) -> Result<f64, ClassificationFault> {
        CpuRule.score(obs)
    }
}

#[derive(Clone, Copy)]
enum FirstCall {
    Succeeds,
    Errors,
    Panics,
}

/// Records the cpu value of every observation it is applied to.
struct RecordingMitigator {
    first_call: FirstCall,
    calls: AtomicUsize,
    seen: Mutex<Vec<f64>>,
}

impl RecordingMitigator {
    fn new(first_call: FirstCall) -> Arc<Self> {
        Arc::new(Self {
            first_call,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn seen(&self) -> Vec<f64> {
        self.seen.lock().unwrap().clone()
    }
}

impl MitigationTrigger for RecordingMitigator {
    fn apply(&self, obs: &FeatureObservation) -> Result<MitigationOutcome, MitigationFault> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(obs.number("cpu").unwrap_or(-1.0));
        match (call, self.first_call) {
            (0, FirstCall::Errors) => Err(MitigationFault::Failed("access denied".to_string())),
            (0, FirstCall::Panics) => panic!("mitigation backend crashed"),
            _ => Ok(MitigationOutcome::NoAction),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn fast_config() -> PipelineConfig {
    PipelineConfig {
        consume_timeout_ms: 20,
        ..PipelineConfig::default()
    }
}

fn cpu(value: f64) -> FeatureObservation {
    FeatureObservation::new("process").with("cpu", value)
}

fn scripted(values: &'static [f64]) -> impl Fn() -> Vec<Box<dyn Sensor>> + Send + Sync + 'static {
    move || -> Vec<Box<dyn Sensor>> {
        vec![Box::new(ReplaySensor::from_observations(
            "process",
            Duration::from_millis(5),
            values.iter().copied().map(cpu),
        ))]
    }
}

async fn wait_until(what: &str, mut done: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {}",
            what
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ============================================================================
// Classification flow
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scenario_flags_only_the_spike_in_queue_order() {
    let mitigator = RecordingMitigator::new(FirstCall::Succeeds);
    let orch = PipelineOrchestrator::new(
        fast_config(),
        scripted(&[10.0, 95.0, 12.0]),
        Box::new(CpuRule),
        mitigator.clone(),
    );

    orch.start().unwrap();
    wait_until("three alerts", || orch.stats().alerts == 3).await;
    orch.stop().await;

    let entries = orch.log_snapshot();
    assert_eq!(entries.len(), 3);
    assert!(entries.iter().all(|e| e.kind == LogKind::Alert));
    assert_eq!(entries[0].message, "process {cpu: 10} -> NORMAL, score=0.100");
    assert_eq!(entries[1].message, "process {cpu: 95} -> ANOMALOUS, score=0.900");
    assert_eq!(entries[2].message, "process {cpu: 12} -> NORMAL, score=0.100");

    assert_eq!(mitigator.seen(), vec![95.0]);
    let stats = orch.stats();
    assert_eq!(stats.anomalies, 1);
    assert_eq!(stats.observations_classified, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn always_failing_classifier_logs_one_error_per_observation() {
    let orch = PipelineOrchestrator::new(
        fast_config(),
        scripted(&[1.0, 2.0, 3.0, 4.0, 5.0]),
        Box::new(AlwaysFails),
        Arc::new(NoopMitigator),
    );

    orch.start().unwrap();
    wait_until("five classifications", || orch.stats().observations_classified == 5).await;
    // Consumer is still alive and idling on the queue.
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(orch.state(), PipelineState::Running);
    orch.stop().await;

    let stats = orch.stats();
    assert_eq!(stats.errors, 5);
    assert_eq!(stats.classifier_faults, 5);
    // Fallback verdict is still recorded for every observation.
    assert_eq!(stats.alerts, 5);
    assert!(orch
        .log_snapshot()
        .iter()
        .filter(|e| e.is_alert())
        .all(|e| e.message.ends_with("-> NORMAL, score=0.000")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn artifact_panic_does_not_stop_classification() {
    let orch = PipelineOrchestrator::new(
        fast_config(),
        scripted(&[1.0, 2.0, 3.0, 4.0, 5.0]),
        Box::new(BrokenArtifact),
        Arc::new(NoopMitigator),
    );

    orch.start().unwrap();
    wait_until("five alerts", || orch.stats().alerts == 5).await;
    assert_eq!(orch.state(), PipelineState::Running);
    orch.stop().await;

    let stats = orch.stats();
    assert_eq!(stats.observations_classified, 5);
    assert_eq!(stats.errors, 5);
    assert_eq!(stats.queue_depth, 0);
    assert!(orch.last_artifact().is_none());
    assert!(orch
        .log_snapshot()
        .iter()
        .filter(|e| e.is_error())
        .all(|e| e.message.contains("artifact serialisation bug")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn mitigation_error_is_logged_and_next_observation_classified() {
    let mitigator = RecordingMitigator::new(FirstCall::Errors);
    let orch = PipelineOrchestrator::new(
        fast_config(),
        scripted(&[95.0, 96.0, 10.0]),
        Box::new(CpuRule),
        mitigator.clone(),
    );

    orch.start().unwrap();
    wait_until("three alerts", || orch.stats().alerts == 3).await;
    orch.stop().await;

    let errors: Vec<_> = orch.log_snapshot().into_iter().filter(|e| e.is_error()).collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, "Mitigation failed: access denied");
    assert_eq!(mitigator.seen(), vec![95.0, 96.0]);
    assert_eq!(orch.stats().mitigation_faults, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn mitigation_panic_is_contained() {
    let mitigator = RecordingMitigator::new(FirstCall::Panics);
    let orch = PipelineOrchestrator::new(
        fast_config(),
        scripted(&[95.0, 10.0]),
        Box::new(CpuRule),
        mitigator.clone(),
    );

    orch.start().unwrap();
    wait_until("two alerts", || orch.stats().alerts == 2).await;
    orch.stop().await;

    let errors: Vec<_> = orch.log_snapshot().into_iter().filter(|e| e.is_error()).collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("mitigation backend crashed"));
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn start_while_running_is_rejected_without_side_effects() {
    let factory_calls = Arc::new(AtomicUsize::new(0));
    let calls = Arc::clone(&factory_calls);
    let factory = move || -> Vec<Box<dyn Sensor>> {
        calls.fetch_add(1, Ordering::SeqCst);
        vec![Box::new(ReplaySensor::from_observations(
            "process",
            Duration::from_millis(5),
            [cpu(1.0), cpu(2.0), cpu(3.0)],
        ))]
    };
    let orch = PipelineOrchestrator::new(fast_config(), factory, Box::new(CpuRule), Arc::new(NoopMitigator));

    orch.start().unwrap();
    assert_eq!(orch.start(), Err(StartupError::AlreadyRunning(PipelineState::Running)));
    assert_eq!(factory_calls.load(Ordering::SeqCst), 1);

    wait_until("three alerts", || orch.stats().alerts == 3).await;
    tokio::time::sleep(Duration::from_millis(60)).await;
    orch.stop().await;

    // No observation consumed twice.
    assert_eq!(orch.stats().observations_classified, 3);
    assert_eq!(orch.log_snapshot().len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_is_idempotent() {
    let orch = PipelineOrchestrator::new(
        fast_config(),
        scripted(&[1.0]),
        Box::new(CpuRule),
        Arc::new(NoopMitigator),
    );

    // Stop before start is a no-op.
    orch.stop().await;
    assert_eq!(orch.state(), PipelineState::Idle);

    orch.start().unwrap();
    wait_until("one alert", || orch.stats().alerts == 1).await;
    orch.stop().await;
    let after_first = orch.log_snapshot();

    orch.stop().await;
    assert_eq!(orch.state(), PipelineState::Idle);
    assert_eq!(orch.log_snapshot(), after_first);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_stops_serialise() {
    let orch = Arc::new(PipelineOrchestrator::new(
        fast_config(),
        scripted(&[1.0, 2.0]),
        Box::new(CpuRule),
        Arc::new(NoopMitigator),
    ));
    orch.start().unwrap();
    wait_until("two alerts", || orch.stats().alerts == 2).await;

    let a = tokio::spawn({
        let orch = Arc::clone(&orch);
        async move { orch.stop().await }
    });
    let b = tokio::spawn({
        let orch = Arc::clone(&orch);
        async move { orch.stop().await }
    });
    a.await.unwrap();
    b.await.unwrap();

    assert_eq!(orch.state(), PipelineState::Idle);
    assert_eq!(orch.log_snapshot().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pipeline_restarts_after_stop() {
    let orch = PipelineOrchestrator::new(
        fast_config(),
        scripted(&[10.0, 20.0]),
        Box::new(CpuRule),
        Arc::new(NoopMitigator),
    );

    orch.start().unwrap();
    wait_until("first run alerts", || orch.stats().alerts == 2).await;
    orch.stop().await;

    // Fresh sensors, fresh queue; the log carries over.
    orch.start().unwrap();
    assert_eq!(orch.state(), PipelineState::Running);
    wait_until("second run alerts", || orch.stats().alerts == 4).await;
    orch.stop().await;

    let stats = orch.stats();
    assert_eq!(stats.observations_classified, 4);
    assert_eq!(stats.observations_enqueued, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn orchestrators_are_independent() {
    let a = PipelineOrchestrator::new(fast_config(), scripted(&[1.0]), Box::new(CpuRule), Arc::new(NoopMitigator));
    let b = PipelineOrchestrator::new(fast_config(), scripted(&[95.0, 96.0]), Box::new(CpuRule), Arc::new(NoopMitigator));

    a.start().unwrap();
    b.start().unwrap();
    wait_until("both logs", || a.stats().alerts == 1 && b.stats().alerts == 2).await;
    a.stop().await;
    assert_eq!(b.state(), PipelineState::Running);
    b.stop().await;

    assert_eq!(a.stats().anomalies, 0);
    assert_eq!(b.stats().anomalies, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_lets_in_flight_classification_finish() {
    let (classifier, entered) = SlowRule::new(Duration::from_millis(300));
    let orch = PipelineOrchestrator::new(fast_config(), scripted(&[95.0]), Box::new(classifier), Arc::new(NoopMitigator));

    orch.start().unwrap();
    wait_until("predict entered", || entered.load(Ordering::SeqCst) == 1).await;
    orch.stop().await;

    let entries = orch.log_snapshot();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].message, "process {cpu: 95} -> ANOMALOUS, score=0.900");
    assert_eq!(orch.stats().observations_classified, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_discards_and_counts_the_backlog() {
    let (classifier, entered) = SlowRule::new(Duration::from_millis(400));
    let orch = PipelineOrchestrator::new(
        fast_config(),
        scripted(&[1.0, 2.0, 3.0, 4.0, 5.0]),
        Box::new(classifier),
        Arc::new(NoopMitigator),
    );

    orch.start().unwrap();
    wait_until("backlog queued", || {
        entered.load(Ordering::SeqCst) == 1 && orch.stats().observations_enqueued == 5
    })
    .await;
    orch.stop().await;

    let stats = orch.stats();
    assert_eq!(stats.observations_classified, 1);
    assert_eq!(stats.observations_discarded, 4);
    assert_eq!(stats.alerts, 1);
    assert_eq!(stats.queue_depth, 0);
    // Discarded observations are counted, never logged.
    assert_eq!(orch.log_snapshot().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn start_while_stopping_is_rejected() {
    let (classifier, entered) = SlowRule::new(Duration::from_millis(300));
    let orch = Arc::new(PipelineOrchestrator::new(
        fast_config(),
        scripted(&[10.0]),
        Box::new(classifier),
        Arc::new(NoopMitigator),
    ));

    orch.start().unwrap();
    wait_until("predict entered", || entered.load(Ordering::SeqCst) == 1).await;

    let stopping = tokio::spawn({
        let orch = Arc::clone(&orch);
        async move { orch.stop().await }
    });
    wait_until("stopping state", || orch.state() == PipelineState::Stopping).await;
    assert_eq!(orch.start(), Err(StartupError::AlreadyRunning(PipelineState::Stopping)));

    stopping.await.unwrap();
    assert_eq!(orch.state(), PipelineState::Idle);
    assert_eq!(orch.stats().alerts, 1);
    // The rejected start spawned nothing; a later start works.
    orch.start().unwrap();
    orch.stop().await;
    assert_eq!(orch.state(), PipelineState::Idle);
}

// ============================================================================
// Sensor failure isolation
// ============================================================================

fn crashing_plus_healthy(crash: ReplayStep) -> impl Fn() -> Vec<Box<dyn Sensor>> + Send + Sync + 'static {
    move || -> Vec<Box<dyn Sensor>> {
        vec![
            Box::new(ReplaySensor::new("broken", Duration::from_millis(5), vec![crash.clone()])),
            Box::new(
                ReplaySensor::from_observations("network", Duration::from_millis(5), [cpu(5.0)]).repeat(),
            ),
        ]
    }
}

async fn assert_crash_isolated(crash: ReplayStep, expected: &str) {
    let orch = PipelineOrchestrator::new(
        fast_config(),
        crashing_plus_healthy(crash),
        Box::new(CpuRule),
        Arc::new(NoopMitigator),
    );

    orch.start().unwrap();
    wait_until("crash entry", || orch.stats().sensors_crashed == 1).await;
    let alerts_at_crash = orch.stats().alerts;
    wait_until("alerts after crash", || orch.stats().alerts >= alerts_at_crash + 3).await;
    assert_eq!(orch.state(), PipelineState::Running);
    orch.stop().await;

    let errors: Vec<_> = orch.log_snapshot().into_iter().filter(|e| e.is_error()).collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fatal_sensor_fault_is_isolated() {
    assert_crash_isolated(
        ReplayStep::Crash("interface vanished".to_string()),
        "Sensor broken crashed: interface vanished",
    )
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sensor_panic_is_isolated() {
    assert_crash_isolated(
        ReplayStep::Panic("index out of bounds".to_string()),
        "Sensor broken crashed: panicked: index out of bounds",
    )
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn transient_sensor_fault_keeps_sensor_running() {
    let factory = || -> Vec<Box<dyn Sensor>> {
        vec![Box::new(ReplaySensor::new(
            "process",
            Duration::from_millis(5),
            vec![
                ReplayStep::Fail("permission denied".to_string()),
                ReplayStep::Emit(vec![cpu(7.0)]),
            ],
        ))]
    };
    let orch = PipelineOrchestrator::new(fast_config(), factory, Box::new(CpuRule), Arc::new(NoopMitigator));

    orch.start().unwrap();
    wait_until("alert after fault", || orch.stats().alerts == 1).await;
    orch.stop().await;

    let entries = orch.log_snapshot();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].message, "Sensor process sample failed: permission denied");
    assert_eq!(orch.stats().sensors_crashed, 0);
    assert_eq!(orch.stats().sensor_faults, 1);
}

// ============================================================================
// Presentation surface
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn log_since_and_report_cover_the_run() {
    let orch = PipelineOrchestrator::new(
        fast_config(),
        scripted(&[10.0, 95.0]),
        Box::new(CpuRule),
        Arc::new(NoopMitigator),
    );

    orch.start().unwrap();
    wait_until("two alerts", || orch.stats().alerts == 2).await;
    orch.stop().await;

    let (first, cursor) = orch.log_since(0);
    assert_eq!(first.len(), 2);
    let (rest, _) = orch.log_since(cursor);
    assert!(rest.is_empty());

    let json = serde_json::to_value(orch.report()).unwrap();
    assert_eq!(json["state"], "Idle");
    assert_eq!(json["stats"]["state"], "Idle");
    assert_eq!(json["stats"]["anomalies"], 1);
    assert_eq!(json["entries"][1]["kind"], "alert");
    // CpuRule has no artifact.
    assert!(json["artifact"].is_null());
}
