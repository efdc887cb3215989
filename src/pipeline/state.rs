//! Pipeline lifecycle state and run statistics.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use super::queue::QueueStats;
use crate::types::LogEntry;

/// Lifecycle of one orchestrator.
///
/// `Idle --start()--> Running --stop()--> Stopping --(consumer exits)--> Idle`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Idle,
    Running,
    Stopping,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineState::Idle => write!(f, "Idle"),
            PipelineState::Running => write!(f, "Running"),
            PipelineState::Stopping => write!(f, "Stopping"),
        }
    }
}

/// Monotonic counters shared by the tasks of a pipeline, across runs.
#[derive(Debug, Default)]
pub(crate) struct PipelineCounters {
    pub classified: AtomicU64,
    pub anomalies: AtomicU64,
    pub classifier_faults: AtomicU64,
    pub mitigations_applied: AtomicU64,
    pub mitigation_faults: AtomicU64,
    pub sensor_faults: AtomicU64,
    pub sensors_crashed: AtomicU64,
    pub discarded_at_stop: AtomicU64,
    // Queue counters folded in from finished runs.
    pub enqueued: AtomicU64,
    pub rejected: AtomicU64,
    pub displaced: AtomicU64,
}

impl PipelineCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    /// Fold a finished run's queue counters into the lifetime totals.
    pub fn absorb_queue(&self, stats: QueueStats) {
        Self::add(&self.enqueued, stats.enqueued);
        Self::add(&self.rejected, stats.rejected);
        Self::add(&self.displaced, stats.displaced);
    }
}

/// Point-in-time statistics for the presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStats {
    pub state: PipelineState,
    pub run_started_at: Option<DateTime<Utc>>,
    pub observations_enqueued: u64,
    pub observations_classified: u64,
    pub anomalies: u64,
    pub classifier_faults: u64,
    pub mitigations_applied: u64,
    pub mitigation_faults: u64,
    pub sensor_faults: u64,
    pub sensors_crashed: u64,
    pub queue_depth: usize,
    pub observations_rejected: u64,
    pub observations_displaced: u64,
    pub observations_discarded: u64,
    pub alerts: usize,
    pub errors: usize,
}

impl PipelineStats {
    pub(crate) fn collect(
        state: PipelineState,
        run_started_at: Option<DateTime<Utc>>,
        counters: &PipelineCounters,
        live_queue: Option<QueueStats>,
        alerts: usize,
        errors: usize,
    ) -> Self {
        let live = live_queue.unwrap_or_default();
        Self {
            state,
            run_started_at,
            observations_enqueued: PipelineCounters::get(&counters.enqueued) + live.enqueued,
            observations_classified: PipelineCounters::get(&counters.classified),
            anomalies: PipelineCounters::get(&counters.anomalies),
            classifier_faults: PipelineCounters::get(&counters.classifier_faults),
            mitigations_applied: PipelineCounters::get(&counters.mitigations_applied),
            mitigation_faults: PipelineCounters::get(&counters.mitigation_faults),
            sensor_faults: PipelineCounters::get(&counters.sensor_faults),
            sensors_crashed: PipelineCounters::get(&counters.sensors_crashed),
            queue_depth: live.depth,
            observations_rejected: PipelineCounters::get(&counters.rejected) + live.rejected,
            observations_displaced: PipelineCounters::get(&counters.displaced) + live.displaced,
            observations_discarded: PipelineCounters::get(&counters.discarded_at_stop),
            alerts,
            errors,
        }
    }
}

/// Everything an export layer needs to render a report.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub generated_at: DateTime<Utc>,
    pub state: PipelineState,
    pub stats: PipelineStats,
    pub entries: Vec<LogEntry>,
    /// Most recent classifier artifact, passed through uninterpreted.
    pub artifact: Option<serde_json::Value>,
}
