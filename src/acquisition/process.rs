//! Process table sensor.
//!
//! Each cycle refreshes the process list and emits one observation for each
//! of the top-N processes by CPU usage.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use sysinfo::System;
use tracing::debug;

use super::{Sensor, SensorFault};
use crate::config::defaults;
use crate::types::FeatureObservation;

const BYTES_PER_MB: f64 = 1_048_576.0;

pub struct ProcessSensor {
    system: System,
    interval: Duration,
    top_n: usize,
    /// pid -> first time this sensor saw it
    first_seen: HashMap<u32, Instant>,
    new_window: Duration,
    primed: bool,
}

impl ProcessSensor {
    pub fn new(interval: Duration, top_n: usize) -> Self {
        Self {
            system: System::new(),
            interval,
            top_n: top_n.max(1),
            first_seen: HashMap::new(),
            new_window: Duration::from_secs(defaults::NEW_PROCESS_WINDOW_SECS),
            primed: false,
        }
    }

    /// Refresh the process table off the async workers.
    async fn refresh(&mut self) -> Result<(), SensorFault> {
        let mut system = std::mem::replace(&mut self.system, System::new());
        self.system = tokio::task::spawn_blocking(move || {
            system.refresh_processes();
            system
        })
        .await
        .map_err(|e| SensorFault::Sample(format!("process refresh task failed: {}", e)))?;
        Ok(())
    }

    fn collect(&mut self) -> Vec<FeatureObservation> {
        let now = Instant::now();

        let mut rows: Vec<(u32, String, f32, u64)> = self
            .system
            .processes()
            .iter()
            .map(|(pid, p)| (pid.as_u32(), p.name().to_string(), p.cpu_usage(), p.memory()))
            .collect();

        // Forget exited processes so pid reuse counts as new.
        let alive: HashSet<u32> = rows.iter().map(|(pid, ..)| *pid).collect();
        self.first_seen.retain(|pid, _| alive.contains(pid));

        // Everything present at the first refresh is the starting population.
        let primed = self.primed;
        for (pid, ..) in &rows {
            self.first_seen.entry(*pid).or_insert(now);
        }
        self.primed = true;

        rows.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
        rows.truncate(self.top_n);

        rows.into_iter()
            .map(|(pid, name, cpu, memory)| {
                let new_process = primed
                    && self
                        .first_seen
                        .get(&pid)
                        .is_some_and(|seen| now.duration_since(*seen) <= self.new_window);
                FeatureObservation::new("process")
                    .with("pid", pid)
                    .with("name", name)
                    .with("cpu", f64::from(cpu))
                    .with("memory_mb", memory as f64 / BYTES_PER_MB)
                    .with("new_process", new_process)
            })
            .collect()
    }
}

#[async_trait]
impl Sensor for ProcessSensor {
    fn name(&self) -> &str {
        "process"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn sample(&mut self) -> Result<Vec<FeatureObservation>, SensorFault> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(SensorFault::Fatal(
                "process enumeration is not supported on this platform".to_string(),
            ));
        }

        self.refresh().await?;
        let observations = self.collect();
        if observations.is_empty() {
            return Err(SensorFault::Sample("process table was empty".to_string()));
        }
        debug!(count = observations.len(), tracked = self.first_seen.len(), "Process sample");
        Ok(observations)
    }
}
