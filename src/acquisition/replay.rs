//! Scripted sensor for demos and tests.
//!
//! Plays back a fixed list of steps, one per cycle. Once the script is
//! exhausted the sensor either idles (returns nothing) or starts over.

use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;

use super::{Sensor, SensorFault};
use crate::types::FeatureObservation;

#[derive(Debug, Clone)]
pub enum ReplayStep {
    /// Emit these observations, re-stamped with the current time.
    Emit(Vec<FeatureObservation>),
    /// Transient sample failure.
    Fail(String),
    /// Fatal failure; ends the sensor task.
    Crash(String),
    /// Panic inside `sample()`.
    Panic(String),
}

#[derive(Debug, Clone)]
pub struct ReplaySensor {
    name: String,
    interval: Duration,
    steps: Vec<ReplayStep>,
    cursor: usize,
    repeat: bool,
}

impl ReplaySensor {
    pub fn new(name: impl Into<String>, interval: Duration, steps: Vec<ReplayStep>) -> Self {
        Self {
            name: name.into(),
            interval,
            steps,
            cursor: 0,
            repeat: false,
        }
    }

    /// Restart the script from the top once it runs out.
    pub fn repeat(mut self) -> Self {
        self.repeat = true;
        self
    }

    /// One `Emit` step per observation.
    pub fn from_observations(
        name: impl Into<String>,
        interval: Duration,
        observations: impl IntoIterator<Item = FeatureObservation>,
    ) -> Self {
        let steps = observations
            .into_iter()
            .map(|obs| ReplayStep::Emit(vec![obs]))
            .collect();
        Self::new(name, interval, steps)
    }

    fn next_step(&mut self) -> Option<ReplayStep> {
        if self.cursor >= self.steps.len() {
            if !self.repeat || self.steps.is_empty() {
                return None;
            }
            self.cursor = 0;
        }
        let step = self.steps.get(self.cursor).cloned();
        self.cursor += 1;
        step
    }
}

#[async_trait]
impl Sensor for ReplaySensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    #[allow(clippy::panic)]
    async fn sample(&mut self) -> Result<Vec<FeatureObservation>, SensorFault> {
        match self.next_step() {
            None => Ok(Vec::new()),
            Some(ReplayStep::Emit(observations)) => {
                let now = Utc::now();
                Ok(observations.into_iter().map(|o| o.observed_at(now)).collect())
            }
            Some(ReplayStep::Fail(reason)) => Err(SensorFault::Sample(reason)),
            Some(ReplayStep::Crash(reason)) => Err(SensorFault::Fatal(reason)),
            Some(ReplayStep::Panic(message)) => panic!("{}", message),
        }
    }
}
