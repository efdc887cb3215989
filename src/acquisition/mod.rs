//! Sensor data acquisition module
//!
//! Sensors sample one monitored domain (process table, network interfaces)
//! and hand back feature observations. The loop around them, cadence,
//! cancellation and queue pushes, lives in [`harness`] so every sensor
//! behaves the same way under shutdown and back-pressure.

pub mod harness;
pub mod network;
pub mod process;
pub mod replay;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::config::SensorsConfig;
use crate::types::FeatureObservation;

pub use harness::{run_sensor, SensorContext};
pub use network::NetworkSensor;
pub use process::ProcessSensor;
pub use replay::{ReplaySensor, ReplayStep};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SensorFault {
    /// One sampling cycle failed; the sensor keeps running.
    #[error("sample failed: {0}")]
    Sample(String),

    /// The sensor cannot continue; its task ends.
    #[error("{0}")]
    Fatal(String),
}

// ============================================================================
// Sensor Trait
// ============================================================================

/// A periodically sampled source of feature observations.
///
/// Implementations only describe one sampling cycle; the harness drives the
/// loop and owns cancellation.
#[async_trait]
pub trait Sensor: Send + 'static {
    /// Human-readable name for logs (e.g. "process", "network").
    fn name(&self) -> &str;

    /// Delay between sampling cycles.
    fn interval(&self) -> Duration;

    /// Sample once. May return zero observations.
    async fn sample(&mut self) -> Result<Vec<FeatureObservation>, SensorFault>;
}

/// Builds a fresh set of sensors for every pipeline run.
pub trait SensorFactory: Send + Sync + 'static {
    fn create(&self) -> Vec<Box<dyn Sensor>>;
}

impl<F> SensorFactory for F
where
    F: Fn() -> Vec<Box<dyn Sensor>> + Send + Sync + 'static,
{
    fn create(&self) -> Vec<Box<dyn Sensor>> {
        self()
    }
}

/// Process + network sensors on the local host, as configured.
#[derive(Debug, Clone, Default)]
pub struct HostSensorFactory {
    config: SensorsConfig,
}

impl HostSensorFactory {
    pub fn new(config: SensorsConfig) -> Self {
        Self { config }
    }
}

impl SensorFactory for HostSensorFactory {
    fn create(&self) -> Vec<Box<dyn Sensor>> {
        let mut sensors: Vec<Box<dyn Sensor>> = Vec::with_capacity(2);
        if self.config.process.enabled {
            sensors.push(Box::new(ProcessSensor::new(
                Duration::from_millis(self.config.process.interval_ms),
                self.config.process.top_n,
            )));
        }
        if self.config.network.enabled {
            sensors.push(Box::new(NetworkSensor::new(Duration::from_millis(
                self.config.network.interval_ms,
            ))));
        }
        sensors
    }
}
