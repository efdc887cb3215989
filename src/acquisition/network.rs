//! Network interface sensor.
//!
//! Emits per-interface throughput since the previous refresh. Interfaces
//! with no traffic in the window are skipped.

use async_trait::async_trait;
use std::time::{Duration, Instant};
use sysinfo::Networks;

use super::{Sensor, SensorFault};
use crate::types::FeatureObservation;

pub struct NetworkSensor {
    networks: Option<Networks>,
    interval: Duration,
    last_refresh: Instant,
}

impl NetworkSensor {
    pub fn new(interval: Duration) -> Self {
        Self {
            networks: None,
            interval,
            last_refresh: Instant::now(),
        }
    }
}

#[async_trait]
impl Sensor for NetworkSensor {
    fn name(&self) -> &str {
        "network"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn sample(&mut self) -> Result<Vec<FeatureObservation>, SensorFault> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(SensorFault::Fatal(
                "network statistics are not supported on this platform".to_string(),
            ));
        }

        // Interface enumeration and refresh block; keep them off the async workers.
        let previous = self.networks.take();
        let primed = previous.is_some();
        let networks = tokio::task::spawn_blocking(move || match previous {
            Some(mut networks) => {
                networks.refresh();
                networks
            }
            None => Networks::new_with_refreshed_list(),
        })
        .await
        .map_err(|e| SensorFault::Sample(format!("network refresh task failed: {}", e)))?;
        let networks = self.networks.insert(networks);

        // First cycle only establishes the counters.
        let now = Instant::now();
        if !primed {
            self.last_refresh = now;
            return Ok(Vec::new());
        }

        let elapsed = now.duration_since(self.last_refresh).as_secs_f64().max(1e-3);
        self.last_refresh = now;

        let observations = networks
            .iter()
            .filter(|(_, data)| data.received() > 0 || data.transmitted() > 0)
            .map(|(interface, data)| {
                FeatureObservation::new("network")
                    .with("interface", interface.as_str())
                    .with("rx_bytes_per_sec", data.received() as f64 / elapsed)
                    .with("tx_bytes_per_sec", data.transmitted() as f64 / elapsed)
                    .with("rx_packets", data.packets_received())
                    .with("tx_packets", data.packets_transmitted())
            })
            .collect();

        Ok(observations)
    }
}
