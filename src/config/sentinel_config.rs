//! Sentinel Configuration - pipeline, sensor, classifier and mitigation tunables
//!
//! Each struct implements `Default` with the values in `config::defaults`,
//! so a missing file or a missing section means stock behaviour.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use super::defaults;
use crate::pipeline::OverflowPolicy;
use crate::types::Label;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "THREATWATCH_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "threatwatch.toml";

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {1}", .0.display())]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Config parse error ({}): {1}", .0.display())]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("Config validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
}

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one monitoring deployment.
///
/// Load with `SentinelConfig::load()` which searches:
/// 1. `$THREATWATCH_CONFIG`
/// 2. `./threatwatch.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SentinelConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub sensors: SensorsConfig,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(default)]
    pub mitigation: MitigationConfig,
}

impl SentinelConfig {
    /// Load configuration using the standard search order.
    ///
    /// A file that exists but fails to load is reported and skipped, never
    /// fatal: the monitor should come up with defaults rather than not at all.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded config from {}", CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded config from ./{}", LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        info!("No config file found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from a TOML string (no file involved).
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)
            .map_err(|e| ConfigError::Parse(PathBuf::from("<inline>"), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every section and report all problems at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        let p = &self.pipeline;
        if p.consume_timeout_ms == 0 {
            errors.push("pipeline.consume_timeout_ms must be > 0".to_string());
        }
        if p.overflow_policy == OverflowPolicyKind::Block && p.push_timeout_ms == 0 {
            errors.push("pipeline.push_timeout_ms must be > 0 with the block policy".to_string());
        }
        if p.overflow_policy == OverflowPolicyKind::DropOldest && p.queue_capacity == 0 {
            errors.push("pipeline.overflow_policy = \"drop_oldest\" requires a bounded queue_capacity".to_string());
        }

        let s = &self.sensors;
        if s.process.enabled && s.process.interval_ms == 0 {
            errors.push("sensors.process.interval_ms must be > 0".to_string());
        }
        if s.process.enabled && s.process.top_n == 0 {
            errors.push("sensors.process.top_n must be > 0".to_string());
        }
        if s.network.enabled && s.network.interval_ms == 0 {
            errors.push("sensors.network.interval_ms must be > 0".to_string());
        }
        if !s.process.enabled && !s.network.enabled {
            errors.push("at least one sensor must be enabled".to_string());
        }

        let c = &self.classifier;
        for (feature, limit) in &c.limits {
            if !limit.is_finite() || *limit <= 0.0 {
                errors.push(format!("classifier.limits.{} must be a positive finite number", feature));
            }
        }
        if c.kind == ClassifierKind::Threshold && c.limits.is_empty() {
            errors.push("classifier.limits must not be empty for the threshold classifier".to_string());
        }
        if !c.sigma.is_finite() || c.sigma <= 0.0 {
            errors.push("classifier.sigma must be a positive finite number".to_string());
        }
        if c.kind == ClassifierKind::Baseline && c.warmup_samples < 2 {
            errors.push("classifier.warmup_samples must be >= 2".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicyKind {
    Block,
    DropOldest,
}

/// Label the consumer assumes when the classifier faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultPolicy {
    AssumeNormal,
    AssumeAnomalous,
}

impl FaultPolicy {
    pub fn label(self) -> Label {
        match self {
            FaultPolicy::AssumeNormal => Label::Normal,
            FaultPolicy::AssumeAnomalous => Label::Anomalous,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_consume_timeout_ms")]
    pub consume_timeout_ms: u64,

    /// 0 = unbounded.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default = "default_overflow_policy")]
    pub overflow_policy: OverflowPolicyKind,

    #[serde(default = "default_push_timeout_ms")]
    pub push_timeout_ms: u64,

    #[serde(default = "default_fault_policy")]
    pub on_classifier_fault: FaultPolicy,
}

fn default_consume_timeout_ms() -> u64 {
    defaults::CONSUME_TIMEOUT_MS
}
fn default_queue_capacity() -> usize {
    defaults::QUEUE_CAPACITY
}
fn default_overflow_policy() -> OverflowPolicyKind {
    OverflowPolicyKind::Block
}
fn default_push_timeout_ms() -> u64 {
    defaults::PUSH_TIMEOUT_MS
}
fn default_fault_policy() -> FaultPolicy {
    FaultPolicy::AssumeNormal
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            consume_timeout_ms: default_consume_timeout_ms(),
            queue_capacity: default_queue_capacity(),
            overflow_policy: default_overflow_policy(),
            push_timeout_ms: default_push_timeout_ms(),
            on_classifier_fault: default_fault_policy(),
        }
    }
}

impl PipelineConfig {
    /// Never zero, so an unvalidated config cannot make the consumer spin.
    pub fn consume_timeout(&self) -> Duration {
        Duration::from_millis(self.consume_timeout_ms.max(1))
    }

    /// Queue capacity, `None` when unbounded.
    pub fn capacity(&self) -> Option<usize> {
        (self.queue_capacity > 0).then_some(self.queue_capacity)
    }

    pub fn overflow(&self) -> OverflowPolicy {
        match self.overflow_policy {
            OverflowPolicyKind::Block => OverflowPolicy::Block {
                timeout: Duration::from_millis(self.push_timeout_ms),
            },
            OverflowPolicyKind::DropOldest => OverflowPolicy::DropOldest,
        }
    }
}

// ============================================================================
// Sensors
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SensorsConfig {
    #[serde(default)]
    pub process: ProcessSensorConfig,

    #[serde(default)]
    pub network: NetworkSensorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSensorConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_process_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "default_process_top_n")]
    pub top_n: usize,
}

fn default_true() -> bool {
    true
}
fn default_process_interval_ms() -> u64 {
    defaults::PROCESS_SAMPLE_INTERVAL_MS
}
fn default_process_top_n() -> usize {
    defaults::PROCESS_TOP_N
}

impl Default for ProcessSensorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: default_process_interval_ms(),
            top_n: default_process_top_n(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSensorConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_network_interval_ms")]
    pub interval_ms: u64,
}

fn default_network_interval_ms() -> u64 {
    defaults::NETWORK_SAMPLE_INTERVAL_MS
}

impl Default for NetworkSensorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: default_network_interval_ms(),
        }
    }
}

// ============================================================================
// Classifier
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierKind {
    /// Fixed per-feature upper limits.
    Threshold,
    /// Online mean/std baseline with a sigma cut-off.
    Baseline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_classifier_kind")]
    pub kind: ClassifierKind,

    /// Feature name -> upper limit (threshold classifier).
    #[serde(default = "default_limits")]
    pub limits: BTreeMap<String, f64>,

    /// Z-score cut-off (baseline classifier).
    #[serde(default = "default_sigma")]
    pub sigma: f64,

    /// Samples per feature before the baseline classifier flags anything.
    #[serde(default = "default_warmup_samples")]
    pub warmup_samples: usize,
}

fn default_classifier_kind() -> ClassifierKind {
    ClassifierKind::Threshold
}
fn default_limits() -> BTreeMap<String, f64> {
    BTreeMap::from([
        ("cpu".to_string(), defaults::CPU_LIMIT_PERCENT),
        ("memory_mb".to_string(), defaults::MEMORY_LIMIT_MB),
        ("rx_bytes_per_sec".to_string(), defaults::THROUGHPUT_LIMIT_BYTES_PER_SEC),
        ("tx_bytes_per_sec".to_string(), defaults::THROUGHPUT_LIMIT_BYTES_PER_SEC),
    ])
}
fn default_sigma() -> f64 {
    defaults::BASELINE_SIGMA
}
fn default_warmup_samples() -> usize {
    defaults::BASELINE_WARMUP_SAMPLES
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            kind: default_classifier_kind(),
            limits: default_limits(),
            sigma: default_sigma(),
            warmup_samples: default_warmup_samples(),
        }
    }
}

// ============================================================================
// Mitigation
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MitigationConfig {
    /// Record intended actions without touching any process.
    #[serde(default = "default_true")]
    pub dry_run: bool,

    /// Process names that are never terminated (case-insensitive).
    #[serde(default = "default_protected")]
    pub protected: Vec<String>,
}

fn default_protected() -> Vec<String> {
    ["init", "systemd", "launchd", "kernel_task", "csrss.exe", "lsass.exe", "services.exe", "wininit.exe", "threatwatch"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for MitigationConfig {
    fn default() -> Self {
        Self {
            dry_run: true,
            protected: default_protected(),
        }
    }
}
