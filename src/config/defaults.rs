//! System-wide default constants.
//!
//! Every tunable in `SentinelConfig` falls back to one of these.
//! Grouped by subsystem for easy discovery.

// ============================================================================
// Pipeline
// ============================================================================

/// Consumer wait per queue read before re-checking cancellation (ms).
///
/// Bounds consumer shutdown latency.
pub const CONSUME_TIMEOUT_MS: u64 = 1_000;

/// Feature queue capacity. 0 means unbounded.
pub const QUEUE_CAPACITY: usize = 1_024;

/// How long a sensor push may wait for queue space under the block policy (ms).
pub const PUSH_TIMEOUT_MS: u64 = 250;

/// Decimal places used when rendering scores in alert messages.
pub const SCORE_PRECISION: usize = 3;

// ============================================================================
// Sensors
// ============================================================================

/// Process table sampling cadence (ms).
pub const PROCESS_SAMPLE_INTERVAL_MS: u64 = 2_000;

/// Processes reported per cycle, highest CPU first.
pub const PROCESS_TOP_N: usize = 10;

/// A process first seen less than this long ago is flagged `new_process` (s).
pub const NEW_PROCESS_WINDOW_SECS: u64 = 30;

/// Network interface sampling cadence (ms).
pub const NETWORK_SAMPLE_INTERVAL_MS: u64 = 2_000;

// ============================================================================
// Classifier
// ============================================================================

/// CPU usage limit for the threshold classifier (%).
pub const CPU_LIMIT_PERCENT: f64 = 90.0;

/// Resident memory limit for the threshold classifier (MB).
pub const MEMORY_LIMIT_MB: f64 = 4_096.0;

/// Per-interface throughput limit, each direction (bytes/s). 50 MB/s.
pub const THROUGHPUT_LIMIT_BYTES_PER_SEC: f64 = 50.0 * 1_048_576.0;

/// Z-score at which the baseline classifier flags an observation.
pub const BASELINE_SIGMA: f64 = 3.0;

/// Samples per feature before the baseline classifier starts flagging.
pub const BASELINE_WARMUP_SAMPLES: usize = 30;

/// Floor applied to the learned standard deviation (avoids divide-by-zero
/// on flat signals).
pub const BASELINE_MIN_STD: f64 = 1e-6;

// ============================================================================
// Presentation
// ============================================================================

/// Interval at which the CLI polls the alert log (ms).
pub const LOG_POLL_INTERVAL_MS: u64 = 1_500;
