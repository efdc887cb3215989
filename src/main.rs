//! threatwatch - real-time host threat monitor
//!
//! Samples the process table and network interfaces, classifies every
//! observation and (optionally) terminates offending processes. Alerts are
//! printed as they arrive.
//!
//! # Usage
//!
//! ```bash
//! # Monitor this host until Ctrl+C (mitigation is dry-run)
//! threatwatch
//!
//! # Scripted demo scenario for 20 seconds, then write a JSON report
//! threatwatch --demo --duration 20 --report report.json
//!
//! # Actually terminate flagged processes
//! threatwatch --enforce
//! ```
//!
//! # Environment Variables
//!
//! - `THREATWATCH_CONFIG`: Path to a TOML config file
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use threatwatch::acquisition::{ReplaySensor, ReplayStep, Sensor};
use threatwatch::config::{defaults, SentinelConfig};
use threatwatch::detection::build_classifier;
use threatwatch::mitigation::ProcessMitigator;
use threatwatch::{FeatureObservation, PipelineOrchestrator};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "threatwatch")]
#[command(about = "Real-time host threat monitoring pipeline")]
#[command(version)]
struct CliArgs {
    /// Path to a TOML config file (overrides THREATWATCH_CONFIG / ./threatwatch.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Stop after this many seconds (0 = run until Ctrl+C)
    #[arg(short, long, default_value = "0")]
    duration: u64,

    /// Interval between alert log polls, in milliseconds
    #[arg(long, default_value_t = defaults::LOG_POLL_INTERVAL_MS)]
    poll_ms: u64,

    /// Write a JSON report to this path on exit
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,

    /// Terminate flagged processes instead of only reporting them
    #[arg(long)]
    enforce: bool,

    /// Replay a scripted scenario instead of sampling the host
    #[arg(long)]
    demo: bool,

    /// Emit operational logs as JSON
    #[arg(long)]
    log_json: bool,
}

// ============================================================================
// Setup
// ============================================================================

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

fn load_config(args: &CliArgs) -> Result<SentinelConfig> {
    let mut config = match &args.config {
        Some(path) => SentinelConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => SentinelConfig::load(),
    };
    if args.enforce {
        config.mitigation.dry_run = false;
    }
    Ok(config)
}

/// Process spikes, a burst of outbound traffic and one flaky sample.
fn demo_sensors() -> Vec<Box<dyn Sensor>> {
    let process = |pid: u32, name: &str, cpu: f64, new_process: bool| {
        FeatureObservation::new("process")
            .with("pid", pid)
            .with("name", name)
            .with("cpu", cpu)
            .with("memory_mb", 120.0)
            .with("new_process", new_process)
    };
    let network = |tx: f64| {
        FeatureObservation::new("network")
            .with("interface", "eth0")
            .with("rx_bytes_per_sec", 80_000.0)
            .with("tx_bytes_per_sec", tx)
            .with("rx_packets", 60_u32)
            .with("tx_packets", 45_u32)
    };

    vec![
        Box::new(
            ReplaySensor::new(
                "process",
                Duration::from_millis(800),
                vec![
                    ReplayStep::Emit(vec![process(2101, "nginx", 12.0, false)]),
                    ReplayStep::Emit(vec![process(2102, "postgres", 18.5, false)]),
                    ReplayStep::Emit(vec![process(4_000_001, "xmrig", 97.0, true)]),
                    ReplayStep::Fail("process table busy".to_string()),
                    ReplayStep::Emit(vec![process(2101, "nginx", 9.0, false)]),
                ],
            )
            .repeat(),
        ),
        Box::new(
            ReplaySensor::new(
                "network",
                Duration::from_millis(1_200),
                vec![
                    ReplayStep::Emit(vec![network(40_000.0)]),
                    ReplayStep::Emit(vec![network(90_000_000.0)]),
                    ReplayStep::Emit(vec![network(35_000.0)]),
                ],
            )
            .repeat(),
        ),
    ]
}

fn print_new_entries(orchestrator: &PipelineOrchestrator, cursor: &mut usize) {
    let (entries, next) = orchestrator.log_since(*cursor);
    for entry in entries {
        println!("{}", entry);
    }
    *cursor = next;
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(args.log_json);

    let config = load_config(&args)?;
    config.validate().context("Invalid configuration")?;

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  threatwatch - real-time host threat monitor");
    info!(
        "  classifier: {:?} | mitigation: {}",
        config.classifier.kind,
        if config.mitigation.dry_run { "dry-run" } else { "ENFORCING" }
    );
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let orchestrator = if args.demo {
        info!("Input: scripted demo scenario");
        PipelineOrchestrator::new(
            config.pipeline.clone(),
            demo_sensors,
            build_classifier(&config.classifier),
            Arc::new(ProcessMitigator::from_config(&config.mitigation)),
        )
    } else {
        info!("Input: host process table and network interfaces");
        PipelineOrchestrator::from_config(&config)
    };

    orchestrator.start().context("Failed to start pipeline")?;

    let deadline = (args.duration > 0).then(|| tokio::time::Instant::now() + Duration::from_secs(args.duration));
    let mut poll = tokio::time::interval(Duration::from_millis(args.poll_ms.max(10)));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut cursor = 0usize;

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    warn!(error = %e, "Failed to listen for Ctrl+C");
                }
                info!("Received Ctrl+C, initiating shutdown...");
                break;
            }
            _ = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            } => {
                info!(seconds = args.duration, "Run duration reached, shutting down");
                break;
            }
            _ = poll.tick() => print_new_entries(&orchestrator, &mut cursor),
        }
    }

    orchestrator.stop().await;
    print_new_entries(&orchestrator, &mut cursor);

    let stats = orchestrator.stats();
    info!(
        classified = stats.observations_classified,
        anomalies = stats.anomalies,
        errors = stats.errors,
        mitigations = stats.mitigations_applied,
        discarded = stats.observations_discarded,
        "Pipeline summary"
    );

    if let Some(path) = &args.report {
        let report = orchestrator.report();
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
        info!(path = %path.display(), "Report written");
    }

    info!("threatwatch shutdown complete");
    Ok(())
}
