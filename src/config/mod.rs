//! Sentinel Configuration Module
//!
//! Operator-tunable settings loaded from TOML.
//!
//! ## Loading Order
//!
//! 1. `THREATWATCH_CONFIG` environment variable (path to TOML file)
//! 2. `threatwatch.toml` in the current working directory
//! 3. Built-in defaults (`config::defaults`)
//!
//! There is no process-wide config: the loaded `SentinelConfig` is passed
//! explicitly to whatever needs it, and several pipelines may run side by
//! side with different settings.

mod sentinel_config;
pub mod defaults;

pub use sentinel_config::*;
