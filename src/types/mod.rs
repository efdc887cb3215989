//! Shared data structures for the monitoring pipeline
//!
//! - `FeatureObservation`: produced by sensors, consumed by the classifier
//! - `ClassificationResult`: classifier verdict (label + score)
//! - `LogEntry`: append-only alert/error record read by the presentation layer

mod classification;
mod log;
mod observation;

pub use classification::*;
pub use log::*;
pub use observation::*;
