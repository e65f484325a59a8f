//! Engine statistics

pub mod metrics;

pub use metrics::{EngineCounters, ServerStats, StreamStats};
