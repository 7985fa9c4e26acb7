//! Fatigue inference module
//!
//! This module turns passive keyboard and pointer telemetry into a smoothed
//! 0-100 fatigue score, personalized by self-calibrating baselines.
//!
//! Pipeline: Input events → Sampler → Aggregator → Scorer (+ Baselines) → FatigueMetrics

pub mod aggregator;
pub mod baseline;
pub mod sampler;
pub mod scorer;
pub mod tracker;
pub mod types;

pub use aggregator::WindowAggregator;
pub use baseline::{BaselineKey, BaselineStore};
pub use sampler::InputSampler;
pub use scorer::{sensitivity_factor, FatigueScorer, ScoreBreakdown};
pub use tracker::{FatigueTracker, MetricsCallback, WindowReport};
pub use types::{
    BaselineState, FatigueMetrics, InputEvent, Intensity, RawInputSample, WindowFeatures,
};
