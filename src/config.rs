//! Engine configuration
//!
//! Tunables for windowing, pointer filtering, baseline defaults and session timers.
//! Every field falls back to its default, so partial JSON documents are accepted.

use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_4;

use crate::error::FatigueError;

/// Default aggregation window (5 seconds)
pub const DEFAULT_WINDOW_SIZE_MS: u64 = 5000;

/// Default number of window scores averaged by the smoother
pub const DEFAULT_SMOOTHING_WINDOW: usize = 5;

/// Pointer moves at or below this displacement carry no direction information
pub const DEFAULT_POINTER_NOISE_FLOOR_PX: f64 = 5.0;

/// Default latency baseline before any real data arrives
pub const DEFAULT_LATENCY_BASELINE_MS: f64 = 120.0;

/// Default latency-jitter baseline before any real data arrives
pub const DEFAULT_VARIANCE_BASELINE_MS: f64 = 30.0;

/// Baselines are never used as divisors below this value
pub const DEFAULT_BASELINE_FLOOR_MS: f64 = 1.0;

/// Elapsed-time accrual cadence
pub const DEFAULT_ELAPSED_TICK_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Length of one aggregation window in milliseconds
    pub window_size_ms: u64,
    /// Number of window scores in the rolling smoother
    pub smoothing_window: usize,
    /// Minimum pointer displacement (px) for a move to count toward direction changes
    pub pointer_noise_floor_px: f64,
    /// Angular delta (radians) above which consecutive moves count as a direction change
    pub direction_change_rad: f64,
    /// Latency baseline used until a better one is observed
    pub default_latency_baseline_ms: f64,
    /// Jitter baseline used until a better one is observed
    pub default_variance_baseline_ms: f64,
    /// Lower bound applied to baselines before dividing by them
    pub baseline_floor_ms: f64,
    /// Elapsed-time timer period in milliseconds
    pub elapsed_tick_ms: u64,
    /// Whether the per-intensity maximum session duration is enforced
    pub time_cap_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_size_ms: DEFAULT_WINDOW_SIZE_MS,
            smoothing_window: DEFAULT_SMOOTHING_WINDOW,
            pointer_noise_floor_px: DEFAULT_POINTER_NOISE_FLOOR_PX,
            direction_change_rad: FRAC_PI_4,
            default_latency_baseline_ms: DEFAULT_LATENCY_BASELINE_MS,
            default_variance_baseline_ms: DEFAULT_VARIANCE_BASELINE_MS,
            baseline_floor_ms: DEFAULT_BASELINE_FLOOR_MS,
            elapsed_tick_ms: DEFAULT_ELAPSED_TICK_MS,
            time_cap_enabled: true,
        }
    }
}

impl EngineConfig {
    /// Load and validate a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, FatigueError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn validate(&self) -> Result<(), FatigueError> {
        if self.window_size_ms == 0 {
            return Err(FatigueError::InvalidConfig(
                "window_size_ms must be greater than zero".to_string(),
            ));
        }
        if self.smoothing_window == 0 {
            return Err(FatigueError::InvalidConfig(
                "smoothing_window must be at least 1".to_string(),
            ));
        }
        if self.elapsed_tick_ms == 0 {
            return Err(FatigueError::InvalidConfig(
                "elapsed_tick_ms must be greater than zero".to_string(),
            ));
        }
        if !(self.baseline_floor_ms > 0.0) {
            return Err(FatigueError::InvalidConfig(
                "baseline_floor_ms must be positive".to_string(),
            ));
        }
        if !(self.default_latency_baseline_ms > 0.0) || !(self.default_variance_baseline_ms > 0.0)
        {
            return Err(FatigueError::InvalidConfig(
                "default baselines must be positive".to_string(),
            ));
        }
        if self.pointer_noise_floor_px < 0.0 || self.direction_change_rad < 0.0 {
            return Err(FatigueError::InvalidConfig(
                "pointer thresholds must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_engine_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.window_size_ms, 5000);
        assert_eq!(config.smoothing_window, 5);
        assert_eq!(config.default_latency_baseline_ms, 120.0);
        assert_eq!(config.default_variance_baseline_ms, 30.0);
        assert!((config.direction_change_rad - std::f64::consts::FRAC_PI_4).abs() < 1e-12);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = EngineConfig::from_json(r#"{"window_size_ms": 10000}"#).unwrap();
        assert_eq!(config.window_size_ms, 10000);
        assert_eq!(config.smoothing_window, 5);
        assert!(config.time_cap_enabled);
    }

    #[test]
    fn test_rejects_zero_window() {
        let result = EngineConfig::from_json(r#"{"window_size_ms": 0}"#);
        assert!(matches!(result, Err(FatigueError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_non_positive_floor() {
        let config = EngineConfig {
            baseline_floor_ms: 0.0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            EngineConfig::from_json("not json"),
            Err(FatigueError::Json(_))
        ));
    }
}
