//! Fatigue scoring
//!
//! Fuses a window's features with the personal baselines into one bounded score:
//!
//! ```text
//! raw = 0.40 * slowing% + 0.30 * jitter% + sluggish(10) + erratic(20) + stagnation(5)
//! adjusted = clamp(raw * sensitivity(intensity), 0, 100)
//! score = round(mean(last 5 adjusted))
//! ```

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::config::{EngineConfig, DEFAULT_BASELINE_FLOOR_MS, DEFAULT_SMOOTHING_WINDOW};
use crate::fatigue::types::{BaselineState, Intensity, WindowFeatures};

/// Weight of the latency-slowing term
const COGNITIVE_SLOWING_WEIGHT: f64 = 0.40;

/// Weight of the latency-jitter term
const MOTOR_INCONSISTENCY_WEIGHT: f64 = 0.30;

/// Pointer velocity (px/sec) below which present movement counts as sluggish
const SLUGGISH_VELOCITY_PX_PER_SEC: f64 = 50.0;
const SLUGGISH_POINTER_BONUS: f64 = 10.0;

/// Direction changes above which the trajectory counts as erratic
pub const ERRATIC_DIRECTION_CHANGES: u32 = 2;
const ERRATIC_POINTER_BONUS: f64 = 20.0;

/// Pointer moves below which a keystroke-free window counts as stagnant
const STAGNATION_MAX_POINTER_MOVES: u32 = 5;
const STAGNATION_BONUS: f64 = 5.0;

const MAX_SCORE: f64 = 100.0;

/// Multiplier applied to the raw score: 0.84 at intensity 1, 1.0 at 5, 1.2 at 10
pub fn sensitivity_factor(intensity: Intensity) -> f64 {
    1.0 + ((intensity.level() as f64 - 5.0) / 5.0) * 0.2
}

/// Per-term contributions behind one window score
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub cognitive_slowing: f64,
    pub motor_inconsistency: f64,
    pub sluggish_pointer: f64,
    pub erratic_pointer: f64,
    pub stagnation: f64,
    /// Sum of all contributions
    pub raw_score: f64,
    pub sensitivity_factor: f64,
    /// Raw score after sensitivity and clamping, before smoothing
    pub adjusted_score: f64,
    /// Rolling mean of recent adjusted scores, rounded
    pub smoothed_score: u8,
}

impl ScoreBreakdown {
    pub fn is_erratic(&self) -> bool {
        self.erratic_pointer > 0.0
    }
}

/// Stateful scorer holding the smoothing history for one tracking run
#[derive(Debug, Clone)]
pub struct FatigueScorer {
    history: VecDeque<f64>,
    smoothing_window: usize,
    baseline_floor_ms: f64,
}

impl Default for FatigueScorer {
    fn default() -> Self {
        Self::new(DEFAULT_SMOOTHING_WINDOW, DEFAULT_BASELINE_FLOOR_MS)
    }
}

impl FatigueScorer {
    pub fn new(smoothing_window: usize, baseline_floor_ms: f64) -> Self {
        let smoothing_window = smoothing_window.max(1);
        Self {
            history: VecDeque::with_capacity(smoothing_window + 1),
            smoothing_window,
            baseline_floor_ms,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.smoothing_window, config.baseline_floor_ms)
    }

    /// Score one window and fold it into the smoothing history
    pub fn score(
        &mut self,
        features: &WindowFeatures,
        baselines: &BaselineState,
        intensity: Intensity,
    ) -> ScoreBreakdown {
        let mut breakdown = self.contributions(features, baselines);

        breakdown.sensitivity_factor = sensitivity_factor(intensity);
        breakdown.adjusted_score =
            (breakdown.raw_score * breakdown.sensitivity_factor).clamp(0.0, MAX_SCORE);

        self.history.push_back(breakdown.adjusted_score);
        while self.history.len() > self.smoothing_window {
            self.history.pop_front();
        }
        breakdown.smoothed_score = self.smoothed();

        breakdown
    }

    /// Unsmoothed, unadjusted contributions for a window
    pub fn contributions(
        &self,
        features: &WindowFeatures,
        baselines: &BaselineState,
    ) -> ScoreBreakdown {
        let cognitive_slowing = excess_pct(
            features.mean_latency_ms,
            baselines.latency_baseline_ms,
            self.baseline_floor_ms,
        ) * COGNITIVE_SLOWING_WEIGHT;

        let motor_inconsistency = excess_pct(
            features.latency_std_dev_ms,
            baselines.variance_baseline_ms,
            self.baseline_floor_ms,
        ) * MOTOR_INCONSISTENCY_WEIGHT;

        let sluggish_pointer = if features.pointer_velocity_px_per_sec
            < SLUGGISH_VELOCITY_PX_PER_SEC
            && features.pointer_move_count > 0
        {
            SLUGGISH_POINTER_BONUS
        } else {
            0.0
        };

        let erratic_pointer = if features.erratic_score > ERRATIC_DIRECTION_CHANGES {
            ERRATIC_POINTER_BONUS
        } else {
            0.0
        };

        let stagnation = if features.latency_sample_count == 0
            && features.pointer_move_count < STAGNATION_MAX_POINTER_MOVES
        {
            STAGNATION_BONUS
        } else {
            0.0
        };

        ScoreBreakdown {
            cognitive_slowing,
            motor_inconsistency,
            sluggish_pointer,
            erratic_pointer,
            stagnation,
            raw_score: cognitive_slowing
                + motor_inconsistency
                + sluggish_pointer
                + erratic_pointer
                + stagnation,
            ..ScoreBreakdown::default()
        }
    }

    fn smoothed(&self) -> u8 {
        if self.history.is_empty() {
            return 0;
        }
        let mean = self.history.iter().sum::<f64>() / self.history.len() as f64;
        mean.round().clamp(0.0, MAX_SCORE) as u8
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Drop the smoothing history
    pub fn reset(&mut self) {
        self.history.clear();
    }
}

/// Percentage by which `value` exceeds `baseline`, zero when at or below it.
///
/// The baseline is floored before dividing so a degenerate stored value cannot
/// divide by zero.
fn excess_pct(value: f64, baseline: f64, floor: f64) -> f64 {
    let reference = if baseline.is_finite() {
        baseline.max(floor)
    } else {
        floor
    };
    (value - reference).max(0.0) / reference * 100.0
}
