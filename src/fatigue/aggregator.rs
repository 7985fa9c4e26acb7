//! Window aggregation
//!
//! Reduces one drained [`RawInputSample`] into a [`WindowFeatures`] vector.
//! Rates are normalized by the nominal window length, not by measured wall time.

use crate::config::EngineConfig;
use crate::fatigue::types::{RawInputSample, WindowFeatures};

/// Keystrokes counted as one word by the WPM heuristic
const KEYSTROKES_PER_WORD: f64 = 5.0;

/// Feature reducer for a fixed window length
#[derive(Debug, Clone, Copy)]
pub struct WindowAggregator {
    window_size_ms: u64,
}

impl WindowAggregator {
    pub fn new(window_size_ms: u64) -> Self {
        Self {
            window_size_ms: window_size_ms.max(1),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.window_size_ms)
    }

    pub fn window_size_ms(&self) -> u64 {
        self.window_size_ms
    }

    /// Reduce a sample. Empty samples yield an all-zero feature vector.
    pub fn aggregate(&self, sample: &RawInputSample) -> WindowFeatures {
        let latencies = &sample.key_latencies_ms;
        let per_second = 1000.0 / self.window_size_ms as f64;
        let per_minute = 60_000.0 / self.window_size_ms as f64;

        WindowFeatures {
            mean_latency_ms: mean(latencies),
            latency_std_dev_ms: sample_std_dev(latencies),
            latency_sample_count: latencies.len() as u32,
            pointer_distance_px: sample.pointer_distance_px,
            pointer_velocity_px_per_sec: sample.pointer_distance_px * per_second,
            pointer_move_count: sample.pointer_move_count,
            erratic_score: sample.pointer_direction_changes,
            typing_speed_wpm: latencies.len() as f64 * per_minute / KEYSTROKES_PER_WORD,
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation with Bessel's correction (n - 1 divisor)
fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mu = mean(values);
    let variance = values.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}
