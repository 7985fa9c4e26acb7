//! Fatigue data types
//!
//! This module defines the values flowing through the fatigue pipeline:
//! raw input events, the per-window sample buffer, derived features, baselines
//! and the emitted metrics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::FatigueError;

/// A raw device event delivered by the host
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputEvent {
    /// Key pressed at a monotonic timestamp in milliseconds
    KeyDown { at_ms: f64 },
    /// Pointer moved to a position in CSS pixels
    PointerMove { x: f64, y: f64, at_ms: f64 },
}

impl InputEvent {
    pub fn at_ms(&self) -> f64 {
        match *self {
            InputEvent::KeyDown { at_ms } => at_ms,
            InputEvent::PointerMove { at_ms, .. } => at_ms,
        }
    }
}

/// Raw counters accumulated during one window.
///
/// Drained (read and reset to empty) by the aggregator on every window tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawInputSample {
    /// Inter-keystroke intervals in arrival order
    pub key_latencies_ms: Vec<f64>,
    /// Cumulative Euclidean pointer displacement
    pub pointer_distance_px: f64,
    /// Pointer-move events seen
    pub pointer_move_count: u32,
    /// Sharp turns between consecutive above-noise-floor movements
    pub pointer_direction_changes: u32,
}

impl RawInputSample {
    pub fn is_empty(&self) -> bool {
        self.key_latencies_ms.is_empty() && self.pointer_move_count == 0
    }
}

/// Feature vector reduced from one window of raw input
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowFeatures {
    /// Mean inter-keystroke latency (0 without keystrokes)
    pub mean_latency_ms: f64,
    /// Sample standard deviation of latency (0 with fewer than two samples)
    pub latency_std_dev_ms: f64,
    /// Number of latency samples in the window
    pub latency_sample_count: u32,
    pub pointer_distance_px: f64,
    /// Pointer displacement normalized to px/sec by the nominal window length
    pub pointer_velocity_px_per_sec: f64,
    pub pointer_move_count: u32,
    /// Raw direction-change count
    pub erratic_score: u32,
    /// Keystrokes-per-five scaled to a per-minute rate
    pub typing_speed_wpm: f64,
}

/// The user's best-known alert state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaselineState {
    /// Lowest mean keystroke latency ever observed
    pub latency_baseline_ms: f64,
    /// Lowest keystroke-latency standard deviation ever observed
    pub variance_baseline_ms: f64,
}

impl Default for BaselineState {
    fn default() -> Self {
        Self {
            latency_baseline_ms: crate::config::DEFAULT_LATENCY_BASELINE_MS,
            variance_baseline_ms: crate::config::DEFAULT_VARIANCE_BASELINE_MS,
        }
    }
}

/// Metrics emitted once per window tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FatigueMetrics {
    /// Wall-clock time of computation
    pub timestamp: DateTime<Utc>,
    /// Mean keystroke latency this window (0 without keystrokes)
    pub keystroke_latency_ms: f64,
    /// Keystroke-latency standard deviation this window
    pub latency_std_dev_ms: f64,
    /// Latency samples recorded this window
    pub keystroke_count: u32,
    /// Approximate words per minute
    pub typing_speed_wpm: f64,
    pub mouse_distance_px: f64,
    pub mouse_velocity_px_per_sec: f64,
    /// More than two sharp direction changes in the window
    pub erratic_mouse_movement: bool,
    /// Smoothed, intensity-adjusted fatigue estimate (0-100)
    pub fatigue_score: u8,
}

/// User-selected focus sensitivity, 1 (least) to 10 (most)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Intensity(u8);

impl Intensity {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;
    /// Neutral sensitivity (factor 1.0)
    pub const NEUTRAL: Intensity = Intensity(5);

    pub fn new(level: u8) -> Result<Self, FatigueError> {
        if (Self::MIN..=Self::MAX).contains(&level) {
            Ok(Self(level))
        } else {
            Err(FatigueError::InvalidIntensity(level))
        }
    }

    pub fn level(self) -> u8 {
        self.0
    }

    /// Every intensity from least to most sensitive
    pub fn all() -> impl Iterator<Item = Intensity> {
        (Self::MIN..=Self::MAX).map(Intensity)
    }
}

impl Default for Intensity {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

impl TryFrom<u8> for Intensity {
    type Error = FatigueError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        Self::new(level)
    }
}

impl From<Intensity> for u8 {
    fn from(intensity: Intensity) -> Self {
        intensity.0
    }
}

impl fmt::Display for Intensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intensity_range() {
        assert!(Intensity::new(0).is_err());
        assert!(Intensity::new(11).is_err());
        assert_eq!(Intensity::new(7).unwrap().level(), 7);
        assert_eq!(Intensity::all().count(), 10);
        assert_eq!(Intensity::default(), Intensity::NEUTRAL);
    }

    #[test]
    fn test_intensity_serde_validates() {
        let parsed: Intensity = serde_json::from_str("8").unwrap();
        assert_eq!(parsed.level(), 8);
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "8");
        assert!(serde_json::from_str::<Intensity>("0").is_err());
    }

    #[test]
    fn test_input_event_tagging() {
        let event: InputEvent =
            serde_json::from_str(r#"{"type":"pointer_move","x":10.0,"y":4.0,"at_ms":12.5}"#)
                .unwrap();
        assert_eq!(
            event,
            InputEvent::PointerMove {
                x: 10.0,
                y: 4.0,
                at_ms: 12.5
            }
        );
        assert_eq!(event.at_ms(), 12.5);
    }

    #[test]
    fn test_empty_sample() {
        let mut sample = RawInputSample::default();
        assert!(sample.is_empty());
        sample.pointer_move_count = 1;
        assert!(!sample.is_empty());
    }
}
