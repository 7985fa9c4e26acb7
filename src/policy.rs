//! Intervention policy
//!
//! A pure decision over `(score, intensity, elapsed)`. Higher intensity means a
//! more sensitive user: a lower fatigue threshold and a shorter session cap.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::fatigue::types::{FatigueMetrics, Intensity};

/// Threshold used for an unknown intensity
pub const DEFAULT_CRITICAL_THRESHOLD: u8 = 90;

/// Session cap used for an unknown intensity
pub const DEFAULT_TIME_CAP_MINUTES: u32 = 60;

/// Score at or above which a session pauses for fatigue.
///
/// Intensities 1-3 map to 100, which the smoother practically never reaches:
/// those sessions only stop manually.
pub fn critical_threshold(level: u8) -> u8 {
    match level {
        10 => 65,
        9 => 70,
        8 => 75,
        7 => 80,
        6 => 85,
        5 => 90,
        4 => 95,
        1..=3 => 100,
        _ => DEFAULT_CRITICAL_THRESHOLD,
    }
}

/// Maximum session length in minutes before a forced recovery break
pub fn time_cap_minutes(level: u8) -> u32 {
    match level {
        10 => 5,
        9 => 10,
        8 => 15,
        7 => 20,
        6 => 25,
        5 => 30,
        4 => 40,
        3 => 50,
        2 => 60,
        1 => 70,
        _ => DEFAULT_TIME_CAP_MINUTES,
    }
}

/// Why a session was paused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InterventionReason {
    Fatigue,
    TimeCap,
}

/// Outcome of one policy evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PolicyAction {
    None,
    PauseForFatigue { score: u8, threshold: u8 },
    PauseForTimeCap { elapsed_secs: u64, cap_secs: u64 },
}

impl PolicyAction {
    pub fn reason(&self) -> Option<InterventionReason> {
        match self {
            PolicyAction::None => None,
            PolicyAction::PauseForFatigue { .. } => Some(InterventionReason::Fatigue),
            PolicyAction::PauseForTimeCap { .. } => Some(InterventionReason::TimeCap),
        }
    }

    pub fn fires(&self) -> bool {
        !matches!(self, PolicyAction::None)
    }
}

/// Stateless policy; the only knob is whether the time cap applies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterventionPolicy {
    pub time_cap_enabled: bool,
}

impl Default for InterventionPolicy {
    fn default() -> Self {
        Self {
            time_cap_enabled: true,
        }
    }
}

impl InterventionPolicy {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            time_cap_enabled: config.time_cap_enabled,
        }
    }

    /// Fatigue is checked first; the time cap only when fatigue does not fire.
    ///
    /// `score` is `None` on elapsed-time ticks, where only the cap is relevant.
    pub fn evaluate(
        &self,
        score: Option<u8>,
        intensity: Intensity,
        elapsed_secs: u64,
    ) -> PolicyAction {
        if let Some(score) = score {
            let threshold = critical_threshold(intensity.level());
            if score >= threshold {
                return PolicyAction::PauseForFatigue { score, threshold };
            }
        }

        if self.time_cap_enabled {
            let cap_secs = time_cap_minutes(intensity.level()) as u64 * 60;
            if elapsed_secs >= cap_secs {
                return PolicyAction::PauseForTimeCap {
                    elapsed_secs,
                    cap_secs,
                };
            }
        }

        PolicyAction::None
    }
}

/// A fired intervention, carrying everything the UI needs to explain it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intervention {
    pub reason: InterventionReason,
    pub triggered_at: DateTime<Utc>,
    /// Latest fatigue score (0 if no window has been scored yet)
    pub score: u8,
    pub intensity: Intensity,
    pub threshold: u8,
    pub elapsed_secs: u64,
    pub time_cap_secs: u64,
    /// Metrics sample that triggered the pause, if any
    pub metrics: Option<FatigueMetrics>,
    pub recommend_recovery: bool,
}

impl Intervention {
    pub fn from_action(
        action: PolicyAction,
        intensity: Intensity,
        elapsed_secs: u64,
        metrics: Option<FatigueMetrics>,
        triggered_at: DateTime<Utc>,
    ) -> Option<Self> {
        let reason = action.reason()?;
        let score = match action {
            PolicyAction::PauseForFatigue { score, .. } => score,
            _ => metrics.as_ref().map(|m| m.fatigue_score).unwrap_or(0),
        };
        Some(Self {
            reason,
            triggered_at,
            score,
            intensity,
            threshold: critical_threshold(intensity.level()),
            elapsed_secs,
            time_cap_secs: time_cap_minutes(intensity.level()) as u64 * 60,
            metrics,
            recommend_recovery: true,
        })
    }

    /// Human-readable explanation
    pub fn message(&self) -> String {
        match self.reason {
            InterventionReason::Fatigue => format!(
                "Fatigue score {} reached the limit of {} for intensity {}. Take a recovery break.",
                self.score, self.threshold, self.intensity
            ),
            InterventionReason::TimeCap => format!(
                "You have focused for {} minutes, the maximum for intensity {}. \
                 Take a recovery break.",
                self.elapsed_secs / 60,
                self.intensity
            ),
        }
    }
}
