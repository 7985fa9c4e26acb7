//! Input sampling
//!
//! Converts raw key and pointer events into the running counters of a
//! [`RawInputSample`], with constant work per event.

use std::f64::consts::FRAC_PI_4;

use crate::config::{EngineConfig, DEFAULT_POINTER_NOISE_FLOOR_PX};
use crate::fatigue::types::{InputEvent, RawInputSample};

/// Passive accumulator for one tracking run.
///
/// The previous keystroke time and pointer position survive window drains, so a
/// keystroke pair straddling a window boundary still yields one latency sample.
#[derive(Debug, Clone)]
pub struct InputSampler {
    sample: RawInputSample,
    last_key_at_ms: Option<f64>,
    last_pointer: Option<(f64, f64)>,
    last_angle: Option<f64>,
    noise_floor_px: f64,
    direction_change_rad: f64,
}

impl Default for InputSampler {
    fn default() -> Self {
        Self::new(DEFAULT_POINTER_NOISE_FLOOR_PX, FRAC_PI_4)
    }
}

impl InputSampler {
    pub fn new(noise_floor_px: f64, direction_change_rad: f64) -> Self {
        Self {
            sample: RawInputSample::default(),
            last_key_at_ms: None,
            last_pointer: None,
            last_angle: None,
            noise_floor_px,
            direction_change_rad,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.pointer_noise_floor_px, config.direction_change_rad)
    }

    pub fn record(&mut self, event: InputEvent) {
        match event {
            InputEvent::KeyDown { at_ms } => self.on_key_down(at_ms),
            InputEvent::PointerMove { x, y, .. } => self.on_pointer_move(x, y),
        }
    }

    pub fn on_key_down(&mut self, at_ms: f64) {
        if let Some(previous) = self.last_key_at_ms {
            // Out-of-order timestamps would produce negative latencies
            self.sample.key_latencies_ms.push((at_ms - previous).max(0.0));
        }
        self.last_key_at_ms = Some(at_ms);
    }

    pub fn on_pointer_move(&mut self, x: f64, y: f64) {
        self.sample.pointer_move_count += 1;

        if let Some((prev_x, prev_y)) = self.last_pointer {
            let dx = x - prev_x;
            let dy = y - prev_y;
            let distance = dx.hypot(dy);
            self.sample.pointer_distance_px += distance;

            if distance > self.noise_floor_px {
                let angle = dy.atan2(dx);
                if let Some(previous_angle) = self.last_angle {
                    if (angle - previous_angle).abs() > self.direction_change_rad {
                        self.sample.pointer_direction_changes += 1;
                    }
                }
                self.last_angle = Some(angle);
            }
        }

        self.last_pointer = Some((x, y));
    }

    /// Take the accumulated counters, leaving an empty sample behind
    pub fn drain(&mut self) -> RawInputSample {
        std::mem::take(&mut self.sample)
    }

    /// Forget everything, including the previous-event references
    pub fn reset(&mut self) {
        self.sample = RawInputSample::default();
        self.last_key_at_ms = None;
        self.last_pointer = None;
        self.last_angle = None;
    }

    pub fn pending(&self) -> &RawInputSample {
        &self.sample
    }
}
