//! Fatigue tracking orchestration
//!
//! [`FatigueTracker`] is an explicit two-state machine (idle, tracking). Each
//! transition owns its resources: `start` attaches one listener set and one window
//! timer through the [`TrackingHost`], `stop` releases them and discards any
//! partially accumulated window.
//!
//! Pipeline per window tick: sampler drain, aggregator, scorer, baseline update, then
//! the metrics callback.

use chrono::{DateTime, Utc};
use log::{debug, info};
use std::fmt;
use std::rc::Rc;

use crate::config::EngineConfig;
use crate::fatigue::aggregator::WindowAggregator;
use crate::fatigue::baseline::BaselineStore;
use crate::fatigue::sampler::InputSampler;
use crate::fatigue::scorer::{FatigueScorer, ScoreBreakdown, ERRATIC_DIRECTION_CHANGES};
use crate::fatigue::types::{BaselineState, FatigueMetrics, InputEvent, Intensity, WindowFeatures};
use crate::host::{ListenerHandle, TimerHandle, TimerPurpose, TrackingHost};

/// Receives every emitted metrics sample, synchronously from the window tick
pub type MetricsCallback = Rc<dyn Fn(&FatigueMetrics)>;

/// Resources held while tracking
struct ActiveTracking {
    listener: ListenerHandle,
    window_timer: TimerHandle,
    intensity: Intensity,
    on_metrics: MetricsCallback,
}

/// Result of one window tick
#[derive(Debug, Clone, PartialEq)]
pub struct WindowReport {
    pub metrics: FatigueMetrics,
    pub features: WindowFeatures,
    pub breakdown: ScoreBreakdown,
}

/// Owns every piece of mutable fatigue state for one user.
pub struct FatigueTracker<H: TrackingHost> {
    host: H,
    sampler: InputSampler,
    aggregator: WindowAggregator,
    scorer: FatigueScorer,
    baselines: BaselineStore,
    active: Option<ActiveTracking>,
    windows_emitted: u64,
}

impl<H: TrackingHost> FatigueTracker<H> {
    pub fn new(host: H, baselines: BaselineStore, config: &EngineConfig) -> Self {
        Self {
            host,
            sampler: InputSampler::from_config(config),
            aggregator: WindowAggregator::from_config(config),
            scorer: FatigueScorer::from_config(config),
            baselines,
            active: None,
            windows_emitted: 0,
        }
    }

    /// Begin tracking. A no-op while already tracking.
    ///
    /// The intensity is fixed for the run; call [`stop`](Self::stop) then `start`
    /// to apply a new one. Returns whether tracking was started by this call.
    pub fn start(&mut self, on_metrics: MetricsCallback, intensity: Intensity) -> bool {
        if self.active.is_some() {
            return false;
        }

        let baselines = self.baselines.load();
        self.sampler.reset();
        self.scorer.reset();

        let listener = self.host.attach_input();
        let window_timer = self
            .host
            .schedule_repeating(TimerPurpose::WindowTick, self.aggregator.window_size_ms());

        info!(
            "Fatigue tracking started (intensity {}, baselines {:.1}ms/{:.1}ms)",
            intensity, baselines.latency_baseline_ms, baselines.variance_baseline_ms
        );

        self.active = Some(ActiveTracking {
            listener,
            window_timer,
            intensity,
            on_metrics,
        });
        true
    }

    /// Stop tracking and release host resources. A no-op while idle.
    pub fn stop(&mut self) -> bool {
        let Some(active) = self.active.take() else {
            return false;
        };

        self.host.cancel_timer(active.window_timer);
        self.host.detach_input(active.listener);
        self.sampler.reset();
        self.scorer.reset();

        info!("Fatigue tracking stopped");
        true
    }

    /// Feed one input event. Ignored while idle.
    pub fn record(&mut self, event: InputEvent) {
        if self.active.is_some() {
            self.sampler.record(event);
        }
    }

    /// Handle a window-timer fire, emitting one metrics sample.
    ///
    /// Emits even for windows without input. Returns `None` while idle.
    pub fn on_window_tick(&mut self, now: DateTime<Utc>) -> Option<WindowReport> {
        let (intensity, on_metrics) = {
            let active = self.active.as_ref()?;
            (active.intensity, Rc::clone(&active.on_metrics))
        };

        let sample = self.sampler.drain();
        let features = self.aggregator.aggregate(&sample);
        let baselines = self.baselines.current();
        let breakdown = self.scorer.score(&features, &baselines, intensity);

        if features.latency_sample_count > 0 {
            // A zero jitter candidate is rejected by the store's positivity guard
            self.baselines
                .observe(features.mean_latency_ms, features.latency_std_dev_ms);
        }

        let metrics = FatigueMetrics {
            timestamp: now,
            keystroke_latency_ms: features.mean_latency_ms,
            latency_std_dev_ms: features.latency_std_dev_ms,
            keystroke_count: features.latency_sample_count,
            typing_speed_wpm: features.typing_speed_wpm,
            mouse_distance_px: features.pointer_distance_px,
            mouse_velocity_px_per_sec: features.pointer_velocity_px_per_sec,
            erratic_mouse_movement: features.erratic_score > ERRATIC_DIRECTION_CHANGES,
            fatigue_score: breakdown.smoothed_score,
        };

        self.windows_emitted += 1;
        debug!(
            "Window {} scored {} (raw {:.1}, {} keystrokes)",
            self.windows_emitted,
            metrics.fatigue_score,
            breakdown.raw_score,
            features.latency_sample_count
        );

        on_metrics(&metrics);

        Some(WindowReport {
            metrics,
            features,
            breakdown,
        })
    }

    pub fn is_tracking(&self) -> bool {
        self.active.is_some()
    }

    /// Intensity of the current run
    pub fn intensity(&self) -> Option<Intensity> {
        self.active.as_ref().map(|a| a.intensity)
    }

    pub fn baselines(&self) -> BaselineState {
        self.baselines.current()
    }

    pub fn windows_emitted(&self) -> u64 {
        self.windows_emitted
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }
}

impl<H: TrackingHost> fmt::Debug for FatigueTracker<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FatigueTracker")
            .field("tracking", &self.is_tracking())
            .field("intensity", &self.intensity())
            .field("baselines", &self.baselines.current())
            .field("windows_emitted", &self.windows_emitted)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::SimulatedHost;
    use crate::fatigue::baseline::LATENCY_BASELINE_KEY;
    use crate::storage::tests::ReadOnlyStore;
    use crate::storage::{KeyValueStore, MemoryStore};
    use chrono::TimeZone;
    use proptest::prelude::*;
    use std::cell::RefCell;

    fn tracker() -> FatigueTracker<SimulatedHost> {
        let config = EngineConfig::default();
        let baselines = BaselineStore::new(MemoryStore::shared(), &config);
        FatigueTracker::new(SimulatedHost::new(), baselines, &config)
    }

    fn collector() -> (Rc<RefCell<Vec<FatigueMetrics>>>, MetricsCallback) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let callback: MetricsCallback = Rc::new(move |m: &FatigueMetrics| {
            sink.borrow_mut().push(m.clone());
        });
        (seen, callback)
    }

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
    }

    fn neutral() -> Intensity {
        Intensity::NEUTRAL
    }

    #[test]
    fn test_start_is_idempotent() {
        let mut tracker = tracker();
        let (_, callback) = collector();

        assert!(tracker.start(Rc::clone(&callback), neutral()));
        assert!(!tracker.start(callback, Intensity::new(9).unwrap()));

        assert_eq!(tracker.host().attach_calls(), 1);
        assert_eq!(tracker.host().active_listeners(), 1);
        assert_eq!(tracker.host().active_timers(TimerPurpose::WindowTick), 1);
        assert_eq!(tracker.intensity(), Some(neutral()));
    }

    #[test]
    fn test_stop_when_idle_is_noop() {
        let mut tracker = tracker();
        assert!(!tracker.stop());

        let (_, callback) = collector();
        tracker.start(callback, neutral());
        assert!(tracker.stop());
        assert!(!tracker.stop());
        assert_eq!(tracker.host().active_listeners(), 0);
        assert_eq!(tracker.host().active_timers(TimerPurpose::WindowTick), 0);
    }

    #[test]
    fn test_idle_tracker_ignores_input_and_ticks() {
        let mut tracker = tracker();
        tracker.record(InputEvent::KeyDown { at_ms: 0.0 });
        assert!(tracker.on_window_tick(at(5)).is_none());
    }

    #[test]
    fn test_empty_window_still_emits() {
        let mut tracker = tracker();
        let (seen, callback) = collector();
        tracker.start(callback, neutral());

        let report = tracker.on_window_tick(at(5)).unwrap();
        assert_eq!(report.metrics.fatigue_score, 5);
        assert_eq!(report.metrics.keystroke_count, 0);
        assert_eq!(report.metrics.timestamp, at(5));
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn test_empty_window_scales_with_intensity() {
        let mut tracker = tracker();
        let (_, callback) = collector();
        tracker.start(callback, Intensity::new(10).unwrap());
        // 5 * 1.2 = 6
        assert_eq!(tracker.on_window_tick(at(5)).unwrap().metrics.fatigue_score, 6);
    }

    #[test]
    fn test_uniform_typing_calibrates_latency_only() {
        let mut tracker = tracker();
        let (_, callback) = collector();
        tracker.start(callback, neutral());

        for i in 0..11 {
            tracker.record(InputEvent::KeyDown {
                at_ms: i as f64 * 80.0,
            });
        }
        let report = tracker.on_window_tick(at(5)).unwrap();
        assert!((report.metrics.keystroke_latency_ms - 80.0).abs() < 1e-9);
        assert_eq!(report.breakdown.cognitive_slowing, 0.0);
        assert_eq!(tracker.baselines().latency_baseline_ms, 80.0);
        assert_eq!(tracker.baselines().variance_baseline_ms, 30.0);
    }

    #[test]
    fn test_restart_keeps_unpersisted_improvement() {
        let backing = Rc::new(MemoryStore::new());
        backing.set(LATENCY_BASELINE_KEY, "100").unwrap();
        let config = EngineConfig::default();
        let baselines = BaselineStore::new(Rc::new(ReadOnlyStore::new(backing)), &config);
        let mut tracker = FatigueTracker::new(SimulatedHost::new(), baselines, &config);

        let (_, callback) = collector();
        tracker.start(Rc::clone(&callback), neutral());
        for i in 0..11 {
            tracker.record(InputEvent::KeyDown {
                at_ms: i as f64 * 80.0,
            });
        }
        tracker.on_window_tick(at(5)).unwrap();
        assert_eq!(tracker.baselines().latency_baseline_ms, 80.0);

        tracker.stop();
        tracker.start(callback, Intensity::new(8).unwrap());
        assert_eq!(tracker.baselines().latency_baseline_ms, 80.0);
    }

    #[test]
    fn test_clean_typing_tightens_baselines() {
        let mut tracker = tracker();
        let (_, callback) = collector();
        tracker.start(callback, neutral());

        let mut t = 0.0;
        tracker.record(InputEvent::KeyDown { at_ms: t });
        for gap in [70.0, 90.0, 80.0, 80.0] {
            t += gap;
            tracker.record(InputEvent::KeyDown { at_ms: t });
        }
        tracker.on_window_tick(at(5)).unwrap();

        let baselines = tracker.baselines();
        assert!((baselines.latency_baseline_ms - 80.0).abs() < 1e-9);
        assert!(baselines.variance_baseline_ms < 30.0);
    }

    #[test]
    fn test_stop_discards_partial_window() {
        let mut tracker = tracker();
        let (seen, callback) = collector();
        tracker.start(Rc::clone(&callback), neutral());

        tracker.record(InputEvent::KeyDown { at_ms: 0.0 });
        tracker.record(InputEvent::KeyDown { at_ms: 400.0 });
        tracker.stop();
        assert!(seen.borrow().is_empty());

        tracker.start(callback, neutral());
        let report = tracker.on_window_tick(at(10)).unwrap();
        assert_eq!(report.metrics.keystroke_count, 0);
    }

    #[test]
    fn test_erratic_flag() {
        let mut tracker = tracker();
        let (_, callback) = collector();
        tracker.start(callback, neutral());

        // Zig-zag with three sharp turns
        for (x, y) in [(0.0, 0.0), (50.0, 0.0), (50.0, 50.0), (0.0, 50.0), (0.0, 0.0)] {
            tracker.record(InputEvent::PointerMove { x, y, at_ms: 0.0 });
        }
        let report = tracker.on_window_tick(at(5)).unwrap();
        assert!(report.metrics.erratic_mouse_movement);
        assert_eq!(report.breakdown.erratic_pointer, 20.0);
    }

    proptest! {
        #[test]
        fn prop_no_keystroke_lost_across_boundary(
            gaps in prop::collection::vec(1.0f64..400.0, 1..60),
            split in 0usize..60,
        ) {
            let mut tracker = tracker();
            let (seen, callback) = collector();
            tracker.start(callback, neutral());

            let n = gaps.len() + 1;
            let split = split.min(n);
            let mut t = 0.0;
            let mut times = vec![t];
            for gap in &gaps {
                t += gap;
                times.push(t);
            }

            for time in &times[..split] {
                tracker.record(InputEvent::KeyDown { at_ms: *time });
            }
            tracker.on_window_tick(at(5));
            for time in &times[split..] {
                tracker.record(InputEvent::KeyDown { at_ms: *time });
            }
            tracker.on_window_tick(at(10));

            let total: u32 = seen.borrow().iter().map(|m| m.keystroke_count).sum();
            prop_assert_eq!(total as usize, n - 1);
        }
    }
}
