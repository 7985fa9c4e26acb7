//! Focus session control
//!
//! [`SessionController`] owns the session status machine, accrues elapsed time
//! while running, and couples fatigue tracking to the status: tracking runs
//! exactly while the session is `Running`.
//!
//! ```text
//! Idle -> Running <-> Paused
//!           |          |
//!           +-> Completed <-+
//! any -> Idle (reset)
//! ```
//!
//! A snapshot is persisted on every transition so a reload can rebuild elapsed
//! time from the wall-clock anchor of a running session.

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::FatigueError;
use crate::fatigue::baseline::BaselineStore;
use crate::fatigue::tracker::{FatigueTracker, MetricsCallback};
use crate::fatigue::types::{BaselineState, FatigueMetrics, InputEvent, Intensity};
use crate::host::{TimerHandle, TimerPurpose, TrackingHost};
use crate::policy::{Intervention, InterventionPolicy, PolicyAction};
use crate::storage::SharedStore;

/// Storage key for the persisted session snapshot
pub const SESSION_SNAPSHOT_KEY: &str = "fatigue.session_snapshot";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Running,
    Paused,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Running => "running",
            SessionStatus::Paused => "paused",
            SessionStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable session state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: Option<Uuid>,
    pub status: SessionStatus,
    pub elapsed_secs: u64,
    /// Planned length; 0 means open-ended
    pub planned_duration_secs: u64,
    pub intensity: Intensity,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            session_id: None,
            status: SessionStatus::Idle,
            elapsed_secs: 0,
            planned_duration_secs: 0,
            intensity: Intensity::default(),
        }
    }
}

/// Minimal persisted form of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: Option<Uuid>,
    pub status: SessionStatus,
    pub elapsed_secs: u64,
    pub planned_duration_secs: u64,
    pub intensity: Intensity,
    /// Wall-clock moment the session last entered `Running`
    #[serde(default)]
    pub running_since: Option<DateTime<Utc>>,
    /// Elapsed seconds already accrued at `running_since`
    #[serde(default)]
    pub elapsed_at_anchor_secs: u64,
}

/// Something the UI layer should react to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Metrics(FatigueMetrics),
    Intervention(Intervention),
    Completed { elapsed_secs: u64 },
}

/// Orchestrates one user's focus sessions
pub struct SessionController<H: TrackingHost> {
    state: SessionState,
    tracker: FatigueTracker<H>,
    policy: InterventionPolicy,
    store: SharedStore,
    elapsed_tick_ms: u64,
    elapsed_ms: u64,
    elapsed_timer: Option<TimerHandle>,
    running_since: Option<DateTime<Utc>>,
    elapsed_at_anchor_secs: u64,
    current: Option<FatigueMetrics>,
    pause_history: Vec<FatigueMetrics>,
    interventions: Vec<Intervention>,
    on_metrics: MetricsCallback,
}

impl<H: TrackingHost> SessionController<H> {
    pub fn new(host: H, store: SharedStore, config: &EngineConfig) -> Self {
        let baselines = BaselineStore::new(Rc::clone(&store), config);
        Self {
            state: SessionState::default(),
            tracker: FatigueTracker::new(host, baselines, config),
            policy: InterventionPolicy::from_config(config),
            store,
            elapsed_tick_ms: config.elapsed_tick_ms.max(1),
            elapsed_ms: 0,
            elapsed_timer: None,
            running_since: None,
            elapsed_at_anchor_secs: 0,
            current: None,
            pause_history: Vec::new(),
            interventions: Vec::new(),
            on_metrics: Rc::new(|_: &FatigueMetrics| {}),
        }
    }

    /// Forward every metrics sample to an observer, starting with the next run
    pub fn with_observer(mut self, on_metrics: MetricsCallback) -> Self {
        self.on_metrics = on_metrics;
        self
    }

    // ── User actions ────────────────────────────────────────────────

    /// Start a session. Resumes a paused one; a running one is left alone.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), FatigueError> {
        match self.state.status {
            SessionStatus::Running => Ok(()),
            SessionStatus::Paused => self.resume(now),
            SessionStatus::Idle | SessionStatus::Completed => {
                self.state.session_id = Some(Uuid::new_v4());
                self.elapsed_ms = 0;
                self.state.elapsed_secs = 0;
                self.current = None;
                self.enter_running(now);
                Ok(())
            }
        }
    }

    pub fn pause(&mut self, _now: DateTime<Utc>) -> Result<(), FatigueError> {
        match self.state.status {
            SessionStatus::Running => {
                self.leave_running(SessionStatus::Paused);
                Ok(())
            }
            SessionStatus::Paused => Ok(()),
            status => Err(invalid_transition(status, "pause")),
        }
    }

    pub fn resume(&mut self, now: DateTime<Utc>) -> Result<(), FatigueError> {
        match self.state.status {
            SessionStatus::Paused => {
                self.enter_running(now);
                Ok(())
            }
            SessionStatus::Running => Ok(()),
            status => Err(invalid_transition(status, "resume")),
        }
    }

    /// Finish the session, keeping its elapsed time
    pub fn stop(&mut self, _now: DateTime<Utc>) -> Result<(), FatigueError> {
        match self.state.status {
            SessionStatus::Running | SessionStatus::Paused => {
                self.leave_running(SessionStatus::Completed);
                Ok(())
            }
            SessionStatus::Completed => Ok(()),
            SessionStatus::Idle => Err(invalid_transition(SessionStatus::Idle, "stop")),
        }
    }

    /// Return to `Idle` with elapsed time cleared. Valid from any status.
    pub fn reset(&mut self) {
        self.leave_running(SessionStatus::Idle);
        self.state.session_id = None;
        self.state.elapsed_secs = 0;
        self.elapsed_ms = 0;
        self.current = None;
        self.persist();
    }

    /// Change sensitivity; a running tracker restarts so the new factor applies now
    pub fn set_intensity(&mut self, intensity: Intensity) {
        if self.state.intensity == intensity {
            return;
        }
        self.state.intensity = intensity;

        if self.state.status == SessionStatus::Running {
            self.tracker.stop();
            self.tracker.start(Rc::clone(&self.on_metrics), intensity);
        }
        info!("Session intensity set to {}", intensity);
        self.persist();
    }

    pub fn set_planned_duration(&mut self, secs: u64) {
        self.state.planned_duration_secs = secs;
        self.persist();
    }

    // ── Host callbacks ──────────────────────────────────────────────

    pub fn handle_input(&mut self, event: InputEvent) {
        self.tracker.record(event);
    }

    /// Dispatch a timer fire from the host
    pub fn on_timer(&mut self, purpose: TimerPurpose, now: DateTime<Utc>) -> Vec<SessionEvent> {
        match purpose {
            TimerPurpose::WindowTick => self.on_window_tick(now),
            TimerPurpose::ElapsedTick => self.on_elapsed_tick(now),
        }
    }

    fn on_window_tick(&mut self, now: DateTime<Utc>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if self.state.status != SessionStatus::Running {
            return events;
        }
        let Some(report) = self.tracker.on_window_tick(now) else {
            return events;
        };

        let score = report.metrics.fatigue_score;
        self.current = Some(report.metrics.clone());
        events.push(SessionEvent::Metrics(report.metrics));

        let action = self
            .policy
            .evaluate(Some(score), self.state.intensity, self.state.elapsed_secs);
        if let Some(intervention) = self.intervene(action, now) {
            events.push(SessionEvent::Intervention(intervention));
        }
        events
    }

    fn on_elapsed_tick(&mut self, now: DateTime<Utc>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if self.state.status != SessionStatus::Running {
            return events;
        }

        self.elapsed_ms += self.elapsed_tick_ms;
        self.state.elapsed_secs = self.elapsed_ms / 1000;

        let planned = self.state.planned_duration_secs;
        if planned > 0 && self.state.elapsed_secs >= planned {
            info!("Session completed after {}s", self.state.elapsed_secs);
            self.leave_running(SessionStatus::Completed);
            events.push(SessionEvent::Completed {
                elapsed_secs: self.state.elapsed_secs,
            });
            return events;
        }

        let action = self
            .policy
            .evaluate(None, self.state.intensity, self.state.elapsed_secs);
        if let Some(intervention) = self.intervene(action, now) {
            events.push(SessionEvent::Intervention(intervention));
        }
        events
    }

    fn intervene(&mut self, action: PolicyAction, now: DateTime<Utc>) -> Option<Intervention> {
        let intervention = Intervention::from_action(
            action,
            self.state.intensity,
            self.state.elapsed_secs,
            self.current.clone(),
            now,
        )?;

        info!(
            "Intervention fired: {:?} (score {}, threshold {}, elapsed {}s)",
            intervention.reason,
            intervention.score,
            intervention.threshold,
            intervention.elapsed_secs
        );

        if let Some(metrics) = &intervention.metrics {
            self.pause_history.push(metrics.clone());
        }
        self.leave_running(SessionStatus::Paused);
        self.interventions.push(intervention.clone());
        Some(intervention)
    }

    // ── Transitions ────────────────────────────────────────────────

    fn enter_running(&mut self, now: DateTime<Utc>) {
        let from = self.state.status;
        self.state.status = SessionStatus::Running;
        self.running_since = Some(now);
        self.elapsed_at_anchor_secs = self.state.elapsed_secs;

        self.tracker
            .start(Rc::clone(&self.on_metrics), self.state.intensity);
        if self.elapsed_timer.is_none() {
            self.elapsed_timer = Some(
                self.tracker
                    .host_mut()
                    .schedule_repeating(TimerPurpose::ElapsedTick, self.elapsed_tick_ms),
            );
        }

        info!("Session {} -> running", from);
        self.persist();
    }

    fn leave_running(&mut self, to: SessionStatus) {
        let from = self.state.status;
        self.tracker.stop();
        if let Some(timer) = self.elapsed_timer.take() {
            self.tracker.host_mut().cancel_timer(timer);
        }
        self.running_since = None;
        self.state.status = to;

        if from != to {
            info!("Session {} -> {}", from, to);
        }
        self.persist();
    }

    // ── Persistence ────────────────────────────────────────────────

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.state.session_id,
            status: self.state.status,
            elapsed_secs: self.state.elapsed_secs,
            planned_duration_secs: self.state.planned_duration_secs,
            intensity: self.state.intensity,
            running_since: self.running_since,
            elapsed_at_anchor_secs: self.elapsed_at_anchor_secs,
        }
    }

    fn persist(&self) {
        let json = match serde_json::to_string(&self.snapshot()) {
            Ok(json) => json,
            Err(e) => {
                warn!("Session snapshot encoding failed: {}", e);
                return;
            }
        };
        if let Err(e) = self.store.set(SESSION_SNAPSHOT_KEY, &json) {
            warn!("Session snapshot write failed: {}", e);
        }
    }

    /// Rebuild state from the persisted snapshot.
    ///
    /// A running session gets its elapsed time from `now - running_since` and
    /// resumes tracking. Returns whether a snapshot was applied.
    pub fn restore(&mut self, now: DateTime<Utc>) -> bool {
        let raw = match self.store.get(SESSION_SNAPSHOT_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return false,
            Err(e) => {
                warn!("Session snapshot read failed: {}", e);
                return false;
            }
        };
        let snapshot: SessionSnapshot = match serde_json::from_str(&raw) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Ignoring corrupt session snapshot: {}", e);
                return false;
            }
        };

        self.leave_running(SessionStatus::Idle);
        self.state = SessionState {
            session_id: snapshot.session_id,
            status: SessionStatus::Idle,
            elapsed_secs: snapshot.elapsed_secs,
            planned_duration_secs: snapshot.planned_duration_secs,
            intensity: snapshot.intensity,
        };

        match (snapshot.status, snapshot.running_since) {
            (SessionStatus::Running, Some(anchor)) => {
                let away = (now - anchor).num_seconds().max(0) as u64;
                let elapsed = snapshot.elapsed_at_anchor_secs.saturating_add(away);
                self.state.elapsed_secs = elapsed;
                self.elapsed_ms = elapsed * 1000;

                let planned = snapshot.planned_duration_secs;
                if planned > 0 && elapsed >= planned {
                    self.leave_running(SessionStatus::Completed);
                } else {
                    // Re-anchor at the restored elapsed time
                    self.state.status = SessionStatus::Paused;
                    self.enter_running(now);
                }
            }
            (SessionStatus::Running, None) => {
                // No anchor to rebuild from; keep the accrued time but wait for the user
                self.elapsed_ms = snapshot.elapsed_secs * 1000;
                self.leave_running(SessionStatus::Paused);
            }
            (status, _) => {
                self.elapsed_ms = snapshot.elapsed_secs * 1000;
                self.state.status = status;
                self.persist();
            }
        }

        info!(
            "Restored session {:?} ({}, {}s)",
            self.state.session_id, self.state.status, self.state.elapsed_secs
        );
        true
    }

    // ── Queries ────────────────────────────────────────────────────

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn status(&self) -> SessionStatus {
        self.state.status
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.state.elapsed_secs
    }

    pub fn intensity(&self) -> Intensity {
        self.state.intensity
    }

    /// Latest metrics sample of the current session
    pub fn current_metrics(&self) -> Option<&FatigueMetrics> {
        self.current.as_ref()
    }

    /// Metrics samples that triggered a pause
    pub fn pause_history(&self) -> &[FatigueMetrics] {
        &self.pause_history
    }

    pub fn interventions(&self) -> &[Intervention] {
        &self.interventions
    }

    pub fn baselines(&self) -> BaselineState {
        self.tracker.baselines()
    }

    pub fn tracker(&self) -> &FatigueTracker<H> {
        &self.tracker
    }

    pub fn host(&self) -> &H {
        self.tracker.host()
    }

    pub fn host_mut(&mut self) -> &mut H {
        self.tracker.host_mut()
    }
}

fn invalid_transition(from: SessionStatus, action: &str) -> FatigueError {
    FatigueError::InvalidTransition {
        from: from.to_string(),
        action: action.to_string(),
    }
}
