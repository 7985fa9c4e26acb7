//! Deterministic replay of recorded sessions
//!
//! A replay is an NDJSON stream of [`ReplayEvent`]s, each stamped with a
//! millisecond offset from the start of the recording. Events drive a
//! [`SessionController`] over a [`SimulatedHost`]; timers due before each
//! event fire first, so the same input always yields the same records.
//!
//! ```json
//! {"at_ms":0,"type":"start"}
//! {"at_ms":120,"type":"key_down"}
//! {"at_ms":300,"type":"pointer_move","x":10.0,"y":4.0}
//! {"at_ms":60000,"type":"advance"}
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::FatigueError;
use crate::fatigue::types::{InputEvent, Intensity};
use crate::host::SimulatedHost;
use crate::session::{SessionController, SessionEvent};
use crate::storage::SharedStore;

/// What happens at one point of a recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplayAction {
    Start,
    Pause,
    Resume,
    Stop,
    Reset,
    Intensity { level: u8 },
    PlannedDuration { secs: u64 },
    KeyDown,
    PointerMove { x: f64, y: f64 },
    /// Only lets the clock run
    Advance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayEvent {
    pub at_ms: u64,
    #[serde(flatten)]
    pub action: ReplayAction,
}

/// One emitted session event with its virtual time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayRecord {
    pub at_ms: u64,
    #[serde(flatten)]
    pub event: SessionEvent,
}

/// Parse an NDJSON recording. Blank lines and `#` comments are skipped.
pub fn parse_ndjson(input: &str) -> Result<Vec<ReplayEvent>, FatigueError> {
    let mut events = Vec::new();
    for (index, line) in input.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let event: ReplayEvent = serde_json::from_str(line)
            .map_err(|e| FatigueError::Replay(format!("line {}: {}", index + 1, e)))?;
        events.push(event);
    }
    Ok(events)
}

/// Drives one controller through a recording
pub struct Replayer {
    controller: SessionController<SimulatedHost>,
    origin: DateTime<Utc>,
    records: Vec<ReplayRecord>,
    last_at_ms: u64,
}

impl Replayer {
    /// `origin` is the wall-clock time of offset 0
    pub fn new(store: SharedStore, config: &EngineConfig, origin: DateTime<Utc>) -> Self {
        Self {
            controller: SessionController::new(SimulatedHost::new(), store, config),
            origin,
            records: Vec::new(),
            last_at_ms: 0,
        }
    }

    pub fn apply(&mut self, event: &ReplayEvent) -> Result<(), FatigueError> {
        if event.at_ms < self.last_at_ms {
            return Err(FatigueError::Replay(format!(
                "event at {}ms is earlier than the previous event at {}ms",
                event.at_ms, self.last_at_ms
            )));
        }
        self.advance_to(event.at_ms);
        self.last_at_ms = event.at_ms;

        let now = self.wall_clock(event.at_ms);
        let at = event.at_ms as f64;
        match &event.action {
            ReplayAction::Start => self.controller.start(now)?,
            ReplayAction::Pause => self.controller.pause(now)?,
            ReplayAction::Resume => self.controller.resume(now)?,
            ReplayAction::Stop => self.controller.stop(now)?,
            ReplayAction::Reset => self.controller.reset(),
            ReplayAction::Intensity { level } => {
                self.controller.set_intensity(Intensity::new(*level)?)
            }
            ReplayAction::PlannedDuration { secs } => self.controller.set_planned_duration(*secs),
            ReplayAction::KeyDown => {
                self.controller.handle_input(InputEvent::KeyDown { at_ms: at })
            }
            ReplayAction::PointerMove { x, y } => {
                self.controller.handle_input(InputEvent::PointerMove {
                    x: *x,
                    y: *y,
                    at_ms: at,
                })
            }
            ReplayAction::Advance => {}
        }
        Ok(())
    }

    /// Fire every timer due up to `at_ms`, in order
    pub fn advance_to(&mut self, at_ms: u64) {
        while let Some(fire) = self.controller.host_mut().next_due(at_ms) {
            let now = self.wall_clock(fire.at_ms);
            for event in self.controller.on_timer(fire.purpose, now) {
                self.records.push(ReplayRecord {
                    at_ms: fire.at_ms,
                    event,
                });
            }
        }
        self.controller.host_mut().set_now(at_ms);
    }

    pub fn records(&self) -> &[ReplayRecord] {
        &self.records
    }

    pub fn controller(&self) -> &SessionController<SimulatedHost> {
        &self.controller
    }

    pub fn into_records(self) -> Vec<ReplayRecord> {
        self.records
    }

    fn wall_clock(&self, at_ms: u64) -> DateTime<Utc> {
        self.origin + Duration::milliseconds(at_ms.min(i64::MAX as u64) as i64)
    }
}

/// Replay a whole recording and return everything it emitted
pub fn run(
    events: &[ReplayEvent],
    store: SharedStore,
    config: &EngineConfig,
    origin: DateTime<Utc>,
) -> Result<Vec<ReplayRecord>, FatigueError> {
    let mut replayer = Replayer::new(store, config, origin);
    for event in events {
        replayer.apply(event)?;
    }
    Ok(replayer.into_records())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::InterventionReason;
    use crate::session::SessionStatus;
    use crate::storage::MemoryStore;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn origin() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap()
    }

    const START_THEN_ONE_WINDOW: &str =
        "{\"at_ms\":0,\"type\":\"start\"}\n{\"at_ms\":5000,\"type\":\"advance\"}";

    fn replay(input: &str) -> Vec<ReplayRecord> {
        let events = parse_ndjson(input).unwrap();
        run(&events, MemoryStore::shared(), &EngineConfig::default(), origin()).unwrap()
    }

    #[test]
    fn test_parse_ndjson() {
        let events = parse_ndjson(
            "# warm-up\n\
             {\"at_ms\":0,\"type\":\"start\"}\n\
             \n\
             {\"at_ms\":10,\"type\":\"pointer_move\",\"x\":1.0,\"y\":2.0}\n",
        )
        .unwrap();
        assert_eq!(
            events,
            vec![
                ReplayEvent {
                    at_ms: 0,
                    action: ReplayAction::Start
                },
                ReplayEvent {
                    at_ms: 10,
                    action: ReplayAction::PointerMove { x: 1.0, y: 2.0 }
                },
            ]
        );
    }

    #[test]
    fn test_parse_error_names_line() {
        let err = parse_ndjson("{\"at_ms\":0,\"type\":\"start\"}\n{\"at_ms\":1,\"type\":\"jump\"}")
            .unwrap_err();
        assert!(err.to_string().contains("line 2"), "{}", err);
    }

    #[test]
    fn test_empty_window_metrics() {
        let records = replay(START_THEN_ONE_WINDOW);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].at_ms, 5000);
        match &records[0].event {
            SessionEvent::Metrics(metrics) => {
                assert_eq!(metrics.fatigue_score, 5);
                assert_eq!(metrics.keystroke_count, 0);
                assert_eq!(metrics.timestamp, origin() + Duration::seconds(5));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_time_cap_after_five_minutes_at_intensity_ten() {
        let records = replay(
            "{\"at_ms\":0,\"type\":\"intensity\",\"level\":10}\n\
             {\"at_ms\":0,\"type\":\"start\"}\n\
             {\"at_ms\":400000,\"type\":\"advance\"}",
        );

        let metrics = records
            .iter()
            .filter(|r| matches!(r.event, SessionEvent::Metrics(_)))
            .count();
        assert_eq!(metrics, 60);

        let last = records.last().unwrap();
        assert_eq!(last.at_ms, 300_000);
        match &last.event {
            SessionEvent::Intervention(intervention) => {
                assert_eq!(intervention.reason, InterventionReason::TimeCap);
                assert_eq!(intervention.score, 6);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_pause_freezes_output() {
        let events = parse_ndjson(
            "{\"at_ms\":0,\"type\":\"start\"}\n\
             {\"at_ms\":2500,\"type\":\"pause\"}\n\
             {\"at_ms\":60000,\"type\":\"resume\"}\n\
             {\"at_ms\":65000,\"type\":\"advance\"}",
        )
        .unwrap();
        let mut replayer = Replayer::new(MemoryStore::shared(), &EngineConfig::default(), origin());
        for event in &events {
            replayer.apply(event).unwrap();
        }

        let times: Vec<u64> = replayer.records().iter().map(|r| r.at_ms).collect();
        assert_eq!(times, vec![65_000]);
        assert_eq!(replayer.controller().elapsed_secs(), 7);
        assert_eq!(replayer.controller().status(), SessionStatus::Running);
    }

    #[test]
    fn test_out_of_order_events_rejected() {
        let events =
            parse_ndjson("{\"at_ms\":10,\"type\":\"start\"}\n{\"at_ms\":5,\"type\":\"key_down\"}")
                .unwrap();
        let result = run(&events, MemoryStore::shared(), &EngineConfig::default(), origin());
        assert!(matches!(result, Err(FatigueError::Replay(_))));
    }

    #[test]
    fn test_illegal_action_surfaces() {
        let events = parse_ndjson("{\"at_ms\":0,\"type\":\"resume\"}").unwrap();
        let result = run(&events, MemoryStore::shared(), &EngineConfig::default(), origin());
        assert!(matches!(result, Err(FatigueError::InvalidTransition { .. })));
    }

    #[test]
    fn test_record_json_is_flat() {
        let records = replay(START_THEN_ONE_WINDOW);
        let value = serde_json::to_value(&records[0]).unwrap();
        assert_eq!(value["at_ms"], 5000);
        assert_eq!(value["event"], "metrics");
        assert_eq!(value["fatigue_score"], 5);
    }
}
