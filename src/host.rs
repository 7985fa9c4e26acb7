//! Host integration seam
//!
//! The engine never owns an event loop. Whatever embeds it (a UI runtime, the
//! replay driver, the FFI layer) implements [`TrackingHost`] to attach input
//! listeners and run repeating timers, then feeds events and timer fires back in.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// What a repeating timer drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerPurpose {
    /// Drains the sampler into one metrics sample
    WindowTick,
    /// Accrues one second of session time
    ElapsedTick,
}

/// Opaque handle for an attached input listener set
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerHandle(pub u64);

/// Opaque handle for a repeating timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerHandle(pub u64);

/// Resource acquisition and release on behalf of the engine.
pub trait TrackingHost {
    /// Subscribe to keyboard and pointer events
    fn attach_input(&mut self) -> ListenerHandle;
    /// Unsubscribe a listener set previously returned by `attach_input`
    fn detach_input(&mut self, handle: ListenerHandle);
    /// Start a timer that fires every `period_ms` until cancelled
    fn schedule_repeating(&mut self, purpose: TimerPurpose, period_ms: u64) -> TimerHandle;
    fn cancel_timer(&mut self, handle: TimerHandle);
}

/// A timer fire produced by [`SimulatedHost::next_due`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFire {
    pub handle: TimerHandle,
    pub purpose: TimerPurpose,
    /// Virtual time of the fire in milliseconds
    pub at_ms: u64,
}

#[derive(Debug, Clone)]
struct SimulatedTimer {
    purpose: TimerPurpose,
    period_ms: u64,
    next_fire_ms: u64,
}

/// Deterministic host running on a virtual millisecond clock.
///
/// Used by tests, the replay driver and the FFI layer. It keeps counters of every
/// acquisition so idempotency can be asserted.
#[derive(Debug, Clone, Default)]
pub struct SimulatedHost {
    now_ms: u64,
    next_id: u64,
    listeners: BTreeSet<ListenerHandle>,
    timers: BTreeMap<TimerHandle, SimulatedTimer>,
    attach_calls: usize,
    schedule_calls: usize,
}

impl SimulatedHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Number of listener sets currently attached
    pub fn active_listeners(&self) -> usize {
        self.listeners.len()
    }

    /// Number of live timers for a purpose
    pub fn active_timers(&self, purpose: TimerPurpose) -> usize {
        self.timers.values().filter(|t| t.purpose == purpose).count()
    }

    pub fn attach_calls(&self) -> usize {
        self.attach_calls
    }

    pub fn schedule_calls(&self) -> usize {
        self.schedule_calls
    }

    /// Pop the earliest timer fire at or before `until_ms`, advancing the clock to it.
    ///
    /// Fires are returned one at a time because handling a fire may cancel or
    /// schedule other timers. Ties resolve in handle order, which is scheduling order.
    pub fn next_due(&mut self, until_ms: u64) -> Option<TimerFire> {
        let (handle, fire_at) = self
            .timers
            .iter()
            .filter(|(_, timer)| timer.next_fire_ms <= until_ms)
            .min_by_key(|(handle, timer)| (timer.next_fire_ms, **handle))
            .map(|(handle, timer)| (*handle, timer.next_fire_ms))?;

        let timer = self.timers.get_mut(&handle)?;
        timer.next_fire_ms = fire_at.saturating_add(timer.period_ms);
        let purpose = timer.purpose;
        self.now_ms = self.now_ms.max(fire_at);

        Some(TimerFire {
            handle,
            purpose,
            at_ms: fire_at,
        })
    }

    /// Move the clock forward without firing anything.
    ///
    /// Callers drain [`next_due`](Self::next_due) first; the clock never moves backwards.
    pub fn set_now(&mut self, now_ms: u64) {
        self.now_ms = self.now_ms.max(now_ms);
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

impl TrackingHost for SimulatedHost {
    fn attach_input(&mut self) -> ListenerHandle {
        self.attach_calls += 1;
        let handle = ListenerHandle(self.allocate_id());
        self.listeners.insert(handle);
        handle
    }

    fn detach_input(&mut self, handle: ListenerHandle) {
        self.listeners.remove(&handle);
    }

    fn schedule_repeating(&mut self, purpose: TimerPurpose, period_ms: u64) -> TimerHandle {
        self.schedule_calls += 1;
        let handle = TimerHandle(self.allocate_id());
        self.timers.insert(
            handle,
            SimulatedTimer {
                purpose,
                period_ms: period_ms.max(1),
                next_fire_ms: self.now_ms.saturating_add(period_ms.max(1)),
            },
        );
        handle
    }

    fn cancel_timer(&mut self, handle: TimerHandle) {
        self.timers.remove(&handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_in_chronological_order() {
        let mut host = SimulatedHost::new();
        let window = host.schedule_repeating(TimerPurpose::WindowTick, 5000);
        let elapsed = host.schedule_repeating(TimerPurpose::ElapsedTick, 1000);

        let mut fires = Vec::new();
        while let Some(fire) = host.next_due(5000) {
            fires.push(fire);
        }

        assert_eq!(fires.len(), 6);
        assert!(fires[..4].iter().all(|f| f.handle == elapsed));
        let times: Vec<u64> = fires.iter().map(|f| f.at_ms).collect();
        assert_eq!(times, vec![1000, 2000, 3000, 4000, 5000, 5000]);

        // Both due at 5000: the earlier-scheduled window timer goes first
        assert_eq!(fires[4].handle, window);
        assert_eq!(fires[5].handle, elapsed);
        assert_eq!(host.now_ms(), 5000);
    }

    #[test]
    fn test_ties_follow_scheduling_order() {
        let mut host = SimulatedHost::new();
        let elapsed = host.schedule_repeating(TimerPurpose::ElapsedTick, 1000);
        let window = host.schedule_repeating(TimerPurpose::WindowTick, 1000);

        assert_eq!(host.next_due(1000).map(|f| f.handle), Some(elapsed));
        assert_eq!(host.next_due(1000).map(|f| f.handle), Some(window));
        assert!(host.next_due(1000).is_none());
    }

    #[test]
    fn test_cancelled_timer_never_fires() {
        let mut host = SimulatedHost::new();
        let handle = host.schedule_repeating(TimerPurpose::WindowTick, 5000);
        host.cancel_timer(handle);

        assert!(host.next_due(60_000).is_none());
        assert_eq!(host.active_timers(TimerPurpose::WindowTick), 0);
    }

    #[test]
    fn test_timer_scheduled_later_starts_from_now() {
        let mut host = SimulatedHost::new();
        host.set_now(12_000);
        host.schedule_repeating(TimerPurpose::WindowTick, 5000);

        assert!(host.next_due(16_999).is_none());
        assert_eq!(host.next_due(17_000).map(|f| f.at_ms), Some(17_000));
    }

    #[test]
    fn test_listener_accounting() {
        let mut host = SimulatedHost::new();
        let a = host.attach_input();
        let b = host.attach_input();
        assert_ne!(a, b);
        assert_eq!(host.active_listeners(), 2);
        assert_eq!(host.attach_calls(), 2);

        host.detach_input(a);
        host.detach_input(a);
        assert_eq!(host.active_listeners(), 1);
    }
}
