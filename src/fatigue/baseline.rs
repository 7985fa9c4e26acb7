//! Personal baseline management
//!
//! Baselines hold the user's best observed (lowest) keystroke latency and jitter.
//! They only ever tighten: a candidate is kept only when it beats the current value.
//! Storage failures degrade to process-lifetime memory and are never surfaced.

use log::{debug, warn};

use crate::config::EngineConfig;
use crate::fatigue::types::BaselineState;
use crate::storage::SharedStore;

/// Storage key for the latency baseline
pub const LATENCY_BASELINE_KEY: &str = "fatigue.latency_baseline_ms";

/// Storage key for the latency-jitter baseline
pub const VARIANCE_BASELINE_KEY: &str = "fatigue.variance_baseline_ms";

/// Which of the two baselines an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaselineKey {
    Latency,
    Variance,
}

impl BaselineKey {
    pub fn storage_key(self) -> &'static str {
        match self {
            BaselineKey::Latency => LATENCY_BASELINE_KEY,
            BaselineKey::Variance => VARIANCE_BASELINE_KEY,
        }
    }
}

/// Monotonic-minimum scalar store over a [`KeyValueStore`](crate::storage::KeyValueStore)
pub struct BaselineStore {
    store: SharedStore,
    current: BaselineState,
    defaults: BaselineState,
}

impl BaselineStore {
    pub fn new(store: SharedStore, config: &EngineConfig) -> Self {
        let defaults = BaselineState {
            latency_baseline_ms: config.default_latency_baseline_ms,
            variance_baseline_ms: config.default_variance_baseline_ms,
        };
        let mut baselines = Self {
            store,
            current: defaults,
            defaults,
        };
        baselines.load();
        baselines
    }

    /// Refresh the in-memory values from storage.
    ///
    /// Each baseline becomes the lower of its stored and in-memory value. An
    /// improvement whose write failed is kept, and a store that goes away
    /// mid-session never loses one.
    pub fn load(&mut self) -> BaselineState {
        let latency = self.current.latency_baseline_ms;
        let variance = self.current.variance_baseline_ms;
        self.current.latency_baseline_ms =
            self.read(LATENCY_BASELINE_KEY, latency).min(latency);
        self.current.variance_baseline_ms =
            self.read(VARIANCE_BASELINE_KEY, variance).min(variance);
        self.current
    }

    pub fn current(&self) -> BaselineState {
        self.current
    }

    /// Persisted value for `key`, or `default` when absent or unparseable
    pub fn read(&self, key: &str, default: f64) -> f64 {
        match self.store.get(key) {
            Ok(Some(raw)) => match raw.trim().parse::<f64>() {
                Ok(value) if is_valid_candidate(value) => value,
                _ => {
                    warn!("Ignoring unparseable baseline {}={:?}", key, raw);
                    default
                }
            },
            Ok(None) => default,
            Err(e) => {
                warn!("Baseline read failed for {}: {}", key, e);
                default
            }
        }
    }

    /// Offer a candidate; it is kept only if it beats the current value.
    ///
    /// The reference is the stored value, or the in-memory value when nothing is
    /// stored yet. Returns whether the baseline tightened.
    pub fn write(&mut self, key: BaselineKey, candidate: f64) -> bool {
        if !is_valid_candidate(candidate) {
            if candidate == 0.0 {
                // Uniform typing has zero jitter
                debug!("Skipped zero baseline candidate for {:?}", key);
            } else {
                warn!("Rejected degenerate baseline candidate {:?} for {:?}", candidate, key);
            }
            return false;
        }

        let in_memory = self.value(key);
        let reference = self.read(key.storage_key(), in_memory).min(in_memory);
        if candidate >= reference {
            return false;
        }

        debug!(
            "Baseline {:?} improved {:.1}ms -> {:.1}ms",
            key, reference, candidate
        );
        self.set_value(key, candidate);
        if let Err(e) = self.store.set(key.storage_key(), &candidate.to_string()) {
            warn!("Baseline write failed for {}: {}", key.storage_key(), e);
        }
        true
    }

    /// Offer both candidates from one window
    pub fn observe(&mut self, mean_latency_ms: f64, std_dev_latency_ms: f64) {
        self.write(BaselineKey::Latency, mean_latency_ms);
        self.write(BaselineKey::Variance, std_dev_latency_ms);
    }

    pub fn value(&self, key: BaselineKey) -> f64 {
        match key {
            BaselineKey::Latency => self.current.latency_baseline_ms,
            BaselineKey::Variance => self.current.variance_baseline_ms,
        }
    }

    fn set_value(&mut self, key: BaselineKey, value: f64) {
        match key {
            BaselineKey::Latency => self.current.latency_baseline_ms = value,
            BaselineKey::Variance => self.current.variance_baseline_ms = value,
        }
    }

    /// Forget persisted baselines and return to the configured defaults
    pub fn clear(&mut self) {
        for key in [LATENCY_BASELINE_KEY, VARIANCE_BASELINE_KEY] {
            if let Err(e) = self.store.remove(key) {
                warn!("Baseline clear failed for {}: {}", key, e);
            }
        }
        self.current = self.defaults;
    }
}

fn is_valid_candidate(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tests::{ReadOnlyStore, UnavailableStore};
    use crate::storage::{KeyValueStore, MemoryStore};
    use proptest::prelude::*;
    use std::rc::Rc;

    fn memory_baselines() -> (Rc<MemoryStore>, BaselineStore) {
        let memory = Rc::new(MemoryStore::new());
        let store = BaselineStore::new(memory.clone(), &EngineConfig::default());
        (memory, store)
    }

    #[test]
    fn test_defaults_without_storage() {
        let (_, store) = memory_baselines();
        assert_eq!(store.current(), BaselineState::default());
    }

    #[test]
    fn test_lower_candidate_is_persisted() {
        let (memory, mut store) = memory_baselines();

        assert!(store.write(BaselineKey::Latency, 80.0));
        assert_eq!(store.value(BaselineKey::Latency), 80.0);
        assert_eq!(
            memory.get(LATENCY_BASELINE_KEY).unwrap().as_deref(),
            Some("80")
        );
    }

    #[test]
    fn test_higher_candidate_is_ignored() {
        let (memory, mut store) = memory_baselines();

        assert!(!store.write(BaselineKey::Latency, 150.0));
        assert_eq!(store.value(BaselineKey::Latency), 120.0);
        assert!(memory.get(LATENCY_BASELINE_KEY).unwrap().is_none());
    }

    #[test]
    fn test_degenerate_candidates_rejected() {
        let (memory, mut store) = memory_baselines();

        assert!(!store.write(BaselineKey::Variance, 0.0));
        assert!(!store.write(BaselineKey::Variance, -4.0));
        assert!(!store.write(BaselineKey::Variance, f64::NAN));
        assert!(!store.write(BaselineKey::Variance, f64::INFINITY));
        assert!(memory.is_empty());
        assert_eq!(store.value(BaselineKey::Variance), 30.0);
    }

    #[test]
    fn test_survives_restart() {
        let memory = Rc::new(MemoryStore::new());
        {
            let mut store = BaselineStore::new(memory.clone(), &EngineConfig::default());
            store.observe(90.0, 12.0);
        }

        let reopened = BaselineStore::new(memory, &EngineConfig::default());
        assert_eq!(reopened.current().latency_baseline_ms, 90.0);
        assert_eq!(reopened.current().variance_baseline_ms, 12.0);
    }

    #[test]
    fn test_unparseable_value_falls_back() {
        let memory = Rc::new(MemoryStore::new());
        memory.set(LATENCY_BASELINE_KEY, "fast").unwrap();
        memory.set(VARIANCE_BASELINE_KEY, "0").unwrap();

        let store = BaselineStore::new(memory, &EngineConfig::default());
        assert_eq!(store.current(), BaselineState::default());
    }

    #[test]
    fn test_unavailable_storage_uses_memory() {
        let mut store = BaselineStore::new(Rc::new(UnavailableStore), &EngineConfig::default());
        assert_eq!(store.current(), BaselineState::default());

        assert!(store.write(BaselineKey::Latency, 100.0));
        assert!(store.write(BaselineKey::Latency, 95.0));
        assert!(!store.write(BaselineKey::Latency, 99.0));
        assert_eq!(store.value(BaselineKey::Latency), 95.0);
    }

    #[test]
    fn test_reload_keeps_improvement_when_write_fails() {
        let backing = Rc::new(MemoryStore::new());
        backing.set(LATENCY_BASELINE_KEY, "100").unwrap();
        let mut store = BaselineStore::new(
            Rc::new(ReadOnlyStore::new(backing.clone())),
            &EngineConfig::default(),
        );
        assert_eq!(store.value(BaselineKey::Latency), 100.0);

        assert!(store.write(BaselineKey::Latency, 80.0));
        assert_eq!(backing.get(LATENCY_BASELINE_KEY).unwrap().as_deref(), Some("100"));

        assert_eq!(store.load().latency_baseline_ms, 80.0);
        assert_eq!(store.value(BaselineKey::Variance), 30.0);
    }

    #[test]
    fn test_load_never_raises_above_memory() {
        let (memory, mut store) = memory_baselines();
        store.observe(70.0, 10.0);
        memory.set(LATENCY_BASELINE_KEY, "150").unwrap();
        memory.set(VARIANCE_BASELINE_KEY, "40").unwrap();

        let loaded = store.load();
        assert_eq!(loaded.latency_baseline_ms, 70.0);
        assert_eq!(loaded.variance_baseline_ms, 10.0);
    }

    #[test]
    fn test_clear_restores_defaults() {
        let (memory, mut store) = memory_baselines();
        store.observe(70.0, 10.0);
        store.clear();

        assert_eq!(store.current(), BaselineState::default());
        assert!(memory.is_empty());
    }

    proptest! {
        #[test]
        fn prop_baseline_never_increases(
            candidates in prop::collection::vec(-50.0f64..400.0, 0..40)
        ) {
            let (_, mut store) = memory_baselines();
            let mut previous = store.value(BaselineKey::Latency);
            for candidate in &candidates {
                store.write(BaselineKey::Latency, *candidate);
                let now = store.value(BaselineKey::Latency);
                prop_assert!(now <= previous);
                previous = now;
            }

            let expected = candidates
                .iter()
                .copied()
                .filter(|c| *c > 0.0)
                .fold(120.0f64, f64::min);
            prop_assert_eq!(store.value(BaselineKey::Latency), expected);
        }
    }
}
