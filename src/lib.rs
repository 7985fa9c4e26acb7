//! Fatigue Sense - On-device fatigue inference from keystroke and pointer telemetry
//!
//! Fatigue Sense watches how a user types and moves the pointer during a focus
//! session and turns that into a smoothed 0-100 fatigue score, personalized by
//! baselines that calibrate themselves to the user's best observed performance.
//! When the score crosses an intensity-dependent threshold, or the session runs
//! past its time cap, the session pauses for a recovery break.
//!
//! ## Modules
//!
//! - **Fatigue**: sampling, window aggregation, baselines, scoring and the tracker
//! - **Policy**: when to intervene, per intensity
//! - **Session**: focus session status machine driving the tracker
//! - **Host / Storage**: seams to the embedding runtime and its key-value store
//!
//! The engine never spawns threads or sleeps. The host delivers input events and
//! timer fires; the engine reacts synchronously.

pub mod config;
pub mod error;
pub mod fatigue;
pub mod host;
pub mod policy;
pub mod replay;
pub mod session;
pub mod storage;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::EngineConfig;
pub use error::{FatigueError, StorageError};
pub use fatigue::{
    BaselineState, FatigueMetrics, FatigueTracker, InputEvent, Intensity, MetricsCallback,
};
pub use host::{SimulatedHost, TimerPurpose, TrackingHost};
pub use policy::{Intervention, InterventionPolicy, InterventionReason, PolicyAction};
pub use session::{SessionController, SessionEvent, SessionSnapshot, SessionState, SessionStatus};
pub use storage::{FileStore, KeyValueStore, MemoryStore, SharedStore};

/// Engine version, reported by the CLI and doctor checks
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for reports
pub const PRODUCER_NAME: &str = "fatigue-sense";
