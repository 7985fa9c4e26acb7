//! Error types for Fatigue Sense

use thiserror::Error;

/// Errors surfaced to callers of the engine.
///
/// Storage failures inside the telemetry path are logged and swallowed; they only
/// appear here when a caller talks to a store directly.
#[derive(Debug, Error)]
pub enum FatigueError {
    #[error("Intensity must be between 1 and 10, got {0}")]
    InvalidIntensity(u8),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Cannot {action} a session that is {from}")]
    InvalidTransition { from: String, action: String },

    #[error("Replay error: {0}")]
    Replay(String),
}

/// Errors raised by a [`KeyValueStore`](crate::storage::KeyValueStore) backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stored data is corrupt: {0}")]
    Corrupt(String),
}
