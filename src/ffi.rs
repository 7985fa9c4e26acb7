//! FFI bindings for Fatigue Sense
//!
//! This module provides C-compatible functions for embedding the tracker in a
//! host runtime. The host owns its event loop: it forwards key and pointer
//! events, and calls `fatigue_tracker_tick` from its own window timer.
//! Returned strings are allocated here and must be freed by the caller using
//! `fatigue_free_string`.

use chrono::{DateTime, TimeZone, Utc};
use std::cell::RefCell;
use std::ffi::CString;
use std::os::raw::c_char;
use std::ptr;
use std::rc::Rc;

use crate::config::EngineConfig;
use crate::fatigue::baseline::BaselineStore;
use crate::fatigue::tracker::FatigueTracker;
use crate::fatigue::types::{FatigueMetrics, InputEvent, Intensity};
use crate::host::SimulatedHost;
use crate::policy::{InterventionPolicy, InterventionReason};
use crate::storage::MemoryStore;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last error message
fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clear the last error message
fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

fn intensity_from_i32(level: i32) -> Option<Intensity> {
    u8::try_from(level).ok().and_then(|l| Intensity::new(l).ok())
}

fn wall_clock(unix_ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(unix_ms).single()
}

// ============================================================================
// Tracker API
// ============================================================================

/// Opaque handle to a fatigue tracker
pub struct FatigueTrackerHandle {
    tracker: FatigueTracker<SimulatedHost>,
    intensity: Intensity,
}

/// Create a tracker with the given intensity (1-10).
///
/// Baselines live in an in-memory store owned by the handle.
///
/// # Safety
/// - Returns a pointer to a newly allocated tracker.
/// - Must be freed with `fatigue_tracker_free`.
/// - Returns NULL on error; call `fatigue_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn fatigue_tracker_new(intensity: i32) -> *mut FatigueTrackerHandle {
    clear_last_error();

    let Some(intensity) = intensity_from_i32(intensity) else {
        set_last_error(&format!("Intensity must be between 1 and 10, got {}", intensity));
        return ptr::null_mut();
    };

    let config = EngineConfig::default();
    let baselines = BaselineStore::new(MemoryStore::shared(), &config);
    let tracker = FatigueTracker::new(SimulatedHost::new(), baselines, &config);
    Box::into_raw(Box::new(FatigueTrackerHandle { tracker, intensity }))
}

/// Free a tracker.
///
/// # Safety
/// - `tracker` must be a valid pointer returned by `fatigue_tracker_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn fatigue_tracker_free(tracker: *mut FatigueTrackerHandle) {
    if !tracker.is_null() {
        drop(Box::from_raw(tracker));
    }
}

/// Start tracking. Returns 1 if tracking started, 0 if already tracking, -1 on error.
///
/// # Safety
/// - `tracker` must be a valid pointer returned by `fatigue_tracker_new`.
#[no_mangle]
pub unsafe extern "C" fn fatigue_tracker_start(tracker: *mut FatigueTrackerHandle) -> i32 {
    clear_last_error();

    if tracker.is_null() {
        set_last_error("Null tracker pointer");
        return -1;
    }

    let handle = &mut *tracker;
    let intensity = handle.intensity;
    let started = handle
        .tracker
        .start(Rc::new(|_: &FatigueMetrics| {}), intensity);
    i32::from(started)
}

/// Stop tracking. Returns 1 if tracking stopped, 0 if already idle, -1 on error.
///
/// # Safety
/// - `tracker` must be a valid pointer returned by `fatigue_tracker_new`.
#[no_mangle]
pub unsafe extern "C" fn fatigue_tracker_stop(tracker: *mut FatigueTrackerHandle) -> i32 {
    clear_last_error();

    if tracker.is_null() {
        set_last_error("Null tracker pointer");
        return -1;
    }

    i32::from((*tracker).tracker.stop())
}

/// Record a key press at a monotonic timestamp in milliseconds.
///
/// # Safety
/// - `tracker` must be a valid pointer returned by `fatigue_tracker_new`.
#[no_mangle]
pub unsafe extern "C" fn fatigue_tracker_key_down(tracker: *mut FatigueTrackerHandle, at_ms: f64) {
    if tracker.is_null() {
        set_last_error("Null tracker pointer");
        return;
    }
    (*tracker).tracker.record(InputEvent::KeyDown { at_ms });
}

/// Record a pointer position at a monotonic timestamp in milliseconds.
///
/// # Safety
/// - `tracker` must be a valid pointer returned by `fatigue_tracker_new`.
#[no_mangle]
pub unsafe extern "C" fn fatigue_tracker_pointer_move(
    tracker: *mut FatigueTrackerHandle,
    x: f64,
    y: f64,
    at_ms: f64,
) {
    if tracker.is_null() {
        set_last_error("Null tracker pointer");
        return;
    }
    (*tracker)
        .tracker
        .record(InputEvent::PointerMove { x, y, at_ms });
}

/// Close the current window and return its metrics as JSON.
///
/// `unix_ms` is the wall-clock time of the tick, in milliseconds since the epoch.
///
/// # Safety
/// - `tracker` must be a valid pointer returned by `fatigue_tracker_new`.
/// - Returns a newly allocated string that must be freed with `fatigue_free_string`.
/// - Returns NULL while idle (no error set) or on error (`fatigue_last_error` set).
#[no_mangle]
pub unsafe extern "C" fn fatigue_tracker_tick(
    tracker: *mut FatigueTrackerHandle,
    unix_ms: i64,
) -> *mut c_char {
    clear_last_error();

    if tracker.is_null() {
        set_last_error("Null tracker pointer");
        return ptr::null_mut();
    }

    let Some(now) = wall_clock(unix_ms) else {
        set_last_error(&format!("Timestamp out of range: {}", unix_ms));
        return ptr::null_mut();
    };

    let handle = &mut *tracker;
    let Some(report) = handle.tracker.on_window_tick(now) else {
        return ptr::null_mut();
    };

    match serde_json::to_string(&report.metrics) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Policy API
// ============================================================================

/// Evaluate the intervention policy.
///
/// Returns 0 for no action, 1 for a fatigue pause, 2 for a time-cap pause and
/// -1 for invalid arguments.
#[no_mangle]
pub extern "C" fn fatigue_policy_evaluate(score: i32, intensity: i32, elapsed_secs: i64) -> i32 {
    clear_last_error();

    let Some(intensity) = intensity_from_i32(intensity) else {
        set_last_error(&format!("Intensity must be between 1 and 10, got {}", intensity));
        return -1;
    };
    let score = score.clamp(0, 100) as u8;
    let elapsed = elapsed_secs.max(0) as u64;

    match InterventionPolicy::default()
        .evaluate(Some(score), intensity, elapsed)
        .reason()
    {
        None => 0,
        Some(InterventionReason::Fatigue) => 1,
        Some(InterventionReason::TimeCap) => 2,
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a static string that is valid until the next Fatigue Sense call.
/// - Returns NULL if there was no error.
/// - Do NOT free this pointer.
#[no_mangle]
pub unsafe extern "C" fn fatigue_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match e.borrow().as_ref() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by Fatigue Sense functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a Fatigue Sense function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn fatigue_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}
