//! Process-wide, handle-based interface.
//!
//! Every function resolves against one global [`Engine`], created on first
//! use or by [`init`]. Failures are returned as [`CntError`](crate::CntError), logged at
//! `warn` level and remembered per thread so that bindings which only see
//! [`INVALID_HANDLE`] or an empty value can still ask [`last_error`].
//!
//! ```rust
//! use eepcnt::api;
//!
//! let path = std::env::temp_dir().join("eepcnt_api_doc.cnt");
//! # std::fs::remove_file(&path).ok();
//! let ch = api::create_channel_info()?;
//! api::add_channel(ch, "Fp1", "A1", "uV")?;
//! api::add_channel(ch, "Fp2", "A1", "uV")?;
//!
//! let file = api::write_cnt(&path, 256.0, ch, false)?;
//! api::add_samples(file, vec![0.0; 2 * 256], 256)?;
//! api::close(file)?;
//!
//! let file = api::read_cnt(&path)?;
//! assert_eq!(api::sample_count(file)?, 256);
//! assert_eq!(api::get_samples(file, 0, 1)?, vec![0.0, 0.0]);
//! api::close(file)?;
//! # std::fs::remove_file(&path).ok();
//! # Ok::<(), eepcnt::CntError>(())
//! ```

use std::cell::Cell;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::{const_mutex, Mutex};
use tracing::{info, warn};

use crate::engine::Engine;
use crate::error::{ErrorKind, Result};
use crate::types::{AverageInfo, RecordingField};

pub use crate::registry::{Handle, INVALID_HANDLE};

static ENGINE: Mutex<Option<Arc<Engine>>> = const_mutex(None);

thread_local! {
    static LAST_ERROR: Cell<Option<ErrorKind>> = const { Cell::new(None) };
}

fn engine() -> Arc<Engine> {
    let mut slot = ENGINE.lock();
    Arc::clone(slot.get_or_insert_with(|| Arc::new(Engine::new())))
}

fn track<T>(op: &'static str, result: Result<T>) -> Result<T> {
    match &result {
        Ok(_) => LAST_ERROR.with(|e| e.set(None)),
        Err(err) => {
            warn!(op, kind = %err.kind(), "{}", err);
            LAST_ERROR.with(|e| e.set(Some(err.kind())));
        }
    }
    result
}

/// Kind of the most recent failure on this thread, cleared by each success.
pub fn last_error() -> Option<ErrorKind> {
    LAST_ERROR.with(Cell::get)
}

/// Creates the global state. Calling it again has no effect.
pub fn init() {
    let mut slot = ENGINE.lock();
    if slot.is_none() {
        *slot = Some(Arc::new(Engine::new()));
        info!(version = crate::version(), "eepcnt initialized");
    }
}

/// Closes every open session, finishing writers, and drops all handles.
///
/// Calling it without prior use, or twice, has no effect. A later call into
/// the API starts with a fresh, empty registry.
pub fn shutdown() -> Result<()> {
    let engine = ENGINE.lock().take();
    match engine {
        Some(engine) => track("shutdown", engine.close_all()),
        None => Ok(()),
    }
}

pub fn version() -> &'static str {
    crate::version()
}

// ---- channel info ----

pub fn create_channel_info() -> Result<Handle> {
    track("create_channel_info", engine().create_channel_info())
}

pub fn add_channel(handle: Handle, label: &str, reference: &str, unit: &str) -> Result<usize> {
    track("add_channel", engine().add_channel(handle, label, reference, unit))
}

pub fn close_channel_info(handle: Handle) -> Result<()> {
    track("close_channel_info", engine().close_channel_info(handle))
}

// ---- file I/O ----

/// Creates a CNT file; consumes the channel info handle on success.
pub fn write_cnt<P: AsRef<Path>>(path: P, sample_rate: f64, channel_info: Handle, large_file: bool) -> Result<Handle> {
    track("write_cnt", engine().write_cnt(path.as_ref(), sample_rate, channel_info, large_file))
}

pub fn read_cnt<P: AsRef<Path>>(path: P) -> Result<Handle> {
    track("read_cnt", engine().read_cnt(path.as_ref()))
}

/// Closes a file handle. Closing an already closed handle succeeds.
pub fn close(handle: Handle) -> Result<()> {
    track("close", engine().close(handle))
}

// ---- queries ----

pub fn channel_count(handle: Handle) -> Result<usize> {
    track("channel_count", engine().channel_count(handle))
}

pub fn channel_label(handle: Handle, index: usize) -> Result<String> {
    track("channel_label", engine().channel_label(handle, index))
}

pub fn channel_unit(handle: Handle, index: usize) -> Result<String> {
    track("channel_unit", engine().channel_unit(handle, index))
}

pub fn channel_reference(handle: Handle, index: usize) -> Result<String> {
    track("channel_reference", engine().channel_reference(handle, index))
}

pub fn channel_index(handle: Handle, label: &str) -> Result<Option<usize>> {
    track("channel_index", engine().channel_index(handle, label))
}

pub fn sample_frequency(handle: Handle) -> Result<f64> {
    track("sample_frequency", engine().sample_frequency(handle))
}

pub fn sample_count(handle: Handle) -> Result<u64> {
    track("sample_count", engine().sample_count(handle))
}

// ---- samples ----

/// Appends `count` samples; `samples` is sample-major with one value per
/// channel per sample.
pub fn add_samples(handle: Handle, samples: Vec<f32>, count: usize) -> Result<()> {
    track("add_samples", engine().add_samples(handle, &samples, count))
}

pub fn get_samples(handle: Handle, from: u64, to: u64) -> Result<Vec<f32>> {
    track("get_samples", engine().get_samples(handle, from, to))
}

// ---- recording info ----

pub fn create_recording_info() -> Result<Handle> {
    track("create_recording_info", engine().create_recording_info())
}

/// Recording start as seconds since the Unix epoch.
pub fn set_start_time(handle: Handle, epoch: i64) -> Result<()> {
    track("set_start_time", engine().set_start_time(handle, epoch))
}

pub fn set_date_of_birth(handle: Handle, year: i32, month: u32, day: u32) -> Result<()> {
    track("set_date_of_birth", engine().set_date_of_birth(handle, year, month, day))
}

pub fn set_patient_name(handle: Handle, name: &str) -> Result<()> {
    track("set_patient_name", engine().set_patient_name(handle, name))
}

pub fn set_patient_sex(handle: Handle, sex: char) -> Result<()> {
    track("set_patient_sex", engine().set_patient_sex(handle, sex))
}

pub fn set_patient_handedness(handle: Handle, handedness: char) -> Result<()> {
    track("set_patient_handedness", engine().set_patient_handedness(handle, handedness))
}

pub fn set_recording_field(handle: Handle, field: RecordingField, value: &str) -> Result<()> {
    track("set_recording_field", engine().set_recording_field(handle, field, value))
}

/// Attaches recording info to a write session; consumes the recording info
/// handle on success.
pub fn add_recording_info(file: Handle, recording_info: Handle) -> Result<()> {
    track("add_recording_info", engine().add_recording_info(file, recording_info))
}

pub fn start_time(handle: Handle) -> Result<Option<DateTime<Utc>>> {
    track("start_time", engine().start_time(handle))
}

pub fn date_of_birth(handle: Handle) -> Result<Option<NaiveDate>> {
    track("date_of_birth", engine().date_of_birth(handle))
}

pub fn patient_name(handle: Handle) -> Result<Option<String>> {
    track("patient_name", engine().patient_name(handle))
}

pub fn patient_sex(handle: Handle) -> Result<Option<char>> {
    track("patient_sex", engine().patient_sex(handle))
}

pub fn patient_handedness(handle: Handle) -> Result<Option<char>> {
    track("patient_handedness", engine().patient_handedness(handle))
}

pub fn recording_field(handle: Handle, field: RecordingField) -> Result<Option<String>> {
    track("recording_field", engine().recording_field(handle, field))
}

// ---- triggers ----

pub fn add_trigger(handle: Handle, sample: u64, code: &str) -> Result<()> {
    track("add_trigger", engine().add_trigger(handle, sample, code))
}

pub fn trigger_count(handle: Handle) -> Result<usize> {
    track("trigger_count", engine().trigger_count(handle))
}

/// Returns `(code, sample)` of the trigger at `index`.
pub fn trigger(handle: Handle, index: usize) -> Result<(String, u64)> {
    track("trigger", engine().trigger(handle, index))
}

// ---- average info ----

pub fn set_average_info(handle: Handle, average: AverageInfo) -> Result<()> {
    track("set_average_info", engine().set_average_info(handle, average))
}

pub fn zero_offset(handle: Handle) -> Result<i64> {
    track("zero_offset", engine().zero_offset(handle))
}

pub fn condition_label(handle: Handle) -> Result<String> {
    track("condition_label", engine().condition_label(handle))
}

pub fn condition_color(handle: Handle) -> Result<String> {
    track("condition_color", engine().condition_color(handle))
}

pub fn trials_total(handle: Handle) -> Result<i64> {
    track("trials_total", engine().trials_total(handle))
}

pub fn trials_averaged(handle: Handle) -> Result<i64> {
    track("trials_averaged", engine().trials_averaged(handle))
}
