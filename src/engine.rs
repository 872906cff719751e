//! Handle-based operations over a registry of sessions and builders.
//!
//! The process-wide API in [`crate::api`] wraps one `Engine`; tests and
//! embedders may hold their own. The registry lock is held only to allocate,
//! resolve, release or mutate a builder; file I/O happens outside it.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use tracing::info;

use crate::error::{CntError, Result};
use crate::metadata::RecordingInfoBuilder;
use crate::reader::ReadOptions;
use crate::registry::{Entry, Handle, HandleKind, HandleRegistry};
use crate::session::FileSession;
use crate::types::{AverageInfo, OpenMode, RecordingField, RecordingInfo};
use crate::writer::WriteOptions;
use crate::ChannelInfoBuilder;

#[derive(Debug, Default)]
pub struct Engine {
    registry: Mutex<HandleRegistry>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live handles of any kind.
    pub fn open_handles(&self) -> usize {
        self.registry.lock().len()
    }

    fn file(&self, handle: Handle) -> Result<Arc<FileSession>> {
        self.registry.lock().file(handle)
    }

    // ---- channel info ----

    pub fn create_channel_info(&self) -> Result<Handle> {
        self.registry.lock().alloc(Entry::ChannelInfo(ChannelInfoBuilder::new()))
    }

    /// Appends a channel; returns its 0-based index.
    pub fn add_channel(&self, handle: Handle, label: &str, reference: &str, unit: &str) -> Result<usize> {
        self.registry.lock().channel_info_mut(handle)?.add(label, reference, unit)
    }

    /// Discards a channel info builder that was not used by `write_cnt`.
    pub fn close_channel_info(&self, handle: Handle) -> Result<()> {
        let mut registry = self.registry.lock();
        registry.check(handle, HandleKind::ChannelInfo)?;
        registry.release(handle).map(|_| ())
    }

    // ---- file sessions ----

    pub fn write_cnt(&self, path: &Path, sample_rate: f64, channel_info: Handle, large_file: bool) -> Result<Handle> {
        let options = WriteOptions { large_file, ..WriteOptions::default() };
        self.write_cnt_with(path, sample_rate, channel_info, options)
    }

    /// Creates a file from a channel info builder.
    ///
    /// The builder handle is consumed only if the file was created. While the
    /// file is being created the builder is checked out, so concurrent calls
    /// on the same handle fail with `InvalidHandle`.
    pub fn write_cnt_with(
        &self,
        path: &Path,
        sample_rate: f64,
        channel_info: Handle,
        options: WriteOptions,
    ) -> Result<Handle> {
        let entry = self.registry.lock().checkout(channel_info, HandleKind::ChannelInfo)?;
        let created = match &entry {
            Entry::ChannelInfo(builder) => builder
                .clone()
                .finalize()
                .and_then(|channels| FileSession::create(path, sample_rate, channels, options)),
            _ => Err(CntError::InvalidHandle(channel_info)),
        };

        let mut registry = self.registry.lock();
        let session = match created {
            Ok(session) => session,
            Err(e) => {
                registry.restore(channel_info, entry)?;
                return Err(e);
            }
        };
        // 先分配文件句柄, 再释放构建器槽位
        let handle = registry.alloc(Entry::File(Arc::new(session)))?;
        registry.retire(channel_info)?;
        Ok(handle)
    }

    pub fn read_cnt(&self, path: &Path) -> Result<Handle> {
        self.read_cnt_with(path, ReadOptions::default())
    }

    pub fn read_cnt_with(&self, path: &Path, options: ReadOptions) -> Result<Handle> {
        let session = FileSession::open(path, options)?;
        self.registry.lock().alloc(Entry::File(Arc::new(session)))
    }

    /// Closes a file session. Write sessions are finalized; closing a
    /// released handle again succeeds without effect.
    pub fn close(&self, handle: Handle) -> Result<()> {
        let session = {
            let mut registry = self.registry.lock();
            if registry.is_released(handle) {
                return Ok(());
            }
            registry.check(handle, HandleKind::File)?;
            match registry.release(handle)? {
                Entry::File(session) => session,
                _ => return Err(CntError::InvalidHandle(handle)),
            }
        };
        session.close()
    }

    /// Closes every session and drops every builder.
    ///
    /// All sessions are attempted; the first failure is returned.
    pub fn close_all(&self) -> Result<()> {
        let entries = self.registry.lock().drain();
        let mut result = Ok(());
        let mut closed = 0usize;
        for (_, entry) in entries {
            if let Entry::File(session) = entry {
                closed += 1;
                if let Err(e) = session.close() {
                    if result.is_ok() {
                        result = Err(e);
                    }
                }
            }
        }
        info!(sessions = closed, "closed all handles");
        result
    }

    pub fn mode(&self, handle: Handle) -> Result<OpenMode> {
        Ok(self.file(handle)?.mode())
    }

    // ---- queries ----

    pub fn channel_count(&self, handle: Handle) -> Result<usize> {
        self.file(handle)?.channel_count()
    }

    pub fn channel_label(&self, handle: Handle, index: usize) -> Result<String> {
        Ok(self.file(handle)?.channel(index)?.label)
    }

    pub fn channel_reference(&self, handle: Handle, index: usize) -> Result<String> {
        Ok(self.file(handle)?.channel(index)?.reference)
    }

    pub fn channel_unit(&self, handle: Handle, index: usize) -> Result<String> {
        Ok(self.file(handle)?.channel(index)?.unit)
    }

    /// Index of the first channel labelled `label`.
    pub fn channel_index(&self, handle: Handle, label: &str) -> Result<Option<usize>> {
        self.file(handle)?.channel_index(label)
    }

    pub fn sample_frequency(&self, handle: Handle) -> Result<f64> {
        self.file(handle)?.sample_frequency()
    }

    pub fn sample_count(&self, handle: Handle) -> Result<u64> {
        self.file(handle)?.sample_count()
    }

    // ---- samples ----

    pub fn add_samples(&self, handle: Handle, samples: &[f32], count: usize) -> Result<()> {
        self.file(handle)?.add_samples(samples, count)
    }

    pub fn get_samples(&self, handle: Handle, from: u64, to: u64) -> Result<Vec<f32>> {
        self.file(handle)?.get_samples(from, to)
    }

    // ---- recording info ----

    pub fn create_recording_info(&self) -> Result<Handle> {
        self.registry.lock().alloc(Entry::RecordingInfo(RecordingInfoBuilder::new()))
    }

    fn with_recording_info<T>(
        &self,
        handle: Handle,
        f: impl FnOnce(&mut RecordingInfoBuilder) -> Result<T>,
    ) -> Result<T> {
        let mut registry = self.registry.lock();
        f(registry.recording_info_mut(handle)?)
    }

    pub fn set_start_time(&self, handle: Handle, epoch: i64) -> Result<()> {
        self.with_recording_info(handle, |b| b.set_start_time(epoch))
    }

    pub fn set_date_of_birth(&self, handle: Handle, year: i32, month: u32, day: u32) -> Result<()> {
        self.with_recording_info(handle, |b| b.set_date_of_birth(year, month, day))
    }

    pub fn set_patient_name(&self, handle: Handle, name: &str) -> Result<()> {
        self.with_recording_info(handle, |b| {
            b.set_patient_name(name);
            Ok(())
        })
    }

    pub fn set_patient_sex(&self, handle: Handle, sex: char) -> Result<()> {
        self.with_recording_info(handle, |b| {
            b.set_patient_sex(sex);
            Ok(())
        })
    }

    pub fn set_patient_handedness(&self, handle: Handle, handedness: char) -> Result<()> {
        self.with_recording_info(handle, |b| {
            b.set_patient_handedness(handedness);
            Ok(())
        })
    }

    pub fn set_recording_field(&self, handle: Handle, field: RecordingField, value: &str) -> Result<()> {
        self.with_recording_info(handle, |b| {
            b.set_field(field, value);
            Ok(())
        })
    }

    /// Attaches a recording info builder to a write session and consumes the
    /// builder handle. On failure both handles are left as they were.
    pub fn add_recording_info(&self, file: Handle, recording_info: Handle) -> Result<()> {
        let (session, entry) = {
            let mut registry = self.registry.lock();
            let session = registry.file(file)?;
            let entry = registry.checkout(recording_info, HandleKind::RecordingInfo)?;
            (session, entry)
        };
        let attached = match &entry {
            Entry::RecordingInfo(builder) => session.attach_recording_info(builder.clone().build()),
            _ => Err(CntError::InvalidHandle(recording_info)),
        };

        let mut registry = self.registry.lock();
        match attached {
            Ok(()) => registry.retire(recording_info),
            Err(e) => {
                registry.restore(recording_info, entry)?;
                Err(e)
            }
        }
    }

    fn read_recording_info<T>(&self, handle: Handle, f: impl FnOnce(&RecordingInfo) -> Option<T>) -> Result<Option<T>> {
        Ok(self.file(handle)?.recording_info()?.and_then(f))
    }

    pub fn start_time(&self, handle: Handle) -> Result<Option<DateTime<Utc>>> {
        self.read_recording_info(handle, |info| info.start_time)
    }

    pub fn date_of_birth(&self, handle: Handle) -> Result<Option<NaiveDate>> {
        self.read_recording_info(handle, |info| info.date_of_birth)
    }

    pub fn patient_name(&self, handle: Handle) -> Result<Option<String>> {
        self.read_recording_info(handle, |info| info.patient_name.clone())
    }

    pub fn patient_sex(&self, handle: Handle) -> Result<Option<char>> {
        self.read_recording_info(handle, |info| info.patient_sex)
    }

    pub fn patient_handedness(&self, handle: Handle) -> Result<Option<char>> {
        self.read_recording_info(handle, |info| info.patient_handedness)
    }

    pub fn recording_field(&self, handle: Handle, field: RecordingField) -> Result<Option<String>> {
        self.read_recording_info(handle, |info| info.field(field).map(str::to_string))
    }

    // ---- triggers ----

    pub fn add_trigger(&self, handle: Handle, sample: u64, code: &str) -> Result<()> {
        self.file(handle)?.add_trigger(sample, code)
    }

    pub fn trigger_count(&self, handle: Handle) -> Result<usize> {
        self.file(handle)?.trigger_count()
    }

    /// Returns `(code, sample)` of the trigger at `index`.
    pub fn trigger(&self, handle: Handle, index: usize) -> Result<(String, u64)> {
        let trigger = self.file(handle)?.trigger(index)?;
        Ok((trigger.code, trigger.sample))
    }

    // ---- average info ----

    pub fn set_average_info(&self, handle: Handle, average: AverageInfo) -> Result<()> {
        self.file(handle)?.set_average_info(average)
    }

    fn average<T>(&self, handle: Handle, f: impl FnOnce(&AverageInfo) -> T, none: T) -> Result<T> {
        Ok(self.file(handle)?.average_info().map_or(none, f))
    }

    pub fn zero_offset(&self, handle: Handle) -> Result<i64> {
        self.average(handle, |a| a.zero_offset, AverageInfo::NONE_VALUE)
    }

    pub fn condition_label(&self, handle: Handle) -> Result<String> {
        self.average(handle, |a| a.condition_label.clone(), AverageInfo::NONE_LABEL.to_string())
    }

    pub fn condition_color(&self, handle: Handle) -> Result<String> {
        self.average(handle, |a| a.condition_color.clone(), AverageInfo::NONE_LABEL.to_string())
    }

    pub fn trials_total(&self, handle: Handle) -> Result<i64> {
        self.average(handle, |a| a.trials_total, AverageInfo::NONE_VALUE)
    }

    pub fn trials_averaged(&self, handle: Handle) -> Result<i64> {
        self.average(handle, |a| a.trials_averaged, AverageInfo::NONE_VALUE)
    }
}
