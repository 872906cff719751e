//! A file open for reading or writing, as held by the handle registry.
//!
//! Read sessions are immutable and served without locking. A write session
//! serializes appends and metadata updates through its own lock, so
//! operations on different files never contend.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::debug;

use crate::channels::{Channel, ChannelInfo};
use crate::error::{CntError, Result};
use crate::reader::{CntReader, ReadOptions};
use crate::types::{AverageInfo, OpenMode, RecordingInfo, Trigger};
use crate::writer::{CntWriter, WriteOptions};

#[derive(Debug)]
enum Inner {
    Read(CntReader),
    // None 表示已关闭
    Write(Mutex<Option<CntWriter>>),
}

#[derive(Debug)]
pub struct FileSession {
    path: PathBuf,
    inner: Inner,
}

impl FileSession {
    pub fn open(path: &Path, options: ReadOptions) -> Result<Self> {
        let reader = CntReader::open_with(path, options)?;
        Ok(FileSession { path: path.to_path_buf(), inner: Inner::Read(reader) })
    }

    pub fn create(
        path: &Path,
        sample_rate: f64,
        channels: ChannelInfo,
        options: WriteOptions,
    ) -> Result<Self> {
        let writer = CntWriter::create(path, sample_rate, channels, options)?;
        Ok(FileSession {
            path: path.to_path_buf(),
            inner: Inner::Write(Mutex::new(Some(writer))),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> OpenMode {
        match self.inner {
            Inner::Read(_) => OpenMode::Read,
            Inner::Write(_) => OpenMode::Write,
        }
    }

    fn with_writer<T>(&self, f: impl FnOnce(&mut CntWriter) -> Result<T>) -> Result<T> {
        match &self.inner {
            Inner::Write(slot) => {
                let mut guard = slot.lock();
                let writer = guard
                    .as_mut()
                    .ok_or_else(|| CntError::InvalidMode("session is closed".to_string()))?;
                f(writer)
            }
            Inner::Read(_) => Err(CntError::InvalidMode("session is open for reading".to_string())),
        }
    }

    fn reader(&self) -> Result<&CntReader> {
        match &self.inner {
            Inner::Read(reader) => Ok(reader),
            Inner::Write(_) => Err(CntError::InvalidMode("session is open for writing".to_string())),
        }
    }

    /// Runs `f` against the channel table of either kind of session.
    fn with_channels<T>(&self, f: impl FnOnce(&ChannelInfo) -> Result<T>) -> Result<T> {
        match &self.inner {
            Inner::Read(reader) => f(reader.channels()),
            Inner::Write(_) => self.with_writer(|w| f(w.channels())),
        }
    }

    pub fn channel_count(&self) -> Result<usize> {
        self.with_channels(|c| Ok(c.len()))
    }

    pub fn channel(&self, index: usize) -> Result<Channel> {
        self.with_channels(|c| c.get(index).cloned())
    }

    pub fn channel_index(&self, label: &str) -> Result<Option<usize>> {
        self.with_channels(|c| Ok(c.index_of(label)))
    }

    pub fn sample_frequency(&self) -> Result<f64> {
        match &self.inner {
            Inner::Read(reader) => Ok(reader.sample_rate()),
            Inner::Write(_) => self.with_writer(|w| Ok(w.sample_rate())),
        }
    }

    pub fn sample_count(&self) -> Result<u64> {
        match &self.inner {
            Inner::Read(reader) => Ok(reader.sample_count()),
            Inner::Write(_) => self.with_writer(|w| Ok(w.sample_count())),
        }
    }

    pub fn add_samples(&self, samples: &[f32], count: usize) -> Result<()> {
        self.with_writer(|w| w.add_samples(samples, count))
    }

    pub fn get_samples(&self, from: u64, to: u64) -> Result<Vec<f32>> {
        match &self.inner {
            Inner::Read(reader) => reader.read_samples(from, to),
            Inner::Write(_) => self.with_writer(|w| w.read_samples(from, to)),
        }
    }

    pub fn attach_recording_info(&self, info: RecordingInfo) -> Result<()> {
        self.with_writer(|w| w.set_recording_info(info))
    }

    pub fn set_average_info(&self, average: AverageInfo) -> Result<()> {
        self.with_writer(|w| w.set_average_info(average))
    }

    pub fn add_trigger(&self, sample: u64, code: &str) -> Result<()> {
        self.with_writer(|w| w.add_trigger(sample, code))
    }

    /// Recording info of a file opened for reading; `None` if it has none.
    pub fn recording_info(&self) -> Result<Option<&RecordingInfo>> {
        Ok(self.reader()?.recording_info())
    }

    pub fn trigger_count(&self) -> Result<usize> {
        Ok(self.reader()?.triggers().len())
    }

    pub fn trigger(&self, index: usize) -> Result<Trigger> {
        self.reader()?
            .triggers()
            .get(index)
            .cloned()
            .ok_or(CntError::InvalidTriggerIndex(index))
    }

    /// Average statistics; `None` for plain recordings and write sessions.
    pub fn average_info(&self) -> Option<&AverageInfo> {
        match &self.inner {
            Inner::Read(reader) => reader.average_info(),
            Inner::Write(_) => None,
        }
    }

    /// Finishes a write session. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        match &self.inner {
            Inner::Read(_) => Ok(()),
            Inner::Write(slot) => match slot.lock().take() {
                Some(writer) => writer.finalize(),
                None => {
                    debug!(path = %self.path.display(), "session already closed");
                    Ok(())
                }
            },
        }
    }
}
