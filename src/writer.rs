use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::channels::ChannelInfo;
use crate::codec::{ContainerWriter, FourCc, CHUNK_HEADER_LEN, RIFF_HEADER_LEN};
use crate::error::{CntError, Result};
use crate::metadata::{
    encode_average_info, encode_header, encode_recording_info, encode_triggers,
};
use crate::store::{create_file, SampleWriter};
use crate::types::{AverageInfo, CntHeader, RecordingInfo, Trigger};
use crate::{DEFAULT_BLOCK_SAMPLES, DEFAULT_SEGMENT_CAPACITY};

/// Options for creating a CNT file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOptions {
    /// Spread samples over `<path>.NNN` segment files instead of the
    /// recording's own `data` chunk, lifting the 4 GiB single-file ceiling.
    pub large_file: bool,
    /// Samples buffered in memory before a write.
    pub block_samples: usize,
    /// Maximum sample payload per segment file in large-file mode.
    pub segment_capacity: u64,
    /// Replace existing files instead of failing with `AlreadyExists`.
    pub overwrite: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        WriteOptions {
            large_file: false,
            block_samples: DEFAULT_BLOCK_SAMPLES,
            segment_capacity: DEFAULT_SEGMENT_CAPACITY,
            overwrite: false,
        }
    }
}

/// CNT file writer
///
/// Samples are streamed into the file as they arrive; nothing already
/// written is rewritten except the fixed header, whose sample count is
/// backpatched by [`finalize`](Self::finalize).
///
/// # File Creation Workflow
///
/// 1. Build a [`ChannelInfo`] with [`ChannelInfoBuilder`](crate::ChannelInfoBuilder)
/// 2. Create the writer with [`CntWriter::create`]
/// 3. Append samples with [`add_samples`](Self::add_samples)
/// 4. Optionally attach recording info, triggers or average info
/// 5. Finish the file with [`finalize`](Self::finalize)
///
/// # Examples
///
/// ```rust
/// use eepcnt::{ChannelInfoBuilder, CntReader, CntWriter, WriteOptions};
///
/// let path = std::env::temp_dir().join("eepcnt_writer_doc.cnt");
/// let mut channels = ChannelInfoBuilder::new();
/// channels.add("Fp1", "A1", "uV")?;
/// channels.add("Fp2", "A1", "uV")?;
///
/// let options = WriteOptions { overwrite: true, ..WriteOptions::default() };
/// let mut writer = CntWriter::create(&path, 256.0, channels.finalize()?, options)?;
///
/// // one second of a 10 Hz sine on both channels
/// let mut samples = Vec::new();
/// for i in 0..256 {
///     let v = (2.0 * std::f32::consts::PI * 10.0 * i as f32 / 256.0).sin();
///     samples.push(v);
///     samples.push(-v);
/// }
/// writer.add_samples(&samples, 256)?;
/// writer.finalize()?;
///
/// let reader = CntReader::open(&path)?;
/// assert_eq!(reader.sample_count(), 256);
/// # std::fs::remove_file(&path).ok();
/// # Ok::<(), eepcnt::CntError>(())
/// ```
#[derive(Debug)]
pub struct CntWriter {
    path: PathBuf,
    header: CntHeader,
    channels: ChannelInfo,
    store: Option<SampleWriter>,
    recording_info: Option<RecordingInfo>,
    // 附加时即编码, 关闭时写入
    recording_chunk: Option<Vec<u8>>,
    average_info: Option<AverageInfo>,
    triggers: Vec<Trigger>,
}

impl CntWriter {
    /// Creates a new CNT file and writes its header placeholder.
    ///
    /// # Errors
    ///
    /// * `CntError::InvalidArgument` - non-positive sample rate or bad options
    /// * `CntError::AlreadyExists` - the file exists and `overwrite` is off
    /// * `CntError::Io` - the file cannot be created
    pub fn create<P: AsRef<Path>>(
        path: P,
        sample_rate: f64,
        channels: ChannelInfo,
        options: WriteOptions,
    ) -> Result<Self> {
        let path = path.as_ref();
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(CntError::InvalidArgument(format!("invalid sample rate {}", sample_rate)));
        }
        let block_samples = u32::try_from(options.block_samples)
            .ok()
            .filter(|&b| b > 0)
            .ok_or_else(|| {
                CntError::InvalidArgument(format!("invalid block size {}", options.block_samples))
            })?;

        let header = CntHeader {
            sample_rate,
            channel_count: channels.len() as u32,
            block_samples,
            segment_capacity: if options.large_file { options.segment_capacity } else { 0 },
            sample_count: 0,
            large_file: options.large_file,
            average: false,
        };

        let file = create_file(path, options.overwrite)?;
        match Self::start(path, file, header, &channels, &options) {
            Ok(store) => {
                info!(
                    path = %path.display(),
                    channels = channels.len(),
                    sample_rate,
                    large_file = options.large_file,
                    "created CNT file"
                );
                Ok(CntWriter {
                    path: path.to_path_buf(),
                    header,
                    channels,
                    store: Some(store),
                    recording_info: None,
                    recording_chunk: None,
                    average_info: None,
                    triggers: Vec::new(),
                })
            }
            Err(e) => {
                fs::remove_file(path).ok();
                Err(e)
            }
        }
    }

    fn start(
        path: &Path,
        file: fs::File,
        header: CntHeader,
        channels: &ChannelInfo,
        options: &WriteOptions,
    ) -> Result<SampleWriter> {
        let mut container = ContainerWriter::create(file, FourCc::CNT_FORM)?;
        // 头部必须位于固定偏移, 关闭时回填
        let entry = container.write_chunk(FourCc::EEPH, &encode_header(&header))?;
        debug_assert_eq!(entry.offset, RIFF_HEADER_LEN);
        container.write_chunk(FourCc::CHAN, &channels.encode()?)?;

        if options.large_file {
            SampleWriter::segmented(
                container,
                path,
                channels.len(),
                options.block_samples,
                options.segment_capacity,
                options.overwrite,
            )
        } else {
            SampleWriter::single(container, channels.len(), options.block_samples)
        }
    }

    fn store(&self) -> Result<&SampleWriter> {
        self.store
            .as_ref()
            .ok_or_else(|| CntError::InvalidMode("writer already finalized".to_string()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sample_rate(&self) -> f64 {
        self.header.sample_rate
    }

    pub fn channels(&self) -> &ChannelInfo {
        &self.channels
    }

    pub fn is_large_file(&self) -> bool {
        self.header.large_file
    }

    pub fn sample_count(&self) -> u64 {
        self.store.as_ref().map_or(self.header.sample_count, |s| s.sample_count())
    }

    /// Appends `count` samples from a flat, sample-major buffer.
    ///
    /// `samples.len()` must equal `count * channel_count`; otherwise
    /// `CntError::Shape` is returned and nothing is appended.
    pub fn add_samples(&mut self, samples: &[f32], count: usize) -> Result<()> {
        self.store
            .as_mut()
            .ok_or_else(|| CntError::InvalidMode("writer already finalized".to_string()))?
            .append(samples, count)
    }

    /// Reads back samples `[from, to)` written so far.
    pub fn read_samples(&self, from: u64, to: u64) -> Result<Vec<f32>> {
        self.store()?.read_range(from, to)
    }

    /// Attaches recording info. Only one attachment per file is allowed.
    pub fn set_recording_info(&mut self, info: RecordingInfo) -> Result<()> {
        if self.recording_info.is_some() {
            return Err(CntError::AlreadyAttached);
        }
        let chunk = encode_recording_info(&info)?;
        self.recording_chunk = Some(chunk);
        self.recording_info = Some(info);
        Ok(())
    }

    pub fn recording_info(&self) -> Option<&RecordingInfo> {
        self.recording_info.as_ref()
    }

    /// Marks the file as an average file carrying these statistics.
    pub fn set_average_info(&mut self, average: AverageInfo) -> Result<()> {
        encode_average_info(&average)?;
        self.header.average = true;
        self.average_info = Some(average);
        Ok(())
    }

    /// Adds an event marker. Triggers are stored in insertion order.
    pub fn add_trigger(&mut self, sample: u64, code: &str) -> Result<()> {
        if code.is_empty() {
            return Err(CntError::InvalidArgument("trigger code must not be empty".to_string()));
        }
        self.triggers.push(Trigger { sample, code: code.to_string() });
        Ok(())
    }

    pub fn triggers(&self) -> &[Trigger] {
        &self.triggers
    }

    /// Finishes the file.
    ///
    /// Flushes buffered samples, closes the sample chunk(s), backpatches the
    /// header sample count, writes the trailing metadata chunks and the
    /// container size. Without this call the file is not readable.
    pub fn finalize(mut self) -> Result<()> {
        let store = self
            .store
            .take()
            .ok_or_else(|| CntError::InvalidMode("writer already finalized".to_string()))?;
        let (mut container, sample_count) = store.finish()?;

        self.header.sample_count = sample_count;
        container.patch(RIFF_HEADER_LEN + CHUNK_HEADER_LEN, &encode_header(&self.header))?;

        if let Some(chunk) = self.recording_chunk.take() {
            container.write_chunk(FourCc::INFO, &chunk)?;
        }
        if let Some(average) = &self.average_info {
            container.write_chunk(FourCc::AVG, &encode_average_info(average)?)?;
        }
        if !self.triggers.is_empty() {
            container.write_chunk(FourCc::EVT, &encode_triggers(&self.triggers)?)?;
        }
        container.finish()?;

        info!(
            path = %self.path.display(),
            samples = sample_count,
            triggers = self.triggers.len(),
            "finalized CNT file"
        );
        Ok(())
    }
}

impl Drop for CntWriter {
    fn drop(&mut self) {
        if self.store.is_some() {
            warn!(path = %self.path.display(), "CNT writer dropped without finalize; file is incomplete");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::ChannelInfoBuilder;

    fn two_channels() -> ChannelInfo {
        let mut b = ChannelInfoBuilder::new();
        b.add("Fp1", "A1", "uV").unwrap();
        b.add("Fp2", "A1", "uV").unwrap();
        b.finalize().unwrap()
    }

    #[test]
    fn test_create_rejects_bad_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rate.cnt");
        for rate in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = CntWriter::create(&path, rate, two_channels(), WriteOptions::default());
            assert!(matches!(err, Err(CntError::InvalidArgument(_))));
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_create_refuses_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exists.cnt");
        fs::write(&path, b"keep").unwrap();
        let err = CntWriter::create(&path, 256.0, two_channels(), WriteOptions::default());
        assert!(matches!(err, Err(CntError::AlreadyExists(_))));
        assert_eq!(fs::read(&path).unwrap(), b"keep");
    }

    #[test]
    fn test_bad_segment_capacity_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seg.cnt");
        let options = WriteOptions { large_file: true, segment_capacity: 4, ..WriteOptions::default() };
        let err = CntWriter::create(&path, 256.0, two_channels(), options);
        assert!(matches!(err, Err(CntError::InvalidArgument(_))));
        assert!(!path.exists());
    }

    #[test]
    fn test_recording_info_is_one_shot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("info.cnt");
        let mut w = CntWriter::create(&path, 256.0, two_channels(), WriteOptions::default()).unwrap();
        w.set_recording_info(RecordingInfo::default()).unwrap();
        assert!(matches!(
            w.set_recording_info(RecordingInfo::default()),
            Err(CntError::AlreadyAttached)
        ));
        w.finalize().unwrap();
    }

    #[test]
    fn test_trigger_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trg.cnt");
        let mut w = CntWriter::create(&path, 256.0, two_channels(), WriteOptions::default()).unwrap();
        assert!(w.add_trigger(3, "").is_err());
        w.add_trigger(3, "11").unwrap();
        assert_eq!(w.triggers().len(), 1);
        w.finalize().unwrap();
    }
}
