use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::channels::ChannelInfo;
use crate::codec::{index_chunks, read_payload, FourCc, RIFF_HEADER_LEN};
use crate::error::{CntError, Result};
use crate::metadata::{decode_average_info, decode_header, decode_recording_info, decode_triggers};
use crate::store::SampleReader;
use crate::types::{AverageInfo, CntHeader, RecordingInfo, Trigger};

/// Options for opening a CNT file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Reject chunks with unknown tags instead of skipping them.
    pub strict: bool,
}

/// CNT file reader
///
/// All metadata is decoded when the file is opened. Sample data stays on
/// disk and is read on demand with positional reads, so a reader can be
/// shared between threads and every method takes `&self`.
///
/// # Examples
///
/// ```rust
/// use eepcnt::CntReader;
/// # use eepcnt::doctest_utils::create_simple_test_file;
///
/// # let path = std::env::temp_dir().join("eepcnt_reader_doc.cnt");
/// # create_simple_test_file(&path)?;
/// let reader = CntReader::open(&path)?;
///
/// println!("Channels: {}", reader.channels().len());
/// println!("Sample rate: {} Hz", reader.sample_rate());
/// println!("Duration: {:.1} s", reader.sample_count() as f64 / reader.sample_rate());
///
/// // first ten samples of every channel, sample-major
/// let first = reader.read_samples(0, 10)?;
/// assert_eq!(first.len(), 10 * reader.channels().len());
/// # std::fs::remove_file(&path).ok();
/// # Ok::<(), eepcnt::CntError>(())
/// ```
#[derive(Debug)]
pub struct CntReader {
    path: PathBuf,
    header: CntHeader,
    channels: ChannelInfo,
    recording_info: Option<RecordingInfo>,
    average_info: Option<AverageInfo>,
    triggers: Vec<Trigger>,
    samples: SampleReader,
}

impl CntReader {
    /// Opens a CNT file with default (lenient) options.
    ///
    /// # Errors
    ///
    /// * `CntError::NotFound` - the path does not exist
    /// * `CntError::Format` - the file is not a finished CNT file
    /// * `CntError::Io` - any other I/O failure
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, ReadOptions::default())
    }

    pub fn open_with<P: AsRef<Path>>(path: P, options: ReadOptions) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => CntError::NotFound(path.display().to_string()),
            _ => CntError::Io(e),
        })?;

        let index = index_chunks(&file, options.strict)?;

        // 头部块必须紧跟容器头
        let eeph = index
            .first(FourCc::EEPH)
            .filter(|entry| entry.offset == RIFF_HEADER_LEN)
            .ok_or_else(|| CntError::format("missing eeph header chunk"))?;
        let header = decode_header(&read_payload(&file, eeph)?)?;

        let chan = index
            .first(FourCc::CHAN)
            .ok_or_else(|| CntError::format("missing chan chunk"))?;
        let channels = ChannelInfo::decode(&read_payload(&file, chan)?)?;
        if channels.len() != header.channel_count as usize {
            return Err(CntError::Format(format!(
                "header declares {} channels, chan chunk holds {}",
                header.channel_count,
                channels.len()
            )));
        }

        let recording_info = match index.first(FourCc::INFO) {
            Some(entry) => Some(decode_recording_info(&read_payload(&file, entry)?)?),
            None => None,
        };
        let average_info = match index.first(FourCc::AVG) {
            Some(entry) => Some(decode_average_info(&read_payload(&file, entry)?)?),
            None => None,
        };
        if header.average && average_info.is_none() {
            return Err(CntError::format("average file without avg chunk"));
        }
        let triggers = match index.first(FourCc::EVT) {
            Some(entry) => decode_triggers(&read_payload(&file, entry)?)?,
            None => Vec::new(),
        };

        let samples = if header.large_file {
            debug!(path = %path.display(), "opening segment files");
            SampleReader::segmented(
                path,
                channels.len(),
                header.sample_count,
                header.segment_capacity,
            )?
        } else {
            let data = index.first(FourCc::DATA).copied();
            SampleReader::single(file, data.as_ref(), channels.len(), header.sample_count)?
        };

        info!(
            path = %path.display(),
            channels = channels.len(),
            samples = header.sample_count,
            large_file = header.large_file,
            "opened CNT file"
        );

        Ok(CntReader {
            path: path.to_path_buf(),
            header,
            channels,
            recording_info,
            average_info,
            triggers,
            samples,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fixed header as stored in the `eeph` chunk.
    pub fn header(&self) -> &CntHeader {
        &self.header
    }

    pub fn channels(&self) -> &ChannelInfo {
        &self.channels
    }

    pub fn sample_rate(&self) -> f64 {
        self.header.sample_rate
    }

    pub fn sample_count(&self) -> u64 {
        self.header.sample_count
    }

    pub fn is_large_file(&self) -> bool {
        self.header.large_file
    }

    pub fn is_average(&self) -> bool {
        self.average_info.is_some()
    }

    /// Reads samples `[from, to)` as a flat, sample-major buffer of
    /// `(to - from) * channels` values.
    ///
    /// # Errors
    ///
    /// `CntError::Range` if `from > to` or `to > sample_count()`.
    pub fn read_samples(&self, from: u64, to: u64) -> Result<Vec<f32>> {
        self.samples.read_range(from, to)
    }

    pub fn recording_info(&self) -> Option<&RecordingInfo> {
        self.recording_info.as_ref()
    }

    /// Averaging statistics, present only in average files.
    ///
    /// ```rust
    /// use eepcnt::CntReader;
    /// # use eepcnt::doctest_utils::create_average_test_file;
    ///
    /// # let path = std::env::temp_dir().join("eepcnt_average_doc.cnt");
    /// # create_average_test_file(&path)?;
    /// let reader = CntReader::open(&path)?;
    /// if let Some(avg) = reader.average_info() {
    ///     println!("{}: {} of {} trials", avg.condition_label, avg.trials_averaged, avg.trials_total);
    /// }
    /// assert!(reader.is_average());
    /// # std::fs::remove_file(&path).ok();
    /// # Ok::<(), eepcnt::CntError>(())
    /// ```
    pub fn average_info(&self) -> Option<&AverageInfo> {
        self.average_info.as_ref()
    }

    /// Triggers in the order they were added.
    pub fn triggers(&self) -> &[Trigger] {
        &self.triggers
    }
}
