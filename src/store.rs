//! Sample store: interleaved `f32` samples inside the container.
//!
//! Samples are laid out sample-major, channel-minor. A single-file store keeps
//! them in the recording's `data` chunk; a large-file store spreads them over
//! numbered segment files (see [`SegmentLayout`]).

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::codec::{
    read_chunk_header_at, read_container_header, segment_path, ChunkEntry, ContainerWriter,
    FourCc, OpenChunk, SegmentLayout, MAX_CONTAINER_LEN, RIFF_HEADER_LEN,
};
use crate::error::{CntError, Result};
use crate::utils::{bytes_to_samples, read_exact_at, samples_to_bytes};

/// Room kept free in a single-file container for the chunks written on close.
const TRAILER_RESERVE: u64 = 1 << 20;

const SAMPLE_SIZE: u64 = std::mem::size_of::<f32>() as u64;

/// Where persisted samples live.
#[derive(Debug, Clone, Copy)]
enum Placement {
    Single { data_offset: u64 },
    Segmented(SegmentLayout),
}

impl Placement {
    /// Splits `[from, to)` into contiguous runs of `(file id, offset, samples)`.
    fn runs(&self, stride: u64, from: u64, to: u64) -> Vec<(u32, u64, u64)> {
        match *self {
            Placement::Single { data_offset } => {
                if from == to {
                    Vec::new()
                } else {
                    vec![(0, data_offset + from * stride, to - from)]
                }
            }
            Placement::Segmented(layout) => {
                let per_segment = layout.samples_per_segment();
                let mut runs = Vec::new();
                let mut sample = from;
                while sample < to {
                    let (segment, offset) = layout.resolve(sample * stride);
                    let n = (to - sample).min(per_segment - sample % per_segment);
                    runs.push((segment, offset, n));
                    sample += n;
                }
                runs
            }
        }
    }
}

fn read_runs<'a>(
    placement: &Placement,
    stride: u64,
    from: u64,
    to: u64,
    file_for: impl Fn(u32) -> Option<&'a File>,
    out: &mut Vec<f32>,
) -> Result<()> {
    let mut bytes = Vec::new();
    for (id, offset, samples) in placement.runs(stride, from, to) {
        let file = file_for(id)
            .ok_or_else(|| CntError::Format(format!("segment {} is missing", id)))?;
        bytes.resize((samples * stride) as usize, 0);
        read_exact_at(file, &mut bytes, offset)?;
        bytes_to_samples(&bytes, out);
    }
    Ok(())
}

fn check_range(from: u64, to: u64, sample_count: u64) -> Result<()> {
    if from > to || to > sample_count {
        return Err(CntError::Range { from, to, sample_count });
    }
    Ok(())
}

fn stride_of(channel_count: usize) -> u64 {
    channel_count as u64 * SAMPLE_SIZE
}

#[derive(Debug)]
struct Segment {
    container: ContainerWriter,
    chunk: OpenChunk,
}

#[derive(Debug)]
enum Sink {
    Single { chunk: OpenChunk },
    Segmented { base: PathBuf, overwrite: bool, segments: Vec<Segment> },
}

/// Append side of the store, owned by a write session.
///
/// Appends are buffered and flushed in whole blocks of `block_samples`
/// samples. Reads combine the persisted prefix with the buffered tail, so a
/// reader never observes a partial sample.
#[derive(Debug)]
pub struct SampleWriter {
    container: ContainerWriter,
    sink: Sink,
    placement: Placement,
    channel_count: usize,
    stride: u64,
    block_samples: usize,
    pending: Vec<f32>,
    flushed: u64,
}

impl SampleWriter {
    /// Store inside the recording's own `data` chunk, opened at the cursor.
    pub fn single(mut container: ContainerWriter, channel_count: usize, block_samples: usize) -> Result<Self> {
        let chunk = container.begin_chunk(FourCc::DATA)?;
        let placement = Placement::Single { data_offset: chunk.payload_offset() };
        Ok(Self::with_sink(container, Sink::Single { chunk }, placement, channel_count, block_samples))
    }

    /// Store spread over `<base>.NNN` segment files.
    pub fn segmented(
        container: ContainerWriter,
        base: &Path,
        channel_count: usize,
        block_samples: usize,
        segment_capacity: u64,
        overwrite: bool,
    ) -> Result<Self> {
        let layout = SegmentLayout::new(stride_of(channel_count), segment_capacity)?;
        let sink = Sink::Segmented { base: base.to_path_buf(), overwrite, segments: Vec::new() };
        Ok(Self::with_sink(container, sink, Placement::Segmented(layout), channel_count, block_samples))
    }

    fn with_sink(
        container: ContainerWriter,
        sink: Sink,
        placement: Placement,
        channel_count: usize,
        block_samples: usize,
    ) -> Self {
        SampleWriter {
            container,
            sink,
            placement,
            channel_count,
            stride: stride_of(channel_count),
            block_samples: block_samples.max(1),
            pending: Vec::with_capacity(block_samples.max(1) * channel_count),
            flushed: 0,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    pub fn sample_count(&self) -> u64 {
        self.flushed + (self.pending.len() / self.channel_count) as u64
    }

    /// Appends `count` whole samples; `flat.len()` must be `count * channels`.
    ///
    /// Either all samples are accepted or the store is left unchanged.
    pub fn append(&mut self, flat: &[f32], count: usize) -> Result<()> {
        if count.checked_mul(self.channel_count) != Some(flat.len()) {
            return Err(CntError::Shape {
                len: flat.len(),
                count,
                channels: self.channel_count,
            });
        }
        if count == 0 {
            return Ok(());
        }
        if let Placement::Single { data_offset } = self.placement {
            let total = self.sample_count() + count as u64;
            if data_offset + total * self.stride > MAX_CONTAINER_LEN - TRAILER_RESERVE {
                return Err(CntError::InvalidArgument(
                    "recording would exceed the single-file size ceiling; use large-file mode"
                        .to_string(),
                ));
            }
        }

        let block_len = self.block_samples * self.channel_count;
        let buffered = self.pending.len() + flat.len();
        let full_blocks = buffered / block_len;
        if full_blocks == 0 {
            self.pending.extend_from_slice(flat);
            return Ok(());
        }

        // 拼接完整块后一次写入
        let flush_len = full_blocks * block_len;
        let from_new = flush_len - self.pending.len();
        let mut block = Vec::with_capacity(flush_len);
        block.extend_from_slice(&self.pending);
        block.extend_from_slice(&flat[..from_new]);

        let before = self.flushed;
        if let Err(e) = self.write_persisted(&block) {
            self.rewind_to(before);
            return Err(e);
        }
        self.flushed += (full_blocks * self.block_samples) as u64;
        self.pending.clear();
        self.pending.extend_from_slice(&flat[from_new..]);
        debug!(blocks = full_blocks, flushed = self.flushed, "flushed sample blocks");
        Ok(())
    }

    /// Writes whole samples after the persisted prefix.
    fn write_persisted(&mut self, samples: &[f32]) -> Result<()> {
        let stride = self.stride;
        match (&mut self.sink, self.placement) {
            (Sink::Single { chunk }, _) => {
                self.container.append(chunk, &samples_to_bytes(samples))?;
            }
            (Sink::Segmented { base, overwrite, segments }, Placement::Segmented(layout)) => {
                let count = samples.len() as u64 / (stride / SAMPLE_SIZE);
                let floats_per_sample = (stride / SAMPLE_SIZE) as usize;
                let mut written = 0u64;
                let runs = Placement::Segmented(layout).runs(stride, self.flushed, self.flushed + count);
                for (id, _, n) in runs {
                    while segments.len() <= id as usize {
                        let next = segments.len() as u32;
                        segments.push(open_segment(base, next, *overwrite)?);
                    }
                    let segment = &mut segments[id as usize];
                    let start = written as usize * floats_per_sample;
                    let end = (written + n) as usize * floats_per_sample;
                    segment
                        .container
                        .append(&mut segment.chunk, &samples_to_bytes(&samples[start..end]))?;
                    written += n;
                }
                debug_assert_eq!(written, count);
            }
            (Sink::Segmented { .. }, Placement::Single { .. }) => {
                return Err(CntError::InvalidArgument("segmented sink without layout".to_string()))
            }
        }
        Ok(())
    }

    /// Restores the persisted state to `flushed` samples.
    fn rewind_to(&mut self, flushed: u64) {
        let stride = self.stride;
        match (&mut self.sink, self.placement) {
            (Sink::Single { chunk }, _) => self.container.rewind(chunk, flushed * stride),
            (Sink::Segmented { segments, .. }, Placement::Segmented(layout)) => {
                for (id, segment) in segments.iter_mut().enumerate() {
                    let keep = layout.samples_in_segment(id as u32, flushed) * stride;
                    if segment.chunk.len() > keep {
                        segment.container.rewind(&mut segment.chunk, keep);
                    }
                }
            }
            (Sink::Segmented { .. }, Placement::Single { .. }) => {}
        }
    }

    /// Returns samples `[from, to)` including buffered ones.
    pub fn read_range(&self, from: u64, to: u64) -> Result<Vec<f32>> {
        check_range(from, to, self.sample_count())?;
        let mut out = Vec::with_capacity(((to - from) as usize) * self.channel_count);

        let persisted_to = to.min(self.flushed);
        if from < persisted_to {
            let sink = &self.sink;
            let container = &self.container;
            read_runs(
                &self.placement,
                self.stride,
                from,
                persisted_to,
                |id| match sink {
                    Sink::Single { .. } => Some(container.file()),
                    Sink::Segmented { segments, .. } => {
                        segments.get(id as usize).map(|s| s.container.file())
                    }
                },
                &mut out,
            )?;
        }

        let pending_from = from.max(self.flushed);
        if pending_from < to {
            let start = ((pending_from - self.flushed) as usize) * self.channel_count;
            let end = ((to - self.flushed) as usize) * self.channel_count;
            out.extend_from_slice(&self.pending[start..end]);
        }
        Ok(out)
    }

    /// Flushes the partial block, closes the sample chunk(s) and hands the
    /// recording container back for the trailing chunks.
    pub fn finish(mut self) -> Result<(ContainerWriter, u64)> {
        if !self.pending.is_empty() {
            let pending = std::mem::take(&mut self.pending);
            let samples = (pending.len() / self.channel_count) as u64;
            self.write_persisted(&pending)?;
            self.flushed += samples;
        }
        match self.sink {
            Sink::Single { chunk } => {
                self.container.end_chunk(chunk)?;
            }
            Sink::Segmented { segments, .. } => {
                let count = segments.len();
                for mut segment in segments {
                    segment.container.end_chunk(segment.chunk)?;
                    segment.container.finish()?;
                }
                debug!(segments = count, "finalized segment files");
            }
        }
        Ok((self.container, self.flushed))
    }
}

fn open_segment(base: &Path, id: u32, overwrite: bool) -> Result<Segment> {
    let path = segment_path(base, id);
    let file = create_file(&path, overwrite)?;
    let mut container = ContainerWriter::create(file, FourCc::SEGMENT_FORM)?;
    let chunk = container.begin_chunk(FourCc::DATA)?;
    debug!(path = %path.display(), id, "opened segment");
    Ok(Segment { container, chunk })
}

/// Creates a read/write file; `AlreadyExists` unless `overwrite`.
pub(crate) fn create_file(path: &Path, overwrite: bool) -> Result<File> {
    let mut options = OpenOptions::new();
    options.read(true).write(true);
    if overwrite {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    options.open(path).map_err(|e| match e.kind() {
        io::ErrorKind::AlreadyExists => CntError::AlreadyExists(path.display().to_string()),
        _ => CntError::Io(e),
    })
}

/// Read side of the store. Payload is read on demand with positional reads,
/// so concurrent range reads share no cursor.
#[derive(Debug)]
pub struct SampleReader {
    placement: Placement,
    files: Vec<File>,
    channel_count: usize,
    stride: u64,
    sample_count: u64,
}

impl SampleReader {
    /// Samples inside the recording's `data` chunk.
    pub fn single(
        file: File,
        data: Option<&ChunkEntry>,
        channel_count: usize,
        sample_count: u64,
    ) -> Result<Self> {
        let stride = stride_of(channel_count);
        let needed = sample_count
            .checked_mul(stride)
            .ok_or_else(|| CntError::format("sample count overflows"))?;
        let data_offset = match data {
            Some(entry) if entry.len >= needed => entry.payload_offset(),
            Some(entry) => {
                return Err(CntError::Format(format!(
                    "data chunk holds {} bytes, header promises {}",
                    entry.len, needed
                )))
            }
            None if sample_count == 0 => RIFF_HEADER_LEN,
            None => return Err(CntError::format("missing data chunk")),
        };
        Ok(SampleReader {
            placement: Placement::Single { data_offset },
            files: vec![file],
            channel_count,
            stride,
            sample_count,
        })
    }

    /// Samples spread over `<base>.NNN` segment files.
    pub fn segmented(
        base: &Path,
        channel_count: usize,
        sample_count: u64,
        segment_capacity: u64,
    ) -> Result<Self> {
        let stride = stride_of(channel_count);
        let layout = SegmentLayout::new(stride, segment_capacity)
            .map_err(|e| CntError::Format(format!("invalid segment layout: {}", e)))?;

        let mut files = Vec::new();
        for id in 0..layout.segment_count(sample_count) {
            let path = segment_path(base, id);
            let file = File::open(&path).map_err(|e| {
                CntError::Format(format!("cannot open segment {}: {}", path.display(), e))
            })?;
            let end = read_container_header(&file, FourCc::SEGMENT_FORM)?;
            let entry = read_chunk_header_at(&file, RIFF_HEADER_LEN, end)?;
            let needed = layout.samples_in_segment(id, sample_count) * stride;
            if entry.tag != FourCc::DATA || entry.len < needed {
                return Err(CntError::Format(format!(
                    "segment {} holds {} bytes of {}, expected {} bytes of data",
                    id, entry.len, entry.tag, needed
                )));
            }
            files.push(file);
        }
        Ok(SampleReader {
            placement: Placement::Segmented(layout),
            files,
            channel_count,
            stride,
            sample_count,
        })
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    /// Returns `(to - from) * channels` values, sample-major.
    pub fn read_range(&self, from: u64, to: u64) -> Result<Vec<f32>> {
        check_range(from, to, self.sample_count)?;
        let mut out = Vec::with_capacity(((to - from) as usize) * self.channel_count);
        read_runs(
            &self.placement,
            self.stride,
            from,
            to,
            |id| self.files.get(id as usize),
            &mut out,
        )?;
        Ok(out)
    }
}
