//! Tagged-chunk byte container.
//!
//! Files are RIFF-shaped: a 12-byte `RIFF` header naming a form type,
//! followed by chunks of `tag[4] | u32 payload length | payload`, each padded
//! to an even length. All numbers are little-endian.
//!
//! ```text
//! 0   "RIFF"
//! 4   u32 container size (file length - 8)
//! 8   form type ("CNT " for recordings, "CNTS" for large-file segments)
//! 12  chunks ...
//! ```

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{CntError, Result};
use crate::utils::{read_exact_at, write_all_at};

/// Four-character chunk tag.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCc(pub [u8; 4]);

impl FourCc {
    pub const RIFF: FourCc = FourCc(*b"RIFF");
    pub const CNT_FORM: FourCc = FourCc(*b"CNT ");
    pub const SEGMENT_FORM: FourCc = FourCc(*b"CNTS");

    pub const EEPH: FourCc = FourCc(*b"eeph");
    pub const CHAN: FourCc = FourCc(*b"chan");
    pub const DATA: FourCc = FourCc(*b"data");
    pub const INFO: FourCc = FourCc(*b"info");
    pub const AVG: FourCc = FourCc(*b"avg ");
    pub const EVT: FourCc = FourCc(*b"evt ");

    /// Tags understood by the recording reader.
    pub const KNOWN: [FourCc; 6] = [
        FourCc::EEPH,
        FourCc::CHAN,
        FourCc::DATA,
        FourCc::INFO,
        FourCc::AVG,
        FourCc::EVT,
    ];

    pub fn is_known(&self) -> bool {
        FourCc::KNOWN.contains(self)
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCc({:?})", String::from_utf8_lossy(&self.0))
    }
}

pub const RIFF_HEADER_LEN: u64 = 12;
pub const CHUNK_HEADER_LEN: u64 = 8;

/// Largest container a 32-bit RIFF size field can describe.
pub const MAX_CONTAINER_LEN: u64 = u32::MAX as u64 + 8;

/// Payload offset of the single `data` chunk inside a segment file.
pub const SEGMENT_DATA_OFFSET: u64 = RIFF_HEADER_LEN + CHUNK_HEADER_LEN;

/// Location of one chunk in a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkEntry {
    pub tag: FourCc,
    /// Offset of the chunk header.
    pub offset: u64,
    /// Payload length in bytes, excluding padding.
    pub len: u64,
}

impl ChunkEntry {
    pub fn payload_offset(&self) -> u64 {
        self.offset + CHUNK_HEADER_LEN
    }

    /// Offset of the chunk following this one.
    pub fn next_offset(&self) -> u64 {
        self.payload_offset() + self.len + (self.len & 1)
    }
}

/// Directory of a container, built by one scan on open.
#[derive(Debug, Default)]
pub struct ChunkIndex {
    entries: Vec<ChunkEntry>,
    by_tag: HashMap<FourCc, Vec<usize>>,
    container_end: u64,
}

impl ChunkIndex {
    fn push(&mut self, entry: ChunkEntry) {
        self.by_tag.entry(entry.tag).or_default().push(self.entries.len());
        self.entries.push(entry);
    }

    /// First chunk carrying `tag`.
    pub fn first(&self, tag: FourCc) -> Option<&ChunkEntry> {
        self.by_tag
            .get(&tag)
            .and_then(|ids| ids.first())
            .map(|&i| &self.entries[i])
    }

    /// Offsets of every chunk carrying `tag`, in file order.
    pub fn offsets(&self, tag: FourCc) -> Vec<u64> {
        self.by_tag
            .get(&tag)
            .map(|ids| ids.iter().map(|&i| self.entries[i].offset).collect())
            .unwrap_or_default()
    }

    pub fn entries(&self) -> &[ChunkEntry] {
        &self.entries
    }

    pub fn container_end(&self) -> u64 {
        self.container_end
    }
}

/// Sequential chunk writer over a seekable file.
///
/// Chunks are appended at the write cursor. A chunk opened with
/// [`begin_chunk`](Self::begin_chunk) may be streamed into and has its length
/// backpatched by [`end_chunk`](Self::end_chunk).
#[derive(Debug)]
pub struct ContainerWriter {
    file: File,
    cursor: u64,
}

/// A chunk whose payload is still being streamed.
#[derive(Debug)]
pub struct OpenChunk {
    entry: ChunkEntry,
}

impl OpenChunk {
    pub fn payload_offset(&self) -> u64 {
        self.entry.payload_offset()
    }

    pub fn len(&self) -> u64 {
        self.entry.len
    }
}

impl ContainerWriter {
    /// Writes a `RIFF` header with a placeholder size.
    pub fn create(file: File, form: FourCc) -> Result<Self> {
        let mut header = Vec::with_capacity(RIFF_HEADER_LEN as usize);
        header.extend_from_slice(&FourCc::RIFF.0);
        header.extend_from_slice(&0u32.to_le_bytes());
        header.extend_from_slice(&form.0);
        write_all_at(&file, &header, 0)?;
        Ok(ContainerWriter { file, cursor: RIFF_HEADER_LEN })
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    fn check_ceiling(&self, extra: u64) -> Result<()> {
        if self.cursor + extra > MAX_CONTAINER_LEN {
            return Err(CntError::InvalidArgument(
                "container would exceed the 4 GiB single-file ceiling; use large-file mode"
                    .to_string(),
            ));
        }
        Ok(())
    }

    fn chunk_header(tag: FourCc, len: u64) -> Result<[u8; 8]> {
        let len = u32::try_from(len)
            .map_err(|_| CntError::InvalidArgument(format!("chunk {} too large", tag)))?;
        let mut header = [0u8; 8];
        header[..4].copy_from_slice(&tag.0);
        header[4..].copy_from_slice(&len.to_le_bytes());
        Ok(header)
    }

    /// Appends a complete chunk and returns where it landed.
    pub fn write_chunk(&mut self, tag: FourCc, payload: &[u8]) -> Result<ChunkEntry> {
        let len = payload.len() as u64;
        self.check_ceiling(CHUNK_HEADER_LEN + len + (len & 1))?;
        let entry = ChunkEntry { tag, offset: self.cursor, len };

        let mut bytes = Vec::with_capacity(payload.len() + 9);
        bytes.extend_from_slice(&Self::chunk_header(tag, len)?);
        bytes.extend_from_slice(payload);
        if len & 1 == 1 {
            bytes.push(0);
        }
        write_all_at(&self.file, &bytes, self.cursor)?;
        self.cursor = entry.next_offset();
        debug!(tag = %tag, offset = entry.offset, len, "wrote chunk");
        Ok(entry)
    }

    /// Opens a chunk with a zero length placeholder.
    pub fn begin_chunk(&mut self, tag: FourCc) -> Result<OpenChunk> {
        self.check_ceiling(CHUNK_HEADER_LEN)?;
        let entry = ChunkEntry { tag, offset: self.cursor, len: 0 };
        write_all_at(&self.file, &Self::chunk_header(tag, 0)?, self.cursor)?;
        self.cursor += CHUNK_HEADER_LEN;
        Ok(OpenChunk { entry })
    }

    /// Streams bytes into the open chunk. Nothing may be written between
    /// `begin_chunk` and `end_chunk` other than through this method.
    pub fn append(&mut self, chunk: &mut OpenChunk, bytes: &[u8]) -> Result<()> {
        self.check_ceiling(bytes.len() as u64)?;
        write_all_at(&self.file, bytes, self.cursor)?;
        self.cursor += bytes.len() as u64;
        chunk.entry.len += bytes.len() as u64;
        Ok(())
    }

    /// Drops streamed bytes past `len`; used to undo a failed append.
    pub fn rewind(&mut self, chunk: &mut OpenChunk, len: u64) {
        debug_assert!(len <= chunk.entry.len);
        chunk.entry.len = len;
        self.cursor = chunk.entry.payload_offset() + len;
    }

    /// Backpatches the chunk length and pads it to even size.
    pub fn end_chunk(&mut self, chunk: OpenChunk) -> Result<ChunkEntry> {
        let entry = chunk.entry;
        let header = Self::chunk_header(entry.tag, entry.len)?;
        write_all_at(&self.file, &header[4..], entry.offset + 4)?;
        if entry.len & 1 == 1 {
            write_all_at(&self.file, &[0], self.cursor)?;
            self.cursor += 1;
        }
        debug!(tag = %entry.tag, offset = entry.offset, len = entry.len, "closed chunk");
        Ok(entry)
    }

    /// Overwrites bytes at an absolute offset already written.
    pub fn patch(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        debug_assert!(offset + bytes.len() as u64 <= self.cursor);
        write_all_at(&self.file, bytes, offset)?;
        Ok(())
    }

    /// Backpatches the container size and syncs the file.
    pub fn finish(&mut self) -> Result<()> {
        let size = u32::try_from(self.cursor - 8).map_err(|_| {
            CntError::InvalidArgument("container exceeds the 4 GiB ceiling".to_string())
        })?;
        write_all_at(&self.file, &size.to_le_bytes(), 4)?;
        self.file.sync_data()?;
        Ok(())
    }
}

/// Validates the `RIFF` header and returns the container end offset.
pub fn read_container_header(file: &File, form: FourCc) -> Result<u64> {
    let file_len = file.metadata()?.len();
    if file_len < RIFF_HEADER_LEN {
        return Err(CntError::format("file too short for a container header"));
    }
    let mut header = [0u8; RIFF_HEADER_LEN as usize];
    read_exact_at(file, &mut header, 0)?;

    if header[..4] != FourCc::RIFF.0 {
        return Err(CntError::format("missing RIFF signature"));
    }
    if header[8..12] != form.0 {
        return Err(CntError::Format(format!(
            "unexpected form type {}, expected {}",
            FourCc([header[8], header[9], header[10], header[11]]),
            form
        )));
    }
    let size = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as u64;
    let end = size + 8;
    if end < RIFF_HEADER_LEN {
        return Err(CntError::format("container was never finalized"));
    }
    if end > file_len {
        return Err(CntError::Format(format!(
            "container declares {} bytes but file holds {}",
            end, file_len
        )));
    }
    Ok(end)
}

/// Reads one chunk header at `offset`, checking it fits inside `end`.
pub fn read_chunk_header_at(file: &File, offset: u64, end: u64) -> Result<ChunkEntry> {
    if offset + CHUNK_HEADER_LEN > end {
        return Err(CntError::Format(format!("truncated chunk header at {}", offset)));
    }
    let mut header = [0u8; CHUNK_HEADER_LEN as usize];
    read_exact_at(file, &mut header, offset)?;
    let tag = FourCc([header[0], header[1], header[2], header[3]]);
    let len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as u64;
    let entry = ChunkEntry { tag, offset, len };
    if entry.payload_offset() + len > end {
        return Err(CntError::Format(format!(
            "chunk {} at {} declares {} bytes past the container end",
            tag,
            offset,
            entry.payload_offset() + len - end
        )));
    }
    Ok(entry)
}

/// Decodes one chunk: `(tag, payload, next_offset)`.
pub fn read_chunk_at(file: &File, offset: u64, end: u64) -> Result<(FourCc, Vec<u8>, u64)> {
    let entry = read_chunk_header_at(file, offset, end)?;
    let mut payload = vec![0u8; entry.len as usize];
    read_exact_at(file, &mut payload, entry.payload_offset())?;
    Ok((entry.tag, payload, entry.next_offset().min(end)))
}

/// Reads the payload of an indexed chunk.
pub fn read_payload(file: &File, entry: &ChunkEntry) -> Result<Vec<u8>> {
    let mut payload = vec![0u8; entry.len as usize];
    read_exact_at(file, &mut payload, entry.payload_offset())?;
    Ok(payload)
}

/// Scans a recording container once and builds its chunk directory.
///
/// In strict mode an unknown tag is a format error; otherwise it is skipped.
pub fn index_chunks(file: &File, strict: bool) -> Result<ChunkIndex> {
    let end = read_container_header(file, FourCc::CNT_FORM)?;
    let mut index = ChunkIndex { container_end: end, ..ChunkIndex::default() };

    let mut offset = RIFF_HEADER_LEN;
    while offset < end {
        let entry = read_chunk_header_at(file, offset, end)?;
        if entry.tag.is_known() {
            index.push(entry);
        } else if strict {
            return Err(CntError::Format(format!(
                "unrecognized chunk {} at offset {}",
                entry.tag, offset
            )));
        } else {
            debug!(tag = %entry.tag, offset, "skipping unknown chunk");
        }
        offset = entry.next_offset().min(end);
    }
    debug!(chunks = index.entries.len(), end, "indexed container");
    Ok(index)
}

/// Maps the logical sample byte stream onto numbered segment files.
///
/// Each segment holds a whole number of samples, so no sample straddles two
/// files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentLayout {
    stride: u64,
    samples_per_segment: u64,
}

impl SegmentLayout {
    /// `stride` is the size of one sample in bytes, `capacity` the maximum
    /// payload bytes per segment.
    pub fn new(stride: u64, capacity: u64) -> Result<Self> {
        if stride == 0 {
            return Err(CntError::InvalidArgument("sample stride must be non-zero".to_string()));
        }
        let max_capacity = MAX_CONTAINER_LEN - SEGMENT_DATA_OFFSET;
        if capacity < stride || capacity > max_capacity {
            return Err(CntError::InvalidArgument(format!(
                "segment capacity {} must lie in {}..={}",
                capacity, stride, max_capacity
            )));
        }
        Ok(SegmentLayout { stride, samples_per_segment: capacity / stride })
    }

    pub fn stride(&self) -> u64 {
        self.stride
    }

    pub fn samples_per_segment(&self) -> u64 {
        self.samples_per_segment
    }

    /// `(segment_id, physical_offset)` of a logical byte offset.
    pub fn resolve(&self, logical_offset: u64) -> (u32, u64) {
        let sample = logical_offset / self.stride;
        let within = logical_offset % self.stride;
        let segment = sample / self.samples_per_segment;
        let local = sample % self.samples_per_segment;
        (
            segment as u32,
            SEGMENT_DATA_OFFSET + local * self.stride + within,
        )
    }

    /// Number of segment files needed for `sample_count` samples.
    pub fn segment_count(&self, sample_count: u64) -> u32 {
        sample_count.div_ceil(self.samples_per_segment) as u32
    }

    /// Samples stored in segment `id` when the store holds `sample_count`.
    pub fn samples_in_segment(&self, id: u32, sample_count: u64) -> u64 {
        let start = id as u64 * self.samples_per_segment;
        sample_count.saturating_sub(start).min(self.samples_per_segment)
    }
}

/// `<path>.<NNN>`
pub fn segment_path(base: &Path, id: u32) -> PathBuf {
    let mut name = base.as_os_str().to_os_string();
    name.push(format!(".{:03}", id));
    PathBuf::from(name)
}
