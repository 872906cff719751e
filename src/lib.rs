//! # EEProbe CNT Library for Rust
//!
//! A pure Rust library for reading and writing continuous multichannel
//! recordings (EEG/MEG) in a chunked, RIFF-shaped CNT container. Each file
//! stores a channel table, a sample rate, a stream of 32-bit float samples
//! and optional metadata: recording info, triggers and averaging statistics.
//!
//! The crate has two layers:
//!
//! * typed values: [`CntWriter`] and [`CntReader`]
//! * a process-wide, handle-based interface in [`api`], where every object
//!   is addressed by an integer [`Handle`]
//!
//! ## Quick Start
//!
//! ### Creating a CNT file
//!
//! ```rust
//! use eepcnt::{ChannelInfoBuilder, CntWriter, RecordingInfoBuilder, Result, WriteOptions};
//!
//! fn main() -> Result<()> {
//!     let path = std::env::temp_dir().join("eepcnt_quick_start.cnt");
//!
//!     // Describe the channels
//!     let mut channels = ChannelInfoBuilder::new();
//!     channels.add("Fp1", "A1", "uV")?;
//!     channels.add("Fp2", "A1", "uV")?;
//!
//!     let options = WriteOptions { overwrite: true, ..WriteOptions::default() };
//!     let mut writer = CntWriter::create(&path, 256.0, channels.finalize()?, options)?;
//!
//!     // Recording metadata
//!     let mut info = RecordingInfoBuilder::new();
//!     info.set_start_time(1_700_000_000)?;
//!     info.set_patient_name("Jane Doe");
//!     writer.set_recording_info(info.build())?;
//!
//!     // 256 samples of 2 channels, sample-major
//!     writer.add_samples(&vec![0.0; 2 * 256], 256)?;
//!     writer.add_trigger(128, "stim")?;
//!     writer.finalize()?;
//!
//!     # std::fs::remove_file(&path).ok();
//!     Ok(())
//! }
//! ```
//!
//! ### Reading a CNT file
//!
//! ```rust
//! use eepcnt::{CntReader, Result};
//! # use eepcnt::doctest_utils::create_simple_test_file;
//!
//! fn main() -> Result<()> {
//!     # let path = std::env::temp_dir().join("eepcnt_quick_read.cnt");
//!     # create_simple_test_file(&path)?;
//!     let reader = CntReader::open(&path)?;
//!
//!     for channel in reader.channels().iter() {
//!         println!("{} ({}) against {}", channel.label, channel.unit, channel.reference);
//!     }
//!
//!     // samples [10, 20) of every channel
//!     let block = reader.read_samples(10, 20)?;
//!     assert_eq!(block.len(), 10 * reader.channels().len());
//!     # std::fs::remove_file(&path).ok();
//!     Ok(())
//! }
//! ```
//!
//! ## Large files
//!
//! A single container is limited to 4 GiB. With
//! [`WriteOptions::large_file`] set, samples go to companion segment files
//! `<path>.000`, `<path>.001`, ... and the main file keeps only metadata.
//! Readers resolve sample positions across segments transparently.
//!
//! ## Average files
//!
//! Files written with [`CntWriter::set_average_info`] carry averaging
//! statistics. For plain recordings the accessors in [`api`] return the
//! sentinels `0` and `"none"`:
//!
//! ```rust
//! use eepcnt::AverageInfo;
//!
//! assert_eq!(AverageInfo::NONE_LABEL, "none");
//! assert_eq!(AverageInfo::NONE_VALUE, 0);
//! ```

pub mod api;
pub mod channels;
pub mod codec;
pub mod engine;
pub mod error;
pub mod metadata;
pub mod reader;
pub mod registry;
pub mod session;
pub mod store;
pub mod types;
pub mod utils;
pub mod writer;

#[doc(hidden)]
pub mod doctest_utils; // For internal doctest support

// Re-export main types for convenience
pub use channels::{Channel, ChannelInfo, ChannelInfoBuilder};
pub use engine::Engine;
pub use error::{CntError, ErrorKind, Result};
pub use metadata::RecordingInfoBuilder;
pub use reader::{CntReader, ReadOptions};
pub use registry::{Handle, HandleKind, INVALID_HANDLE};
pub use types::{AverageInfo, CntHeader, OpenMode, RecordingField, RecordingInfo, Trigger};
pub use writer::{CntWriter, WriteOptions};

// Important constants
pub const CNT_FORMAT_VERSION: u16 = 1;
pub const DEFAULT_BLOCK_SAMPLES: usize = 512;
/// Largest even payload that fits one 32-bit chunk length.
pub const DEFAULT_SEGMENT_CAPACITY: u64 = (u32::MAX as u64 - 16) & !1;
pub const MAX_CHANNELS: usize = 4096;

/// Library version
///
/// Returns the current version of the eepcnt library.
///
/// # Examples
///
/// ```rust
/// let version = eepcnt::version();
/// assert!(!version.is_empty());
/// assert!(version.contains('.'));
/// println!("CNT library version: {}", version);
/// ```
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
