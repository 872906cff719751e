//! Channel table: ordered channel descriptors and their builder.

use crate::error::{CntError, Result};
use crate::utils::{ByteReader, ByteWriter};
use crate::MAX_CHANNELS;

/// One recorded signal stream (electrode).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub label: String,
    pub reference: String,
    pub unit: String,
}

impl Channel {
    pub fn new(label: &str, reference: &str, unit: &str) -> Self {
        Channel {
            label: label.to_string(),
            reference: reference.to_string(),
            unit: unit.to_string(),
        }
    }
}

/// Immutable, ordered list of channels attached to a file.
///
/// The channel count is the interleave width of the sample store. Labels may
/// repeat; montages reuse electrode labels against different references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    channels: Vec<Channel>,
}

impl ChannelInfo {
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<&Channel> {
        self.channels.get(index).ok_or(CntError::InvalidChannelIndex(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter()
    }

    /// Index of the first channel with this label.
    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.channels.iter().position(|c| c.label == label)
    }

    pub(crate) fn encode(&self) -> Result<Vec<u8>> {
        let mut w = ByteWriter::with_capacity(4 + self.channels.len() * 24);
        w.put_u32(self.channels.len() as u32);
        for channel in &self.channels {
            w.put_str(&channel.label)?;
            w.put_str(&channel.reference)?;
            w.put_str(&channel.unit)?;
        }
        Ok(w.into_inner())
    }

    pub(crate) fn decode(payload: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(payload, "channel table");
        let count = r.get_u32()? as usize;
        if count == 0 || count > MAX_CHANNELS {
            return Err(CntError::Format(format!("invalid channel count {}", count)));
        }
        let mut channels = Vec::with_capacity(count);
        for _ in 0..count {
            let label = r.get_str()?;
            let reference = r.get_str()?;
            let unit = r.get_str()?;
            channels.push(Channel { label, reference, unit });
        }
        Ok(ChannelInfo { channels })
    }
}

/// Append-only builder for [`ChannelInfo`].
///
/// ```rust
/// use eepcnt::ChannelInfoBuilder;
///
/// let mut builder = ChannelInfoBuilder::new();
/// assert_eq!(builder.add("Fp1", "A1", "uV")?, 0);
/// assert_eq!(builder.add("Fp2", "A1", "uV")?, 1);
/// let info = builder.finalize()?;
/// assert_eq!(info.len(), 2);
/// assert_eq!(info.index_of("Fp2"), Some(1));
/// # Ok::<(), eepcnt::CntError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct ChannelInfoBuilder {
    channels: Vec<Channel>,
}

impl ChannelInfoBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a channel and returns its 0-based index.
    pub fn add(&mut self, label: &str, reference: &str, unit: &str) -> Result<usize> {
        for (name, value) in [("label", label), ("reference", reference), ("unit", unit)] {
            if value.is_empty() {
                return Err(CntError::InvalidArgument(format!("channel {} must not be empty", name)));
            }
        }
        if self.channels.len() >= MAX_CHANNELS {
            return Err(CntError::InvalidArgument(format!(
                "at most {} channels supported",
                MAX_CHANNELS
            )));
        }
        self.channels.push(Channel::new(label, reference, unit));
        Ok(self.channels.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Consumes the builder. A file needs at least one channel.
    pub fn finalize(self) -> Result<ChannelInfo> {
        if self.channels.is_empty() {
            return Err(CntError::InvalidArgument("channel info has no channels".to_string()));
        }
        Ok(ChannelInfo { channels: self.channels })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_indices_and_duplicates() {
        let mut b = ChannelInfoBuilder::new();
        assert_eq!(b.add("Cz", "A1", "uV").unwrap(), 0);
        assert_eq!(b.add("Cz", "A2", "uV").unwrap(), 1);
        let info = b.finalize().unwrap();
        assert_eq!(info.len(), 2);
        assert_eq!(info.get(1).unwrap().reference, "A2");
        assert_eq!(info.index_of("Cz"), Some(0));
        assert_eq!(info.index_of("Pz"), None);
        assert!(matches!(info.get(2), Err(CntError::InvalidChannelIndex(2))));
    }

    #[test]
    fn test_builder_rejects_empty_fields() {
        let mut b = ChannelInfoBuilder::new();
        assert!(b.add("", "A1", "uV").is_err());
        assert!(b.add("Fp1", "A1", "").is_err());
        assert!(b.is_empty());
        assert!(b.finalize().is_err());
    }

    #[test]
    fn test_channel_table_codec() {
        let mut b = ChannelInfoBuilder::new();
        b.add("Fp1", "A1", "uV").unwrap();
        b.add("EOG", "ref", "mV").unwrap();
        let info = b.finalize().unwrap();
        let decoded = ChannelInfo::decode(&info.encode().unwrap()).unwrap();
        assert_eq!(decoded, info);

        let mut truncated = info.encode().unwrap();
        truncated.truncate(truncated.len() - 1);
        assert!(matches!(ChannelInfo::decode(&truncated), Err(CntError::Format(_))));
        assert!(ChannelInfo::decode(&0u32.to_le_bytes()).is_err());
    }
}
