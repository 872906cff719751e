//! Metadata records: recording info builder and the payload codecs of the
//! `eeph`, `info`, `avg ` and `evt ` chunks.

use chrono::{Datelike, NaiveDate};

use crate::error::{CntError, Result};
use crate::types::{AverageInfo, CntHeader, RecordingField, RecordingInfo, Trigger};
use crate::utils::{epoch_to_datetime, ymd_to_date, ByteReader, ByteWriter};
use crate::{CNT_FORMAT_VERSION, MAX_CHANNELS};

/// Size of the `eeph` payload.
pub const HEADER_LEN: usize = 36;

/// Offset of `sample_count` inside the `eeph` payload.
pub const HEADER_SAMPLE_COUNT_OFFSET: u64 = 28;

const FLAG_LARGE_FILE: u16 = 0x0001;
const FLAG_AVERAGE: u16 = 0x0002;

const FIELD_START_TIME: u8 = 1;
const FIELD_DATE_OF_BIRTH: u8 = 2;
const FIELD_PATIENT_NAME: u8 = 3;
const FIELD_PATIENT_SEX: u8 = 4;
const FIELD_PATIENT_HANDEDNESS: u8 = 5;

/// Accumulates recording info before it is attached to a write session.
///
/// Every setter is independent and the last write of a field wins.
///
/// ```rust
/// use eepcnt::{RecordingField, RecordingInfoBuilder};
///
/// let mut builder = RecordingInfoBuilder::new();
/// builder.set_patient_name("John Doe");
/// builder.set_date_of_birth(1950, 6, 28)?;
/// builder.set_start_time(1_600_000_000)?;
/// builder.set_field(RecordingField::Hospital, "General");
/// let info = builder.build();
/// assert_eq!(info.patient_name.as_deref(), Some("John Doe"));
/// assert_eq!(info.field(RecordingField::Hospital), Some("General"));
/// # Ok::<(), eepcnt::CntError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct RecordingInfoBuilder {
    info: RecordingInfo,
}

impl RecordingInfoBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recording start as seconds since the Unix epoch.
    pub fn set_start_time(&mut self, epoch: i64) -> Result<()> {
        self.info.start_time = Some(epoch_to_datetime(epoch)?);
        Ok(())
    }

    pub fn set_date_of_birth(&mut self, year: i32, month: u32, day: u32) -> Result<()> {
        self.info.date_of_birth = Some(ymd_to_date(year, month, day)?);
        Ok(())
    }

    pub fn set_patient_name(&mut self, name: &str) {
        self.info.patient_name = Some(name.to_string());
    }

    pub fn set_patient_sex(&mut self, sex: char) {
        self.info.patient_sex = Some(sex);
    }

    pub fn set_patient_handedness(&mut self, handedness: char) {
        self.info.patient_handedness = Some(handedness);
    }

    pub fn set_field(&mut self, field: RecordingField, value: &str) {
        self.info.fields.insert(field, value.to_string());
    }

    pub fn build(self) -> RecordingInfo {
        self.info
    }
}

fn put_field(w: &mut ByteWriter, id: u8, value: &[u8]) {
    w.put_u8(id);
    w.put_u32(value.len() as u32);
    w.put_bytes(value);
}

fn decode_char(bytes: &[u8]) -> Result<char> {
    let mut r = ByteReader::new(bytes, "recording info");
    char::from_u32(r.get_u32()?)
        .ok_or_else(|| CntError::format("invalid character in recording info"))
}

fn decode_text(bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|_| CntError::format("invalid UTF-8 in recording info"))
}

/// `info` payload: `u32 count`, then `id u8 | len u32 | bytes` per field.
pub(crate) fn encode_recording_info(info: &RecordingInfo) -> Result<Vec<u8>> {
    let mut body = ByteWriter::new();
    let mut count = 0u32;

    if let Some(start) = info.start_time {
        put_field(&mut body, FIELD_START_TIME, &start.timestamp().to_le_bytes());
        count += 1;
    }
    if let Some(dob) = info.date_of_birth {
        let mut d = ByteWriter::with_capacity(6);
        d.put_i32(dob.year());
        d.put_u8(dob.month() as u8);
        d.put_u8(dob.day() as u8);
        put_field(&mut body, FIELD_DATE_OF_BIRTH, &d.into_inner());
        count += 1;
    }
    if let Some(name) = &info.patient_name {
        put_field(&mut body, FIELD_PATIENT_NAME, name.as_bytes());
        count += 1;
    }
    if let Some(sex) = info.patient_sex {
        put_field(&mut body, FIELD_PATIENT_SEX, &(sex as u32).to_le_bytes());
        count += 1;
    }
    if let Some(hand) = info.patient_handedness {
        put_field(&mut body, FIELD_PATIENT_HANDEDNESS, &(hand as u32).to_le_bytes());
        count += 1;
    }
    for (field, value) in &info.fields {
        if u32::try_from(value.len()).is_err() {
            return Err(CntError::InvalidArgument(format!("{:?} too long", field)));
        }
        put_field(&mut body, field.id(), value.as_bytes());
        count += 1;
    }

    let mut w = ByteWriter::with_capacity(4 + body.len());
    w.put_u32(count);
    w.put_bytes(&body.into_inner());
    Ok(w.into_inner())
}

/// Unknown field ids are skipped.
pub(crate) fn decode_recording_info(payload: &[u8]) -> Result<RecordingInfo> {
    let mut r = ByteReader::new(payload, "recording info");
    let count = r.get_u32()?;
    let mut info = RecordingInfo::default();

    for _ in 0..count {
        let id = r.get_u8()?;
        let len = r.get_u32()? as usize;
        let value = r.take(len)?;
        match id {
            FIELD_START_TIME => {
                let mut v = ByteReader::new(value, "recording info");
                info.start_time = Some(epoch_to_datetime(v.get_i64()?).map_err(|_| {
                    CntError::format("start time out of range")
                })?);
            }
            FIELD_DATE_OF_BIRTH => {
                let mut v = ByteReader::new(value, "recording info");
                let year = v.get_i32()?;
                let month = v.get_u8()? as u32;
                let day = v.get_u8()? as u32;
                info.date_of_birth = Some(
                    NaiveDate::from_ymd_opt(year, month, day)
                        .ok_or_else(|| CntError::format("invalid date of birth"))?,
                );
            }
            FIELD_PATIENT_NAME => info.patient_name = Some(decode_text(value)?),
            FIELD_PATIENT_SEX => info.patient_sex = Some(decode_char(value)?),
            FIELD_PATIENT_HANDEDNESS => info.patient_handedness = Some(decode_char(value)?),
            other => match RecordingField::from_id(other) {
                Some(field) => {
                    info.fields.insert(field, decode_text(value)?);
                }
                None => tracing::debug!(id = other, "skipping unknown recording info field"),
            },
        }
    }
    Ok(info)
}

pub(crate) fn encode_average_info(avg: &AverageInfo) -> Result<Vec<u8>> {
    let mut w = ByteWriter::new();
    w.put_i64(avg.zero_offset);
    w.put_str(&avg.condition_label)?;
    w.put_str(&avg.condition_color)?;
    w.put_i64(avg.trials_total);
    w.put_i64(avg.trials_averaged);
    Ok(w.into_inner())
}

pub(crate) fn decode_average_info(payload: &[u8]) -> Result<AverageInfo> {
    let mut r = ByteReader::new(payload, "average info");
    Ok(AverageInfo {
        zero_offset: r.get_i64()?,
        condition_label: r.get_str()?,
        condition_color: r.get_str()?,
        trials_total: r.get_i64()?,
        trials_averaged: r.get_i64()?,
    })
}

pub(crate) fn encode_triggers(triggers: &[Trigger]) -> Result<Vec<u8>> {
    let mut w = ByteWriter::new();
    w.put_u32(triggers.len() as u32);
    for trigger in triggers {
        w.put_u64(trigger.sample);
        w.put_str(&trigger.code)?;
    }
    Ok(w.into_inner())
}

pub(crate) fn decode_triggers(payload: &[u8]) -> Result<Vec<Trigger>> {
    let mut r = ByteReader::new(payload, "trigger table");
    let count = r.get_u32()? as usize;
    // 每个触发至少 12 字节
    if count > r.remaining() / 12 {
        return Err(CntError::format("trigger count exceeds chunk size"));
    }
    let mut triggers = Vec::with_capacity(count);
    for _ in 0..count {
        let sample = r.get_u64()?;
        let code = r.get_str()?;
        triggers.push(Trigger { sample, code });
    }
    Ok(triggers)
}

pub(crate) fn encode_header(header: &CntHeader) -> Vec<u8> {
    let mut flags = 0u16;
    if header.large_file {
        flags |= FLAG_LARGE_FILE;
    }
    if header.average {
        flags |= FLAG_AVERAGE;
    }
    let mut w = ByteWriter::with_capacity(HEADER_LEN);
    w.put_u16(CNT_FORMAT_VERSION);
    w.put_u16(flags);
    w.put_f64(header.sample_rate);
    w.put_u32(header.channel_count);
    w.put_u32(header.block_samples);
    w.put_u64(header.segment_capacity);
    w.put_u64(header.sample_count);
    debug_assert_eq!(w.len(), HEADER_LEN);
    w.into_inner()
}

pub(crate) fn decode_header(payload: &[u8]) -> Result<CntHeader> {
    if payload.len() < HEADER_LEN {
        return Err(CntError::Format(format!(
            "header chunk holds {} bytes, expected {}",
            payload.len(),
            HEADER_LEN
        )));
    }
    let mut r = ByteReader::new(payload, "header");
    let version = r.get_u16()?;
    if version != CNT_FORMAT_VERSION {
        return Err(CntError::Format(format!("unsupported format version {}", version)));
    }
    let flags = r.get_u16()?;
    let header = CntHeader {
        sample_rate: r.get_f64()?,
        channel_count: r.get_u32()?,
        block_samples: r.get_u32()?,
        segment_capacity: r.get_u64()?,
        sample_count: r.get_u64()?,
        large_file: flags & FLAG_LARGE_FILE != 0,
        average: flags & FLAG_AVERAGE != 0,
    };

    if !(header.sample_rate.is_finite() && header.sample_rate > 0.0) {
        return Err(CntError::Format(format!("invalid sample rate {}", header.sample_rate)));
    }
    if header.channel_count == 0 || header.channel_count as usize > MAX_CHANNELS {
        return Err(CntError::Format(format!("invalid channel count {}", header.channel_count)));
    }
    if header.block_samples == 0 {
        return Err(CntError::format("block size must be non-zero"));
    }
    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_last_write_wins() {
        let mut b = RecordingInfoBuilder::new();
        b.set_patient_name("first");
        b.set_patient_name("second");
        b.set_field(RecordingField::Comment, "a");
        b.set_field(RecordingField::Comment, "b");
        let info = b.build();
        assert_eq!(info.patient_name.as_deref(), Some("second"));
        assert_eq!(info.field(RecordingField::Comment), Some("b"));
        assert!(info.start_time.is_none());
    }

    #[test]
    fn test_builder_rejects_bad_date() {
        let mut b = RecordingInfoBuilder::new();
        assert!(b.set_date_of_birth(1990, 13, 1).is_err());
        assert!(b.build().date_of_birth.is_none());
    }

    #[test]
    fn test_recording_info_codec() {
        let mut b = RecordingInfoBuilder::new();
        b.set_start_time(1_234_567_890).unwrap();
        b.set_date_of_birth(1950, 6, 28).unwrap();
        b.set_patient_name("Jöhn \0 Doe");
        b.set_patient_sex('M');
        b.set_patient_handedness('R');
        b.set_field(RecordingField::Technician, "tech");
        let info = b.build();

        let decoded = decode_recording_info(&encode_recording_info(&info).unwrap()).unwrap();
        assert_eq!(decoded, info);

        let empty = RecordingInfo::default();
        let decoded = decode_recording_info(&encode_recording_info(&empty).unwrap()).unwrap();
        assert_eq!(decoded, empty);
    }

    #[test]
    fn test_unknown_info_field_is_skipped() {
        let mut w = ByteWriter::new();
        w.put_u32(2);
        put_field(&mut w, 99, b"future");
        put_field(&mut w, FIELD_PATIENT_NAME, b"Ann");
        let info = decode_recording_info(&w.into_inner()).unwrap();
        assert_eq!(info.patient_name.as_deref(), Some("Ann"));
    }

    #[test]
    fn test_average_and_triggers_codec() {
        let avg = AverageInfo {
            zero_offset: 51,
            condition_label: "target".to_string(),
            condition_color: "red".to_string(),
            trials_total: 120,
            trials_averaged: 97,
        };
        assert_eq!(decode_average_info(&encode_average_info(&avg).unwrap()).unwrap(), avg);

        let triggers = vec![
            Trigger { sample: 10, code: "1".to_string() },
            Trigger { sample: 5, code: "boundary".to_string() },
        ];
        assert_eq!(decode_triggers(&encode_triggers(&triggers).unwrap()).unwrap(), triggers);

        let mut bogus = 1000u32.to_le_bytes().to_vec();
        bogus.extend_from_slice(&[0; 12]);
        assert!(decode_triggers(&bogus).is_err());
    }

    #[test]
    fn test_header_codec() {
        let header = CntHeader {
            sample_rate: 512.0,
            channel_count: 16,
            block_samples: 512,
            segment_capacity: 1 << 20,
            sample_count: 5120,
            large_file: true,
            average: false,
        };
        let bytes = encode_header(&header);
        assert_eq!(bytes.len(), HEADER_LEN);
        assert_eq!(
            &bytes[HEADER_SAMPLE_COUNT_OFFSET as usize..],
            &5120u64.to_le_bytes()
        );
        assert_eq!(decode_header(&bytes).unwrap(), header);

        let mut bad = bytes.clone();
        bad[0] = 9;
        assert!(decode_header(&bad).is_err());
        assert!(decode_header(&bytes[..10]).is_err());

        let mut zero_rate = header;
        zero_rate.sample_rate = 0.0;
        assert!(decode_header(&encode_header(&zero_rate)).is_err());
    }
}
