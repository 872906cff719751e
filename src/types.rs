use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};

/// Free-text recording fields beyond the patient name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordingField {
    PatientId,
    PatientAddress,
    PatientPhone,
    Hospital,
    TestName,
    TestSerial,
    Physician,
    Technician,
    MachineMake,
    MachineModel,
    MachineSerialNumber,
    Comment,
}

impl RecordingField {
    pub const ALL: [RecordingField; 12] = [
        RecordingField::PatientId,
        RecordingField::PatientAddress,
        RecordingField::PatientPhone,
        RecordingField::Hospital,
        RecordingField::TestName,
        RecordingField::TestSerial,
        RecordingField::Physician,
        RecordingField::Technician,
        RecordingField::MachineMake,
        RecordingField::MachineModel,
        RecordingField::MachineSerialNumber,
        RecordingField::Comment,
    ];

    /// Field id inside the `info` chunk.
    pub(crate) fn id(self) -> u8 {
        16 + self as u8
    }

    pub(crate) fn from_id(id: u8) -> Option<Self> {
        id.checked_sub(16)
            .and_then(|i| RecordingField::ALL.get(i as usize).copied())
    }
}

/// Recording metadata attached to a file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordingInfo {
    pub start_time: Option<DateTime<Utc>>,
    pub date_of_birth: Option<NaiveDate>,
    pub patient_name: Option<String>,
    pub patient_sex: Option<char>,
    pub patient_handedness: Option<char>,
    pub fields: BTreeMap<RecordingField, String>,
}

impl RecordingInfo {
    pub fn field(&self, field: RecordingField) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }
}

/// Averaging statistics, present only in average files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AverageInfo {
    /// Sample index of the stimulus onset.
    pub zero_offset: i64,
    pub condition_label: String,
    pub condition_color: String,
    pub trials_total: i64,
    pub trials_averaged: i64,
}

impl AverageInfo {
    /// Returned by string accessors on non-average files.
    pub const NONE_LABEL: &'static str = "none";
    /// Returned by numeric accessors on non-average files.
    pub const NONE_VALUE: i64 = 0;
}

/// Event marker at a sample position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub sample: u64,
    pub code: String,
}

/// Fixed header of a recording (`eeph` chunk).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CntHeader {
    pub sample_rate: f64,
    pub channel_count: u32,
    pub block_samples: u32,
    pub segment_capacity: u64,
    pub sample_count: u64,
    pub large_file: bool,
    pub average: bool,
}

/// Whether a session reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenMode::Read => write!(f, "read"),
            OpenMode::Write => write!(f, "write"),
        }
    }
}
