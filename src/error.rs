use std::fmt;
use std::io;
use thiserror::Error;

use crate::registry::{Handle, HandleKind};

#[derive(Debug, Error)]
pub enum CntError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("File already exists: {0}")]
    AlreadyExists(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid file format: {0}")]
    Format(String),

    #[error("Invalid handle: {0}")]
    InvalidHandle(Handle),

    #[error("Handle {handle} refers to a {actual}, expected a {expected}")]
    TypeMismatch {
        handle: Handle,
        expected: HandleKind,
        actual: HandleKind,
    },

    #[error("Sample buffer of length {len} does not hold {count} samples of {channels} channels")]
    Shape {
        len: usize,
        count: usize,
        channels: usize,
    },

    #[error("Sample range {from}..{to} out of bounds (sample count {sample_count})")]
    Range {
        from: u64,
        to: u64,
        sample_count: u64,
    },

    #[error("Channel index {0} out of range")]
    InvalidChannelIndex(usize),

    #[error("Trigger index {0} out of range")]
    InvalidTriggerIndex(usize),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Operation not valid for this session: {0}")]
    InvalidMode(String),

    #[error("Recording info already attached")]
    AlreadyAttached,
}

/// Coarse error classification, stable across boundary layers that cannot
/// carry a full [`CntError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    Io,
    Format,
    InvalidHandle,
    TypeMismatch,
    Shape,
    Range,
    InvalidArgument,
    InvalidMode,
    AlreadyAttached,
}

impl CntError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CntError::NotFound(_) => ErrorKind::NotFound,
            CntError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            CntError::Io(_) => ErrorKind::Io,
            CntError::Format(_) => ErrorKind::Format,
            CntError::InvalidHandle(_) => ErrorKind::InvalidHandle,
            CntError::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            CntError::Shape { .. } => ErrorKind::Shape,
            CntError::Range { .. } => ErrorKind::Range,
            CntError::InvalidChannelIndex(_)
            | CntError::InvalidTriggerIndex(_)
            | CntError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            CntError::InvalidMode(_) => ErrorKind::InvalidMode,
            CntError::AlreadyAttached => ErrorKind::AlreadyAttached,
        }
    }

    /// Shorthand for format errors built from anything displayable.
    pub(crate) fn format(msg: impl fmt::Display) -> Self {
        CntError::Format(msg.to_string())
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

pub type Result<T> = std::result::Result<T, CntError>;
