//! Protocol errors

use std::time::Duration;

use thiserror::Error;

/// Errors that abort a driver call
#[derive(Error, Debug)]
pub enum QzfmError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serial port error: {0}")]
    Serial(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Timed out after {waited:?} waiting for {what}")]
    Timeout { what: &'static str, waited: Duration },

    #[error("Readback data length incorrect: expected {expected} samples, decoded {decoded}")]
    Quota { expected: usize, decoded: usize },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<serialport::Error> for QzfmError {
    fn from(err: serialport::Error) -> Self {
        QzfmError::Serial(err.to_string())
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, QzfmError>;

/// Why a single line was skipped.
///
/// These never abort a call. A faulty status line yields no code and a faulty
/// data word becomes a NaN sample.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LineFault {
    #[error("empty line")]
    Empty,

    #[error("unclassified line prefix {0:?}")]
    Unclassified(char),

    #[error("truncated code {0:?}")]
    Truncated(String),

    #[error("unknown code {0:?}")]
    UnknownCode(String),

    #[error("non-numeric payload {0:?}")]
    NonNumeric(String),

    #[error("data word has {actual} characters, expected {expected}")]
    WordLength { expected: usize, actual: usize },
}
