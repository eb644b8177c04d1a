use std::io;
use thiserror::Error;

/// Every failure the scanning pipeline can surface.
///
/// I/O and configuration errors are always fatal. `MalformedRow` and
/// `InvalidValue` only appear when the caller asked for
/// `MalformedPolicy::Fail`; under the other policies such rows are dropped
/// locally.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Row has more than {limit} fields")]
    TooManyFields { limit: usize },

    #[error("Output record of {len} bytes exceeds the write buffer capacity ({capacity} bytes)")]
    RecordTooLarge { len: usize, capacity: usize },

    #[error("Malformed row at line {line}: found {fields} fields, need {expected}")]
    MalformedRow { line: u64, fields: usize, expected: usize },

    #[error("Malformed row at line {line}: field {field} is not a valid integer")]
    InvalidValue { line: u64, field: usize },
}

pub type Result<T> = std::result::Result<T, ScanError>;

impl ScanError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        ScanError::Config(msg.into())
    }
}
