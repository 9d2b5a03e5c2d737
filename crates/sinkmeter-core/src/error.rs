//! Shared error type across sinkmeter crates.

use thiserror::Error;

/// Stable error codes (used in log fields and by tests).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Invalid input / malformed feed line or config.
    BadRequest,
    /// Unsupported config or envelope version.
    UnsupportedVersion,
    /// I/O or runtime failure.
    Internal,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, SinkMeterError>;

/// Unified error type used by core and exporter.
#[derive(Debug, Error)]
pub enum SinkMeterError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unsupported version")]
    UnsupportedVersion,
    #[error("internal: {0}")]
    Internal(String),
}

impl SinkMeterError {
    /// Map to a stable code.
    pub fn code(&self) -> ErrorCode {
        match self {
            SinkMeterError::BadRequest(_) => ErrorCode::BadRequest,
            SinkMeterError::UnsupportedVersion => ErrorCode::UnsupportedVersion,
            SinkMeterError::Internal(_) => ErrorCode::Internal,
        }
    }
}

impl From<std::io::Error> for SinkMeterError {
    fn from(e: std::io::Error) -> Self {
        SinkMeterError::Internal(format!("io: {e}"))
    }
}
