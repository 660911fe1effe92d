//! Error types for capture operations.

use std::fmt;

use ajamedia_common::ValidationError;

use super::CaptureState;

/// Error type for capture operations.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureError {
    /// Invalid pixel format, frame rate or port combination
    Configuration(String),
    /// Outgoing frame buffer smaller than `stride * height`
    BufferMismatch { expected: usize, actual: usize },
    /// The hardware channel failed; the session has been torn down
    ChannelFault(String),
    /// Operation not allowed in the current session state
    InvalidState {
        expected: CaptureState,
        actual: CaptureState,
    },
    /// The device could not open the output channel
    Device(String),
}

impl CaptureError {
    /// Whether this error ended the session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CaptureError::ChannelFault(_) | CaptureError::Device(_))
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::Configuration(msg) => write!(f, "Invalid output configuration: {}", msg),
            CaptureError::BufferMismatch { expected, actual } => write!(
                f,
                "Frame buffer too small: expected at least {} bytes, got {}",
                expected, actual
            ),
            CaptureError::ChannelFault(msg) => write!(f, "Output channel fault: {}", msg),
            CaptureError::InvalidState { expected, actual } => {
                write!(f, "Capture session is {} (expected {})", actual, expected)
            }
            CaptureError::Device(msg) => write!(f, "Device error: {}", msg),
        }
    }
}

impl std::error::Error for CaptureError {}

impl From<ValidationError> for CaptureError {
    fn from(err: ValidationError) -> Self {
        CaptureError::Configuration(err.to_string())
    }
}

impl From<CaptureError> for String {
    fn from(err: CaptureError) -> Self {
        err.to_string()
    }
}
