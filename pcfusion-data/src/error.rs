//! Error types for frame and calibration data.

use thiserror::Error;

/// Errors raised while building or loading frame data.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("Buffer size mismatch for {what}: expected {expected}, got {actual}")]
    BufferSize {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Lookup table is {lookup_width}x{lookup_height} but frame is {width}x{height}")]
    LookupMismatch {
        lookup_width: u32,
        lookup_height: u32,
        width: u32,
        height: u32,
    },

    #[error("Invalid intrinsics: {0}")]
    InvalidIntrinsics(String),

    #[error("Calibration error: {0}")]
    Calibration(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
