//! Error types for the integration engine.

use thiserror::Error;

/// Errors that abort a render or session start.
///
/// Per-frame degradations (excluded cameras, empty tuples) are logged instead.
#[derive(Debug, Error)]
pub enum BlendError {
    #[error("Failed to allocate {what} ({bytes} bytes)")]
    Allocation { what: &'static str, bytes: usize },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid output size {width}x{height}")]
    InvalidOutputSize { width: u32, height: u32 },

    #[error("No views requested")]
    NoViews,
}
