//! Common frame source types and traits.

use pcfusion_data::{CameraLookup, DataError, OrganizedPointCloud};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while opening or decoding a source.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Source not found: {0}")]
    NotFound(String),

    #[error("Failed to open source: {0}")]
    OpenFailed(String),

    #[error("Failed to decode frame {index}: {reason}")]
    DecodeFailed { index: usize, reason: String },

    #[error("Stream ended")]
    StreamEnded,

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Frame is {actual_width}x{actual_height}, expected {expected_width}x{expected_height}")]
    DimensionMismatch {
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    #[error("No frame sources configured")]
    NoSources,

    #[error("Frame data error: {0}")]
    Data(#[from] DataError),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One synchronized camera.
///
/// Timestamps are seconds relative to the source's first frame. `resolve`
/// never blocks indefinitely; `None` means no frame is available for the query.
pub trait FrameSource: Send {
    fn camera_index(&self) -> usize;

    /// Raster size (width, height) of every frame this source emits.
    fn resolution(&self) -> (u32, u32);

    /// Calibration tables shared by all frames of this source.
    fn lookup(&self) -> &Arc<CameraLookup>;

    /// Ascending frame timestamps.
    fn timestamps(&self) -> &[f64];

    /// Frame with the smallest timestamp not before `t` minus the sync tolerance.
    fn resolve(&mut self, t: f64) -> Option<Arc<OrganizedPointCloud>>;

    /// Index of the frame returned by the last successful `resolve`.
    fn current_frame(&self) -> Option<usize>;

    fn frame_count(&self) -> usize {
        self.timestamps().len()
    }

    fn total_time(&self) -> f64 {
        self.timestamps().last().copied().unwrap_or(0.0)
    }

    /// Time between the current frame and the next one.
    fn time_delta_to_next_frame(&self) -> Option<f64> {
        let ts = self.timestamps();
        let i = self.current_frame().unwrap_or(0);
        match (ts.get(i), ts.get(i + 1)) {
            (Some(a), Some(b)) => Some(b - a),
            _ => None,
        }
    }

    /// Mean frame rate over the recording, if it has at least two frames.
    fn frame_rate(&self) -> Option<f32> {
        let ts = self.timestamps();
        if ts.len() < 2 {
            return None;
        }
        let span = ts[ts.len() - 1] - ts[0];
        (span > 0.0).then(|| ((ts.len() - 1) as f64 / span) as f32)
    }
}
