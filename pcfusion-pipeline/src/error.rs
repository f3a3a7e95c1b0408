//! Pipeline errors.

use pcfusion_blend::BlendError;
use pcfusion_capture::CaptureError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Pipeline is shut down")]
    Closed,

    #[error("Failed to spawn pipeline thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Stream start failed: {0}")]
    Capture(#[from] CaptureError),

    #[error("Engine error: {0}")]
    Blend(#[from] BlendError),
}
