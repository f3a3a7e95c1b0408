//! Error types for the command-line frontend.

use pcfusion_blend::BlendError;
use pcfusion_capture::CaptureError;
use pcfusion_data::DataError;
use pcfusion_pipeline::PipelineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Calibration error: {0}")]
    Data(#[from] DataError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Engine error: {0}")]
    Blend(#[from] BlendError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Cannot present frame: {0}")]
    Present(String),

    #[error("Image encode error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
