//! pcfusion - real-time fusion of multi-camera depth+color streams
//!
//! Facade over the workspace crates:
//!
//! - [`data`]: organized point cloud frames, lookup tables, calibration
//! - [`capture`]: frame sources and the stream coordinator
//! - [`blend`]: the BlendPCR engine plus the simple mesh and point splat renderers
//! - [`pipeline`]: handoff, filter chain and the pipeline threads
//!
//! The most common types are re-exported at the root.

pub use pcfusion_blend as blend;
pub use pcfusion_capture as capture;
pub use pcfusion_data as data;
pub use pcfusion_pipeline as pipeline;

pub use pcfusion_blend::{
    BlendCompositor, BlendParams, BlendPcr, Compositor, Integrator, Presenter, Reconstructor, RenderFrame, Renderer,
    SharedParams, SimpleMeshRenderer, SplatRenderer, ViewCamera, ViewOutput,
};
pub use pcfusion_capture::{FrameSource, Pacing, SessionConfig, StreamControl, StreamCoordinator, synthetic_rig};
pub use pcfusion_data::{CalibrationDescriptor, FrameTuple, OrganizedPointCloud, Rgba8};
pub use pcfusion_pipeline::{FilterChain, FilterSettings, Pipeline, PipelineError, TelemetrySnapshot};
