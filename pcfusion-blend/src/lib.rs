//! pcfusion Blend Crate
//!
//! Fuses the frames of several organized-pixel depth cameras into one
//! composited view. Work is split along the thread boundary of the pipeline:
//!
//! - [`reconstruction`]: per-camera surface reconstruction and cross-view
//!   quality scoring, run once per frame tuple on the pipeline thread
//! - [`screen`]: rasterization, dominant-camera selection, weight smoothing
//!   and final compositing, run once per rendered frame on the render thread
//! - [`renderer`]: the `Integrator` / `Compositor` / `Renderer` seams, the
//!   `BlendPcr`, `SimpleMesh` and `Splat` renderers and the `Presenter` contract

pub mod error;
pub mod math;
pub mod params;
pub mod reconstruction;
pub mod renderer;
pub mod screen;
pub mod simple_mesh;
pub mod splat;
pub mod view;

pub use error::BlendError;
pub use params::{BlendParams, SharedParams};
pub use reconstruction::{CameraReconstruction, ReconstructedTuple, Reconstructor};
pub use renderer::{BlendCompositor, BlendPcr, Compositor, Integrator, Presenter, Renderer, SplitRenderer};
pub use screen::{AllocationTracker, RenderFrame, ViewOutput};
pub use simple_mesh::{MeshBuilder, MeshCompositor, MeshScene, SimpleMeshRenderer};
pub use splat::{SplatCompositor, SplatRenderer};
pub use view::ViewCamera;
