//! pcfusion Pipeline - threads between the cameras and the renderer
//!
//! The stream thread resolves frame tuples and hands them to the pipeline
//! thread through a single-slot [`Handoff`]. The pipeline thread filters each
//! tuple, integrates it, and publishes the result to a [`LatestOutput`] that the
//! render thread reads without blocking either side.
//!
//! - [`Pipeline`]: owns both threads of one session
//! - [`FilterChain`]: ordered, live-editable [`Filter`] stages
//! - [`Telemetry`]: smoothed stage timings and drop counters
//!
//! ## Example
//!
//! ```ignore
//! use pcfusion_blend::{BlendPcr, Compositor, SharedParams};
//! use pcfusion_pipeline::{FilterChain, Pipeline};
//!
//! let (integrator, mut compositor) = BlendPcr::with_params(params, 1280, 720)?.into_parts();
//! let pipeline = Pipeline::start(sources, &session, FilterChain::new(), integrator)?;
//! if let Some((_, scene)) = pipeline.wait_for_output(0, timeout) {
//!     let frame = compositor.render(&scene, &views)?;
//! }
//! ```

mod error;
mod filter;
mod handoff;
mod latest;
mod pipeline;
mod telemetry;

pub use error::PipelineError;
pub use filter::{
    ClippingFilter, ClippingSettings, ErosionFilter, ErosionSettings, Filter, FilterChain, FilterChainHandle, FilterId,
    FilterSettings, FilterSummary, MAX_EROSION_INTENSITY, SpatialHoleFillingFilter, SpatialHoleFillingSettings,
    TemporalHoleFillingFilter, TemporalHoleFillingSettings, TemporalNoiseFilter, TemporalNoiseSettings,
};
pub use handoff::{Handoff, HandoffStats, Received};
pub use latest::LatestOutput;
pub use pipeline::Pipeline;
pub use telemetry::{EMA_ALPHA, Telemetry, TelemetrySnapshot};
