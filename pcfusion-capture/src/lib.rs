//! pcfusion Capture - synchronized multi-camera frame sources
//!
//! This crate turns recordings (or procedural scenes) into organized point
//! cloud frames and drives several of them along one shared timeline:
//!
//! - [`FrameSource`]: one camera, resolves a timeline position to a frame
//! - [`RecordedSource`]: a `FrameSource` over any [`FrameDecoder`], buffered or streamed
//! - [`ImageSequenceDecoder`]: 16-bit depth + color PNG sequences
//! - [`SyntheticDecoder`]: procedural planes and spheres seen by a posed pinhole camera
//! - [`StreamCoordinator`]: the producer thread emitting [`FrameTuple`]s
//!
//! ## Example
//!
//! ```ignore
//! use pcfusion_capture::{SessionConfig, StreamCoordinator, synthetic_rig};
//!
//! let config = SessionConfig::default();
//! let sources = synthetic_rig(2, &config)?;
//! let coordinator = StreamCoordinator::start(sources, &config, |tuple, _pacing| {
//!     // hand the tuple to the pipeline...
//! })?;
//! coordinator.control().pause();
//! ```

mod config;
mod coordinator;
mod image_sequence;
mod recorded;
mod source;
mod synthetic;
mod timeline;

pub use config::SessionConfig;
pub use coordinator::{StreamControl, StreamCoordinator, TupleAssembler};
pub use image_sequence::{ImageSequenceDecoder, image_sequence_sources};
pub use recorded::{DecodedFrame, FrameDecoder, RecordedSource};
pub use source::{CaptureError, FrameSource};
pub use synthetic::{MovingSphere, ScenePlane, SyntheticDecoder, SyntheticScene, SyntheticSource, synthetic_rig};
pub use timeline::{Pacing, PlaybackState, TickAction, Timeline};

pub use pcfusion_data::FrameTuple;
