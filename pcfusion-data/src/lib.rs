//! pcfusion Data Crate
//!
//! CPU-side frame representation shared by every stage of the fusion pipeline:
//! organized depth+color frames, per-camera lookup tables, calibration
//! descriptors and the multi-camera frame tuple.
//! This crate has no threading and no rendering; it only describes data.

pub mod calibration;
pub mod cloud;
pub mod error;
pub mod lookup;
pub mod tuple;
pub mod types;

pub use calibration::{CalibrationDescriptor, CameraEntry, look_at_model};
pub use cloud::{
    AttachmentKind, Attachments, CAMERA_IMAGE_HEIGHT, CAMERA_IMAGE_WIDTH, HIGH_RES_HEIGHT,
    HIGH_RES_WIDTH, HighResColors, OrganizedPointCloud,
};
pub use error::DataError;
pub use lookup::{CameraLookup, LOOKUP_TABLE_SIZE, PinholeIntrinsics};
pub use tuple::FrameTuple;
pub use types::{Raster, Rgba8};
