//! Tunable engine parameters.

use crate::error::BlendError;
use glam::{Vec3, Vec4};
use pcfusion_data::{CAMERA_IMAGE_HEIGHT, CAMERA_IMAGE_WIDTH};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};

/// Parameters of the reconstruction and compositing stages.
///
/// Lengths are in meters unless noted otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendParams {
    /// Raster size every camera must match to take part in integration.
    pub working_width: u32,
    pub working_height: u32,

    pub should_clip: bool,
    pub clip_min: [f32; 3],
    pub clip_max: [f32; 3],
    /// Reject pixels whose color is pure black (no color mapped to the depth pixel).
    pub discard_black_pixels: bool,

    /// Distance in pixels over which edge proximity fades to zero.
    pub edge_radius: u32,

    /// MLS neighborhood radius in pixels. 0 disables smoothing.
    pub kernel_radius: u32,
    pub kernel_spread: f32,
    /// MLS bandwidth on the distance between neighbor positions.
    pub implicit_h: f32,

    /// Neighborhood radius in pixels for covariance normals.
    pub normal_radius: u32,

    /// Depth difference at which cross-view agreement falls to 1/e.
    pub agreement_depth: f32,

    /// Mesh grid step in pixels.
    pub stride: u32,
    /// Longest triangle edge, relative to the mean depth of its endpoints.
    pub max_edge_length: f32,
    /// Side of a point splat in output pixels.
    pub point_size: f32,

    /// Fragments within this view depth of the nearest are considered the same surface.
    pub depth_tolerance: f32,
    /// Output resolution divisor for dominant-camera selection.
    pub mini_scale: u32,
    /// Blur radius of the dominance map, in reduced-resolution pixels.
    pub weight_blur_radius: u32,

    /// RGBA clear color (0-1).
    pub background: [f32; 4],
    /// Replace texture colors with a per-camera palette color.
    pub color_by_camera: bool,
    /// Sample colors from the high-resolution stream when a frame carries one.
    pub use_high_res_colors: bool,
}

impl Default for BlendParams {
    fn default() -> Self {
        Self {
            working_width: CAMERA_IMAGE_WIDTH,
            working_height: CAMERA_IMAGE_HEIGHT,
            should_clip: true,
            clip_min: [-1.0, 0.05, -1.0],
            clip_max: [1.0, 2.0, 1.0],
            discard_black_pixels: false,
            edge_radius: 10,
            kernel_radius: 4,
            kernel_spread: 1.0,
            implicit_h: 0.08,
            normal_radius: 2,
            agreement_depth: 0.03,
            stride: 1,
            max_edge_length: 0.05,
            point_size: 3.0,
            depth_tolerance: 0.05,
            mini_scale: 4,
            weight_blur_radius: 3,
            background: [0.5, 0.5, 0.5, 0.0],
            color_by_camera: false,
            use_high_res_colors: true,
        }
    }
}

impl BlendParams {
    pub fn clip_min(&self) -> Vec3 {
        Vec3::from_array(self.clip_min)
    }

    pub fn clip_max(&self) -> Vec3 {
        Vec3::from_array(self.clip_max)
    }

    pub fn background(&self) -> Vec4 {
        Vec4::from_array(self.background)
    }

    pub fn validate(&self) -> Result<(), BlendError> {
        if self.working_width == 0 || self.working_height == 0 {
            return Err(BlendError::InvalidParameter("working resolution must be non-zero".into()));
        }
        if self.stride == 0 {
            return Err(BlendError::InvalidParameter("stride must be at least 1".into()));
        }
        if self.mini_scale == 0 {
            return Err(BlendError::InvalidParameter("mini_scale must be at least 1".into()));
        }
        if !(self.implicit_h > 0.0) {
            return Err(BlendError::InvalidParameter(format!("implicit_h must be positive, got {}", self.implicit_h)));
        }
        if !(self.kernel_spread >= 0.0) {
            return Err(BlendError::InvalidParameter(format!(
                "kernel_spread must be non-negative, got {}",
                self.kernel_spread
            )));
        }
        if !(self.point_size > 0.0) {
            return Err(BlendError::InvalidParameter(format!("point_size must be positive, got {}", self.point_size)));
        }
        if !(self.agreement_depth > 0.0) || !(self.depth_tolerance >= 0.0) {
            return Err(BlendError::InvalidParameter("depth tolerances must be positive".into()));
        }
        if (0..3).any(|i| self.clip_min[i] > self.clip_max[i]) {
            return Err(BlendError::InvalidParameter("clip_min exceeds clip_max".into()));
        }
        Ok(())
    }
}

/// Versioned parameter cell shared between the control surface and the engine threads.
#[derive(Debug, Clone, Default)]
pub struct SharedParams {
    inner: Arc<Mutex<(u64, BlendParams)>>,
}

impl SharedParams {
    pub fn new(params: BlendParams) -> Self {
        Self {
            inner: Arc::new(Mutex::new((0, params))),
        }
    }

    /// Current version and a snapshot of the parameters.
    pub fn snapshot(&self) -> (u64, BlendParams) {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        (guard.0, guard.1.clone())
    }

    pub fn version(&self) -> u64 {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).0
    }

    /// Apply an edit and bump the version. Invalid results are rejected.
    pub fn update(&self, edit: impl FnOnce(&mut BlendParams)) -> Result<u64, BlendError> {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = guard.1.clone();
        edit(&mut next);
        next.validate()?;
        guard.0 += 1;
        guard.1 = next;
        Ok(guard.0)
    }
}
