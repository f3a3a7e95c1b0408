//! Per-tuple surface reconstruction.
//!
//! Runs once per frame tuple. Steps 1-5 are independent per camera and run in
//! parallel; quality estimation needs every camera's normals and runs after them.

pub mod edge;
pub mod mls;
pub mod normals;
pub mod quality;
pub mod vertices;

use crate::params::{BlendParams, SharedParams};
use glam::{Mat4, Vec3};
use pcfusion_data::{FrameTuple, OrganizedPointCloud, Raster};
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{debug, debug_span, info_span, warn};

/// Reconstruction products of one camera.
#[derive(Debug, Clone)]
pub struct CameraReconstruction {
    pub camera_index: usize,
    /// Source frame: colors, lookup tables and pose.
    pub frame: Arc<OrganizedPointCloud>,
    pub inverse_model: Mat4,
    /// Raw camera-space positions (meters).
    pub positions: Raster<Vec3>,
    pub valid: Raster<bool>,
    pub edge: Raster<f32>,
    /// Smoothed camera-space positions.
    pub smoothed: Raster<Vec3>,
    /// Camera-space unit normals, facing the camera.
    pub normals: Raster<Vec3>,
    pub quality: Raster<f32>,
    pub rejected: usize,
}

impl CameraReconstruction {
    pub fn dimensions(&self) -> (u32, u32) {
        self.valid.dimensions()
    }

    pub fn model_matrix(&self) -> Mat4 {
        self.frame.model_matrix
    }

    pub fn eye(&self) -> Vec3 {
        self.frame.camera_position()
    }

    /// Smoothed position of pixel `i` in world space.
    #[inline]
    pub fn world_position(&self, i: usize) -> Vec3 {
        self.frame.model_matrix.transform_point3(self.smoothed.as_slice()[i])
    }

    #[inline]
    pub fn world_normal(&self, i: usize) -> Vec3 {
        self.frame
            .model_matrix
            .transform_vector3(self.normals.as_slice()[i])
            .normalize_or_zero()
    }

    pub fn valid_count(&self) -> usize {
        self.valid.as_slice().iter().filter(|&&v| v).count()
    }
}

/// Everything the compositor needs from one frame tuple.
#[derive(Debug, Clone, Default)]
pub struct ReconstructedTuple {
    pub sequence: u64,
    pub cursor: f64,
    /// Ordered by camera index.
    pub cameras: Vec<CameraReconstruction>,
    /// Cameras left out because their raster did not match the working resolution.
    pub excluded: Vec<usize>,
    /// Parameter version this tuple was reconstructed with.
    pub params_version: u64,
}

impl ReconstructedTuple {
    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }
}

/// Runs steps 1-6 of the blend engine.
#[derive(Debug, Clone, Default)]
pub struct Reconstructor {
    params: SharedParams,
}

impl Reconstructor {
    pub fn new(params: SharedParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &SharedParams {
        &self.params
    }

    pub fn reconstruct(&self, tuple: &FrameTuple) -> ReconstructedTuple {
        let (params_version, params) = self.params.snapshot();
        let _span = info_span!("reconstruct", sequence = tuple.sequence, cameras = tuple.len()).entered();

        let mut excluded = Vec::new();
        let accepted: Vec<&Arc<OrganizedPointCloud>> = tuple
            .frames
            .iter()
            .filter(|frame| {
                let ok = frame.has_dimensions(params.working_width, params.working_height);
                if !ok {
                    warn!(
                        camera = frame.camera_index,
                        width = frame.width,
                        height = frame.height,
                        expected_width = params.working_width,
                        expected_height = params.working_height,
                        "Excluding camera with mismatched resolution"
                    );
                    excluded.push(frame.camera_index);
                }
                ok
            })
            .collect();

        let mut cameras: Vec<CameraReconstruction> = accepted
            .par_iter()
            .map(|frame| reconstruct_camera(frame, &params))
            .collect();

        let qualities: Vec<Raster<f32>> = (0..cameras.len())
            .into_par_iter()
            .map(|i| quality::estimate_quality(&cameras, i, &params))
            .collect();
        for (camera, q) in cameras.iter_mut().zip(qualities) {
            camera.quality = q;
        }

        debug!(
            cameras = cameras.len(),
            excluded = excluded.len(),
            "Reconstructed tuple"
        );
        ReconstructedTuple {
            sequence: tuple.sequence,
            cursor: tuple.cursor,
            cameras,
            excluded,
            params_version,
        }
    }
}

/// Steps 1-5 for one camera. Quality is left at zero.
pub fn reconstruct_camera(frame: &Arc<OrganizedPointCloud>, params: &BlendParams) -> CameraReconstruction {
    let _span = debug_span!("reconstruct_camera", camera = frame.camera_index).entered();
    let (positions, mut valid) = vertices::generate_vertices(frame);
    let rejected = vertices::reject(frame, &positions, &mut valid, params);
    let edge = edge::edge_proximity(&valid, params.edge_radius);
    let smoothed = mls::smooth_positions(&positions, &valid, &edge, params);
    let normals = normals::estimate_normals(&smoothed, &valid, params.normal_radius);
    let (w, h) = valid.dimensions();

    CameraReconstruction {
        camera_index: frame.camera_index,
        frame: Arc::clone(frame),
        inverse_model: frame.model_matrix.inverse(),
        positions,
        valid,
        edge,
        smoothed,
        normals,
        quality: Raster::filled(w, h, 0.0),
        rejected,
    }
}
