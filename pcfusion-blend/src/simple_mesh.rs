//! Baseline renderer: each camera's raw grid mesh into one shared depth buffer.
//!
//! No smoothing, quality or blending. Where meshes overlap the nearest wins.

use crate::error::BlendError;
use crate::params::{BlendParams, SharedParams};
use crate::reconstruction::{CameraReconstruction, ReconstructedTuple, vertices};
use crate::renderer::{Compositor, Integrator, SplitRenderer, validate_output_size};
use crate::screen::{self, AllocationTracker, RenderFrame, ResourceKey, ScreenResources, raster};
use crate::view::ViewCamera;
use glam::Vec3;
use pcfusion_data::{FrameTuple, OrganizedPointCloud, Raster};
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{debug_span, warn};

/// Scene drawn by the simple mesh renderer. Smoothed positions equal the raw ones
/// and every vertex has quality 1.
pub type MeshScene = ReconstructedTuple;

#[derive(Debug, Clone, Default)]
pub struct MeshBuilder {
    params: SharedParams,
}

impl MeshBuilder {
    pub fn new(params: SharedParams) -> Self {
        Self { params }
    }

    fn build_camera(frame: &Arc<OrganizedPointCloud>, params: &BlendParams) -> CameraReconstruction {
        let (positions, mut valid) = vertices::generate_vertices(frame);
        let rejected = vertices::reject(frame, &positions, &mut valid, params);
        let (w, h) = valid.dimensions();
        CameraReconstruction {
            camera_index: frame.camera_index,
            frame: Arc::clone(frame),
            inverse_model: frame.model_matrix.inverse(),
            smoothed: positions.clone(),
            positions,
            valid,
            edge: Raster::filled(w, h, 0.0),
            normals: Raster::filled(w, h, Vec3::ZERO),
            quality: Raster::filled(w, h, 1.0),
            rejected,
        }
    }
}

impl Integrator for MeshBuilder {
    type Output = MeshScene;

    fn integrate(&mut self, tuple: &FrameTuple) -> MeshScene {
        let (params_version, params) = self.params.snapshot();
        let mut excluded = Vec::new();
        let accepted: Vec<&Arc<OrganizedPointCloud>> = tuple
            .frames
            .iter()
            .filter(|f| {
                let ok = f.has_dimensions(params.working_width, params.working_height);
                if !ok {
                    warn!(camera = f.camera_index, "Excluding camera with mismatched resolution");
                    excluded.push(f.camera_index);
                }
                ok
            })
            .collect();
        let cameras = accepted
            .par_iter()
            .map(|f| Self::build_camera(f, &params))
            .collect();
        MeshScene {
            sequence: tuple.sequence,
            cursor: tuple.cursor,
            cameras,
            excluded,
            params_version,
        }
    }
}

pub struct MeshCompositor {
    params: SharedParams,
    width: u32,
    height: u32,
    tracker: AllocationTracker,
    resources: ScreenResources,
}

impl MeshCompositor {
    pub fn new(params: SharedParams, width: u32, height: u32) -> Result<Self, BlendError> {
        validate_output_size(width, height)?;
        let tracker = AllocationTracker::new();
        Ok(Self {
            params,
            width,
            height,
            resources: ScreenResources::new(tracker.clone()),
            tracker,
        })
    }

    pub fn allocation_tracker(&self) -> &AllocationTracker {
        &self.tracker
    }

    pub fn live_allocations(&self) -> usize {
        self.tracker.live()
    }
}

impl Compositor for MeshCompositor {
    type Input = MeshScene;

    fn render(&mut self, scene: &MeshScene, views: &[ViewCamera]) -> Result<&RenderFrame, BlendError> {
        if views.is_empty() {
            return Err(BlendError::NoViews);
        }
        let (_, params) = self.params.snapshot();
        // one shared depth buffer per view
        self.resources
            .ensure(ResourceKey::new(self.width, self.height, params.mini_scale, views.len(), 1))?;

        let _span = debug_span!("mesh_render", sequence = scene.sequence).entered();
        let background = params.background();
        let ScreenResources { targets, frame, .. } = &mut self.resources;
        for ((target, output), view) in targets.iter_mut().zip(frame.views.iter_mut()).zip(views) {
            let vp = view.view_projection();
            let buffer = &mut target.fragments[0];
            buffer.clear();
            for camera in &scene.cameras {
                let palette = params.color_by_camera.then(|| screen::camera_color(camera.camera_index));
                raster::rasterize_camera(buffer, camera, &vp, &params, palette, Some(1.0));
            }

            screen::resolve_depth_buffer(buffer, output, background);
        }
        frame.sequence = scene.sequence;
        frame.cursor = scene.cursor;
        Ok(&self.resources.frame)
    }

    fn set_output_size(&mut self, width: u32, height: u32) -> Result<(), BlendError> {
        validate_output_size(width, height)?;
        if (width, height) != (self.width, self.height) {
            self.resources.release();
            self.width = width;
            self.height = height;
        }
        Ok(())
    }

    fn output_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

pub type SimpleMeshRenderer = SplitRenderer<MeshBuilder, MeshCompositor>;

impl SplitRenderer<MeshBuilder, MeshCompositor> {
    pub fn with_params(params: SharedParams, width: u32, height: u32) -> Result<Self, BlendError> {
        let compositor = MeshCompositor::new(params.clone(), width, height)?;
        Ok(Self::new("SimpleMesh", MeshBuilder::new(params), compositor))
    }
}
