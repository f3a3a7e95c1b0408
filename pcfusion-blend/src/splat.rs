//! Point splat renderer.
//!
//! Every valid pixel of every camera is drawn as a square splat of
//! `point_size` output pixels into one shared depth buffer. Uses the same
//! unsmoothed scene as the simple mesh renderer.

use crate::error::BlendError;
use crate::params::{BlendParams, SharedParams};
use crate::reconstruction::CameraReconstruction;
use crate::renderer::{Compositor, SplitRenderer, validate_output_size};
use crate::screen::{self, AllocationTracker, FragmentBuffer, RenderFrame, ResourceKey, ScreenResources, raster};
use crate::simple_mesh::{MeshBuilder, MeshScene};
use crate::view::ViewCamera;
use glam::Mat4;
use tracing::debug_span;

/// Splat one camera's valid pixels into `buffer`.
fn splat_camera(buffer: &mut FragmentBuffer, camera: &CameraReconstruction, view_projection: &Mat4, params: &BlendParams) {
    let (w, h) = camera.dimensions();
    let (out_w, out_h) = buffer.dimensions();
    let palette = params.color_by_camera.then(|| screen::camera_color(camera.camera_index));
    let valid = camera.valid.as_slice();
    for y in 0..h {
        for x in 0..w {
            let i = camera.valid.index(x, y);
            if !valid[i] {
                continue;
            }
            let Some((pos, depth)) = ViewCamera::project(view_projection, camera.world_position(i), out_w, out_h) else {
                continue;
            };
            let color = palette.unwrap_or_else(|| raster::vertex_color(camera, x, y, i, params));
            raster::splat_point(buffer, pos, params.point_size, depth, color);
        }
    }
}

pub struct SplatCompositor {
    params: SharedParams,
    width: u32,
    height: u32,
    tracker: AllocationTracker,
    resources: ScreenResources,
}

impl SplatCompositor {
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

    pub fn live_allocations(&self) -> usize {
        self.tracker.live()
    }
}

impl Compositor for SplatCompositor {
    type Input = MeshScene;

    fn render(&mut self, scene: &MeshScene, views: &[ViewCamera]) -> Result<&RenderFrame, BlendError> {
        if views.is_empty() {
            return Err(BlendError::NoViews);
        }
        let (_, params) = self.params.snapshot();
        self.resources
            .ensure(ResourceKey::new(self.width, self.height, params.mini_scale, views.len(), 1))?;

        let _span = debug_span!("splat_render", sequence = scene.sequence).entered();
        let ScreenResources { targets, frame, .. } = &mut self.resources;
        for ((target, output), view) in targets.iter_mut().zip(frame.views.iter_mut()).zip(views) {
            let vp = view.view_projection();
            let buffer = &mut target.fragments[0];
            buffer.clear();
            for camera in &scene.cameras {
                splat_camera(buffer, camera, &vp, &params);
            }
            screen::resolve_depth_buffer(buffer, output, params.background());
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

pub type SplatRenderer = SplitRenderer<MeshBuilder, SplatCompositor>;

impl SplitRenderer<MeshBuilder, SplatCompositor> {
    pub fn with_params(params: SharedParams, width: u32, height: u32) -> Result<Self, BlendError> {
        let compositor = SplatCompositor::new(params.clone(), width, height)?;
        Ok(Self::new("Splats", MeshBuilder::new(params), compositor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconstruction::tests::{flat_frame, test_params};
    use crate::renderer::Renderer;
    use glam::Vec3;
    use pcfusion_data::{FrameTuple, Rgba8};

    const OUT_W: u32 = 48;
    const OUT_H: u32 = 36;

    fn view() -> ViewCamera {
        ViewCamera::look_at(Vec3::ZERO, Vec3::Z, 60.0, OUT_W as f32 / OUT_H as f32, 0.1, 10.0)
    }

    fn render_coverage(point_size: f32) -> f32 {
        let params = SharedParams::new(BlendParams {
            point_size,
            ..test_params()
        });
        let tuple = FrameTuple::new(1, 0.0, true, vec![flat_frame(0, 1000, Rgba8::WHITE, Mat4::IDENTITY)]);
        let mut r = SplatRenderer::with_params(params, OUT_W, OUT_H).unwrap();
        r.integrate(&tuple);
        r.render(&[view()]).unwrap().view(0).unwrap().coverage()
    }

    #[test]
    fn test_larger_points_close_gaps() {
        let small = render_coverage(1.0);
        let large = render_coverage(3.0);
        assert!(small > 0.0);
        assert!(large > small, "{small} vs {large}");
    }

    #[test]
    fn test_nearest_splat_wins() {
        let near = Rgba8::opaque(0, 255, 0);
        let far = Rgba8::opaque(255, 0, 0);
        let tuple = FrameTuple::new(
            3,
            0.0,
            true,
            vec![flat_frame(0, 1500, far, Mat4::IDENTITY), flat_frame(1, 1000, near, Mat4::IDENTITY)],
        );
        let mut r = SplatRenderer::with_params(SharedParams::new(test_params()), OUT_W, OUT_H).unwrap();
        r.integrate(&tuple);
        let frame = r.render(&[view()]).unwrap();
        assert_eq!(frame.sequence(), 3);
        let out = frame.view(0).unwrap();
        assert_eq!(*out.color.get(OUT_W / 2, OUT_H / 2), near);
        assert!((out.depth.get(OUT_W / 2, OUT_H / 2) - 1.0).abs() < 0.01);
        assert_eq!(*out.weight_sum.get(0, 0), 0.0);
    }

    #[test]
    fn test_black_splats_discarded() {
        let params = SharedParams::new(BlendParams {
            discard_black_pixels: true,
            ..test_params()
        });
        let tuple = FrameTuple::new(1, 0.0, true, vec![flat_frame(0, 1000, Rgba8::BLACK, Mat4::IDENTITY)]);
        let mut r = SplatRenderer::with_params(params, OUT_W, OUT_H).unwrap();
        r.integrate(&tuple);
        assert_eq!(r.render(&[view()]).unwrap().view(0).unwrap().coverage(), 0.0);
    }

    #[test]
    fn test_resize_keeps_allocation_count() {
        let mut r = SplatRenderer::with_params(SharedParams::new(test_params()), OUT_W, OUT_H).unwrap();
        r.render(&[view()]).unwrap();
        let baseline = r.compositor().live_allocations();
        r.set_output_size(20, 10).unwrap();
        r.render(&[view()]).unwrap();
        r.set_output_size(OUT_W, OUT_H).unwrap();
        r.render(&[view()]).unwrap();
        assert_eq!(r.compositor().live_allocations(), baseline);
    }
}
