//! Renderer seams.
//!
//! A renderer is split in two halves that may live on different threads: an
//! [`Integrator`] that turns a frame tuple into an immutable scene, and a
//! [`Compositor`] that draws the latest scene into output views. [`SplitRenderer`]
//! glues the two together for single-threaded use.

use crate::error::BlendError;
use crate::params::SharedParams;
use crate::reconstruction::{ReconstructedTuple, Reconstructor};
use crate::screen::{self, AllocationTracker, RenderFrame, ResourceKey, ScreenResources};
use crate::view::ViewCamera;
use pcfusion_data::FrameTuple;
use std::sync::Arc;
use tracing::{debug, debug_span, info};

/// Per-tuple half of a renderer. Runs on the integration thread.
pub trait Integrator: Send + 'static {
    type Output: Send + Sync + 'static;

    fn integrate(&mut self, tuple: &FrameTuple) -> Self::Output;
}

/// Per-frame half of a renderer. Runs on the render thread.
pub trait Compositor {
    type Input;

    fn render(&mut self, input: &Self::Input, views: &[ViewCamera]) -> Result<&RenderFrame, BlendError>;

    /// Resize the outputs. Buffers of the old size are released.
    fn set_output_size(&mut self, width: u32, height: u32) -> Result<(), BlendError>;

    fn output_size(&self) -> (u32, u32);
}

/// A complete renderer driven from one thread.
pub trait Renderer {
    fn name(&self) -> &'static str;

    fn integrate(&mut self, tuple: &FrameTuple);

    fn render(&mut self, views: &[ViewCamera]) -> Result<&RenderFrame, BlendError>;

    fn set_output_size(&mut self, width: u32, height: u32) -> Result<(), BlendError>;

    fn output_size(&self) -> (u32, u32);
}

/// Receives finished frames.
pub trait Presenter {
    type Error: std::error::Error + Send + Sync + 'static;

    fn present(&mut self, frame: &RenderFrame) -> Result<(), Self::Error>;
}

/// An integrator and a compositor sharing the latest scene.
pub struct SplitRenderer<I: Integrator, C> {
    name: &'static str,
    integrator: I,
    compositor: C,
    latest: Arc<I::Output>,
}

impl<I, C> SplitRenderer<I, C>
where
    I: Integrator,
    I::Output: Default,
{
    pub fn new(name: &'static str, integrator: I, compositor: C) -> Self {
        Self {
            name,
            integrator,
            compositor,
            latest: Arc::new(I::Output::default()),
        }
    }

    pub fn integrator(&self) -> &I {
        &self.integrator
    }

    pub fn compositor(&self) -> &C {
        &self.compositor
    }

    pub fn latest(&self) -> &Arc<I::Output> {
        &self.latest
    }

    /// Separate the halves for use on different threads.
    pub fn into_parts(self) -> (I, C) {
        (self.integrator, self.compositor)
    }
}

impl<I, C> Renderer for SplitRenderer<I, C>
where
    I: Integrator,
    I::Output: Default,
    C: Compositor<Input = I::Output>,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn integrate(&mut self, tuple: &FrameTuple) {
        self.latest = Arc::new(self.integrator.integrate(tuple));
    }

    fn render(&mut self, views: &[ViewCamera]) -> Result<&RenderFrame, BlendError> {
        self.compositor.render(&self.latest, views)
    }

    fn set_output_size(&mut self, width: u32, height: u32) -> Result<(), BlendError> {
        self.compositor.set_output_size(width, height)
    }

    fn output_size(&self) -> (u32, u32) {
        self.compositor.output_size()
    }
}

impl Integrator for Reconstructor {
    type Output = ReconstructedTuple;

    fn integrate(&mut self, tuple: &FrameTuple) -> ReconstructedTuple {
        self.reconstruct(tuple)
    }
}

pub(crate) fn validate_output_size(width: u32, height: u32) -> Result<(), BlendError> {
    if width == 0 || height == 0 {
        return Err(BlendError::InvalidOutputSize { width, height });
    }
    Ok(())
}

/// Screen-space half of BlendPCR (steps 7-9).
pub struct BlendCompositor {
    params: SharedParams,
    width: u32,
    height: u32,
    tracker: AllocationTracker,
    resources: ScreenResources,
}

impl BlendCompositor {
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

    pub fn params(&self) -> &SharedParams {
        &self.params
    }

    /// Live count of screen buffers owned by this compositor.
    pub fn allocation_tracker(&self) -> &AllocationTracker {
        &self.tracker
    }

    pub fn live_allocations(&self) -> usize {
        self.tracker.live()
    }

    /// Drop every screen buffer. The next render allocates them again.
    pub fn release(&mut self) {
        self.resources.release();
    }
}

impl Compositor for BlendCompositor {
    type Input = ReconstructedTuple;

    fn render(&mut self, scene: &ReconstructedTuple, views: &[ViewCamera]) -> Result<&RenderFrame, BlendError> {
        if views.is_empty() {
            return Err(BlendError::NoViews);
        }
        let (_, params) = self.params.snapshot();
        let key = ResourceKey::new(self.width, self.height, params.mini_scale, views.len(), scene.cameras.len());
        self.resources.ensure(key)?;

        let _span = debug_span!("blend_render", sequence = scene.sequence, views = views.len()).entered();
        let ScreenResources { targets, frame, .. } = &mut self.resources;
        for ((target, output), view) in targets.iter_mut().zip(frame.views.iter_mut()).zip(views) {
            if scene.cameras.is_empty() {
                screen::clear_view(output, params.background());
            } else {
                screen::blend_view(target, output, scene, view, &params);
            }
        }
        frame.sequence = scene.sequence;
        frame.cursor = scene.cursor;
        debug!(sequence = scene.sequence, "Rendered frame");
        Ok(&self.resources.frame)
    }

    fn set_output_size(&mut self, width: u32, height: u32) -> Result<(), BlendError> {
        validate_output_size(width, height)?;
        if (width, height) != (self.width, self.height) {
            info!(width, height, "Resizing blend outputs");
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

/// The BlendPCR renderer.
pub type BlendPcr = SplitRenderer<Reconstructor, BlendCompositor>;

impl SplitRenderer<Reconstructor, BlendCompositor> {
    pub fn with_params(params: SharedParams, width: u32, height: u32) -> Result<Self, BlendError> {
        let compositor = BlendCompositor::new(params.clone(), width, height)?;
        Ok(Self::new("BlendPCR", Reconstructor::new(params), compositor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconstruction::tests::{flat_frame, test_params};
    use crate::screen::camera_color;
    use glam::{Mat4, Vec3};
    use pcfusion_data::Rgba8;

    const OUT_W: u32 = 48;
    const OUT_H: u32 = 36;

    fn view() -> ViewCamera {
        ViewCamera::look_at(Vec3::ZERO, Vec3::Z, 60.0, OUT_W as f32 / OUT_H as f32, 0.1, 10.0)
    }

    fn renderer() -> BlendPcr {
        BlendPcr::with_params(SharedParams::new(test_params()), OUT_W, OUT_H).unwrap()
    }

    fn two_camera_tuple(a: Rgba8, b: Rgba8) -> FrameTuple {
        FrameTuple::new(
            7,
            0.25,
            true,
            vec![flat_frame(0, 1000, a, Mat4::IDENTITY), flat_frame(1, 1000, b, Mat4::IDENTITY)],
        )
    }

    #[test]
    fn test_weight_sum_is_normalized() {
        let mut r = renderer();
        r.integrate(&two_camera_tuple(Rgba8::WHITE, Rgba8::WHITE));
        let frame = r.render(&[view()]).unwrap();
        assert_eq!(frame.sequence(), 7);
        let out = frame.view(0).unwrap();
        assert!(out
            .weight_sum
            .as_slice()
            .iter()
            .all(|&s| s == 0.0 || (s - 1.0).abs() < 1e-5));
        assert!((out.weight_sum.get(OUT_W / 2, OUT_H / 2) - 1.0).abs() < 1e-5);
        assert_eq!(*out.color.get(OUT_W / 2, OUT_H / 2), Rgba8::WHITE);
        assert!((out.depth.get(OUT_W / 2, OUT_H / 2) - 1.0).abs() < 0.01);
        // the wall does not reach the view corners
        assert_eq!(*out.weight_sum.get(0, 0), 0.0);
        assert_eq!(out.color.get(0, 0).a, 0);
    }

    #[test]
    fn test_tied_cameras_render_lowest_index() {
        let red = Rgba8::opaque(255, 0, 0);
        let blue = Rgba8::opaque(0, 0, 255);
        let mut r = renderer();
        r.integrate(&two_camera_tuple(red, blue));
        let frame = r.render(&[view()]).unwrap();
        assert_eq!(*frame.view(0).unwrap().color.get(OUT_W / 2, OUT_H / 2), red);
    }

    #[test]
    fn test_color_by_camera() {
        let params = SharedParams::new(test_params());
        params.update(|p| p.color_by_camera = true).unwrap();
        let mut r = BlendPcr::with_params(params, OUT_W, OUT_H).unwrap();
        r.integrate(&two_camera_tuple(Rgba8::WHITE, Rgba8::WHITE));
        let frame = r.render(&[view()]).unwrap();
        let expected = Rgba8::from_vec4(camera_color(0));
        assert_eq!(*frame.view(0).unwrap().color.get(OUT_W / 2, OUT_H / 2), expected);
    }

    #[test]
    fn test_render_before_integrate_is_background() {
        let mut r = renderer();
        let frame = r.render(&[view()]).unwrap();
        let out = frame.view(0).unwrap();
        assert!(out.weight_sum.as_slice().iter().all(|&s| s == 0.0));
        assert_eq!(out.coverage(), 0.0);
    }

    #[test]
    fn test_stereo_views() {
        let mut r = renderer();
        r.integrate(&two_camera_tuple(Rgba8::WHITE, Rgba8::WHITE));
        let frame = r.render(&view().views(2)).unwrap();
        assert_eq!(frame.view_count(), 2);
        assert!(frame.views().all(|v| v.coverage() > 0.1));
    }

    #[test]
    fn test_no_views_is_an_error() {
        let mut r = renderer();
        assert!(matches!(r.render(&[]), Err(BlendError::NoViews)));
    }

    #[test]
    fn test_resize_does_not_leak() {
        let mut r = renderer();
        r.integrate(&two_camera_tuple(Rgba8::WHITE, Rgba8::WHITE));
        r.render(&[view()]).unwrap();
        let baseline = r.compositor().live_allocations();
        assert!(baseline > 0);
        for (w, h) in [(64, 48), (16, 12), (OUT_W, OUT_H)] {
            r.set_output_size(w, h).unwrap();
            let frame = r.render(&[view()]).unwrap();
            assert_eq!(frame.view(0).unwrap().dimensions(), (w, h));
        }
        assert_eq!(r.compositor().live_allocations(), baseline);
        assert!(r.set_output_size(0, 10).is_err());
    }
}
