//! Screen-space stages: rasterization, dominance, weight smoothing, compositing.

pub mod composite;
pub mod dominance;
pub mod raster;
pub mod resources;
pub mod weights;

pub use raster::FragmentBuffer;
pub use resources::{AllocationTracker, ResourceKey, Tracked};
pub(crate) use resources::{ScreenResources, ViewTargets};

use crate::params::BlendParams;
use crate::reconstruction::ReconstructedTuple;
use crate::view::ViewCamera;
use glam::Vec4;
use pcfusion_data::{Raster, Rgba8};
use rayon::prelude::*;

/// Per-camera colors used when `color_by_camera` is set.
pub const CAMERA_PALETTE: [[f32; 4]; 8] = [
    [1.0, 0.2, 0.2, 1.0],
    [0.2, 0.6, 1.0, 1.0],
    [0.2, 0.8, 0.2, 1.0],
    [1.0, 0.8, 0.2, 1.0],
    [0.6, 0.4, 0.8, 1.0],
    [0.2, 0.8, 0.8, 1.0],
    [1.0, 0.4, 0.6, 1.0],
    [0.6, 0.6, 0.6, 1.0],
];

pub fn camera_color(camera_index: usize) -> Vec4 {
    Vec4::from_array(CAMERA_PALETTE[camera_index % CAMERA_PALETTE.len()])
}

/// Composited result of one view.
#[derive(Debug, Clone)]
pub struct ViewOutput {
    pub color: Raster<Rgba8>,
    /// Linear view depth in meters, infinite where nothing was drawn.
    pub depth: Raster<f32>,
    /// Sum of the normalized blend weights: 1 on covered pixels, 0 on background.
    pub weight_sum: Raster<f32>,
}

impl ViewOutput {
    pub fn dimensions(&self) -> (u32, u32) {
        self.color.dimensions()
    }

    /// RGBA8 bytes, row-major.
    pub fn color_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.color.as_slice())
    }

    /// Fraction of pixels with content.
    pub fn coverage(&self) -> f32 {
        let covered = self.weight_sum.as_slice().iter().filter(|&&w| w > 0.0).count();
        covered as f32 / self.weight_sum.len().max(1) as f32
    }
}

/// The views rendered for one reconstructed tuple.
#[derive(Debug, Default)]
pub struct RenderFrame {
    pub(crate) sequence: u64,
    pub(crate) cursor: f64,
    pub(crate) views: Vec<Tracked<ViewOutput>>,
}

impl RenderFrame {
    /// Sequence number of the tuple this frame was rendered from.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    pub fn view_count(&self) -> usize {
        self.views.len()
    }

    pub fn view(&self, index: usize) -> Option<&ViewOutput> {
        self.views.get(index).map(|v| &**v)
    }

    pub fn views(&self) -> impl Iterator<Item = &ViewOutput> {
        self.views.iter().map(|v| &**v)
    }
}

/// Steps 7-9 for one view: rasterize every camera, pick dominant cameras,
/// smooth their weights and blend.
pub(crate) fn blend_view(
    targets: &mut ViewTargets,
    output: &mut ViewOutput,
    scene: &ReconstructedTuple,
    view: &ViewCamera,
    params: &BlendParams,
) {
    let view_projection = view.view_projection();
    targets
        .fragments
        .par_iter_mut()
        .zip(scene.cameras.par_iter())
        .for_each(|(buffer, camera)| {
            buffer.clear();
            let palette = params.color_by_camera.then(|| camera_color(camera.camera_index));
            raster::rasterize_camera(buffer, camera, &view_projection, params, palette, None);
        });

    let fragments: Vec<&FragmentBuffer> = targets.fragments.iter().map(|f| &**f).collect();
    dominance::select_dominant(&fragments, params.mini_scale, params.depth_tolerance, &mut targets.dominance);

    for (slot, map) in targets.weights.iter_mut().enumerate() {
        weights::blur_weight_map(
            &targets.dominance,
            slot as u16,
            params.weight_blur_radius,
            &mut targets.scratch,
            map,
        );
    }

    let maps: Vec<&Raster<f32>> = targets.weights.iter().map(|m| &**m).collect();
    composite::composite(
        &fragments,
        &maps,
        params.mini_scale,
        params.depth_tolerance,
        params.background(),
        output,
    );
}

/// Copy a single shared depth buffer into `output`. Covered pixels carry the
/// one fragment drawn there at full weight.
pub(crate) fn resolve_depth_buffer(buffer: &FragmentBuffer, output: &mut ViewOutput, background: Vec4) {
    clear_view(output, background);
    for i in 0..buffer.depth.len() {
        if buffer.is_covered(i) {
            output.color.as_mut_slice()[i] = buffer.color.as_slice()[i];
            output.depth.as_mut_slice()[i] = buffer.depth.as_slice()[i];
            output.weight_sum.as_mut_slice()[i] = 1.0;
        }
    }
}

/// Fill `output` with the background.
pub(crate) fn clear_view(output: &mut ViewOutput, background: Vec4) {
    output.color.fill(Rgba8::from_vec4(background));
    output.depth.fill(f32::INFINITY);
    output.weight_sum.fill(0.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_palette_is_exact_in_eight_bits() {
        for color in CAMERA_PALETTE {
            for v in color {
                let steps = v * 5.0;
                assert!((steps - steps.round()).abs() < 1e-5, "{v}");
            }
        }
        assert_eq!(camera_color(CAMERA_PALETTE.len()), camera_color(0));
        assert_eq!(Rgba8::from_vec4(camera_color(0)), Rgba8::new(255, 51, 51, 255));
    }
}
