//! Final per-pixel blend of all cameras' fragments.

use super::ViewOutput;
use super::raster::FragmentBuffer;
use super::weights::sample_bilinear;
use glam::Vec4;
use pcfusion_data::Rgba8;

/// Weight sums at or below this fall back to the nearest fragment.
pub const WEIGHT_EPSILON: f32 = 1e-6;

/// Blend fragments into `out`.
///
/// Fragments within `depth_tolerance` of the nearest are blended with weight
/// `smoothed_weight * quality`, normalized over the fragments present at the
/// pixel. `weight_sum` receives the sum of the normalized weights actually
/// used. Pixels nobody covers get the background color, infinite depth and a
/// weight sum of 0.
pub fn composite(
    fragments: &[&FragmentBuffer],
    weights: &[&pcfusion_data::Raster<f32>],
    scale: u32,
    depth_tolerance: f32,
    background: Vec4,
    out: &mut ViewOutput,
) {
    let (w, h) = out.color.dimensions();
    let background = Rgba8::from_vec4(background);
    let inv_scale = 1.0 / scale.max(1) as f32;
    let mut raw = vec![0.0f32; fragments.len()];

    for y in 0..h {
        for x in 0..w {
            let i = out.color.index(x, y);
            let nearest = fragments
                .iter()
                .enumerate()
                .map(|(slot, f)| (slot, f.depth.as_slice()[i]))
                .filter(|(_, d)| d.is_finite())
                .min_by(|a, b| a.1.total_cmp(&b.1));
            let Some((nearest_slot, nearest_depth)) = nearest else {
                out.color.as_mut_slice()[i] = background;
                out.depth.as_mut_slice()[i] = f32::INFINITY;
                out.weight_sum.as_mut_slice()[i] = 0.0;
                continue;
            };

            let mx = (x as f32 + 0.5) * inv_scale - 0.5;
            let my = (y as f32 + 0.5) * inv_scale - 0.5;
            let mut total = 0.0f32;
            for (slot, f) in fragments.iter().enumerate() {
                let d = f.depth.as_slice()[i];
                raw[slot] = if d <= nearest_depth + depth_tolerance {
                    (sample_bilinear(weights[slot], mx, my) * f.quality.as_slice()[i]).max(0.0)
                } else {
                    0.0
                };
                total += raw[slot];
            }

            if total > WEIGHT_EPSILON {
                let mut color = Vec4::ZERO;
                let mut depth = 0.0f32;
                let mut used = 0.0f32;
                for (slot, f) in fragments.iter().enumerate() {
                    let share = raw[slot] / total;
                    if share <= 0.0 {
                        continue;
                    }
                    color += f.color.as_slice()[i].to_vec4() * share;
                    depth += f.depth.as_slice()[i] * share;
                    used += share;
                }
                out.color.as_mut_slice()[i] = Rgba8::from_vec4(color);
                out.depth.as_mut_slice()[i] = depth;
                out.weight_sum.as_mut_slice()[i] = used;
            } else {
                // the nearest fragment alone, at full weight
                let f = fragments[nearest_slot];
                out.color.as_mut_slice()[i] = f.color.as_slice()[i];
                out.depth.as_mut_slice()[i] = nearest_depth;
                out.weight_sum.as_mut_slice()[i] = 1.0;
            }
        }
    }
}
