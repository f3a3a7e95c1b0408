//! Edge-aware moving-least-squares smoothing in image space.

use crate::params::BlendParams;
use glam::Vec3;
use pcfusion_data::Raster;

const MIN_WEIGHT_SUM: f32 = 1e-8;

/// Smooth camera-space positions over a `kernel_radius` pixel neighborhood.
///
/// Neighbor weight is `exp(-spread * d^2 / r^2) * exp(-|q - p|^2 / h^2) * (1 - e_q)`,
/// where `d` is the pixel distance and `e_q` the neighbor's edge score. The result is
/// blended back toward the raw position by the pixel's own edge score, so edge
/// pixels keep their measured position. A radius of 0 returns the input unchanged.
pub fn smooth_positions(
    positions: &Raster<Vec3>,
    valid: &Raster<bool>,
    edge: &Raster<f32>,
    params: &BlendParams,
) -> Raster<Vec3> {
    let mut out = positions.clone();
    let r = params.kernel_radius as i64;
    if r == 0 {
        return out;
    }

    let r2 = (r * r) as f32;
    let inv_h2 = 1.0 / (params.implicit_h * params.implicit_h);
    let side = (2 * r + 1) as usize;
    let spatial: Vec<f32> = (-r..=r)
        .flat_map(|dy| (-r..=r).map(move |dx| (dx * dx + dy * dy) as f32))
        .map(|d2| if d2 > r2 { 0.0 } else { (-params.kernel_spread * d2 / r2).exp() })
        .collect();

    let (w, h) = positions.dimensions();
    let pos = positions.as_slice();
    let mask = valid.as_slice();
    let edges = edge.as_slice();
    let wu = w as usize;

    for y in 0..h as i64 {
        for x in 0..w as i64 {
            let i = y as usize * wu + x as usize;
            if !mask[i] {
                continue;
            }
            let p = pos[i];
            let mut sum = Vec3::ZERO;
            let mut weight_sum = 0.0f32;
            for dy in -r..=r {
                let yy = y + dy;
                if yy < 0 || yy >= h as i64 {
                    continue;
                }
                for dx in -r..=r {
                    let xx = x + dx;
                    if xx < 0 || xx >= w as i64 {
                        continue;
                    }
                    let sw = spatial[(dy + r) as usize * side + (dx + r) as usize];
                    let j = yy as usize * wu + xx as usize;
                    if sw == 0.0 || !mask[j] {
                        continue;
                    }
                    let offset = pos[j] - p;
                    let wgt = sw * (-offset.length_squared() * inv_h2).exp() * (1.0 - edges[j]);
                    sum += offset * wgt;
                    weight_sum += wgt;
                }
            }
            let smoothed = if weight_sum > MIN_WEIGHT_SUM { p + sum / weight_sum } else { p };
            out.as_mut_slice()[i] = smoothed.lerp(p, edges[i]);
        }
    }
    out
}
