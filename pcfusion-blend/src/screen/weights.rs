//! Smooth per-camera weight maps from the dominance map.

use pcfusion_data::Raster;

/// One-hot map of `slot` in `dominance`, blurred with a separable tent kernel.
///
/// Kernel taps falling outside the raster are dropped and the remaining taps
/// renormalized, so a map that is 1 everywhere stays 1 at the borders.
pub fn blur_weight_map(dominance: &Raster<Option<u16>>, slot: u16, radius: u32, scratch: &mut Raster<f32>, out: &mut Raster<f32>) {
    for (o, d) in out.as_mut_slice().iter_mut().zip(dominance.as_slice()) {
        *o = if *d == Some(slot) { 1.0 } else { 0.0 };
    }
    if radius == 0 {
        return;
    }
    let (w, h) = dominance.dimensions();
    let r = radius as i64;
    let tap = |k: i64| (r + 1 - k.abs()) as f32;

    for y in 0..h {
        for x in 0..w as i64 {
            let (mut sum, mut norm) = (0.0, 0.0);
            for k in -r..=r {
                let xx = x + k;
                if xx < 0 || xx >= w as i64 {
                    continue;
                }
                sum += tap(k) * out.get(xx as u32, y);
                norm += tap(k);
            }
            *scratch.get_mut(x as u32, y) = sum / norm;
        }
    }
    for y in 0..h as i64 {
        for x in 0..w {
            let (mut sum, mut norm) = (0.0, 0.0);
            for k in -r..=r {
                let yy = y + k;
                if yy < 0 || yy >= h as i64 {
                    continue;
                }
                sum += tap(k) * scratch.get(x, yy as u32);
                norm += tap(k);
            }
            *out.get_mut(x, y as u32) = sum / norm;
        }
    }
}

/// Bilinear sample at continuous reduced-resolution coordinates, clamped to the raster.
#[inline]
pub fn sample_bilinear(map: &Raster<f32>, x: f32, y: f32) -> f32 {
    let (w, h) = map.dimensions();
    let x = x.clamp(0.0, (w - 1) as f32);
    let y = y.clamp(0.0, (h - 1) as f32);
    let (x0, y0) = (x.floor() as u32, y.floor() as u32);
    let (x1, y1) = ((x0 + 1).min(w - 1), (y0 + 1).min(h - 1));
    let (fx, fy) = (x - x0 as f32, y - y0 as f32);
    let top = map.get(x0, y0) * (1.0 - fx) + map.get(x1, y0) * fx;
    let bottom = map.get(x0, y1) * (1.0 - fx) + map.get(x1, y1) * fx;
    top * (1.0 - fy) + bottom * fy
}
