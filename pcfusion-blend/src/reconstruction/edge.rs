//! Edge proximity: how close each pixel is to an invalid pixel.

use pcfusion_data::Raster;

/// Per-pixel edge score in [0, 1].
///
/// Invalid pixels score 1. A valid pixel at Euclidean pixel distance `d` from the
/// nearest invalid pixel scores `1 - d / (radius + 1)` when `d <= radius`, else 0.
/// Pixels outside the raster do not count as invalid.
pub fn edge_proximity(valid: &Raster<bool>, radius: u32) -> Raster<f32> {
    let (w, h) = valid.dimensions();
    let (wu, hu) = (w as usize, h as usize);
    let r = radius as i64;
    let far = r + 1;
    let mask = valid.as_slice();

    // distance to the nearest invalid pixel in the same row, saturated at `far`
    let mut horizontal = vec![far; wu * hu];
    for y in 0..hu {
        let row = &mask[y * wu..(y + 1) * wu];
        let out = &mut horizontal[y * wu..(y + 1) * wu];
        let mut last: Option<i64> = None;
        for x in 0..wu {
            if !row[x] {
                last = Some(x as i64);
            }
            if let Some(l) = last {
                out[x] = (x as i64 - l).min(far);
            }
        }
        last = None;
        for x in (0..wu).rev() {
            if !row[x] {
                last = Some(x as i64);
            }
            if let Some(l) = last {
                out[x] = out[x].min(l - x as i64);
            }
        }
    }

    let limit = r * r;
    let scale = 1.0 / far as f32;
    let mut scores = Vec::with_capacity(wu * hu);
    for y in 0..h as i64 {
        for x in 0..wu {
            if !mask[y as usize * wu + x] {
                scores.push(1.0);
                continue;
            }
            let mut best = i64::MAX;
            for dy in -r..=r {
                let yy = y + dy;
                if yy < 0 || yy >= h as i64 {
                    continue;
                }
                let hd = horizontal[yy as usize * wu + x];
                if hd >= far {
                    continue;
                }
                best = best.min(hd * hd + dy * dy);
            }
            if best <= limit {
                scores.push(1.0 - (best as f32).sqrt() * scale);
            } else {
                scores.push(0.0);
            }
        }
    }
    Raster::from_vec(w, h, scores).unwrap_or_else(|| Raster::filled(w, h, 0.0))
}
