//! Covariance normals over the smoothed positions.

use crate::math::{CovarianceAccumulator, plane_normal};
use glam::Vec3;
use pcfusion_data::Raster;

/// Fewest neighbors for a plane fit.
const MIN_NEIGHBORS: f32 = 3.0;

/// Camera-space unit normal per valid pixel, oriented toward the camera.
///
/// Pixels whose neighborhood is degenerate fall back to the direction toward the
/// camera. Invalid pixels get `Vec3::ZERO`.
pub fn estimate_normals(positions: &Raster<Vec3>, valid: &Raster<bool>, radius: u32) -> Raster<Vec3> {
    let (w, h) = positions.dimensions();
    let wu = w as usize;
    let r = radius.max(1) as i64;
    let pos = positions.as_slice();
    let mask = valid.as_slice();

    let mut normals = Vec::with_capacity(pos.len());
    for y in 0..h as i64 {
        for x in 0..w as i64 {
            let i = y as usize * wu + x as usize;
            if !mask[i] {
                normals.push(Vec3::ZERO);
                continue;
            }
            let p = pos[i];
            let mut acc = CovarianceAccumulator::default();
            for yy in (y - r).max(0)..=(y + r).min(h as i64 - 1) {
                for xx in (x - r).max(0)..=(x + r).min(w as i64 - 1) {
                    let j = yy as usize * wu + xx as usize;
                    if mask[j] {
                        // local offsets keep the covariance well conditioned
                        acc.add(pos[j] - p, 1.0);
                    }
                }
            }

            let to_camera = (-p).normalize_or_zero();
            let n = if acc.weight() >= MIN_NEIGHBORS {
                acc.covariance().and_then(plane_normal)
            } else {
                None
            };
            let n = n.unwrap_or(to_camera);
            normals.push(if n.dot(to_camera) < 0.0 { -n } else { n });
        }
    }
    Raster::from_vec(w, h, normals).unwrap_or_else(|| Raster::filled(w, h, Vec3::ZERO))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(w: u32, h: u32, f: impl Fn(f32, f32) -> Vec3) -> Raster<Vec3> {
        let mut data = Vec::new();
        for y in 0..h {
            for x in 0..w {
                data.push(f(x as f32, y as f32));
            }
        }
        Raster::from_vec(w, h, data).unwrap()
    }

    #[test]
    fn test_fronto_parallel_plane_faces_camera() {
        let pos = grid(7, 7, |x, y| Vec3::new((x - 3.0) * 0.01, (y - 3.0) * 0.01, 1.5));
        let n = estimate_normals(&pos, &Raster::filled(7, 7, true), 2);
        let c = *n.get(3, 3);
        assert!((c - Vec3::NEG_Z).length() < 1e-3, "{c:?}");
        // corners have fewer neighbors but still fit the plane
        assert!(n.get(0, 0).dot(Vec3::NEG_Z) > 0.999);
    }

    #[test]
    fn test_slanted_plane() {
        // z grows with x: normal leans toward -x
        let pos = grid(9, 9, |x, y| Vec3::new(x * 0.01, y * 0.01, 1.0 + x * 0.01));
        let n = estimate_normals(&pos, &Raster::filled(9, 9, true), 2);
        let expected = Vec3::new(1.0, 0.0, -1.0).normalize();
        assert!(n.get(4, 4).dot(expected) > 0.999);
    }

    #[test]
    fn test_isolated_pixel_falls_back_to_view_direction() {
        let pos = grid(5, 5, |_, _| Vec3::new(0.0, 0.0, 2.0));
        let mut valid = Raster::filled(5, 5, false);
        *valid.get_mut(2, 2) = true;
        let n = estimate_normals(&pos, &valid, 2);
        assert!((*n.get(2, 2) - Vec3::NEG_Z).length() < 1e-6);
        assert_eq!(*n.get(0, 0), Vec3::ZERO);
    }
}
