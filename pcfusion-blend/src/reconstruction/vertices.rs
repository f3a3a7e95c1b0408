//! Vertex generation and rejection.

use crate::params::BlendParams;
use glam::Vec3;
use pcfusion_data::{OrganizedPointCloud, Raster};

/// Camera-space position (meters) of every pixel and its validity.
///
/// Pixels with zero depth or no valid lookup ray are invalid and hold `Vec3::ZERO`.
pub fn generate_vertices(frame: &OrganizedPointCloud) -> (Raster<Vec3>, Raster<bool>) {
    let (w, h) = (frame.width, frame.height);
    let mut positions = Vec::with_capacity(frame.pixel_count());
    let mut valid = Vec::with_capacity(frame.pixel_count());
    for y in 0..h {
        for x in 0..w {
            match frame.camera_point(x, y) {
                Some(p) => {
                    positions.push(p);
                    valid.push(true);
                }
                None => {
                    positions.push(Vec3::ZERO);
                    valid.push(false);
                }
            }
        }
    }
    (
        Raster::from_vec(w, h, positions).unwrap_or_else(|| Raster::filled(w, h, Vec3::ZERO)),
        Raster::from_vec(w, h, valid).unwrap_or_else(|| Raster::filled(w, h, false)),
    )
}

/// Invalidate pixels outside the clip box (world space) or without a mapped color.
/// Returns the number of pixels rejected by this pass.
pub fn reject(
    frame: &OrganizedPointCloud,
    positions: &Raster<Vec3>,
    valid: &mut Raster<bool>,
    params: &BlendParams,
) -> usize {
    let min = params.clip_min();
    let max = params.clip_max();
    let mut rejected = 0;
    for (i, ok) in valid.as_mut_slice().iter_mut().enumerate() {
        if !*ok {
            continue;
        }
        let p = positions.as_slice()[i];
        let mut keep = p.is_finite();
        if keep && params.should_clip {
            let world = frame.model_matrix.transform_point3(p);
            keep = world.cmpge(min).all() && world.cmple(max).all();
        }
        if keep && params.discard_black_pixels {
            keep = !frame.colors[i].is_black();
        }
        if !keep {
            *ok = false;
            rejected += 1;
        }
    }
    rejected
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Mat4;
    use pcfusion_data::{CameraLookup, PinholeIntrinsics, Rgba8};
    use std::sync::Arc;

    fn frame(depth: Vec<u16>, colors: Vec<Rgba8>, pose: Mat4) -> OrganizedPointCloud {
        let intr = PinholeIntrinsics::from_horizontal_fov(3, 1, 90.0);
        let lookup = Arc::new(CameraLookup::from_intrinsics(&intr, 16).unwrap());
        OrganizedPointCloud::new(0, 3, 1, depth, colors, pose, lookup).unwrap()
    }

    #[test]
    fn test_zero_depth_is_invalid() {
        let f = frame(vec![1000, 0, 2000], vec![Rgba8::WHITE; 3], Mat4::IDENTITY);
        let (pos, valid) = generate_vertices(&f);
        assert_eq!(valid.as_slice(), &[true, false, true]);
        assert!((pos.get(2, 0).z - 2.0).abs() < 1e-6);
        assert_eq!(*pos.get(1, 0), Vec3::ZERO);
    }

    #[test]
    fn test_clip_box_in_world_space() {
        // camera 1.5 m up looking along +y: 1 m of depth lands at y = 2.5, above clip_max.y
        let pose = Mat4::from_translation(Vec3::new(0.0, 1.5, 0.0)) * Mat4::from_rotation_x(-std::f32::consts::FRAC_PI_2);
        let f = frame(vec![1000, 0, 1000], vec![Rgba8::WHITE; 3], pose);
        let (pos, mut valid) = generate_vertices(&f);
        let params = BlendParams {
            clip_min: [-10.0, 1.0, -10.0],
            clip_max: [10.0, 2.0, 10.0],
            ..BlendParams::default()
        };
        let rejected = reject(&f, &pos, &mut valid, &params);
        assert_eq!(rejected, 2);
        assert!(valid.as_slice().iter().all(|v| !v));

        let (pos, mut valid) = generate_vertices(&f);
        let no_clip = BlendParams {
            should_clip: false,
            ..params
        };
        assert_eq!(reject(&f, &pos, &mut valid, &no_clip), 0);
    }

    #[test]
    fn test_black_pixels_discarded_when_enabled() {
        let colors = vec![Rgba8::WHITE, Rgba8::WHITE, Rgba8::BLACK];
        let f = frame(vec![1000, 1000, 1000], colors, Mat4::IDENTITY);
        let params = BlendParams {
            should_clip: false,
            discard_black_pixels: true,
            ..BlendParams::default()
        };
        let (pos, mut valid) = generate_vertices(&f);
        reject(&f, &pos, &mut valid, &params);
        assert_eq!(valid.as_slice(), &[true, true, false]);
    }
}
