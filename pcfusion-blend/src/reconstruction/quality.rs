//! Cross-camera quality estimation.

use super::CameraReconstruction;
use crate::params::BlendParams;
use glam::Vec3;
use pcfusion_data::Raster;

/// Floor on the view-angle term so grazing surfaces keep a little weight.
pub const MIN_VIEW_ANGLE_WEIGHT: f32 = 0.05;
/// Multiplier applied when another camera saw free space in front of the point.
pub const CONFLICT_PENALTY: f32 = 0.5;

/// Quality of every pixel of camera `index` against all other cameras.
///
/// `quality = share * penalty * (1 - edge)`, where `share` is the camera's view-angle
/// term divided by the sum over all cameras agreeing on the surface, and `penalty`
/// is [`CONFLICT_PENALTY`] if some other camera observed the point as empty space.
/// Invalid pixels get 0.
pub fn estimate_quality(cameras: &[CameraReconstruction], index: usize, params: &BlendParams) -> Raster<f32> {
    let cam = &cameras[index];
    let (w, h) = cam.dimensions();
    let eye = cam.eye();
    let tau = params.agreement_depth;

    let mut out = Vec::with_capacity(cam.valid.len());
    for i in 0..cam.valid.len() {
        if !cam.valid.as_slice()[i] {
            out.push(0.0);
            continue;
        }
        let p = cam.world_position(i);
        let n = cam.world_normal(i);
        let own = view_angle_weight(n, eye - p);

        let mut others = 0.0f32;
        let mut conflict = false;
        for (j, other) in cameras.iter().enumerate() {
            if j == index {
                continue;
            }
            let local = other.inverse_model.transform_point3(p);
            let Some(px) = other.frame.lookup.project(local) else {
                continue;
            };
            let (x, y) = (px.x.round() as i64, px.y.round() as i64);
            let Some(&true) = other.valid.try_get(x, y) else {
                continue;
            };
            let k = other.valid.index(x as u32, y as u32);
            let seen = other.smoothed.as_slice()[k];
            let dz = local.z - seen.z;
            if dz < -tau * 3.0 {
                // the other camera sees through this point
                conflict = true;
                continue;
            }
            let other_normal = other.world_normal(k);
            let agreement = (-(dz / tau).powi(2)).exp() * n.dot(other_normal).max(0.0);
            others += agreement * view_angle_weight(other_normal, other.eye() - p);
        }

        let share = own / (own + others);
        let penalty = if conflict { CONFLICT_PENALTY } else { 1.0 };
        out.push(share * penalty * (1.0 - cam.edge.as_slice()[i]));
    }
    Raster::from_vec(w, h, out).unwrap_or_else(|| Raster::filled(w, h, 0.0))
}

fn view_angle_weight(normal: Vec3, to_eye: Vec3) -> f32 {
    normal.dot(to_eye.normalize_or_zero()).max(MIN_VIEW_ANGLE_WEIGHT)
}
