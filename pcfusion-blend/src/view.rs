//! Output view cameras.

use glam::{Mat4, Vec2, Vec3};

/// Horizontal eye offset of the stereo pair, in meters.
pub const STEREO_EYE_OFFSET: f32 = 0.03;

/// View and projection of one rendered output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewCamera {
    pub view: Mat4,
    pub projection: Mat4,
}

impl ViewCamera {
    pub fn new(view: Mat4, projection: Mat4) -> Self {
        Self { view, projection }
    }

    /// Perspective camera at `eye` looking at `target`.
    pub fn look_at(eye: Vec3, target: Vec3, fov_y_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        let forward = (target - eye).normalize_or_zero();
        let right = forward.cross(Vec3::Y).normalize_or_zero();
        let up = right.cross(forward).normalize_or_zero();
        Self {
            view: Mat4::look_to_rh(eye, forward, up),
            projection: Mat4::perspective_rh(fov_y_degrees.to_radians(), aspect, near, far),
        }
    }

    /// Left and right eye views, offset along the view's x axis.
    pub fn stereo_pair(&self) -> [ViewCamera; 2] {
        let shift = |dx: f32| ViewCamera {
            view: Mat4::from_translation(Vec3::new(dx, 0.0, 0.0)) * self.view,
            projection: self.projection,
        };
        [shift(STEREO_EYE_OFFSET), shift(-STEREO_EYE_OFFSET)]
    }

    /// `count` views: one mono view, or a stereo pair when `count` is 2.
    /// Larger counts repeat the pair.
    pub fn views(&self, count: usize) -> Vec<ViewCamera> {
        match count {
            0 => Vec::new(),
            1 => vec![*self],
            _ => {
                let pair = self.stereo_pair();
                (0..count).map(|i| pair[i % 2]).collect()
            }
        }
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    pub fn eye(&self) -> Vec3 {
        self.view.inverse().w_axis.truncate()
    }

    /// Project a world point to pixel coordinates (y down) and linear view depth.
    #[inline]
    pub fn project(view_projection: &Mat4, world: Vec3, width: u32, height: u32) -> Option<(Vec2, f32)> {
        let clip = *view_projection * world.extend(1.0);
        if clip.w <= 1e-6 {
            return None;
        }
        let ndc = clip.truncate() / clip.w;
        if !(0.0..=1.0).contains(&ndc.z) {
            return None;
        }
        let px = (ndc.x * 0.5 + 0.5) * width as f32;
        let py = (0.5 - ndc.y * 0.5) * height as f32;
        Some((Vec2::new(px, py), clip.w))
    }
}
