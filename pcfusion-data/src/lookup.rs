//! Per-camera calibration lookup tables.
//!
//! Two tables are derived once per camera and shared by every frame it emits:
//!
//! - image -> 3D: for each pixel, the normalized ray `(x/z, y/z)` (NaN if the
//!   pixel has no valid ray).
//! - 3D -> image: a square table over normalized coordinates `[-1, 1]^2` at
//!   `z = 1`, holding the image position relative to the raster size, or
//!   `(-1, -1)` where the ray misses the sensor.

use crate::error::DataError;
use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Side length of the 3D -> image lookup table.
pub const LOOKUP_TABLE_SIZE: u32 = 1024;

/// Pinhole intrinsics in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PinholeIntrinsics {
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
    pub width: u32,
    pub height: u32,
}

impl PinholeIntrinsics {
    /// Centered pinhole with the given horizontal field of view and square pixels.
    pub fn from_horizontal_fov(width: u32, height: u32, fov_degrees: f32) -> Self {
        let f = (width as f32 * 0.5) / (fov_degrees.to_radians() * 0.5).tan();
        Self {
            fx: f,
            fy: f,
            cx: (width as f32 - 1.0) * 0.5,
            cy: (height as f32 - 1.0) * 0.5,
            width,
            height,
        }
    }

    fn validate(&self) -> Result<(), DataError> {
        if self.width == 0 || self.height == 0 {
            return Err(DataError::InvalidIntrinsics("zero-sized raster".into()));
        }
        if !(self.fx.is_finite() && self.fy.is_finite()) || self.fx <= 0.0 || self.fy <= 0.0 {
            return Err(DataError::InvalidIntrinsics(format!(
                "focal lengths must be positive, got fx={} fy={}",
                self.fx, self.fy
            )));
        }
        Ok(())
    }
}

/// Immutable lookup tables for one camera.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraLookup {
    width: u32,
    height: u32,
    image_to_3d: Vec<Vec2>,
    table_size: u32,
    to_image: Vec<Vec2>,
}

impl CameraLookup {
    /// Build both tables from pinhole intrinsics.
    pub fn from_intrinsics(intrinsics: &PinholeIntrinsics, table_size: u32) -> Result<Self, DataError> {
        intrinsics.validate()?;
        if table_size < 2 {
            return Err(DataError::InvalidIntrinsics(format!(
                "lookup table size must be at least 2, got {table_size}"
            )));
        }

        let PinholeIntrinsics {
            fx,
            fy,
            cx,
            cy,
            width,
            height,
        } = *intrinsics;

        let mut image_to_3d = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                image_to_3d.push(Vec2::new((x as f32 - cx) / fx, (y as f32 - cy) / fy));
            }
        }

        let max_x = (width - 1) as f32;
        let max_y = (height - 1) as f32;
        let step = 2.0 / (table_size - 1) as f32;
        let mut to_image = Vec::with_capacity(table_size as usize * table_size as usize);
        for v in 0..table_size {
            for u in 0..table_size {
                let n = Vec2::new(-1.0 + u as f32 * step, -1.0 + v as f32 * step);
                let px = fx * n.x + cx;
                let py = fy * n.y + cy;
                if (0.0..=max_x).contains(&px) && (0.0..=max_y).contains(&py) {
                    to_image.push(Vec2::new(px / width as f32, py / height as f32));
                } else {
                    to_image.push(Vec2::splat(-1.0));
                }
            }
        }

        Ok(Self {
            width,
            height,
            image_to_3d,
            table_size,
            to_image,
        })
    }

    /// Wrap externally provided tables (e.g. exported by a device SDK).
    pub fn from_tables(
        width: u32,
        height: u32,
        image_to_3d: Vec<Vec2>,
        table_size: u32,
        to_image: Vec<Vec2>,
    ) -> Result<Self, DataError> {
        let expected = width as usize * height as usize;
        if image_to_3d.len() != expected {
            return Err(DataError::BufferSize {
                what: "image_to_3d",
                expected,
                actual: image_to_3d.len(),
            });
        }
        let expected = table_size as usize * table_size as usize;
        if table_size < 2 || to_image.len() != expected {
            return Err(DataError::BufferSize {
                what: "to_image",
                expected,
                actual: to_image.len(),
            });
        }
        Ok(Self {
            width,
            height,
            image_to_3d,
            table_size,
            to_image,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn table_size(&self) -> u32 {
        self.table_size
    }

    pub fn image_to_3d(&self) -> &[Vec2] {
        &self.image_to_3d
    }

    pub fn to_image_table(&self) -> &[Vec2] {
        &self.to_image
    }

    /// Normalized ray of a pixel, `None` when the table marks it invalid.
    #[inline]
    pub fn ray(&self, x: u32, y: u32) -> Option<Vec2> {
        let r = self.image_to_3d[y as usize * self.width as usize + x as usize];
        r.is_finite().then_some(r)
    }

    /// Camera-space position in meters of a pixel with depth in millimeters.
    #[inline]
    pub fn unproject(&self, x: u32, y: u32, depth_mm: u16) -> Option<Vec3> {
        if depth_mm == 0 {
            return None;
        }
        let r = self.ray(x, y)?;
        Some(Vec3::new(r.x, r.y, 1.0) * (depth_mm as f32 / 1000.0))
    }

    /// Project a camera-space point to pixel coordinates.
    ///
    /// Bilinearly interpolates the 3D -> image table; returns `None` behind the
    /// camera, outside the table, or when any of the four table cells is invalid.
    pub fn project(&self, p: Vec3) -> Option<Vec2> {
        if p.z <= f32::EPSILON {
            return None;
        }
        let n = Vec2::new(p.x / p.z, p.y / p.z);
        if !(n.x.abs() <= 1.0 && n.y.abs() <= 1.0) {
            return None;
        }

        let last = (self.table_size - 1) as f32;
        let t = (n + Vec2::ONE) * 0.5 * last;
        let x0 = (t.x.floor() as u32).min(self.table_size - 2);
        let y0 = (t.y.floor() as u32).min(self.table_size - 2);
        let fx = t.x - x0 as f32;
        let fy = t.y - y0 as f32;

        let at = |x: u32, y: u32| self.to_image[(y * self.table_size + x) as usize];
        let c00 = at(x0, y0);
        let c10 = at(x0 + 1, y0);
        let c01 = at(x0, y0 + 1);
        let c11 = at(x0 + 1, y0 + 1);
        if [c00, c10, c01, c11].iter().any(|c| c.x < 0.0 || c.y < 0.0) {
            return None;
        }

        let top = c00.lerp(c10, fx);
        let bottom = c01.lerp(c11, fx);
        let rel = top.lerp(bottom, fy);
        Some(rel * Vec2::new(self.width as f32, self.height as f32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinect_like() -> PinholeIntrinsics {
        PinholeIntrinsics {
            fx: 504.0,
            fy: 504.0,
            cx: 320.0,
            cy: 288.0,
            width: 640,
            height: 576,
        }
    }

    #[test]
    fn test_unproject_zero_depth_is_invalid() {
        let lookup = CameraLookup::from_intrinsics(&kinect_like(), 256).unwrap();
        assert!(lookup.unproject(10, 10, 0).is_none());
    }

    #[test]
    fn test_unproject_center_pixel() {
        let lookup = CameraLookup::from_intrinsics(&kinect_like(), 256).unwrap();
        let p = lookup.unproject(320, 288, 1500).unwrap();
        assert!((p - Vec3::new(0.0, 0.0, 1.5)).length() < 1e-6);
    }

    #[test]
    fn test_calibration_roundtrip() {
        let lookup = CameraLookup::from_intrinsics(&kinect_like(), LOOKUP_TABLE_SIZE).unwrap();
        // the outermost pixel ring has table neighbours that fall off the sensor
        for y in (2..574).step_by(37) {
            for x in (2..638).step_by(41) {
                let p = lookup.unproject(x, y, 2000).unwrap();
                let img = lookup.project(p).unwrap();
                assert!((img.x - x as f32).abs() < 0.05, "x {} -> {}", x, img.x);
                assert!((img.y - y as f32).abs() < 0.05, "y {} -> {}", y, img.y);
            }
        }
    }

    #[test]
    fn test_project_behind_camera() {
        let lookup = CameraLookup::from_intrinsics(&kinect_like(), 64).unwrap();
        assert!(lookup.project(Vec3::new(0.0, 0.0, -1.0)).is_none());
    }

    #[test]
    fn test_project_outside_sensor() {
        let lookup = CameraLookup::from_intrinsics(&kinect_like(), 256).unwrap();
        // 0.9 normalized maps to pixel 773 which is beyond the 640 wide raster
        assert!(lookup.project(Vec3::new(0.9, 0.0, 1.0)).is_none());
    }

    #[test]
    fn test_invalid_intrinsics_rejected() {
        let mut bad = kinect_like();
        bad.fx = 0.0;
        assert!(CameraLookup::from_intrinsics(&bad, 256).is_err());
    }

    #[test]
    fn test_from_tables_checks_sizes() {
        let r = CameraLookup::from_tables(2, 2, vec![Vec2::ZERO; 3], 2, vec![Vec2::ZERO; 4]);
        assert!(r.is_err());
    }
}
