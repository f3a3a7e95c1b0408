//! Organized point cloud: one camera's depth+color frame.

use crate::error::DataError;
use crate::lookup::CameraLookup;
use crate::types::Rgba8;
use glam::{Mat4, Vec3};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Working resolution of the depth camera raster.
pub const CAMERA_IMAGE_WIDTH: u32 = 640;
pub const CAMERA_IMAGE_HEIGHT: u32 = 576;

/// Resolution of the optional high-resolution color stream.
pub const HIGH_RES_WIDTH: u32 = 2048;
pub const HIGH_RES_HEIGHT: u32 = 1536;

/// Key of an auxiliary attachment carried alongside a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AttachmentKind {
    /// Reference frame recorded alongside the sensor data for evaluation.
    GroundTruthFrame,
    Custom(u32),
}

/// Opaque attachments. The core pipeline never inspects their contents.
#[derive(Clone, Default)]
pub struct Attachments {
    entries: BTreeMap<AttachmentKind, Arc<dyn Any + Send + Sync>>,
}

impl Attachments {
    pub fn insert<T: Any + Send + Sync>(&mut self, kind: AttachmentKind, value: T) {
        self.entries.insert(kind, Arc::new(value));
    }

    /// Typed access; `None` if missing or stored under another type.
    pub fn get<T: Any + Send + Sync>(&self, kind: AttachmentKind) -> Option<&T> {
        self.entries.get(&kind).and_then(|v| v.downcast_ref::<T>())
    }

    pub fn contains(&self, kind: AttachmentKind) -> bool {
        self.entries.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Attachments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

/// High-resolution color image registered to the depth raster.
#[derive(Debug, Clone, PartialEq)]
pub struct HighResColors {
    pub width: u32,
    pub height: u32,
    pub data: Vec<Rgba8>,
}

impl HighResColors {
    /// Sample by normalized texture coordinate (nearest).
    pub fn sample(&self, u: f32, v: f32) -> Rgba8 {
        let x = ((u * self.width as f32) as i64).clamp(0, self.width as i64 - 1) as usize;
        let y = ((v * self.height as f32) as i64).clamp(0, self.height as i64 - 1) as usize;
        self.data[y * self.width as usize + x]
    }
}

/// One camera's frame.
///
/// Pixel buffers are owned by the frame. The lookup tables belong to the
/// source that produced the frame and are shared through an `Arc`, so a frame
/// keeps them alive even if the source is torn down first.
#[derive(Clone)]
pub struct OrganizedPointCloud {
    pub camera_index: usize,
    pub width: u32,
    pub height: u32,
    /// Range per pixel in millimeters, 0 = invalid.
    pub depth: Vec<u16>,
    pub colors: Vec<Rgba8>,
    pub high_res: Option<HighResColors>,
    /// Camera-to-world rigid transform.
    pub model_matrix: Mat4,
    pub lookup: Arc<CameraLookup>,
    pub frame_id: u64,
    pub timestamp: Option<f64>,
    pub attachments: Attachments,
}

impl OrganizedPointCloud {
    /// Build a frame, validating buffer sizes against the raster and lookup.
    pub fn new(
        camera_index: usize,
        width: u32,
        height: u32,
        depth: Vec<u16>,
        colors: Vec<Rgba8>,
        model_matrix: Mat4,
        lookup: Arc<CameraLookup>,
    ) -> Result<Self, DataError> {
        let expected = width as usize * height as usize;
        if depth.len() != expected {
            return Err(DataError::BufferSize {
                what: "depth",
                expected,
                actual: depth.len(),
            });
        }
        if colors.len() != expected {
            return Err(DataError::BufferSize {
                what: "colors",
                expected,
                actual: colors.len(),
            });
        }
        if lookup.width() != width || lookup.height() != height {
            return Err(DataError::LookupMismatch {
                lookup_width: lookup.width(),
                lookup_height: lookup.height(),
                width,
                height,
            });
        }
        Ok(Self {
            camera_index,
            width,
            height,
            depth,
            colors,
            high_res: None,
            model_matrix,
            lookup,
            frame_id: 0,
            timestamp: None,
            attachments: Attachments::default(),
        })
    }

    pub fn with_frame_id(mut self, frame_id: u64) -> Self {
        self.frame_id = frame_id;
        self
    }

    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_high_res(mut self, high_res: HighResColors) -> Self {
        self.high_res = Some(high_res);
        self
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    #[inline]
    pub fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// True if this frame has the given raster size.
    pub fn has_dimensions(&self, width: u32, height: u32) -> bool {
        self.width == width && self.height == height
    }

    pub fn valid_count(&self) -> usize {
        self.depth.iter().filter(|&&d| d != 0).count()
    }

    /// Camera-space position of a pixel in meters.
    #[inline]
    pub fn camera_point(&self, x: u32, y: u32) -> Option<Vec3> {
        self.lookup.unproject(x, y, self.depth[self.index(x, y)])
    }

    /// World-space position of a pixel in meters.
    #[inline]
    pub fn world_point(&self, x: u32, y: u32) -> Option<Vec3> {
        self.camera_point(x, y)
            .map(|p| self.model_matrix.transform_point3(p))
    }

    /// Camera center in world space.
    pub fn camera_position(&self) -> Vec3 {
        self.model_matrix.w_axis.truncate()
    }

    /// Invalidate a pixel.
    #[inline]
    pub fn reject(&mut self, i: usize) {
        self.depth[i] = 0;
    }
}

impl fmt::Debug for OrganizedPointCloud {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrganizedPointCloud")
            .field("camera_index", &self.camera_index)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("frame_id", &self.frame_id)
            .field("timestamp", &self.timestamp)
            .field("high_res", &self.high_res.as_ref().map(|h| (h.width, h.height)))
            .field("attachments", &self.attachments)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::PinholeIntrinsics;

    fn lookup(w: u32, h: u32) -> Arc<CameraLookup> {
        let intr = PinholeIntrinsics::from_horizontal_fov(w, h, 90.0);
        Arc::new(CameraLookup::from_intrinsics(&intr, 64).unwrap())
    }

    #[test]
    fn test_new_validates_buffers() {
        let lk = lookup(4, 4);
        let bad = OrganizedPointCloud::new(0, 4, 4, vec![0; 15], vec![Rgba8::BLACK; 16], Mat4::IDENTITY, lk.clone());
        assert!(bad.is_err());

        let ok = OrganizedPointCloud::new(0, 4, 4, vec![0; 16], vec![Rgba8::BLACK; 16], Mat4::IDENTITY, lk);
        assert!(ok.is_ok());
    }

    #[test]
    fn test_new_rejects_lookup_mismatch() {
        let r = OrganizedPointCloud::new(0, 4, 4, vec![0; 16], vec![Rgba8::BLACK; 16], Mat4::IDENTITY, lookup(8, 8));
        assert!(matches!(r, Err(DataError::LookupMismatch { .. })));
    }

    #[test]
    fn test_world_point_applies_pose() {
        let lk = lookup(4, 4);
        let mut depth = vec![0; 16];
        depth[0] = 1000;
        let pose = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let pc = OrganizedPointCloud::new(0, 4, 4, depth, vec![Rgba8::BLACK; 16], pose, lk).unwrap();
        let cam = pc.camera_point(0, 0).unwrap();
        let world = pc.world_point(0, 0).unwrap();
        assert!((world - cam - Vec3::new(1.0, 2.0, 3.0)).length() < 1e-6);
        assert!(pc.world_point(1, 0).is_none());
        assert_eq!(pc.valid_count(), 1);
    }

    #[test]
    fn test_clone_shares_lookup() {
        let lk = lookup(4, 4);
        let pc = OrganizedPointCloud::new(0, 4, 4, vec![0; 16], vec![Rgba8::BLACK; 16], Mat4::IDENTITY, lk.clone()).unwrap();
        let copy = pc.clone();
        assert!(Arc::ptr_eq(&pc.lookup, &copy.lookup));
        assert_eq!(Arc::strong_count(&lk), 3);
    }

    #[test]
    fn test_attachments_typed_access() {
        let mut a = Attachments::default();
        a.insert(AttachmentKind::GroundTruthFrame, 42u32);
        assert_eq!(a.get::<u32>(AttachmentKind::GroundTruthFrame), Some(&42));
        assert_eq!(a.get::<u64>(AttachmentKind::GroundTruthFrame), None);
        assert!(!a.contains(AttachmentKind::Custom(1)));
    }
}
