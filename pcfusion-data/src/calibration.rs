//! Calibration descriptor for a multi-camera session.
//!
//! ```json
//! { "camera": [ { "filename": "cam0", "trafo": [[1,0,0,0],[0,1,0,0],[0,0,1,0],[0,0,0,1]] } ] }
//! ```
//!
//! `trafo` is the camera-to-world transform, row-major on disk.

use crate::error::DataError;
use crate::lookup::PinholeIntrinsics;
use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One camera of the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraEntry {
    /// Recording file or device reference, relative to the descriptor.
    pub filename: String,
    /// Row-major camera-to-world transform.
    pub trafo: [[f32; 4]; 4],
    /// Pinhole intrinsics; sources fall back to their own when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intrinsics: Option<PinholeIntrinsics>,
}

impl CameraEntry {
    pub fn new(filename: impl Into<String>, model_matrix: Mat4) -> Self {
        Self {
            filename: filename.into(),
            trafo: model_matrix.transpose().to_cols_array_2d(),
            intrinsics: None,
        }
    }

    pub fn with_intrinsics(mut self, intrinsics: PinholeIntrinsics) -> Self {
        self.intrinsics = Some(intrinsics);
        self
    }

    /// Camera-to-world transform in column-major convention.
    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.trafo).transpose()
    }
}

/// Parsed calibration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationDescriptor {
    #[serde(rename = "camera")]
    pub cameras: Vec<CameraEntry>,
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

impl CalibrationDescriptor {
    pub fn new(cameras: Vec<CameraEntry>) -> Self {
        Self {
            cameras,
            base_dir: None,
        }
    }

    #[tracing::instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DataError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let mut descriptor = Self::from_json_str(&text)?;
        descriptor.base_dir = path.parent().map(Path::to_path_buf);
        info!("Loaded calibration for {} cameras", descriptor.cameras.len());
        Ok(descriptor)
    }

    pub fn from_json_str(text: &str) -> Result<Self, DataError> {
        let descriptor: Self = serde_json::from_str(text)?;
        if descriptor.cameras.is_empty() {
            return Err(DataError::Calibration("descriptor lists no cameras".into()));
        }
        for (i, cam) in descriptor.cameras.iter().enumerate() {
            if cam.trafo.iter().flatten().any(|v| !v.is_finite()) {
                return Err(DataError::Calibration(format!("camera {i} has a non-finite transform")));
            }
            debug!(camera = i, filename = %cam.filename, "calibration entry");
        }
        Ok(descriptor)
    }

    pub fn to_json_string(&self) -> Result<String, DataError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Resolve a camera's filename against the descriptor's directory.
    pub fn resolve_path(&self, camera: usize) -> Option<PathBuf> {
        let entry = self.cameras.get(camera)?;
        Some(match &self.base_dir {
            Some(dir) => dir.join(&entry.filename),
            None => PathBuf::from(&entry.filename),
        })
    }

    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }
}

/// Camera-to-world pose for a depth camera at `eye` looking at `target`.
///
/// Camera axes follow the depth sensor convention: x right, y down, z forward.
pub fn look_at_model(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
    let forward = (target - eye).normalize();
    let right = forward.cross(up).normalize();
    let down = forward.cross(right);
    Mat4::from_cols(
        right.extend(0.0),
        down.extend(0.0),
        forward.extend(0.0),
        eye.extend(1.0),
    )
}
