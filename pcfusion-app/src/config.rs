//! Session configuration file.
//!
//! Every section is optional; missing fields take their defaults.
//!
//! ```json
//! {
//!   "session": { "buffered": true, "pacing": "lockstep" },
//!   "blend": { "kernel_radius": 3 },
//!   "renderer": "blend_pcr",
//!   "output_width": 1280,
//!   "output_height": 720,
//!   "views": 2,
//!   "filters": [ { "kind": "erosion", "intensity": 2 } ]
//! }
//! ```

use crate::errors::AppError;
use glam::Vec3;
use pcfusion_blend::{BlendParams, ViewCamera};
use pcfusion_capture::SessionConfig;
use pcfusion_pipeline::FilterSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

pub const DEFAULT_OUTPUT_WIDTH: u32 = 1920;
pub const DEFAULT_OUTPUT_HEIGHT: u32 = 1080;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RendererKind {
    #[default]
    BlendPcr,
    SimpleMesh,
    Splats,
}

/// Where the output views look from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewSettings {
    pub eye: [f32; 3],
    pub target: [f32; 3],
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            eye: [0.0, 1.2, -0.2],
            target: [0.0, 0.9, 1.5],
            fov_y_degrees: 60.0,
            near: 0.05,
            far: 20.0,
        }
    }
}

impl ViewSettings {
    pub fn camera(&self, aspect: f32) -> ViewCamera {
        ViewCamera::look_at(
            Vec3::from_array(self.eye),
            Vec3::from_array(self.target),
            self.fov_y_degrees,
            aspect,
            self.near,
            self.far,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub session: SessionConfig,
    pub blend: BlendParams,
    pub renderer: RendererKind,
    pub output_width: u32,
    pub output_height: u32,
    /// 1 for a mono view, 2 for a stereo pair.
    pub views: usize,
    pub view: ViewSettings,
    /// Horizontal field of view assumed for recordings without intrinsics.
    pub recording_fov_degrees: f32,
    pub filters: Vec<FilterSettings>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig {
                looping: false,
                ..SessionConfig::default()
            },
            blend: BlendParams::default(),
            renderer: RendererKind::default(),
            output_width: DEFAULT_OUTPUT_WIDTH,
            output_height: DEFAULT_OUTPUT_HEIGHT,
            views: 1,
            view: ViewSettings::default(),
            recording_fov_degrees: 75.0,
            filters: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        info!(path = %path.display(), filters = config.filters.len(), "Loaded configuration");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if !(1..=2).contains(&self.views) {
            return Err(AppError::Config(format!("views must be 1 or 2, got {}", self.views)));
        }
        if self.output_width == 0 || self.output_height == 0 {
            return Err(AppError::Config("output size must be non-zero".into()));
        }
        self.blend.validate()?;
        Ok(())
    }

    pub fn aspect(&self) -> f32 {
        self.output_width as f32 / self.output_height.max(1) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcfusion_capture::Pacing;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.session.looping);
        assert_eq!(config.renderer, RendererKind::BlendPcr);
    }

    #[test]
    fn test_partial_json() {
        let text = r#"{
            "session": { "pacing": "lockstep" },
            "blend": { "kernel_radius": 3 },
            "renderer": "simple_mesh",
            "views": 2,
            "filters": [ { "kind": "erosion", "intensity": 2 }, { "kind": "temporal_noise" } ]
        }"#;
        let config: AppConfig = serde_json::from_str(text).unwrap();
        assert_eq!(config.session.pacing, Pacing::Lockstep);
        assert_eq!(config.blend.kernel_radius, 3);
        assert_eq!(config.blend.edge_radius, BlendParams::default().edge_radius);
        assert_eq!(config.renderer, RendererKind::SimpleMesh);
        assert_eq!(config.views, 2);
        assert_eq!(config.filters.len(), 2);
        assert_eq!(config.output_width, DEFAULT_OUTPUT_WIDTH);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_view_count() {
        let config = AppConfig {
            views: 3,
            ..AppConfig::default()
        };
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_splat_renderer_from_json() {
        let config: AppConfig = serde_json::from_str(r#"{"renderer": "splats", "blend": {"point_size": 2.0}}"#).unwrap();
        assert_eq!(config.renderer, RendererKind::Splats);
        assert!((config.blend.point_size - 2.0).abs() < 1e-6);
        assert!(config.validate().is_ok());
    }
}
