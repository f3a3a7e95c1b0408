use super::Filter;
use glam::Vec3;
use pcfusion_data::OrganizedPointCloud;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClippingSettings {
    /// World-space box corners in meters.
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl Default for ClippingSettings {
    fn default() -> Self {
        Self {
            min: [-1.0, 0.01, -1.0],
            max: [1.0, 2.0, 1.0],
        }
    }
}

/// Invalidates pixels whose world position lies outside an axis-aligned box.
#[derive(Debug, Clone, Default)]
pub struct ClippingFilter {
    settings: ClippingSettings,
}

impl ClippingFilter {
    pub fn new(settings: ClippingSettings) -> Self {
        Self { settings }
    }

    fn clip(&self, frame: &mut OrganizedPointCloud) -> usize {
        let min = Vec3::from_array(self.settings.min);
        let max = Vec3::from_array(self.settings.max);
        let mut removed = 0;
        for y in 0..frame.height {
            for x in 0..frame.width {
                let Some(p) = frame.world_point(x, y) else {
                    continue;
                };
                if !(p.cmpge(min).all() && p.cmple(max).all()) {
                    let i = frame.index(x, y);
                    frame.reject(i);
                    removed += 1;
                }
            }
        }
        removed
    }
}

impl Filter for ClippingFilter {
    fn name(&self) -> &'static str {
        "Clipping"
    }

    fn apply(&mut self, frames: &mut [Arc<OrganizedPointCloud>]) {
        for frame in frames.iter_mut() {
            let removed = self.clip(Arc::make_mut(frame));
            tracing::trace!(camera = frame.camera_index, removed, "clipped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::tests::frame;

    #[test]
    fn test_points_outside_box_removed() {
        // identity pose: world = camera space, all points at z = depth
        let mut frames = vec![frame(0, 2, 1, vec![500, 1500])];
        let mut f = ClippingFilter::new(ClippingSettings {
            min: [-1.0, -1.0, 0.0],
            max: [1.0, 1.0, 1.0],
        });
        f.apply(&mut frames);
        assert_eq!(frames[0].depth, vec![500, 0]);
    }

    #[test]
    fn test_shared_frames_are_copied_on_write() {
        let original = frame(0, 2, 1, vec![500, 1500]);
        let mut frames = vec![Arc::clone(&original)];
        ClippingFilter::new(ClippingSettings {
            min: [-1.0, -1.0, 0.0],
            max: [1.0, 1.0, 1.0],
        })
        .apply(&mut frames);
        assert_eq!(original.depth, vec![500, 1500]);
        assert_eq!(frames[0].depth, vec![500, 0]);
    }
}
