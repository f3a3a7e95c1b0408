use super::Filter;
use pcfusion_data::OrganizedPointCloud;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const MAX_EROSION_INTENSITY: u32 = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErosionSettings {
    /// Number of erosion passes, 1 to 20.
    pub intensity: u32,
    /// Largest depth step to a neighbor, relative to the pixel's depth.
    pub distance_threshold_per_meter: f32,
}

impl Default for ErosionSettings {
    fn default() -> Self {
        Self {
            intensity: 1,
            distance_threshold_per_meter: 0.05,
        }
    }
}

/// Peels pixels off silhouettes and depth discontinuities.
///
/// Each pass removes a valid pixel when one of its 4-neighbors is invalid or
/// differs in depth by more than `distance_threshold_per_meter * depth`.
#[derive(Debug, Clone, Default)]
pub struct ErosionFilter {
    settings: ErosionSettings,
}

impl ErosionFilter {
    pub fn new(settings: ErosionSettings) -> Self {
        Self { settings }
    }

    fn erode_once(&self, frame: &mut OrganizedPointCloud, remove: &mut Vec<usize>) {
        let (w, h) = (frame.width as i64, frame.height as i64);
        let k = self.settings.distance_threshold_per_meter;
        remove.clear();
        for y in 0..h {
            for x in 0..w {
                let i = (y * w + x) as usize;
                let d = frame.depth[i];
                if d == 0 {
                    continue;
                }
                let limit = k * d as f32;
                let erode = [(-1, 0), (1, 0), (0, -1), (0, 1)].iter().any(|&(dx, dy)| {
                    let (nx, ny) = (x + dx, y + dy);
                    if nx < 0 || ny < 0 || nx >= w || ny >= h {
                        return false;
                    }
                    let n = frame.depth[(ny * w + nx) as usize];
                    n == 0 || (n as f32 - d as f32).abs() > limit
                });
                if erode {
                    remove.push(i);
                }
            }
        }
        for &i in remove.iter() {
            frame.reject(i);
        }
    }
}

impl Filter for ErosionFilter {
    fn name(&self) -> &'static str {
        "Erosion"
    }

    fn apply(&mut self, frames: &mut [Arc<OrganizedPointCloud>]) {
        let passes = self.settings.intensity.clamp(1, MAX_EROSION_INTENSITY);
        let mut remove = Vec::new();
        for frame in frames.iter_mut() {
            let frame = Arc::make_mut(frame);
            for _ in 0..passes {
                self.erode_once(frame, &mut remove);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::tests::frame;

    #[test]
    fn test_erodes_around_hole() {
        let mut depth = vec![1000; 25];
        depth[12] = 0;
        let mut frames = vec![frame(0, 5, 5, depth)];
        ErosionFilter::default().apply(&mut frames);
        let d = &frames[0].depth;
        for i in [7, 11, 13, 17] {
            assert_eq!(d[i], 0);
        }
        // diagonal neighbors survive one pass
        assert_eq!(d[6], 1000);
    }

    #[test]
    fn test_intensity_grows_the_hole() {
        let mut depth = vec![1000; 49];
        depth[24] = 0;
        let mut frames = vec![frame(0, 7, 7, depth)];
        ErosionFilter::new(ErosionSettings {
            intensity: 2,
            ..ErosionSettings::default()
        })
        .apply(&mut frames);
        let d = &frames[0].depth;
        assert_eq!(d[24 - 2], 0);
        assert_eq!(d[24 - 3], 1000);
    }

    #[test]
    fn test_depth_step_is_eroded() {
        let mut frames = vec![frame(0, 4, 1, vec![1000, 1000, 2000, 2000])];
        ErosionFilter::default().apply(&mut frames);
        assert_eq!(frames[0].depth, vec![1000, 0, 0, 2000]);
    }

    #[test]
    fn test_image_border_is_kept() {
        let mut frames = vec![frame(0, 3, 3, vec![1000; 9])];
        ErosionFilter::default().apply(&mut frames);
        assert!(frames[0].depth.iter().all(|&d| d == 1000));
    }
}
