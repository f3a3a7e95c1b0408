use super::Filter;
use glam::Vec4;
use pcfusion_data::{OrganizedPointCloud, Rgba8};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatialHoleFillingSettings {
    /// Neighborhood radius in pixels.
    pub radius: u32,
    /// Valid neighbors required to fill a pixel.
    pub min_neighbors: u32,
    /// Largest spread of the neighbor depths, relative to their mean.
    pub depth_tolerance_per_meter: f32,
}

impl Default for SpatialHoleFillingSettings {
    fn default() -> Self {
        Self {
            radius: 1,
            min_neighbors: 3,
            depth_tolerance_per_meter: 0.05,
        }
    }
}

/// Fills invalid pixels from the mean of agreeing valid neighbors.
#[derive(Debug, Clone, Default)]
pub struct SpatialHoleFillingFilter {
    settings: SpatialHoleFillingSettings,
}

impl SpatialHoleFillingFilter {
    pub fn new(settings: SpatialHoleFillingSettings) -> Self {
        Self { settings }
    }

    fn fill(&self, frame: &mut OrganizedPointCloud) -> usize {
        let (w, h) = (frame.width as i64, frame.height as i64);
        let r = self.settings.radius.max(1) as i64;
        let mut fills = Vec::new();
        for y in 0..h {
            for x in 0..w {
                let i = (y * w + x) as usize;
                if frame.depth[i] != 0 {
                    continue;
                }
                let (mut count, mut sum, mut lo, mut hi) = (0u32, 0.0f32, u16::MAX, 0u16);
                let mut color = Vec4::ZERO;
                for ny in (y - r).max(0)..=(y + r).min(h - 1) {
                    for nx in (x - r).max(0)..=(x + r).min(w - 1) {
                        let j = (ny * w + nx) as usize;
                        let d = frame.depth[j];
                        if d == 0 {
                            continue;
                        }
                        count += 1;
                        sum += d as f32;
                        lo = lo.min(d);
                        hi = hi.max(d);
                        color += frame.colors[j].to_vec4();
                    }
                }
                if count < self.settings.min_neighbors.max(1) {
                    continue;
                }
                let mean = sum / count as f32;
                if (hi - lo) as f32 > self.settings.depth_tolerance_per_meter * mean {
                    continue;
                }
                fills.push((i, mean.round() as u16, Rgba8::from_vec4(color / count as f32)));
            }
        }
        for &(i, d, c) in &fills {
            frame.depth[i] = d;
            frame.colors[i] = c;
        }
        fills.len()
    }
}

impl Filter for SpatialHoleFillingFilter {
    fn name(&self) -> &'static str {
        "Spatial Hole Filling"
    }

    fn apply(&mut self, frames: &mut [Arc<OrganizedPointCloud>]) {
        for frame in frames.iter_mut() {
            let filled = self.fill(Arc::make_mut(frame));
            tracing::trace!(camera = frame.camera_index, filled, "filled holes");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporalHoleFillingSettings {
    /// Frames a remembered value may stand in for a missing one.
    pub max_age: u32,
}

impl Default for TemporalHoleFillingSettings {
    fn default() -> Self {
        Self { max_age: 5 }
    }
}

#[derive(Debug, Clone)]
struct PixelMemory {
    width: u32,
    height: u32,
    depth: Vec<u16>,
    colors: Vec<Rgba8>,
    age: Vec<u32>,
}

/// Fills invalid pixels with the last valid value seen at the same pixel.
#[derive(Debug, Clone, Default)]
pub struct TemporalHoleFillingFilter {
    settings: TemporalHoleFillingSettings,
    memory: HashMap<usize, PixelMemory>,
}

impl TemporalHoleFillingFilter {
    pub fn new(settings: TemporalHoleFillingSettings) -> Self {
        Self {
            settings,
            memory: HashMap::new(),
        }
    }

    fn fill(&mut self, frame: &mut OrganizedPointCloud) {
        let n = frame.pixel_count();
        let memory = self.memory.entry(frame.camera_index).or_insert_with(|| PixelMemory {
            width: frame.width,
            height: frame.height,
            depth: vec![0; n],
            colors: vec![Rgba8::TRANSPARENT; n],
            age: vec![0; n],
        });
        if (memory.width, memory.height) != (frame.width, frame.height) {
            *memory = PixelMemory {
                width: frame.width,
                height: frame.height,
                depth: vec![0; n],
                colors: vec![Rgba8::TRANSPARENT; n],
                age: vec![0; n],
            };
        }
        for i in 0..n {
            if frame.depth[i] != 0 {
                memory.depth[i] = frame.depth[i];
                memory.colors[i] = frame.colors[i];
                memory.age[i] = 0;
            } else if memory.depth[i] != 0 && memory.age[i] < self.settings.max_age {
                memory.age[i] += 1;
                frame.depth[i] = memory.depth[i];
                frame.colors[i] = memory.colors[i];
            }
        }
    }
}

impl Filter for TemporalHoleFillingFilter {
    fn name(&self) -> &'static str {
        "Temporal Hole Filling"
    }

    fn apply(&mut self, frames: &mut [Arc<OrganizedPointCloud>]) {
        for frame in frames.iter_mut() {
            self.fill(Arc::make_mut(frame));
        }
    }

    fn reset(&mut self) {
        self.memory.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::tests::frame;

    #[test]
    fn test_spatial_fills_surrounded_hole() {
        let mut depth = vec![1000; 9];
        depth[4] = 0;
        let mut frames = vec![frame(0, 3, 3, depth)];
        SpatialHoleFillingFilter::default().apply(&mut frames);
        assert_eq!(frames[0].depth[4], 1000);
    }

    #[test]
    fn test_spatial_skips_discontinuity() {
        let depth = vec![1000, 1000, 1000, 1000, 0, 2000, 2000, 2000, 2000];
        let mut frames = vec![frame(0, 3, 3, depth)];
        SpatialHoleFillingFilter::default().apply(&mut frames);
        assert_eq!(frames[0].depth[4], 0);
    }

    #[test]
    fn test_temporal_fill_expires() {
        let mut f = TemporalHoleFillingFilter::new(TemporalHoleFillingSettings { max_age: 2 });
        let mut first = vec![frame(0, 1, 1, vec![1200])];
        f.apply(&mut first);
        let mut seen = Vec::new();
        for _ in 0..3 {
            let mut frames = vec![frame(0, 1, 1, vec![0])];
            f.apply(&mut frames);
            seen.push(frames[0].depth[0]);
        }
        assert_eq!(seen, vec![1200, 1200, 0]);
    }

    #[test]
    fn test_temporal_reset_forgets() {
        let mut f = TemporalHoleFillingFilter::default();
        f.apply(&mut [frame(0, 1, 1, vec![1200])]);
        f.reset();
        let mut frames = [frame(0, 1, 1, vec![0])];
        f.apply(&mut frames);
        assert_eq!(frames[0].depth[0], 0);
    }
}
