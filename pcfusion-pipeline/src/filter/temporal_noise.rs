use super::Filter;
use pcfusion_data::OrganizedPointCloud;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporalNoiseSettings {
    /// Weight of the previous depth, 0 (off) to 1.
    pub smooth_factor: f32,
    /// Changes larger than this fraction of the depth restart smoothing.
    pub jump_threshold_per_meter: f32,
}

impl Default for TemporalNoiseSettings {
    fn default() -> Self {
        Self {
            smooth_factor: 0.5,
            jump_threshold_per_meter: 0.05,
        }
    }
}

/// Exponential smoothing of each pixel's depth over time.
#[derive(Debug, Clone, Default)]
pub struct TemporalNoiseFilter {
    settings: TemporalNoiseSettings,
    history: HashMap<usize, Vec<f32>>,
}

impl TemporalNoiseFilter {
    pub fn new(settings: TemporalNoiseSettings) -> Self {
        Self {
            settings,
            history: HashMap::new(),
        }
    }

    fn smooth(&mut self, frame: &mut OrganizedPointCloud) {
        let n = frame.pixel_count();
        let alpha = self.settings.smooth_factor.clamp(0.0, 1.0);
        let jump = self.settings.jump_threshold_per_meter;
        let history = self.history.entry(frame.camera_index).or_default();
        if history.len() != n {
            *history = vec![0.0; n];
        }
        for (d, prev) in frame.depth.iter_mut().zip(history.iter_mut()) {
            if *d == 0 {
                *prev = 0.0;
                continue;
            }
            let current = *d as f32;
            if *prev > 0.0 && (current - *prev).abs() <= jump * current {
                *prev = *prev * alpha + current * (1.0 - alpha);
                *d = prev.round().max(1.0) as u16;
            } else {
                *prev = current;
            }
        }
    }
}

impl Filter for TemporalNoiseFilter {
    fn name(&self) -> &'static str {
        "Temporal Noise"
    }

    fn apply(&mut self, frames: &mut [Arc<OrganizedPointCloud>]) {
        for frame in frames.iter_mut() {
            self.smooth(Arc::make_mut(frame));
        }
    }

    fn reset(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::tests::frame;

    fn run(f: &mut TemporalNoiseFilter, depth: u16) -> u16 {
        let mut frames = [frame(0, 1, 1, vec![depth])];
        f.apply(&mut frames);
        frames[0].depth[0]
    }

    #[test]
    fn test_small_changes_are_smoothed() {
        let mut f = TemporalNoiseFilter::default();
        assert_eq!(run(&mut f, 1000), 1000);
        assert_eq!(run(&mut f, 1020), 1010);
    }

    #[test]
    fn test_jumps_pass_through() {
        let mut f = TemporalNoiseFilter::default();
        run(&mut f, 1000);
        assert_eq!(run(&mut f, 1500), 1500);
        assert_eq!(run(&mut f, 1510), 1505);
    }

    #[test]
    fn test_zero_factor_is_identity() {
        let mut f = TemporalNoiseFilter::new(TemporalNoiseSettings {
            smooth_factor: 0.0,
            ..TemporalNoiseSettings::default()
        });
        run(&mut f, 1000);
        assert_eq!(run(&mut f, 1030), 1030);
    }
}
