//! Session configuration passed to sources and the coordinator.

use crate::timeline::Pacing;
use serde::{Deserialize, Serialize};

/// Everything a capture session needs besides the calibration itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Decode a window of frames up front and serve them from memory.
    pub buffered: bool,
    pub buffered_max_frame_count: usize,
    pub buffered_start_frame_offset: usize,
    /// A frame matches a query `t` if its timestamp is after `t - sync_tolerance`.
    pub sync_tolerance: f64,
    pub looping: bool,
    pub pacing: Pacing,
    /// Start in `Playing` instead of `Idle`.
    pub autoplay: bool,
    /// Integrate tuples where some cameras failed to resolve.
    pub integrate_incomplete: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            buffered: false,
            buffered_max_frame_count: 300,
            buffered_start_frame_offset: 0,
            sync_tolerance: 1.0 / 60.0,
            looping: true,
            pacing: Pacing::FrameSkipping,
            autoplay: true,
            integrate_incomplete: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg: SessionConfig = serde_json::from_str(r#"{"buffered":true,"pacing":"lockstep"}"#).unwrap();
        assert!(cfg.buffered);
        assert_eq!(cfg.buffered_max_frame_count, 300);
        assert!((cfg.sync_tolerance - 1.0 / 60.0).abs() < 1e-12);
        assert_eq!(cfg.pacing, Pacing::Lockstep);
        assert!(cfg.looping);
    }
}
