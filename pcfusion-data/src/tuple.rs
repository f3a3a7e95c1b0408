//! Multi-camera frame tuple.

use crate::cloud::OrganizedPointCloud;
use std::sync::Arc;

/// One frame per camera that resolved at a given timeline cursor.
///
/// Cameras that failed to resolve are absent rather than null-filled, and the
/// tuple is flagged incomplete. Frames are shared immutably once emitted.
#[derive(Debug, Clone, Default)]
pub struct FrameTuple {
    /// Monotonic emission counter assigned by the producer.
    pub sequence: u64,
    /// Timeline position (seconds) the tuple was resolved for.
    pub cursor: f64,
    pub complete: bool,
    pub frames: Vec<Arc<OrganizedPointCloud>>,
}

impl FrameTuple {
    pub fn new(sequence: u64, cursor: f64, complete: bool, frames: Vec<Arc<OrganizedPointCloud>>) -> Self {
        Self {
            sequence,
            cursor,
            complete,
            frames,
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn camera_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.frames.iter().map(|f| f.camera_index)
    }

    /// Frame of the given camera, if it resolved.
    pub fn frame(&self, camera_index: usize) -> Option<&Arc<OrganizedPointCloud>> {
        self.frames.iter().find(|f| f.camera_index == camera_index)
    }
}
