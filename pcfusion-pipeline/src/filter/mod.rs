//! Per-tuple filter stages and the chain that runs them.
//!
//! The chain is owned by the pipeline thread. Other threads edit it through a
//! [`FilterChainHandle`], whose requests are queued and applied by the owner
//! between two `apply` calls, so an edit never lands halfway through a pass.

mod clipping;
mod erosion;
mod hole_filling;
mod temporal_noise;

pub use clipping::{ClippingFilter, ClippingSettings};
pub use erosion::{ErosionFilter, ErosionSettings, MAX_EROSION_INTENSITY};
pub use hole_filling::{SpatialHoleFillingFilter, SpatialHoleFillingSettings, TemporalHoleFillingFilter, TemporalHoleFillingSettings};
pub use temporal_noise::{TemporalNoiseFilter, TemporalNoiseSettings};

use pcfusion_data::{FrameTuple, OrganizedPointCloud};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, info_span, warn};

/// An in-place transform over the frames of one tuple.
///
/// Filters may invalidate, fill or adjust pixels. They must not change a
/// frame's raster size; frames that come back resized are dropped.
pub trait Filter: Send {
    fn name(&self) -> &'static str;

    fn apply(&mut self, frames: &mut [Arc<OrganizedPointCloud>]);

    /// Forget temporal history (after a seek or a chain edit).
    fn reset(&mut self) {}
}

pub type FilterId = u64;

/// Serializable description of a filter stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterSettings {
    Clipping(ClippingSettings),
    Erosion(ErosionSettings),
    SpatialHoleFilling(SpatialHoleFillingSettings),
    TemporalNoise(TemporalNoiseSettings),
    TemporalHoleFilling(TemporalHoleFillingSettings),
}

impl FilterSettings {
    pub fn build(&self) -> Box<dyn Filter> {
        match self {
            Self::Clipping(s) => Box::new(ClippingFilter::new(s.clone())),
            Self::Erosion(s) => Box::new(ErosionFilter::new(s.clone())),
            Self::SpatialHoleFilling(s) => Box::new(SpatialHoleFillingFilter::new(s.clone())),
            Self::TemporalNoise(s) => Box::new(TemporalNoiseFilter::new(s.clone())),
            Self::TemporalHoleFilling(s) => Box::new(TemporalHoleFillingFilter::new(s.clone())),
        }
    }
}

/// One row of [`FilterChainHandle::summary`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSummary {
    pub id: FilterId,
    pub name: &'static str,
    pub active: bool,
}

enum ChainOp {
    Insert {
        index: usize,
        id: FilterId,
        filter: Box<dyn Filter>,
    },
    Remove(FilterId),
    Swap(usize, usize),
    SetActive(FilterId, bool),
    Replace(FilterId, Box<dyn Filter>),
}

#[derive(Default)]
struct Pending {
    ops: Vec<ChainOp>,
    next_id: FilterId,
}

struct Entry {
    id: FilterId,
    active: bool,
    filter: Box<dyn Filter>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Ordered filter stages, applied to every tuple on the pipeline thread.
pub struct FilterChain {
    entries: Vec<Entry>,
    pending: Arc<Mutex<Pending>>,
    summary: Arc<Mutex<Vec<FilterSummary>>>,
}

impl Default for FilterChain {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterChain {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            pending: Arc::new(Mutex::new(Pending {
                ops: Vec::new(),
                next_id: 1,
            })),
            summary: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Build a chain from settings, all stages active.
    pub fn from_settings(settings: &[FilterSettings]) -> Self {
        let chain = Self::new();
        let handle = chain.handle();
        for s in settings {
            handle.push(s.build());
        }
        chain
    }

    pub fn handle(&self) -> FilterChainHandle {
        FilterChainHandle {
            pending: Arc::clone(&self.pending),
            summary: Arc::clone(&self.summary),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Apply queued edits. Returns true if the chain changed.
    ///
    /// Stages that were inserted, replaced or switched back on forget their
    /// temporal history. Untouched stages keep theirs.
    pub fn apply_pending(&mut self) -> bool {
        let ops = std::mem::take(&mut lock(&self.pending).ops);
        if ops.is_empty() {
            return false;
        }
        let mut stale: Vec<FilterId> = Vec::new();
        for op in ops {
            match op {
                ChainOp::Insert { index, id, filter } => {
                    let index = index.min(self.entries.len());
                    info!(id, name = filter.name(), index, "Inserting filter");
                    self.entries.insert(
                        index,
                        Entry {
                            id,
                            active: true,
                            filter,
                        },
                    );
                    stale.push(id);
                }
                ChainOp::Remove(id) => {
                    self.entries.retain(|e| e.id != id);
                }
                ChainOp::Swap(a, b) => {
                    if a < self.entries.len() && b < self.entries.len() {
                        self.entries.swap(a, b);
                    } else {
                        warn!(a, b, len = self.entries.len(), "Ignoring filter swap out of range");
                    }
                }
                ChainOp::SetActive(id, active) => {
                    if let Some(e) = self.entries.iter_mut().find(|e| e.id == id) {
                        if active && !e.active {
                            stale.push(id);
                        }
                        e.active = active;
                    }
                }
                ChainOp::Replace(id, filter) => {
                    if let Some(e) = self.entries.iter_mut().find(|e| e.id == id) {
                        e.filter = filter;
                        stale.push(id);
                    }
                }
            }
        }
        for e in self.entries.iter_mut().filter(|e| stale.contains(&e.id)) {
            e.filter.reset();
        }
        *lock(&self.summary) = self.entries.iter().map(Self::summarize).collect();
        true
    }

    fn summarize(e: &Entry) -> FilterSummary {
        FilterSummary {
            id: e.id,
            name: e.filter.name(),
            active: e.active,
        }
    }

    /// Apply pending edits, then run every active stage in order.
    ///
    /// Frames a stage resized are removed from the tuple and the tuple is
    /// marked incomplete.
    pub fn apply(&mut self, tuple: &mut FrameTuple) {
        self.apply_pending();
        let _span = info_span!("filter_chain", sequence = tuple.sequence).entered();
        for entry in self.entries.iter_mut().filter(|e| e.active) {
            let before: Vec<(usize, u32, u32)> = tuple
                .frames
                .iter()
                .map(|f| (f.camera_index, f.width, f.height))
                .collect();
            entry.filter.apply(&mut tuple.frames);

            let count = tuple.frames.len();
            let mut position = 0;
            tuple.frames.retain(|f| {
                let (camera, w, h) = before[position];
                position += 1;
                let intact = f.camera_index == camera
                    && f.has_dimensions(w, h)
                    && f.depth.len() == f.pixel_count()
                    && f.colors.len() == f.pixel_count();
                if !intact {
                    warn!(camera, filter = entry.filter.name(), "Filter changed raster size; dropping frame");
                }
                intact
            });
            if tuple.frames.len() != count {
                tuple.complete = false;
            }
            debug!(filter = entry.filter.name(), "Applied filter");
        }
    }

    /// Forget temporal state in every stage.
    pub fn reset(&mut self) {
        for e in &mut self.entries {
            e.filter.reset();
        }
    }
}

/// Thread-safe editor for a [`FilterChain`]. Edits take effect before the next tuple.
#[derive(Clone)]
pub struct FilterChainHandle {
    pending: Arc<Mutex<Pending>>,
    summary: Arc<Mutex<Vec<FilterSummary>>>,
}

impl FilterChainHandle {
    fn queue(&self, op: impl FnOnce(FilterId) -> ChainOp) -> FilterId {
        let mut pending = lock(&self.pending);
        let id = pending.next_id;
        pending.next_id += 1;
        pending.ops.push(op(id));
        id
    }

    /// Insert at `index` (clamped to the chain length).
    pub fn insert_at(&self, index: usize, filter: Box<dyn Filter>) -> FilterId {
        self.queue(|id| ChainOp::Insert { index, id, filter })
    }

    pub fn push(&self, filter: Box<dyn Filter>) -> FilterId {
        self.insert_at(usize::MAX, filter)
    }

    pub fn remove(&self, id: FilterId) {
        lock(&self.pending).ops.push(ChainOp::Remove(id));
    }

    /// Swap the stages at two positions.
    pub fn swap(&self, a: usize, b: usize) {
        lock(&self.pending).ops.push(ChainOp::Swap(a, b));
    }

    pub fn set_active(&self, id: FilterId, active: bool) {
        lock(&self.pending).ops.push(ChainOp::SetActive(id, active));
    }

    /// Replace a stage's filter, e.g. with new settings.
    pub fn replace(&self, id: FilterId, filter: Box<dyn Filter>) {
        lock(&self.pending).ops.push(ChainOp::Replace(id, filter));
    }

    pub fn pending_edits(&self) -> usize {
        lock(&self.pending).ops.len()
    }

    /// Stages as of the last applied edit.
    pub fn summary(&self) -> Vec<FilterSummary> {
        lock(&self.summary).clone()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use glam::Mat4;
    use pcfusion_data::{CameraLookup, PinholeIntrinsics, Rgba8};

    pub(crate) fn frame(camera_index: usize, w: u32, h: u32, depth: Vec<u16>) -> Arc<OrganizedPointCloud> {
        let intr = PinholeIntrinsics::from_horizontal_fov(w, h, 60.0);
        let lookup = Arc::new(CameraLookup::from_intrinsics(&intr, 32).unwrap());
        let n = (w * h) as usize;
        Arc::new(OrganizedPointCloud::new(camera_index, w, h, depth, vec![Rgba8::WHITE; n], Mat4::IDENTITY, lookup).unwrap())
    }

    /// Records the order it ran in.
    struct Tag(&'static str, Arc<Mutex<Vec<&'static str>>>);

    impl Filter for Tag {
        fn name(&self) -> &'static str {
            self.0
        }

        fn apply(&mut self, _frames: &mut [Arc<OrganizedPointCloud>]) {
            self.1.lock().unwrap().push(self.0);
        }
    }

    /// Records every reset.
    struct ResetLog(&'static str, Arc<Mutex<Vec<&'static str>>>);

    impl Filter for ResetLog {
        fn name(&self) -> &'static str {
            self.0
        }

        fn apply(&mut self, _frames: &mut [Arc<OrganizedPointCloud>]) {}

        fn reset(&mut self) {
            self.1.lock().unwrap().push(self.0);
        }
    }

    struct Shrink;

    impl Filter for Shrink {
        fn name(&self) -> &'static str {
            "shrink"
        }

        fn apply(&mut self, frames: &mut [Arc<OrganizedPointCloud>]) {
            let f = Arc::make_mut(&mut frames[0]);
            f.width = 1;
        }
    }

    fn tuple() -> FrameTuple {
        FrameTuple::new(1, 0.0, true, vec![frame(0, 2, 2, vec![1000; 4]), frame(1, 2, 2, vec![1000; 4])])
    }

    #[test]
    fn test_edits_are_deferred_until_apply() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = FilterChain::new();
        let handle = chain.handle();
        let a = handle.push(Box::new(Tag("a", Arc::clone(&log))));
        handle.push(Box::new(Tag("b", Arc::clone(&log))));
        assert!(chain.is_empty());
        assert_eq!(handle.pending_edits(), 2);

        chain.apply(&mut tuple());
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);

        handle.swap(0, 1);
        handle.set_active(a, false);
        // nothing changes until the owner applies
        assert_eq!(handle.summary()[0].name, "a");
        log.lock().unwrap().clear();
        chain.apply(&mut tuple());
        assert_eq!(*log.lock().unwrap(), vec!["b"]);
        let summary = handle.summary();
        assert_eq!(summary[1], FilterSummary { id: a, name: "a", active: false });
    }

    #[test]
    fn test_insert_and_remove() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = FilterChain::new();
        let handle = chain.handle();
        handle.push(Box::new(Tag("b", Arc::clone(&log))));
        let a = handle.insert_at(0, Box::new(Tag("a", Arc::clone(&log))));
        chain.apply_pending();
        assert_eq!(handle.summary().iter().map(|s| s.name).collect::<Vec<_>>(), vec!["a", "b"]);
        handle.remove(a);
        chain.apply_pending();
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_only_edited_stages_forget_history() {
        let resets = Arc::new(Mutex::new(Vec::new()));
        let mut chain = FilterChain::new();
        let handle = chain.handle();
        let a = handle.push(Box::new(ResetLog("a", Arc::clone(&resets))));
        let b = handle.push(Box::new(ResetLog("b", Arc::clone(&resets))));
        chain.apply_pending();
        resets.lock().unwrap().clear();

        handle.set_active(a, false);
        chain.apply_pending();
        assert!(resets.lock().unwrap().is_empty());

        handle.set_active(a, true);
        handle.set_active(b, true);
        chain.apply_pending();
        assert_eq!(*resets.lock().unwrap(), vec!["a"]);

        resets.lock().unwrap().clear();
        handle.replace(b, Box::new(ResetLog("b2", Arc::clone(&resets))));
        handle.swap(0, 1);
        chain.apply_pending();
        assert_eq!(*resets.lock().unwrap(), vec!["b2"]);

        resets.lock().unwrap().clear();
        handle.push(Box::new(ResetLog("c", Arc::clone(&resets))));
        chain.apply_pending();
        assert_eq!(*resets.lock().unwrap(), vec!["c"]);
    }

    #[test]
    fn test_resized_frames_are_dropped() {
        let mut chain = FilterChain::new();
        chain.handle().push(Box::new(Shrink));
        let mut t = tuple();
        chain.apply(&mut t);
        assert!(!t.complete);
        assert_eq!(t.camera_indices().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_settings_json() {
        let json = r#"[
            {"kind": "clipping", "min": [-2.0, 0.0, -2.0], "max": [2.0, 2.5, 2.0]},
            {"kind": "erosion", "intensity": 3},
            {"kind": "temporal_hole_filling"}
        ]"#;
        let settings: Vec<FilterSettings> = serde_json::from_str(json).unwrap();
        assert_eq!(settings.len(), 3);
        match &settings[1] {
            FilterSettings::Erosion(e) => assert_eq!(e.intensity, 3),
            other => panic!("unexpected {other:?}"),
        }
        let mut chain = FilterChain::from_settings(&settings);
        chain.apply_pending();
        let names: Vec<_> = chain.handle().summary().iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["Clipping", "Erosion", "Temporal Hole Filling"]);
    }
}
