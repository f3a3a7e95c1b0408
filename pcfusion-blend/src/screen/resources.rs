//! Screen-sized buffers and their bookkeeping.
//!
//! Every buffer is handed out wrapped in [`Tracked`], which keeps a shared live
//! count. A resize releases the whole previous set before anything new is
//! allocated, so the count returns to the same value for the same configuration.

use super::raster::FragmentBuffer;
use super::{RenderFrame, ViewOutput};
use crate::error::BlendError;
use pcfusion_data::{Raster, Rgba8};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// Shared count of live screen buffers.
#[derive(Debug, Clone, Default)]
pub struct AllocationTracker {
    live: Arc<AtomicUsize>,
}

impl AllocationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of buffers currently alive.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub(crate) fn track<T>(&self, value: T) -> Tracked<T> {
        self.live.fetch_add(1, Ordering::SeqCst);
        Tracked {
            value,
            live: Arc::clone(&self.live),
        }
    }
}

/// A buffer counted by an [`AllocationTracker`] until dropped.
#[derive(Debug)]
pub struct Tracked<T> {
    value: T,
    live: Arc<AtomicUsize>,
}

impl<T> Deref for Tracked<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for Tracked<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T> Drop for Tracked<T> {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Allocate a raster, reporting failure instead of aborting.
pub(crate) fn try_raster<T: Clone>(what: &'static str, width: u32, height: u32, value: T) -> Result<Raster<T>, BlendError> {
    let n = width as usize * height as usize;
    let bytes = n.saturating_mul(std::mem::size_of::<T>());
    let mut data = Vec::new();
    data.try_reserve_exact(n)
        .map_err(|_| BlendError::Allocation { what, bytes })?;
    data.resize(n, value);
    Raster::from_vec(width, height, data).ok_or(BlendError::Allocation { what, bytes })
}

/// Everything that determines the size of the screen resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    pub width: u32,
    pub height: u32,
    pub mini_width: u32,
    pub mini_height: u32,
    pub views: usize,
    pub cameras: usize,
}

impl ResourceKey {
    pub fn new(width: u32, height: u32, mini_scale: u32, views: usize, cameras: usize) -> Self {
        let scale = mini_scale.max(1);
        Self {
            width,
            height,
            mini_width: width.div_ceil(scale).max(1),
            mini_height: height.div_ceil(scale).max(1),
            views,
            cameras,
        }
    }

    /// Buffers allocated for this key.
    pub fn buffer_count(&self) -> usize {
        // per view: fragments and weights per camera, dominance, scratch, output
        self.views * (2 * self.cameras + 3)
    }
}

/// Per-view intermediate buffers.
#[derive(Debug)]
pub(crate) struct ViewTargets {
    pub fragments: Vec<Tracked<FragmentBuffer>>,
    pub dominance: Tracked<Raster<Option<u16>>>,
    pub weights: Vec<Tracked<Raster<f32>>>,
    pub scratch: Tracked<Raster<f32>>,
}

#[derive(Debug)]
pub(crate) struct ScreenResources {
    tracker: AllocationTracker,
    key: Option<ResourceKey>,
    pub targets: Vec<ViewTargets>,
    pub frame: RenderFrame,
}

impl ScreenResources {
    pub fn new(tracker: AllocationTracker) -> Self {
        Self {
            tracker,
            key: None,
            targets: Vec::new(),
            frame: RenderFrame::default(),
        }
    }

    pub fn key(&self) -> Option<ResourceKey> {
        self.key
    }

    /// Make the buffers match `key`. Returns true if they were rebuilt.
    pub fn ensure(&mut self, key: ResourceKey) -> Result<bool, BlendError> {
        if self.key == Some(key) {
            return Ok(false);
        }
        self.release();
        if let Err(e) = self.allocate(key) {
            self.release();
            return Err(e);
        }
        self.key = Some(key);
        debug!(?key, live = self.tracker.live(), "Screen resources rebuilt");
        Ok(true)
    }

    fn allocate(&mut self, key: ResourceKey) -> Result<(), BlendError> {
        let t = &self.tracker;
        for _ in 0..key.views {
            let fragments = (0..key.cameras)
                .map(|_| FragmentBuffer::new(key.width, key.height).map(|f| t.track(f)))
                .collect::<Result<Vec<_>, _>>()?;
            let weights = (0..key.cameras)
                .map(|_| try_raster("weight map", key.mini_width, key.mini_height, 0.0f32).map(|r| t.track(r)))
                .collect::<Result<Vec<_>, _>>()?;
            let dominance = t.track(try_raster("dominance map", key.mini_width, key.mini_height, None)?);
            let scratch = t.track(try_raster("blur scratch", key.mini_width, key.mini_height, 0.0f32)?);
            self.targets.push(ViewTargets {
                fragments,
                dominance,
                weights,
                scratch,
            });

            let output = ViewOutput {
                color: try_raster("output color", key.width, key.height, Rgba8::TRANSPARENT)?,
                depth: try_raster("output depth", key.width, key.height, f32::INFINITY)?,
                weight_sum: try_raster("output weights", key.width, key.height, 0.0f32)?,
            };
            self.frame.views.push(t.track(output));
        }
        Ok(())
    }

    /// Drop every buffer.
    pub fn release(&mut self) {
        self.targets.clear();
        self.frame.views.clear();
        self.key = None;
    }
}
