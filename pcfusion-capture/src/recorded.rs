//! Recorded frame source over a pluggable decoder.

use crate::config::SessionConfig;
use crate::source::{CaptureError, FrameSource};
use glam::Mat4;
use ordered_float::OrderedFloat;
use pcfusion_data::{CameraLookup, HighResColors, LOOKUP_TABLE_SIZE, OrganizedPointCloud, PinholeIntrinsics, Rgba8};
use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Raw buffers of one decoded frame.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub depth: Vec<u16>,
    pub colors: Vec<Rgba8>,
    pub high_res: Option<HighResColors>,
}

/// Random access to the frames of one recording.
pub trait FrameDecoder: Send {
    fn resolution(&self) -> (u32, u32);

    /// Intrinsics of the depth raster.
    fn intrinsics(&self) -> PinholeIntrinsics;

    fn frame_count(&self) -> usize;

    /// Absolute timestamp of a frame in seconds.
    fn timestamp(&self, index: usize) -> f64;

    fn decode(&mut self, index: usize) -> Result<DecodedFrame, CaptureError>;
}

/// A [`FrameSource`] backed by a [`FrameDecoder`].
///
/// In buffered mode a window of frames is decoded at construction and the
/// timeline only spans that window. Otherwise frames are decoded on demand and
/// the most recent one is cached, so repeated queries for the same frame hand
/// out the same `Arc`.
pub struct RecordedSource<D: FrameDecoder> {
    camera_index: usize,
    decoder: D,
    model_matrix: Mat4,
    lookup: Arc<CameraLookup>,
    /// Decoder frame index of the first timeline frame.
    first_frame: usize,
    timestamps: Vec<f64>,
    index: BTreeMap<OrderedFloat<f64>, usize>,
    sync_tolerance: f64,
    preloaded: Option<Vec<Arc<OrganizedPointCloud>>>,
    cached: Option<(usize, Arc<OrganizedPointCloud>)>,
    current: Option<usize>,
}

impl<D: FrameDecoder> RecordedSource<D> {
    /// Open a source. `intrinsics` overrides the decoder's own (from the calibration file).
    pub fn new(
        camera_index: usize,
        decoder: D,
        model_matrix: Mat4,
        intrinsics: Option<PinholeIntrinsics>,
        config: &SessionConfig,
    ) -> Result<Self, CaptureError> {
        let count = decoder.frame_count();
        if count == 0 {
            return Err(CaptureError::OpenFailed(format!("camera {camera_index} has no frames")));
        }

        let intrinsics = intrinsics.unwrap_or_else(|| decoder.intrinsics());
        let (width, height) = decoder.resolution();
        if intrinsics.width != width || intrinsics.height != height {
            return Err(CaptureError::DimensionMismatch {
                expected_width: width,
                expected_height: height,
                actual_width: intrinsics.width,
                actual_height: intrinsics.height,
            });
        }
        let lookup = Arc::new(CameraLookup::from_intrinsics(&intrinsics, LOOKUP_TABLE_SIZE)?);

        let (first_frame, last_frame) = if config.buffered {
            let start = config.buffered_start_frame_offset.min(count - 1);
            let end = (start + config.buffered_max_frame_count.max(1)).min(count);
            (start, end)
        } else {
            (0, count)
        };

        let origin = decoder.timestamp(first_frame);
        let timestamps: Vec<f64> = (first_frame..last_frame)
            .map(|i| decoder.timestamp(i) - origin)
            .collect();
        let index = timestamps
            .iter()
            .enumerate()
            .map(|(i, &t)| (OrderedFloat(t), i))
            .collect();

        let mut source = Self {
            camera_index,
            decoder,
            model_matrix,
            lookup,
            first_frame,
            timestamps,
            index,
            sync_tolerance: config.sync_tolerance,
            preloaded: None,
            cached: None,
            current: None,
        };

        if config.buffered {
            let mut frames = Vec::with_capacity(source.timestamps.len());
            for i in 0..source.timestamps.len() {
                frames.push(Arc::new(source.load(i)?));
            }
            info!(
                camera = camera_index,
                frames = frames.len(),
                first = first_frame,
                "Preloaded recording"
            );
            source.preloaded = Some(frames);
        } else {
            info!(camera = camera_index, frames = source.timestamps.len(), "Opened recording");
        }

        Ok(source)
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    pub fn model_matrix(&self) -> Mat4 {
        self.model_matrix
    }

    pub fn is_buffered(&self) -> bool {
        self.preloaded.is_some()
    }

    /// Index of the first frame after `t - tolerance`.
    fn sync_index(&self, t: f64) -> Option<usize> {
        let key = OrderedFloat(t - self.sync_tolerance);
        self.index.range((Excluded(key), Unbounded)).next().map(|(_, &i)| i)
    }

    fn load(&mut self, i: usize) -> Result<OrganizedPointCloud, CaptureError> {
        let decoder_index = self.first_frame + i;
        let decoded = self.decoder.decode(decoder_index)?;
        let (width, height) = self.decoder.resolution();
        let mut frame = OrganizedPointCloud::new(
            self.camera_index,
            width,
            height,
            decoded.depth,
            decoded.colors,
            self.model_matrix,
            Arc::clone(&self.lookup),
        )?
        .with_frame_id(decoder_index as u64)
        .with_timestamp(self.timestamps[i]);
        frame.high_res = decoded.high_res;
        Ok(frame)
    }
}

impl<D: FrameDecoder> FrameSource for RecordedSource<D> {
    fn camera_index(&self) -> usize {
        self.camera_index
    }

    fn resolution(&self) -> (u32, u32) {
        self.decoder.resolution()
    }

    fn lookup(&self) -> &Arc<CameraLookup> {
        &self.lookup
    }

    fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    fn resolve(&mut self, t: f64) -> Option<Arc<OrganizedPointCloud>> {
        let Some(i) = self.sync_index(t) else {
            debug!(camera = self.camera_index, t, "no frame at or after query");
            return None;
        };

        if let Some(frames) = &self.preloaded {
            let frame = frames.get(i).cloned();
            if frame.is_some() {
                self.current = Some(i);
            }
            return frame;
        }

        if let Some((cached_index, frame)) = &self.cached {
            if *cached_index == i {
                self.current = Some(i);
                return Some(Arc::clone(frame));
            }
        }

        match self.load(i) {
            Ok(frame) => {
                let frame = Arc::new(frame);
                self.cached = Some((i, Arc::clone(&frame)));
                self.current = Some(i);
                Some(frame)
            }
            Err(e) => {
                warn!(camera = self.camera_index, frame = i, error = %e, "Failed to decode frame");
                None
            }
        }
    }

    fn current_frame(&self) -> Option<usize> {
        self.current
    }
}
