//! Writes rendered views to disk.

use crate::errors::AppError;
use image::RgbaImage;
use pcfusion_blend::{Presenter, RenderFrame};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Saves every view of a frame as `frame_<sequence>_view<k>.png`.
#[derive(Debug)]
pub struct PngPresenter {
    dir: PathBuf,
    presented: usize,
}

impl PngPresenter {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, AppError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        info!(dir = %dir.display(), "Writing frames");
        Ok(Self { dir, presented: 0 })
    }

    pub fn frame_path(&self, sequence: u64, view: usize) -> PathBuf {
        self.dir.join(format!("frame_{sequence:06}_view{view}.png"))
    }

    /// Frames presented so far.
    pub fn presented(&self) -> usize {
        self.presented
    }
}

impl Presenter for PngPresenter {
    type Error = AppError;

    fn present(&mut self, frame: &RenderFrame) -> Result<(), AppError> {
        for (k, view) in frame.views().enumerate() {
            let (width, height) = view.dimensions();
            let image = RgbaImage::from_raw(width, height, view.color_bytes().to_vec())
                .ok_or_else(|| AppError::Present(format!("view {k} buffer does not match {width}x{height}")))?;
            let path = self.frame_path(frame.sequence(), k);
            image.save(&path)?;
            debug!(path = %path.display(), "Saved view");
        }
        self.presented += 1;
        Ok(())
    }
}
