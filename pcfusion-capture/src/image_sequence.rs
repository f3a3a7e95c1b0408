//! PNG sequence recordings.
//!
//! Directory layout:
//!
//! ```text
//! timestamps.txt        one timestamp in seconds per line
//! depth_00000.png       16-bit grayscale, millimeters
//! color_00000.png       8-bit RGB(A), registered to the depth raster
//! color_hr_00000.png    optional high-resolution color
//! ```

use crate::config::SessionConfig;
use crate::recorded::{DecodedFrame, FrameDecoder, RecordedSource};
use crate::source::{CaptureError, FrameSource};
use pcfusion_data::{CalibrationDescriptor, HighResColors, PinholeIntrinsics, Rgba8};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Reads depth/color PNG pairs from a directory.
#[derive(Debug, Clone)]
pub struct ImageSequenceDecoder {
    dir: PathBuf,
    timestamps: Vec<f64>,
    width: u32,
    height: u32,
    intrinsics: PinholeIntrinsics,
}

impl ImageSequenceDecoder {
    /// Open a recording directory. The raster size is taken from the first depth image.
    #[tracing::instrument(skip_all, fields(dir = %dir.as_ref().display()))]
    pub fn open(dir: impl AsRef<Path>, fov_degrees: f32) -> Result<Self, CaptureError> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.is_dir() {
            return Err(CaptureError::NotFound(dir.display().to_string()));
        }

        let text = fs::read_to_string(dir.join("timestamps.txt"))?;
        let timestamps = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(|l| {
                l.parse::<f64>()
                    .map_err(|e| CaptureError::UnsupportedFormat(format!("bad timestamp {l:?}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if timestamps.is_empty() {
            return Err(CaptureError::OpenFailed(format!("{} lists no frames", dir.display())));
        }
        if timestamps.windows(2).any(|w| w[1] < w[0]) {
            return Err(CaptureError::UnsupportedFormat("timestamps are not ascending".into()));
        }

        let (width, height) = image::image_dimensions(Self::depth_path(&dir, 0))?;
        info!(frames = timestamps.len(), width, height, "Opened image sequence");

        Ok(Self {
            intrinsics: PinholeIntrinsics::from_horizontal_fov(width, height, fov_degrees),
            dir,
            timestamps,
            width,
            height,
        })
    }

    fn depth_path(dir: &Path, index: usize) -> PathBuf {
        dir.join(format!("depth_{index:05}.png"))
    }

    fn color_path(dir: &Path, index: usize) -> PathBuf {
        dir.join(format!("color_{index:05}.png"))
    }

    fn high_res_path(dir: &Path, index: usize) -> PathBuf {
        dir.join(format!("color_hr_{index:05}.png"))
    }

    fn check_dimensions(&self, (w, h): (u32, u32)) -> Result<(), CaptureError> {
        if (w, h) != (self.width, self.height) {
            return Err(CaptureError::DimensionMismatch {
                expected_width: self.width,
                expected_height: self.height,
                actual_width: w,
                actual_height: h,
            });
        }
        Ok(())
    }
}

impl FrameDecoder for ImageSequenceDecoder {
    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn intrinsics(&self) -> PinholeIntrinsics {
        self.intrinsics
    }

    fn frame_count(&self) -> usize {
        self.timestamps.len()
    }

    fn timestamp(&self, index: usize) -> f64 {
        self.timestamps[index]
    }

    fn decode(&mut self, index: usize) -> Result<DecodedFrame, CaptureError> {
        let depth = image::open(Self::depth_path(&self.dir, index))?.into_luma16();
        self.check_dimensions(depth.dimensions())?;

        let color = image::open(Self::color_path(&self.dir, index))?.into_rgba8();
        self.check_dimensions(color.dimensions())?;

        let colors = color
            .pixels()
            .map(|p| Rgba8::new(p[0], p[1], p[2], p[3]))
            .collect();

        let hr_path = Self::high_res_path(&self.dir, index);
        let high_res = if hr_path.exists() {
            let hr = image::open(hr_path)?.into_rgba8();
            debug!(frame = index, "loaded high-res color");
            Some(HighResColors {
                width: hr.width(),
                height: hr.height(),
                data: hr.pixels().map(|p| Rgba8::new(p[0], p[1], p[2], p[3])).collect(),
            })
        } else {
            None
        };

        Ok(DecodedFrame {
            depth: depth.into_raw(),
            colors,
            high_res,
        })
    }
}

/// Open one image-sequence source per calibrated camera.
///
/// Camera entries name recording directories relative to the descriptor.
/// Intrinsics from the descriptor win over the `fov_degrees` fallback.
pub fn image_sequence_sources(
    calibration: &CalibrationDescriptor,
    fov_degrees: f32,
    config: &SessionConfig,
) -> Result<Vec<Box<dyn FrameSource>>, CaptureError> {
    if calibration.is_empty() {
        return Err(CaptureError::NoSources);
    }
    let mut sources: Vec<Box<dyn FrameSource>> = Vec::with_capacity(calibration.len());
    for (index, entry) in calibration.cameras.iter().enumerate() {
        let dir = calibration
            .resolve_path(index)
            .ok_or_else(|| CaptureError::NotFound(entry.filename.clone()))?;
        let decoder = ImageSequenceDecoder::open(&dir, fov_degrees)?;
        sources.push(Box::new(RecordedSource::new(
            index,
            decoder,
            entry.model_matrix(),
            entry.intrinsics,
            config,
        )?));
    }
    info!(cameras = sources.len(), "Opened calibrated recordings");
    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma, Rgb};

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("pcfusion-seq-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_frame(dir: &Path, index: usize, w: u32, h: u32, depth_mm: u16) {
        let depth: ImageBuffer<Luma<u16>, Vec<u16>> = ImageBuffer::from_pixel(w, h, Luma([depth_mm]));
        depth.save(ImageSequenceDecoder::depth_path(dir, index)).unwrap();
        let color: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_pixel(w, h, Rgb([10, 20, 30]));
        color.save(ImageSequenceDecoder::color_path(dir, index)).unwrap();
    }

    #[test]
    fn test_open_and_decode() {
        let dir = temp_dir("decode");
        fs::write(dir.join("timestamps.txt"), "0.0\n0.033\n").unwrap();
        write_frame(&dir, 0, 8, 6, 1234);
        write_frame(&dir, 1, 8, 6, 1500);

        let mut dec = ImageSequenceDecoder::open(&dir, 70.0).unwrap();
        assert_eq!(dec.resolution(), (8, 6));
        assert_eq!(dec.frame_count(), 2);
        let frame = dec.decode(1).unwrap();
        assert!(frame.depth.iter().all(|&d| d == 1500));
        assert_eq!(frame.colors[0], Rgba8::new(10, 20, 30, 255));
        assert!(frame.high_res.is_none());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let dir = temp_dir("mismatch");
        fs::write(dir.join("timestamps.txt"), "0.0\n0.033\n").unwrap();
        write_frame(&dir, 0, 8, 6, 1000);
        write_frame(&dir, 1, 4, 4, 1000);

        let mut dec = ImageSequenceDecoder::open(&dir, 70.0).unwrap();
        assert!(matches!(dec.decode(1), Err(CaptureError::DimensionMismatch { .. })));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_sources_from_calibration() {
        use pcfusion_data::CameraEntry;

        let root = temp_dir("calib");
        for cam in ["cam0", "cam1"] {
            let dir = root.join(cam);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("timestamps.txt"), "0.0\n0.033\n").unwrap();
            write_frame(&dir, 0, 8, 6, 1000);
            write_frame(&dir, 1, 8, 6, 1000);
        }
        let calib = CalibrationDescriptor::new(vec![
            CameraEntry::new(root.join("cam0").display().to_string(), glam::Mat4::IDENTITY),
            CameraEntry::new(root.join("cam1").display().to_string(), glam::Mat4::IDENTITY),
        ]);
        let sources = image_sequence_sources(&calib, 70.0, &SessionConfig::default()).unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[1].camera_index(), 1);
        assert_eq!(sources[0].resolution(), (8, 6));
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_empty_calibration_has_no_sources() {
        let r = image_sequence_sources(&CalibrationDescriptor::default(), 70.0, &SessionConfig::default());
        assert!(matches!(r, Err(CaptureError::NoSources)));
    }

    #[test]
    fn test_descending_timestamps_rejected() {
        let dir = temp_dir("order");
        fs::write(dir.join("timestamps.txt"), "0.5\n0.1\n").unwrap();
        write_frame(&dir, 0, 2, 2, 1000);
        assert!(ImageSequenceDecoder::open(&dir, 70.0).is_err());
        fs::remove_dir_all(&dir).unwrap();
    }
}
