//! Procedural depth camera for tests, demos and rig-less sessions.
//!
//! Renders analytic planes and an optional moving sphere by ray casting from a
//! posed pinhole camera. Depth noise comes from a hash of (frame, pixel, seed)
//! so every decode of the same frame is identical.

use crate::config::SessionConfig;
use crate::recorded::{DecodedFrame, FrameDecoder, RecordedSource};
use crate::source::{CaptureError, FrameSource};
use glam::{Mat4, Vec3};
use pcfusion_data::{CAMERA_IMAGE_HEIGHT, CAMERA_IMAGE_WIDTH, PinholeIntrinsics, Rgba8, look_at_model};

/// An infinite plane with a checkerboard texture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScenePlane {
    pub point: Vec3,
    pub normal: Vec3,
    pub color: Rgba8,
    /// Checker cell size in meters, 0 for a solid color.
    pub checker: f32,
}

/// Sphere translating linearly over time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovingSphere {
    pub center: Vec3,
    pub velocity: Vec3,
    pub radius: f32,
    pub color: Rgba8,
}

impl MovingSphere {
    fn center_at(&self, t: f64) -> Vec3 {
        self.center + self.velocity * t as f32
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SyntheticScene {
    pub planes: Vec<ScenePlane>,
    pub sphere: Option<MovingSphere>,
}

impl SyntheticScene {
    /// A checkered wall at `z = wall_z` facing -Z.
    pub fn wall(wall_z: f32) -> Self {
        Self {
            planes: vec![ScenePlane {
                point: Vec3::new(0.0, 0.0, wall_z),
                normal: Vec3::NEG_Z,
                color: Rgba8::opaque(200, 180, 150),
                checker: 0.1,
            }],
            sphere: None,
        }
    }

    /// Wall plus floor with a sphere moving across the room.
    pub fn room() -> Self {
        let mut scene = Self::wall(1.5);
        scene.planes.push(ScenePlane {
            point: Vec3::ZERO,
            normal: Vec3::Y,
            color: Rgba8::opaque(90, 110, 140),
            checker: 0.25,
        });
        scene.sphere = Some(MovingSphere {
            center: Vec3::new(-0.4, 0.8, 0.6),
            velocity: Vec3::new(0.2, 0.0, 0.0),
            radius: 0.2,
            color: Rgba8::opaque(220, 60, 50),
        });
        scene
    }

    /// Nearest hit along `origin + s * dir` with `s > 0`, as (s, color).
    fn cast(&self, origin: Vec3, dir: Vec3, t: f64) -> Option<(f32, Rgba8)> {
        let mut best: Option<(f32, Rgba8)> = None;
        let mut consider = |s: f32, color: Rgba8| {
            if s > 1e-4 && best.is_none_or(|(b, _)| s < b) {
                best = Some((s, color));
            }
        };

        for plane in &self.planes {
            let denom = plane.normal.dot(dir);
            if denom.abs() < 1e-6 {
                continue;
            }
            let s = plane.normal.dot(plane.point - origin) / denom;
            let hit = origin + dir * s;
            consider(s, checker_color(plane.color, plane.checker, hit));
        }

        if let Some(sphere) = &self.sphere {
            let oc = origin - sphere.center_at(t);
            let a = dir.length_squared();
            let b = oc.dot(dir);
            let c = oc.length_squared() - sphere.radius * sphere.radius;
            let disc = b * b - a * c;
            if disc >= 0.0 {
                let s = (-b - disc.sqrt()) / a;
                consider(s, sphere.color);
            }
        }

        best
    }
}

fn checker_color(base: Rgba8, cell: f32, p: Vec3) -> Rgba8 {
    if cell <= 0.0 {
        return base;
    }
    let q = (p / cell).floor();
    let parity = (q.x as i64 + q.y as i64 + q.z as i64).rem_euclid(2);
    if parity == 0 {
        base
    } else {
        Rgba8::from_vec4(base.to_vec4() * glam::Vec4::new(0.7, 0.7, 0.7, 1.0))
    }
}

/// Integer hash mapped to [-1, 1].
fn hash_noise(frame: usize, pixel: usize, seed: u64) -> f32 {
    let mut h = seed ^ (frame as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ (pixel as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
    h ^= h >> 33;
    h = h.wrapping_mul(0xFF51_AFD7_ED55_8CCD);
    h ^= h >> 33;
    (h >> 40) as f32 / (1u64 << 24) as f32 * 2.0 - 1.0
}

/// Decoder producing frames of a [`SyntheticScene`].
#[derive(Debug, Clone)]
pub struct SyntheticDecoder {
    scene: SyntheticScene,
    intrinsics: PinholeIntrinsics,
    model_matrix: Mat4,
    frame_count: usize,
    fps: f64,
    /// Added to every timestamp, models unsynchronized device clocks.
    time_offset: f64,
    noise_mm: f32,
    max_range: f32,
    seed: u64,
}

impl SyntheticDecoder {
    pub fn new(scene: SyntheticScene, intrinsics: PinholeIntrinsics, model_matrix: Mat4) -> Self {
        Self {
            scene,
            intrinsics,
            model_matrix,
            frame_count: 90,
            fps: 30.0,
            time_offset: 0.0,
            noise_mm: 0.0,
            max_range: 5.0,
            seed: 0,
        }
    }

    pub fn with_frames(mut self, frame_count: usize, fps: f64) -> Self {
        self.frame_count = frame_count;
        self.fps = fps;
        self
    }

    pub fn with_noise(mut self, noise_mm: f32, seed: u64) -> Self {
        self.noise_mm = noise_mm;
        self.seed = seed;
        self
    }

    pub fn with_time_offset(mut self, offset: f64) -> Self {
        self.time_offset = offset;
        self
    }

    pub fn model_matrix(&self) -> Mat4 {
        self.model_matrix
    }
}

impl FrameDecoder for SyntheticDecoder {
    fn resolution(&self) -> (u32, u32) {
        (self.intrinsics.width, self.intrinsics.height)
    }

    fn intrinsics(&self) -> PinholeIntrinsics {
        self.intrinsics
    }

    fn frame_count(&self) -> usize {
        self.frame_count
    }

    fn timestamp(&self, index: usize) -> f64 {
        self.time_offset + index as f64 / self.fps
    }

    fn decode(&mut self, index: usize) -> Result<DecodedFrame, CaptureError> {
        if index >= self.frame_count {
            return Err(CaptureError::StreamEnded);
        }
        let t = index as f64 / self.fps;
        let PinholeIntrinsics {
            fx,
            fy,
            cx,
            cy,
            width,
            height,
        } = self.intrinsics;
        let origin = self.model_matrix.w_axis.truncate();

        let n = width as usize * height as usize;
        let mut depth = vec![0u16; n];
        let mut colors = vec![Rgba8::BLACK; n];
        for y in 0..height {
            for x in 0..width {
                let i = y as usize * width as usize + x as usize;
                // camera-space ray with z = 1, so the hit parameter is the depth
                let ray = Vec3::new((x as f32 - cx) / fx, (y as f32 - cy) / fy, 1.0);
                let dir = self.model_matrix.transform_vector3(ray);
                let Some((z, color)) = self.scene.cast(origin, dir, t) else {
                    continue;
                };
                if z > self.max_range {
                    continue;
                }
                let noisy = z * 1000.0 + self.noise_mm * hash_noise(index, i, self.seed);
                depth[i] = noisy.round().clamp(1.0, u16::MAX as f32) as u16;
                colors[i] = color;
            }
        }

        Ok(DecodedFrame {
            depth,
            colors,
            high_res: None,
        })
    }
}

pub type SyntheticSource = RecordedSource<SyntheticDecoder>;

/// Cameras on an arc 1.5 m in front of a wall, all aimed at its center.
pub fn synthetic_rig(camera_count: usize, config: &SessionConfig) -> Result<Vec<Box<dyn FrameSource>>, CaptureError> {
    if camera_count == 0 {
        return Err(CaptureError::NoSources);
    }
    let intrinsics = PinholeIntrinsics::from_horizontal_fov(CAMERA_IMAGE_WIDTH, CAMERA_IMAGE_HEIGHT, 75.0);
    let target = Vec3::new(0.0, 0.9, 1.5);
    let mut sources: Vec<Box<dyn FrameSource>> = Vec::with_capacity(camera_count);
    for i in 0..camera_count {
        let angle = if camera_count == 1 {
            0.0
        } else {
            (i as f32 / (camera_count - 1) as f32 - 0.5) * 70f32.to_radians()
        };
        let eye = target + Vec3::new(angle.sin(), 0.0, -angle.cos()) * 1.6 + Vec3::new(0.0, 0.3, 0.0);
        let pose = look_at_model(eye, target, Vec3::Y);
        let decoder = SyntheticDecoder::new(SyntheticScene::room(), intrinsics, pose)
            .with_noise(2.0, i as u64 + 1)
            .with_time_offset(i as f64 * 0.004);
        sources.push(Box::new(RecordedSource::new(i, decoder, pose, None, config)?));
    }
    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_intrinsics() -> PinholeIntrinsics {
        PinholeIntrinsics::from_horizontal_fov(32, 24, 60.0)
    }

    #[test]
    fn test_wall_depth_matches_distance() {
        let pose = look_at_model(Vec3::new(0.0, 0.0, 0.0), Vec3::new(0.0, 0.0, 1.0), Vec3::Y);
        let mut dec = SyntheticDecoder::new(SyntheticScene::wall(1.2), small_intrinsics(), pose);
        let frame = dec.decode(0).unwrap();
        // frontal wall: z-depth is constant across the raster
        assert!(frame.depth.iter().all(|&d| d == 1200));
    }

    #[test]
    fn test_noise_is_deterministic_and_bounded() {
        let pose = look_at_model(Vec3::ZERO, Vec3::Z, Vec3::Y);
        let mut dec = SyntheticDecoder::new(SyntheticScene::wall(1.0), small_intrinsics(), pose).with_noise(3.0, 7);
        let a = dec.decode(4).unwrap();
        let b = dec.decode(4).unwrap();
        assert_eq!(a.depth, b.depth);
        assert!(a.depth.iter().all(|&d| (997..=1003).contains(&d)));
        assert!(a.depth.iter().any(|&d| d != 1000));
    }

    #[test]
    fn test_sky_pixels_are_invalid() {
        // looking away from the wall sees nothing
        let pose = look_at_model(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        let mut dec = SyntheticDecoder::new(SyntheticScene::wall(1.0), small_intrinsics(), pose);
        let frame = dec.decode(0).unwrap();
        assert!(frame.depth.iter().all(|&d| d == 0));
    }

    #[test]
    fn test_sphere_occludes_wall() {
        let mut scene = SyntheticScene::wall(2.0);
        scene.sphere = Some(MovingSphere {
            center: Vec3::new(0.0, 0.0, 1.0),
            velocity: Vec3::ZERO,
            radius: 0.25,
            color: Rgba8::opaque(255, 0, 0),
        });
        let pose = look_at_model(Vec3::ZERO, Vec3::Z, Vec3::Y);
        let intr = small_intrinsics();
        let mut dec = SyntheticDecoder::new(scene, intr, pose);
        let frame = dec.decode(0).unwrap();
        let center = (intr.height / 2) as usize * intr.width as usize + (intr.width / 2) as usize;
        assert!(frame.depth[center] < 800);
        assert_eq!(frame.colors[center], Rgba8::opaque(255, 0, 0));
    }

    #[test]
    fn test_rig_sources_are_indexed() {
        let config = SessionConfig::default();
        let rig = synthetic_rig(3, &config).unwrap();
        assert_eq!(rig.len(), 3);
        for (i, s) in rig.iter().enumerate() {
            assert_eq!(s.camera_index(), i);
            assert_eq!(s.resolution(), (CAMERA_IMAGE_WIDTH, CAMERA_IMAGE_HEIGHT));
        }
    }

    #[test]
    fn test_rig_requires_cameras() {
        assert!(matches!(synthetic_rig(0, &SessionConfig::default()), Err(CaptureError::NoSources)));
    }
}
