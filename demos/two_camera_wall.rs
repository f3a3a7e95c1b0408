//! Two-camera wall example
//!
//! Two procedural depth cameras look at a textured wall with a ball rolling in
//! front of it. The tuples go through the threaded pipeline in lockstep and
//! every integrated result is blended into a stereo pair.
//!
//! Usage:
//!   cargo run --example two_camera_wall -- [frames]

use glam::Vec3;
use pcfusion::capture::{MovingSphere, RecordedSource, SyntheticDecoder, SyntheticScene};
use pcfusion::data::{PinholeIntrinsics, look_at_model};
use pcfusion::pipeline::ErosionSettings;
use pcfusion::{
    BlendParams, BlendPcr, Compositor, FilterChain, FilterSettings, FrameSource, Pacing, Pipeline, Rgba8,
    SessionConfig, SharedParams, ViewCamera,
};
use std::error::Error;
use std::time::{Duration, Instant};
use tracing::info;

const CAMERA_WIDTH: u32 = 160;
const CAMERA_HEIGHT: u32 = 120;
const OUTPUT_WIDTH: u32 = 320;
const OUTPUT_HEIGHT: u32 = 240;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let frames: usize = match std::env::args().nth(1) {
        Some(arg) => arg.parse()?,
        None => 30,
    };

    let session = SessionConfig {
        pacing: Pacing::Lockstep,
        looping: false,
        ..SessionConfig::default()
    };

    let mut scene = SyntheticScene::wall(1.5);
    scene.sphere = Some(MovingSphere {
        center: Vec3::new(-0.5, 1.0, 1.1),
        velocity: Vec3::new(0.4, 0.0, 0.0),
        radius: 0.15,
        color: Rgba8::opaque(200, 40, 40),
    });

    let intrinsics = PinholeIntrinsics::from_horizontal_fov(CAMERA_WIDTH, CAMERA_HEIGHT, 70.0);
    let target = Vec3::new(0.0, 1.0, 1.5);
    let mut sources: Vec<Box<dyn FrameSource>> = Vec::new();
    for (index, x) in [-0.35f32, 0.35].into_iter().enumerate() {
        let pose = look_at_model(Vec3::new(x, 1.1, 0.0), target, Vec3::Y);
        let decoder = SyntheticDecoder::new(scene.clone(), intrinsics, pose)
            .with_frames(frames.max(1), 30.0)
            .with_noise(2.0, index as u64 + 1);
        sources.push(Box::new(RecordedSource::new(index, decoder, pose, None, &session)?));
    }

    let params = SharedParams::new(BlendParams {
        working_width: CAMERA_WIDTH,
        working_height: CAMERA_HEIGHT,
        clip_min: [-2.0, 0.05, -1.0],
        clip_max: [2.0, 2.5, 2.0],
        ..BlendParams::default()
    });
    let chain = FilterChain::from_settings(&[FilterSettings::Erosion(ErosionSettings::default())]);

    let (integrator, mut compositor) = BlendPcr::with_params(params, OUTPUT_WIDTH, OUTPUT_HEIGHT)?.into_parts();
    let mut pipeline = Pipeline::start(sources, &session, chain, integrator)?;

    let view = ViewCamera::look_at(
        Vec3::new(0.0, 1.1, -0.3),
        target,
        55.0,
        OUTPUT_WIDTH as f32 / OUTPUT_HEIGHT as f32,
        0.05,
        10.0,
    );
    let views = view.views(2);

    let mut seen = 0;
    let mut rendered = 0;
    while rendered < frames {
        let Some((generation, reconstructed)) = pipeline.wait_for_output(seen, Duration::from_secs(3)) else {
            break;
        };
        seen = generation;

        let started = Instant::now();
        let frame = compositor.render(&reconstructed, &views)?;
        pipeline.record_render(started.elapsed());
        let coverage: Vec<String> = frame.views().map(|v| format!("{:.1}%", v.coverage() * 100.0)).collect();
        info!(
            sequence = frame.sequence(),
            cursor = frame.cursor(),
            coverage = %coverage.join(" / "),
            "Rendered stereo pair"
        );
        rendered += 1;
    }

    let telemetry = pipeline.telemetry();
    pipeline.shutdown();
    info!(
        rendered,
        integration_ms = telemetry.integration_ms,
        render_ms = telemetry.render_ms,
        dropped = telemetry.dropped,
        "Two-camera wall example completed"
    );
    Ok(())
}
