//! The threaded pipeline: stream thread, handoff, filter chain and integrator.
//!
//! ```text
//! StreamCoordinator --publish--> Handoff --recv_latest--> FilterChain -> Integrator -> LatestOutput
//!   (pcfusion-stream)                                  (pcfusion-pipeline)                   ^
//!                                                                                           |
//!                                                                    render thread loads ---+
//! ```

use crate::error::PipelineError;
use crate::filter::{FilterChain, FilterChainHandle};
use crate::handoff::{Handoff, HandoffStats, Received};
use crate::latest::LatestOutput;
use crate::telemetry::{Telemetry, TelemetrySnapshot};
use pcfusion_blend::Integrator;
use pcfusion_capture::{FrameSource, Pacing, SessionConfig, StreamControl, StreamCoordinator};
use pcfusion_data::FrameTuple;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, trace, warn};

const OUTPUT_POLL: Duration = Duration::from_millis(2);

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State moved onto the pipeline thread.
struct Worker<I: Integrator> {
    handoff: Arc<Handoff<FrameTuple>>,
    output: Arc<LatestOutput<I::Output>>,
    telemetry: Arc<Telemetry>,
    last_tuple: Arc<Mutex<Option<FrameTuple>>>,
    integrate_incomplete: Arc<AtomicBool>,
    chain: FilterChain,
    integrator: I,
}

impl<I: Integrator> Worker<I> {
    fn run(mut self) {
        debug!("Pipeline thread started");
        while let Ok(received) = self.handoff.recv_latest() {
            self.process(received);
        }
        info!("Pipeline thread exiting");
    }

    fn process(&mut self, received: Received<FrameTuple>) {
        let Received {
            sequence,
            value: mut tuple,
            dropped,
        } = received;
        if dropped > 0 {
            trace!(dropped, "Tuples dropped since last receive");
            self.telemetry.add_dropped(dropped);
        }
        *lock(&self.last_tuple) = Some(tuple.clone());

        if !tuple.complete {
            let skip = !self.integrate_incomplete.load(Ordering::Relaxed);
            self.telemetry.add_incomplete(skip);
            if skip {
                debug!(sequence = tuple.sequence, cameras = tuple.len(), "Skipping incomplete tuple");
                self.handoff.mark_processed(sequence);
                return;
            }
        }

        let _span = info_span!("integrate", sequence = tuple.sequence, cameras = tuple.len()).entered();
        let started = Instant::now();
        self.chain.apply(&mut tuple);
        self.telemetry.record_filter(started.elapsed());

        let started = Instant::now();
        let result = self.integrator.integrate(&tuple);
        self.telemetry.record_integration(started.elapsed());

        self.output.store(Arc::new(result));
        self.handoff.mark_processed(sequence);
    }
}

/// Owns the stream and pipeline threads of one session.
///
/// The integrator runs on the pipeline thread; its results are published to a
/// [`LatestOutput`] that any render thread can read. Dropping the pipeline shuts
/// both threads down.
pub struct Pipeline<I: Integrator> {
    coordinator: Option<StreamCoordinator>,
    control: StreamControl,
    handoff: Arc<Handoff<FrameTuple>>,
    output: Arc<LatestOutput<I::Output>>,
    telemetry: Arc<Telemetry>,
    filters: FilterChainHandle,
    last_tuple: Arc<Mutex<Option<FrameTuple>>>,
    integrate_incomplete: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl<I: Integrator> Pipeline<I> {
    pub fn start(
        sources: Vec<Box<dyn FrameSource>>,
        config: &SessionConfig,
        chain: FilterChain,
        integrator: I,
    ) -> Result<Self, PipelineError> {
        let handoff = Arc::new(Handoff::new());
        let output = Arc::new(LatestOutput::new());
        let telemetry = Arc::new(Telemetry::new());
        let last_tuple = Arc::new(Mutex::new(None));
        let integrate_incomplete = Arc::new(AtomicBool::new(config.integrate_incomplete));
        let filters = chain.handle();

        let producer = Arc::clone(&handoff);
        let coordinator = StreamCoordinator::start(sources, config, move |tuple: FrameTuple, pacing| {
            let sequence = tuple.sequence;
            let published = match pacing {
                Pacing::FrameSkipping => producer.publish(tuple),
                Pacing::Lockstep => producer.publish_when_processed(tuple),
            };
            if published.is_err() {
                trace!(sequence, "Handoff closed; tuple discarded");
            }
        })?;
        let control = coordinator.control();

        let worker = Worker {
            handoff: Arc::clone(&handoff),
            output: Arc::clone(&output),
            telemetry: Arc::clone(&telemetry),
            last_tuple: Arc::clone(&last_tuple),
            integrate_incomplete: Arc::clone(&integrate_incomplete),
            chain,
            integrator,
        };
        let worker = match thread::Builder::new()
            .name("pcfusion-pipeline".into())
            .spawn(move || worker.run())
        {
            Ok(handle) => handle,
            Err(e) => {
                // unblock a lockstep producer before the coordinator joins
                handoff.close();
                drop(coordinator);
                return Err(PipelineError::Spawn(e));
            }
        };
        info!(pacing = ?config.pacing, "Pipeline started");

        Ok(Self {
            coordinator: Some(coordinator),
            control,
            handoff,
            output,
            telemetry,
            filters,
            last_tuple,
            integrate_incomplete,
            worker: Some(worker),
        })
    }

    /// Playback controls of the stream thread.
    pub fn control(&self) -> &StreamControl {
        &self.control
    }

    /// Edit the filter chain; edits apply before the next tuple.
    pub fn filters(&self) -> &FilterChainHandle {
        &self.filters
    }

    pub fn output(&self) -> &Arc<LatestOutput<I::Output>> {
        &self.output
    }

    pub fn latest(&self) -> Option<Arc<I::Output>> {
        self.output.load()
    }

    pub fn latest_if_newer(&self, seen: u64) -> Option<(u64, Arc<I::Output>)> {
        self.output.load_if_newer(seen)
    }

    /// Block until an output newer than generation `seen` exists, or `timeout` passes.
    pub fn wait_for_output(&self, seen: u64, timeout: Duration) -> Option<(u64, Arc<I::Output>)> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(newer) = self.output.load_if_newer(seen) {
                return Some(newer);
            }
            if Instant::now() >= deadline || !self.is_running() {
                return None;
            }
            thread::sleep(OUTPUT_POLL);
        }
    }

    /// Run the last received tuple through filters and integration again,
    /// e.g. after a parameter edit while paused. Returns false if no tuple has
    /// arrived yet.
    pub fn request_reintegrate(&self) -> Result<bool, PipelineError> {
        let Some(tuple) = lock(&self.last_tuple).clone() else {
            return Ok(false);
        };
        debug!(sequence = tuple.sequence, "Reintegrating last tuple");
        self.handoff.publish(tuple)?;
        Ok(true)
    }

    pub fn set_integrate_incomplete(&self, integrate: bool) {
        self.integrate_incomplete.store(integrate, Ordering::Relaxed);
    }

    /// Record how long the render thread took for one frame.
    pub fn record_render(&self, elapsed: Duration) {
        self.telemetry.record_render(elapsed);
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.telemetry.set_streaming_ms(self.control.processing_time_ms());
        self.telemetry.snapshot()
    }

    pub fn handoff_stats(&self) -> HandoffStats {
        self.handoff.stats()
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop both threads and wait for them. Idempotent.
    pub fn shutdown(&mut self) {
        if self.worker.is_none() && self.coordinator.is_none() {
            return;
        }
        info!("Shutting down pipeline");
        // closing first releases a producer blocked on lockstep and the idle consumer
        self.handoff.close();
        if let Some(mut coordinator) = self.coordinator.take() {
            coordinator.stop();
        }
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                warn!("Pipeline thread panicked");
            }
        }
    }
}

impl<I: Integrator> Drop for Pipeline<I> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use pcfusion_blend::{BlendCompositor, BlendParams, Compositor, Reconstructor, SharedParams, ViewCamera};
    use pcfusion_capture::{RecordedSource, ScenePlane, SyntheticDecoder, SyntheticScene};
    use pcfusion_data::{PinholeIntrinsics, Rgba8, look_at_model};

    /// Records tuple sequences, optionally sleeping to simulate a slow engine.
    struct Recorder {
        seen: Arc<Mutex<Vec<u64>>>,
        delay: Duration,
    }

    impl Recorder {
        fn new(delay: Duration) -> (Self, Arc<Mutex<Vec<u64>>>) {
            let seen = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    seen: Arc::clone(&seen),
                    delay,
                },
                seen,
            )
        }
    }

    impl Integrator for Recorder {
        type Output = u64;

        fn integrate(&mut self, tuple: &FrameTuple) -> u64 {
            thread::sleep(self.delay);
            lock(&self.seen).push(tuple.sequence);
            tuple.sequence
        }
    }

    fn small_source(index: usize, frames: usize, config: &SessionConfig) -> Box<dyn FrameSource> {
        let pose = look_at_model(Vec3::ZERO, Vec3::Z, Vec3::Y);
        let intr = PinholeIntrinsics::from_horizontal_fov(16, 12, 60.0);
        let dec = SyntheticDecoder::new(SyntheticScene::wall(1.0), intr, pose).with_frames(frames, 30.0);
        Box::new(RecordedSource::new(index, dec, pose, None, config).unwrap())
    }

    #[test]
    fn test_outputs_appear_and_shutdown_joins() {
        let config = SessionConfig::default();
        let (recorder, _) = Recorder::new(Duration::ZERO);
        let mut pipeline = Pipeline::start(vec![small_source(0, 300, &config)], &config, FilterChain::new(), recorder).unwrap();
        let (generation, sequence) = pipeline.wait_for_output(0, Duration::from_secs(5)).unwrap();
        assert!(generation >= 1);
        assert!(*sequence >= 1);
        pipeline.shutdown();
        assert!(!pipeline.is_running());
        assert!(pipeline.handoff_stats().produced >= 1);
        // a second shutdown is a no-op
        pipeline.shutdown();
    }

    #[test]
    fn test_slow_integrator_drops_tuples() {
        let config = SessionConfig::default();
        let (recorder, seen) = Recorder::new(Duration::from_millis(80));
        let mut pipeline = Pipeline::start(vec![small_source(0, 300, &config)], &config, FilterChain::new(), recorder).unwrap();
        thread::sleep(Duration::from_millis(900));
        pipeline.shutdown();

        let seen = lock(&seen).clone();
        assert!(seen.len() >= 2);
        assert!(seen.windows(2).all(|w| w[1] > w[0]));
        let telemetry = pipeline.telemetry();
        assert!(telemetry.dropped > 0);
        assert_eq!(telemetry.dropped, pipeline.handoff_stats().dropped);
        assert_eq!(telemetry.processed, seen.len() as u64);
    }

    #[test]
    fn test_lockstep_integrates_every_tuple() {
        let config = SessionConfig {
            pacing: Pacing::Lockstep,
            ..SessionConfig::default()
        };
        let (recorder, seen) = Recorder::new(Duration::from_millis(5));
        let mut pipeline = Pipeline::start(vec![small_source(0, 300, &config)], &config, FilterChain::new(), recorder).unwrap();
        thread::sleep(Duration::from_millis(400));
        pipeline.shutdown();

        let seen = lock(&seen).clone();
        assert!(seen.len() >= 3);
        assert_eq!(seen[0], 1);
        assert!(seen.windows(2).all(|w| w[1] == w[0] + 1));
        assert_eq!(pipeline.handoff_stats().dropped, 0);
    }

    #[test]
    fn test_incomplete_tuples_skipped_by_default() {
        let config = SessionConfig {
            autoplay: false,
            ..SessionConfig::default()
        };
        // camera 1 has a single frame and cannot resolve late cursors
        let sources = vec![small_source(0, 30, &config), small_source(1, 1, &config)];
        let (recorder, seen) = Recorder::new(Duration::ZERO);
        let pipeline = Pipeline::start(sources, &config, FilterChain::new(), recorder).unwrap();

        pipeline.control().seek(0.5);
        let deadline = Instant::now() + Duration::from_secs(5);
        while pipeline.telemetry().incomplete == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        let telemetry = pipeline.telemetry();
        assert_eq!(telemetry.incomplete, 1);
        assert_eq!(telemetry.skipped, 1);
        assert!(lock(&seen).is_empty());

        pipeline.set_integrate_incomplete(true);
        assert!(pipeline.request_reintegrate().unwrap());
        assert!(pipeline.wait_for_output(0, Duration::from_secs(5)).is_some());
    }

    #[test]
    fn test_reintegrate_repeats_last_tuple() {
        let config = SessionConfig {
            autoplay: false,
            ..SessionConfig::default()
        };
        let (recorder, _) = Recorder::new(Duration::ZERO);
        let pipeline = Pipeline::start(vec![small_source(0, 30, &config)], &config, FilterChain::new(), recorder).unwrap();
        assert!(!pipeline.request_reintegrate().unwrap());

        pipeline.control().seek(0.2);
        let (first_gen, first) = pipeline.wait_for_output(0, Duration::from_secs(5)).unwrap();
        assert!(pipeline.request_reintegrate().unwrap());
        let (second_gen, second) = pipeline.wait_for_output(first_gen, Duration::from_secs(5)).unwrap();
        assert!(second_gen > first_gen);
        assert_eq!(*first, *second);
    }

    #[test]
    fn test_closed_pipeline_rejects_reintegrate() {
        let config = SessionConfig {
            autoplay: false,
            ..SessionConfig::default()
        };
        let (recorder, _) = Recorder::new(Duration::ZERO);
        let mut pipeline = Pipeline::start(vec![small_source(0, 30, &config)], &config, FilterChain::new(), recorder).unwrap();
        pipeline.control().seek(0.0);
        pipeline.wait_for_output(0, Duration::from_secs(5)).unwrap();
        pipeline.shutdown();
        assert!(matches!(pipeline.request_reintegrate(), Err(PipelineError::Closed)));
    }

    const CAM_W: u32 = 64;
    const CAM_H: u32 = 48;
    const OUT_W: u32 = 96;
    const OUT_H: u32 = 72;
    const WALL_Z: f32 = 1.5;
    const WALL_COLOR: Rgba8 = Rgba8::opaque(200, 180, 150);

    fn wall_camera(index: usize, x: f32, config: &SessionConfig) -> Box<dyn FrameSource> {
        let scene = SyntheticScene {
            planes: vec![ScenePlane {
                point: Vec3::new(0.0, 0.0, WALL_Z),
                normal: Vec3::NEG_Z,
                color: WALL_COLOR,
                checker: 0.0,
            }],
            sphere: None,
        };
        let pose = look_at_model(Vec3::new(x, 1.0, 0.0), Vec3::new(x, 1.0, WALL_Z), Vec3::Y);
        let intr = PinholeIntrinsics::from_horizontal_fov(CAM_W, CAM_H, 60.0);
        let dec = SyntheticDecoder::new(scene, intr, pose)
            .with_frames(30, 30.0)
            .with_noise(1.0, index as u64 + 7);
        Box::new(RecordedSource::new(index, dec, pose, None, config).unwrap())
    }

    #[test]
    fn test_two_cameras_blend_into_seamless_wall() {
        let config = SessionConfig {
            autoplay: false,
            ..SessionConfig::default()
        };
        let params = SharedParams::new(BlendParams {
            working_width: CAM_W,
            working_height: CAM_H,
            should_clip: false,
            edge_radius: 3,
            kernel_radius: 2,
            ..BlendParams::default()
        });
        let sources = vec![wall_camera(0, -0.2, &config), wall_camera(1, 0.2, &config)];
        let pipeline = Pipeline::start(sources, &config, FilterChain::new(), Reconstructor::new(params.clone())).unwrap();
        pipeline.control().seek(0.0);
        let (_, scene) = pipeline.wait_for_output(0, Duration::from_secs(10)).unwrap();
        assert_eq!(scene.cameras.len(), 2);
        assert!(scene.excluded.is_empty());

        let mut compositor = BlendCompositor::new(params, OUT_W, OUT_H).unwrap();
        let view = ViewCamera::look_at(
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, WALL_Z),
            45.0,
            OUT_W as f32 / OUT_H as f32,
            0.1,
            10.0,
        );
        let frame = compositor.render(&scene, &[view]).unwrap();
        let out = frame.view(0).unwrap();
        assert!(out.coverage() > 0.9, "coverage {}", out.coverage());

        for y in 0..OUT_H {
            let mut previous: Option<f32> = None;
            for x in 0..OUT_W {
                if *out.weight_sum.get(x, y) == 0.0 {
                    previous = None;
                    continue;
                }
                assert!((out.weight_sum.get(x, y) - 1.0).abs() < 1e-4);
                let depth = *out.depth.get(x, y);
                assert!((depth - WALL_Z).abs() < 0.02, "depth {depth} at ({x}, {y})");
                if let Some(p) = previous {
                    assert!((depth - p).abs() < 0.01, "depth step at ({x}, {y})");
                }
                previous = Some(depth);

                let c = out.color.get(x, y);
                let close = |a: u8, b: u8| (a as i16 - b as i16).abs() <= 2;
                assert!(
                    close(c.r, WALL_COLOR.r) && close(c.g, WALL_COLOR.g) && close(c.b, WALL_COLOR.b),
                    "seam color {c:?} at ({x}, {y})"
                );
            }
        }
    }
}
