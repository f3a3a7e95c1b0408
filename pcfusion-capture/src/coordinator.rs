//! Producer thread driving all frame sources along one timeline.

use crate::config::SessionConfig;
use crate::source::{CaptureError, FrameSource};
use crate::timeline::{Pacing, PlaybackState, TickAction, Timeline};
use pcfusion_data::FrameTuple;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Poll interval after an emission in frame-skipping mode.
const FRAME_SKIP_POLL: Duration = Duration::from_millis(25);
/// Poll interval after an emission in lockstep mode.
const LOCKSTEP_POLL: Duration = Duration::from_millis(1);
/// Poll interval while paused or idle.
const PAUSED_POLL: Duration = Duration::from_millis(50);

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Resolves every source at a cursor and packs the results into a tuple.
pub struct TupleAssembler {
    sources: Vec<Box<dyn FrameSource>>,
    next_sequence: u64,
}

impl TupleAssembler {
    pub fn new(sources: Vec<Box<dyn FrameSource>>) -> Self {
        Self {
            sources,
            next_sequence: 1,
        }
    }

    pub fn sources(&self) -> &[Box<dyn FrameSource>] {
        &self.sources
    }

    /// Frame index of the reference camera after the last `assemble`.
    pub fn reference_frame(&self) -> Option<usize> {
        self.sources.first().and_then(|s| s.current_frame())
    }

    pub fn assemble(&mut self, cursor: f64) -> FrameTuple {
        let mut frames = Vec::with_capacity(self.sources.len());
        let mut complete = true;
        for source in &mut self.sources {
            match source.resolve(cursor) {
                Some(frame) => frames.push(frame),
                None => {
                    complete = false;
                    debug!(camera = source.camera_index(), cursor, "camera did not resolve");
                }
            }
        }
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        trace!(sequence, cursor, cameras = frames.len(), complete, "assembled tuple");
        FrameTuple::new(sequence, cursor, complete, frames)
    }
}

/// Thread-safe handle to the playback controls.
#[derive(Clone)]
pub struct StreamControl {
    timeline: Arc<Mutex<Timeline>>,
    processing_ms: Arc<Mutex<f32>>,
}

impl StreamControl {
    pub fn play(&self) {
        lock(&self.timeline).play();
    }

    pub fn pause(&self) {
        lock(&self.timeline).pause();
    }

    pub fn toggle(&self) {
        lock(&self.timeline).toggle();
    }

    pub fn seek(&self, t: f64) {
        lock(&self.timeline).seek(t);
    }

    /// Step by whole frames of camera 0. Returns false if the target is out of range.
    pub fn step(&self, delta: i64) -> bool {
        lock(&self.timeline).step(delta)
    }

    pub fn set_looping(&self, looping: bool) {
        lock(&self.timeline).set_looping(looping);
    }

    pub fn set_pacing(&self, pacing: Pacing) {
        lock(&self.timeline).set_pacing(pacing);
    }

    pub fn pacing(&self) -> Pacing {
        lock(&self.timeline).pacing()
    }

    pub fn state(&self) -> PlaybackState {
        lock(&self.timeline).state()
    }

    pub fn is_playing(&self) -> bool {
        lock(&self.timeline).is_playing()
    }

    pub fn cursor(&self) -> f64 {
        lock(&self.timeline).cursor()
    }

    pub fn total_time(&self) -> f64 {
        lock(&self.timeline).total_time()
    }

    /// Smoothed time spent resolving one tuple, in milliseconds.
    pub fn processing_time_ms(&self) -> f32 {
        *lock(&self.processing_ms)
    }
}

/// Owns the acquisition thread.
///
/// The callback receives each tuple with the pacing that was in effect when it
/// was emitted.
///
/// Dropping the coordinator stops and joins the thread. If the tuple callback
/// can block (lockstep handoff), the consumer side must be closed first so the
/// callback returns.
pub struct StreamCoordinator {
    control: StreamControl,
    stop_signal: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl StreamCoordinator {
    pub fn start<F>(sources: Vec<Box<dyn FrameSource>>, config: &SessionConfig, mut on_tuple: F) -> Result<Self, CaptureError>
    where
        F: FnMut(FrameTuple, Pacing) + Send + 'static,
    {
        let reference = sources.first().ok_or(CaptureError::NoSources)?;
        let mut timeline = Timeline::new(reference.timestamps().to_vec(), config.looping, config.pacing);
        if config.autoplay {
            timeline.play();
        }
        info!(
            cameras = sources.len(),
            total_time = timeline.total_time(),
            pacing = ?config.pacing,
            "Starting stream coordinator"
        );

        let control = StreamControl {
            timeline: Arc::new(Mutex::new(timeline)),
            processing_ms: Arc::new(Mutex::new(0.0)),
        };
        let stop_signal = Arc::new(AtomicBool::new(false));

        let thread_control = control.clone();
        let thread_stop = Arc::clone(&stop_signal);
        let mut assembler = TupleAssembler::new(sources);

        let thread_handle = thread::Builder::new()
            .name("pcfusion-stream".into())
            .spawn(move || {
                debug!("Stream thread started");
                let mut last_tick = Instant::now();
                while !thread_stop.load(Ordering::SeqCst) {
                    let now = Instant::now();
                    let wall_delta = now.duration_since(last_tick).as_secs_f64();
                    last_tick = now;

                    let (action, pacing) = {
                        let mut timeline = lock(&thread_control.timeline);
                        (timeline.tick(wall_delta), timeline.pacing())
                    };

                    let cursor = match action {
                        TickAction::Wait => {
                            thread::sleep(PAUSED_POLL);
                            continue;
                        }
                        TickAction::Emit(cursor) => cursor,
                    };

                    let started = Instant::now();
                    let tuple = assembler.assemble(cursor);
                    lock(&thread_control.timeline).set_reference_frame(assembler.reference_frame());
                    {
                        let ms = started.elapsed().as_secs_f32() * 1000.0;
                        let mut ema = lock(&thread_control.processing_ms);
                        *ema = ms * 0.1 + *ema * 0.9;
                    }
                    if !tuple.complete {
                        warn!(sequence = tuple.sequence, cursor, "Incomplete frame tuple");
                    }
                    on_tuple(tuple, pacing);

                    thread::sleep(match pacing {
                        Pacing::FrameSkipping => FRAME_SKIP_POLL,
                        Pacing::Lockstep => LOCKSTEP_POLL,
                    });
                }
                info!("Stream thread exiting");
            })?;

        Ok(Self {
            control,
            stop_signal,
            thread_handle: Some(thread_handle),
        })
    }

    pub fn control(&self) -> StreamControl {
        self.control.clone()
    }

    /// Signal the thread to stop without waiting.
    pub fn request_stop(&self) {
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop and wait for the thread to finish.
    pub fn stop(&mut self) {
        self.request_stop();
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                warn!("Stream thread panicked");
            }
        }
    }
}

impl Drop for StreamCoordinator {
    fn drop(&mut self) {
        self.stop();
    }
}
