//! Smoothed stage timings and tuple counters.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Weight of the newest sample in the moving averages.
pub const EMA_ALPHA: f32 = 0.1;

#[inline]
fn ema(old: f32, sample: Duration) -> f32 {
    sample.as_secs_f32() * 1000.0 * EMA_ALPHA + old * (1.0 - EMA_ALPHA)
}

/// A copy of the current telemetry. Timings are in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TelemetrySnapshot {
    pub streaming_ms: f32,
    pub filter_ms: f32,
    pub integration_ms: f32,
    pub render_ms: f32,
    /// Tuples that went through the engine.
    pub processed: u64,
    /// Tuples overwritten in the handoff before the pipeline took them.
    pub dropped: u64,
    /// Incomplete tuples received.
    pub incomplete: u64,
    /// Incomplete tuples not integrated.
    pub skipped: u64,
}

#[derive(Debug, Default)]
pub struct Telemetry {
    inner: Mutex<TelemetrySnapshot>,
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TelemetrySnapshot> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_filter(&self, elapsed: Duration) {
        let mut t = self.lock();
        t.filter_ms = ema(t.filter_ms, elapsed);
    }

    pub fn record_integration(&self, elapsed: Duration) {
        let mut t = self.lock();
        t.integration_ms = ema(t.integration_ms, elapsed);
        t.processed += 1;
    }

    pub fn record_render(&self, elapsed: Duration) {
        let mut t = self.lock();
        t.render_ms = ema(t.render_ms, elapsed);
    }

    pub fn set_streaming_ms(&self, ms: f32) {
        self.lock().streaming_ms = ms;
    }

    pub fn add_dropped(&self, n: u64) {
        self.lock().dropped += n;
    }

    pub fn add_incomplete(&self, skipped: bool) {
        let mut t = self.lock();
        t.incomplete += 1;
        if skipped {
            t.skipped += 1;
        }
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        *self.lock()
    }
}
