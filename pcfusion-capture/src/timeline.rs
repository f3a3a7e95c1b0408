//! Shared playback timeline.
//!
//! Pure state machine: the coordinator thread calls [`Timeline::tick`] once per
//! iteration, control calls come from any thread through a mutex.
//!
//! ```text
//! Idle -> Playing <-> Paused
//!            \          |
//!             -> Seeking <-
//!                  |
//!                  -> Playing / Paused (whichever was active before the seek)
//! ```

use serde::{Deserialize, Serialize};
use tracing::debug;

/// How the cursor advances while playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pacing {
    /// Advance by measured wall-clock time. Never waits on the consumer, may skip frames.
    #[default]
    FrameSkipping,
    /// Advance by exactly the reference camera's next inter-frame delta.
    Lockstep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
    /// A cursor jump is pending; one tuple is emitted before `resume` is restored.
    Seeking { resume_playing: bool },
}

/// What the coordinator should do after a tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickAction {
    /// Nothing to emit this iteration.
    Wait,
    /// Resolve every camera at this cursor and emit the tuple.
    Emit(f64),
}

/// Added to the lockstep delta so the next query lands strictly past the current frame.
const LOCKSTEP_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct Timeline {
    state: PlaybackState,
    cursor: f64,
    looping: bool,
    pacing: Pacing,
    /// Relative timestamps of the reference camera (camera 0).
    reference: Vec<f64>,
    reference_frame: Option<usize>,
    last_emitted: Option<f64>,
}

impl Timeline {
    pub fn new(reference_timestamps: Vec<f64>, looping: bool, pacing: Pacing) -> Self {
        Self {
            state: PlaybackState::Idle,
            cursor: 0.0,
            looping,
            pacing,
            reference: reference_timestamps,
            reference_frame: None,
            last_emitted: None,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    pub fn total_time(&self) -> f64 {
        self.reference.last().copied().unwrap_or(0.0)
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn pacing(&self) -> Pacing {
        self.pacing
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub fn set_pacing(&mut self, pacing: Pacing) {
        self.pacing = pacing;
    }

    pub fn is_playing(&self) -> bool {
        matches!(
            self.state,
            PlaybackState::Playing | PlaybackState::Seeking { resume_playing: true }
        )
    }

    pub fn play(&mut self) {
        self.state = match self.state {
            PlaybackState::Seeking { .. } => PlaybackState::Seeking { resume_playing: true },
            _ => PlaybackState::Playing,
        };
    }

    pub fn pause(&mut self) {
        self.state = match self.state {
            PlaybackState::Seeking { .. } => PlaybackState::Seeking { resume_playing: false },
            PlaybackState::Playing => PlaybackState::Paused,
            other => other,
        };
    }

    pub fn toggle(&mut self) {
        if self.is_playing() {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Jump the cursor; the next tick emits exactly one tuple at the new position.
    pub fn seek(&mut self, t: f64) {
        self.cursor = t.clamp(0.0, self.total_time());
        self.state = PlaybackState::Seeking {
            resume_playing: self.is_playing(),
        };
        debug!(cursor = self.cursor, "seek");
    }

    /// Move by whole frames of the reference camera. Out-of-range steps are ignored.
    pub fn step(&mut self, delta: i64) -> bool {
        let current = self.reference_frame.unwrap_or(0) as i64;
        let target = current + delta;
        if target < 0 || target >= self.reference.len() as i64 {
            return false;
        }
        let t = self.reference[target as usize] - self.reference[0];
        self.seek(t);
        true
    }

    /// Record which reference frame the last emission resolved to.
    pub fn set_reference_frame(&mut self, frame: Option<usize>) {
        if frame.is_some() {
            self.reference_frame = frame;
        }
    }

    pub fn reference_frame(&self) -> Option<usize> {
        self.reference_frame
    }

    fn next_reference_delta(&self) -> Option<f64> {
        let i = self.reference_frame.unwrap_or(0);
        match (self.reference.get(i), self.reference.get(i + 1)) {
            (Some(a), Some(b)) => Some(b - a),
            _ => None,
        }
    }

    /// Advance one iteration. `wall_delta` is the wall-clock time since the previous tick.
    pub fn tick(&mut self, wall_delta: f64) -> TickAction {
        match self.state {
            PlaybackState::Idle => TickAction::Wait,
            PlaybackState::Seeking { resume_playing } => {
                self.state = if resume_playing {
                    PlaybackState::Playing
                } else {
                    PlaybackState::Paused
                };
                self.emit()
            }
            PlaybackState::Paused => {
                // cursor moved while paused (overrun reset, external change): refresh once
                if self.last_emitted != Some(self.cursor) {
                    self.emit()
                } else {
                    TickAction::Wait
                }
            }
            PlaybackState::Playing => {
                let advance = match self.pacing {
                    Pacing::FrameSkipping => wall_delta,
                    Pacing::Lockstep => self.next_reference_delta().unwrap_or(wall_delta) + LOCKSTEP_EPSILON,
                };
                self.cursor += advance.max(0.0);

                if self.cursor > self.total_time() {
                    self.cursor = 0.0;
                    self.reference_frame = None;
                    if !self.looping {
                        debug!("end of recording reached, pausing");
                        self.state = PlaybackState::Paused;
                        return TickAction::Wait;
                    }
                    debug!("end of recording reached, looping");
                }
                self.emit()
            }
        }
    }

    fn emit(&mut self) -> TickAction {
        self.last_emitted = Some(self.cursor);
        TickAction::Emit(self.cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timeline(looping: bool, pacing: Pacing) -> Timeline {
        // 10 frames at 10 fps
        Timeline::new((0..10).map(|i| i as f64 * 0.1).collect(), looping, pacing)
    }

    #[test]
    fn test_idle_until_played() {
        let mut t = timeline(true, Pacing::FrameSkipping);
        assert_eq!(t.tick(0.05), TickAction::Wait);
        t.play();
        assert_eq!(t.tick(0.05), TickAction::Emit(0.05));
        assert_eq!(t.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_frame_skipping_advances_by_wall_clock() {
        let mut t = timeline(true, Pacing::FrameSkipping);
        t.play();
        t.tick(0.25);
        assert!((t.cursor() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_lockstep_advances_by_frame_delta() {
        let mut t = timeline(true, Pacing::Lockstep);
        t.play();
        t.set_reference_frame(Some(3));
        let TickAction::Emit(c) = t.tick(5.0) else {
            panic!("expected emission");
        };
        assert!((c - (0.1 + LOCKSTEP_EPSILON)).abs() < 1e-9);
    }

    #[test]
    fn test_overrun_wraps_when_looping() {
        let mut t = timeline(true, Pacing::FrameSkipping);
        t.play();
        t.tick(0.85);
        assert_eq!(t.tick(0.1), TickAction::Emit(0.0));
        assert_eq!(t.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_overrun_pauses_and_refreshes_once_when_not_looping() {
        let mut t = timeline(false, Pacing::FrameSkipping);
        t.play();
        t.tick(0.85);
        assert_eq!(t.tick(0.1), TickAction::Wait);
        assert_eq!(t.state(), PlaybackState::Paused);
        assert_eq!(t.tick(0.1), TickAction::Emit(0.0));
        assert_eq!(t.tick(0.1), TickAction::Wait);
        assert_eq!(t.tick(0.1), TickAction::Wait);
    }

    #[test]
    fn test_seek_while_paused_emits_exactly_once() {
        let mut t = timeline(true, Pacing::FrameSkipping);
        t.play();
        t.tick(0.1);
        t.pause();
        assert_eq!(t.tick(0.1), TickAction::Wait);
        t.seek(0.5);
        assert!(matches!(t.state(), PlaybackState::Seeking { resume_playing: false }));
        assert_eq!(t.tick(0.1), TickAction::Emit(0.5));
        assert_eq!(t.state(), PlaybackState::Paused);
        assert_eq!(t.tick(0.1), TickAction::Wait);
    }

    #[test]
    fn test_seek_while_playing_resumes_playing() {
        let mut t = timeline(true, Pacing::FrameSkipping);
        t.play();
        t.seek(0.4);
        assert_eq!(t.tick(0.1), TickAction::Emit(0.4));
        assert_eq!(t.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_seek_clamps_to_duration() {
        let mut t = timeline(true, Pacing::FrameSkipping);
        t.seek(42.0);
        assert!((t.cursor() - 0.9).abs() < 1e-12);
        t.seek(-1.0);
        assert_eq!(t.cursor(), 0.0);
    }

    #[test]
    fn test_step_uses_reference_timestamps() {
        let mut t = timeline(true, Pacing::FrameSkipping);
        t.set_reference_frame(Some(4));
        assert!(t.step(1));
        assert!((t.cursor() - 0.5).abs() < 1e-12);
        t.set_reference_frame(Some(5));
        assert!(t.step(-2));
        assert!((t.cursor() - 0.3).abs() < 1e-12);
        assert!(!t.step(-10));
    }

    #[test]
    fn test_toggle() {
        let mut t = timeline(true, Pacing::FrameSkipping);
        t.toggle();
        assert!(t.is_playing());
        t.toggle();
        assert_eq!(t.state(), PlaybackState::Paused);
    }
}
