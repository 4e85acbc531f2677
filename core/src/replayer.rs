//! Replay playback state machine
//!
//! Drives command state from a stored [`Recording`] tick by tick. The
//! replayer owns the playback cursor and the repeat-run expansion; pacing,
//! live-input merging and the simulation step stay with the session so the
//! simulation cannot distinguish live play from playback.
//!
//! ```text
//! Idle -> Preflighting -> Live -> (Ended | Stopped)
//! ```
//!
//! Preflighting executes synchronously with no real-time pacing; a recording
//! may specify a playback window entirely before the normal visible range,
//! in which case the preflight loop exits at the postflight cutoff instead.

use std::sync::Arc;
use thiserror::Error;

use crate::frame::Frame;
use crate::recording::Recording;

/// Errors raised by playback control.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("a replay is already in progress")]
    ReplayActive,
    #[error("a recording is already in progress")]
    RecordingActive,
    #[error("no stored recording for scene `{0}`")]
    NoRecording(String),
    #[error("failed to restore the initial snapshot: {0}")]
    Restore(String),
    #[error("failed to create the time-sight target: {0}")]
    TargetCreate(String),
    #[error("scheduler suspended after {0} consecutive simulation faults")]
    Suspended(u32),
}

/// Playback phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayPhase {
    /// No replay loaded
    Idle,
    /// Free-running synchronously up to the preflight cutoff
    Preflighting,
    /// Paced by the real-time scheduler
    Live,
    /// Cursor exhausted or postflight cutoff reached
    Ended,
    /// Cancelled by the operator
    Stopped,
}

/// Transient playback cursor, owned by exactly one replayer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayCursor {
    /// Index into the compressed frame list
    pub frame_index: usize,
    /// Ticks already emitted from the current repeated frame
    pub repeat_run: u32,
    /// Total ticks emitted so far
    pub ticks_emitted: u64,
}

/// Replays a recording through the command state bank.
#[derive(Debug, Default)]
pub struct Replayer {
    recording: Option<Arc<Recording>>,
    cursor: ReplayCursor,
    phase: Option<ReplayPhase>,
}

impl Replayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> ReplayPhase {
        self.phase.unwrap_or(ReplayPhase::Idle)
    }

    /// Whether frames are still being injected.
    pub fn is_playing(&self) -> bool {
        matches!(
            self.phase(),
            ReplayPhase::Preflighting | ReplayPhase::Live
        )
    }

    pub fn cursor(&self) -> ReplayCursor {
        self.cursor
    }

    /// The recording being played, while playback is active.
    pub fn recording(&self) -> Option<&Arc<Recording>> {
        self.recording.as_ref()
    }

    /// Load a recording and reset the cursor.
    ///
    /// Enters `Preflighting` when the recording asks for one, `Live`
    /// otherwise. The caller runs the actual preflight loop.
    pub fn begin(&mut self, recording: Arc<Recording>) -> ReplayPhase {
        self.cursor = ReplayCursor::default();
        let phase = if recording.preflight_cutoff > 0 {
            ReplayPhase::Preflighting
        } else {
            ReplayPhase::Live
        };
        tracing::info!(
            scene = recording.scene.as_str(),
            ticks = recording.tick_count,
            preflight = recording.preflight_cutoff,
            postflight = recording.postflight_cutoff,
            "replay started"
        );
        self.recording = Some(recording);
        self.phase = Some(phase);
        phase
    }

    /// Whether the preflight loop should keep free-running.
    pub fn in_preflight(&self) -> bool {
        if self.phase() != ReplayPhase::Preflighting {
            return false;
        }
        let Some(rec) = &self.recording else {
            return false;
        };
        self.cursor.ticks_emitted < rec.preflight_cutoff
            && self.cursor.ticks_emitted < rec.postflight_cutoff
    }

    /// Leave `Preflighting` for `Live`.
    pub fn finish_preflight(&mut self) {
        if self.phase() == ReplayPhase::Preflighting {
            self.phase = Some(ReplayPhase::Live);
        }
    }

    /// Supply the next frame, or signal end-of-replay.
    ///
    /// Walks the compressed frame list, expanding repeat runs so each call
    /// stands for exactly one tick. Returns None - transitioning to `Ended` -
    /// once the cursor is exhausted or the postflight cutoff is reached.
    pub fn inject_next(&mut self) -> Option<Frame> {
        let rec = self.recording.as_ref()?;
        if !self.is_playing() {
            return None;
        }

        if self.cursor.frame_index >= rec.frames.len()
            || self.cursor.ticks_emitted >= rec.postflight_cutoff
        {
            self.phase = Some(ReplayPhase::Ended);
            return None;
        }

        let frame = rec.frames[self.cursor.frame_index].clone();
        if frame.repeats > 0 {
            self.cursor.repeat_run += 1;
            if self.cursor.repeat_run > frame.repeats {
                self.cursor.frame_index += 1;
                self.cursor.repeat_run = 0;
            }
        } else {
            self.cursor.frame_index += 1;
        }
        self.cursor.ticks_emitted += 1;
        Some(frame)
    }

    /// True once the cursor is exhausted: the next `inject_next` call would
    /// transition to `Ended`. Checked right after an injection, this marks
    /// the tick just emitted as the final one.
    pub fn at_end(&self) -> bool {
        let Some(rec) = &self.recording else {
            return false;
        };
        if !self.is_playing() {
            return true;
        }
        self.cursor.frame_index >= rec.frames.len()
            || self.cursor.ticks_emitted >= rec.postflight_cutoff
    }

    /// Cancel playback. Always safe; the cursor is discarded.
    pub fn stop(&mut self) {
        if self.recording.is_some() {
            tracing::info!(ticks_emitted = self.cursor.ticks_emitted, "replay stopped");
        }
        self.phase = Some(ReplayPhase::Stopped);
        self.recording = None;
        self.cursor = ReplayCursor::default();
    }

    /// Drop a finished replay back to `Idle`.
    pub fn clear(&mut self) {
        self.phase = None;
        self.recording = None;
        self.cursor = ReplayCursor::default();
    }

    /// Playback progress in `0.0..=1.0` of the postflight window.
    pub fn progress(&self) -> f32 {
        let Some(rec) = &self.recording else {
            return 0.0;
        };
        if rec.postflight_cutoff == 0 {
            return 0.0;
        }
        (self.cursor.ticks_emitted as f32 / rec.postflight_cutoff as f32).min(1.0)
    }
}
