//! Recorder
//!
//! Accumulates sampled frames into a [`Recording`]. The recorder mirrors
//! every frame the attached scene consumes - independent of, and in addition
//! to, that scene's own debug capture list - and finalizes the playback
//! window when stopped. Only one recording may be active per session.

use chrono::{DateTime, Utc};

use crate::frame::{Frame, append_frame};
use crate::recording::{Recording, RecordingFlags};

/// Metadata supplied when a recording begins.
#[derive(Debug, Clone)]
pub struct RecordingMeta {
    /// Scene identifier the recording belongs to
    pub scene: String,
    /// Opaque simulation parameters needed to rebuild the instance
    pub sim_params: serde_json::Value,
    /// Stop immediately after the first tick, keeping zero frames; the
    /// recording then exists purely to carry the initial snapshot
    pub snapshot_only: bool,
}

impl RecordingMeta {
    pub fn new(scene: impl Into<String>) -> Self {
        Self {
            scene: scene.into(),
            sim_params: serde_json::Value::Null,
            snapshot_only: false,
        }
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.sim_params = params;
        self
    }

    pub fn snapshot_only(mut self) -> Self {
        self.snapshot_only = true;
        self
    }
}

/// Accumulates frames into a recording until stopped.
#[derive(Debug, Default)]
pub struct Recorder {
    recording: Option<Recording>,
    snapshot_only: bool,
    done: bool,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a recording is currently accepting frames.
    pub fn is_recording(&self) -> bool {
        self.recording.is_some() && !self.done
    }

    /// Whether a recording exists, finished or not.
    pub fn is_active(&self) -> bool {
        self.recording.is_some()
    }

    /// Begin a new recording.
    ///
    /// `initial_snapshot` is whatever the simulation exposes as restorable
    /// state, captured before the first mirrored tick. `origin_tick` is the
    /// attached scene's tick counter at begin time.
    pub fn begin(
        &mut self,
        meta: RecordingMeta,
        initial_snapshot: serde_json::Value,
        origin_tick: u64,
        started_at: DateTime<Utc>,
    ) {
        tracing::info!(
            scene = meta.scene.as_str(),
            origin_tick,
            snapshot_only = meta.snapshot_only,
            "recording started"
        );
        let snapshot_checksum = Recording::checksum_snapshot(&initial_snapshot);
        self.snapshot_only = meta.snapshot_only;
        self.done = false;
        self.recording = Some(Recording {
            started_at,
            scene: meta.scene,
            sim_params: meta.sim_params,
            initial_snapshot,
            snapshot_checksum,
            frames: Vec::new(),
            tick_count: 0,
            preflight_cutoff: 0,
            postflight_cutoff: 0,
            original_preflight_cutoff: 0,
            snapshot_only: meta.snapshot_only,
            flags: RecordingFlags::empty(),
        });
    }

    /// Mirror one consumed frame into the recording.
    ///
    /// Snapshot-only recordings stop after their first tick without keeping
    /// any frame material.
    pub fn mirror(&mut self, frame: &Frame) {
        if self.done {
            return;
        }
        let Some(recording) = &mut self.recording else {
            return;
        };

        if self.snapshot_only {
            self.done = true;
            return;
        }

        append_frame(&mut recording.frames, frame.clone(), false);
        recording.tick_count += 1;
    }

    /// Finalize and hand the recording over for persistence.
    ///
    /// Returns None when nothing was being recorded.
    pub fn stop(&mut self) -> Option<Recording> {
        let mut recording = self.recording.take()?;
        recording.postflight_cutoff = recording.tick_count;
        self.done = false;
        tracing::info!(
            scene = recording.scene.as_str(),
            ticks = recording.tick_count,
            frames = recording.frames.len(),
            "recording stopped"
        );
        Some(recording)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirrored_frames_compress_and_count_ticks() {
        let mut recorder = Recorder::new();
        recorder.begin(
            RecordingMeta::new("level_1"),
            serde_json::json!({"x": 1}),
            0,
            Utc::now(),
        );
        assert!(recorder.is_recording());

        for _ in 0..10 {
            recorder.mirror(&Frame::held(["run"]));
        }
        recorder.mirror(&Frame::default());

        let rec = recorder.stop().unwrap();
        assert_eq!(rec.tick_count, 11);
        assert_eq!(rec.frames.len(), 2);
        assert_eq!(rec.postflight_cutoff, 11);
        assert!(!recorder.is_recording());
    }

    #[test]
    fn snapshot_only_keeps_zero_frames() {
        let mut recorder = Recorder::new();
        recorder.begin(
            RecordingMeta::new("level_1").snapshot_only(),
            serde_json::json!({"x": 2}),
            0,
            Utc::now(),
        );

        recorder.mirror(&Frame::held(["run"]));
        assert!(!recorder.is_recording());
        // Frames after the first tick are dropped too
        recorder.mirror(&Frame::held(["run"]));

        let rec = recorder.stop().unwrap();
        assert!(rec.snapshot_only);
        assert!(rec.frames.is_empty());
        assert_eq!(rec.tick_count, 0);
        assert!(rec.snapshot_intact());
    }

    #[test]
    fn stop_without_begin_returns_none() {
        let mut recorder = Recorder::new();
        assert!(recorder.stop().is_none());
    }
}
