//! Persisted recordings
//!
//! A [`Recording`] is the long-lived artifact of a capture session: metadata,
//! an opaque initial-state snapshot, the compressed frame list, and the
//! playback window cutoffs. Recordings are serialized as JSON blobs and must
//! tolerate schema drift - loaders clamp defensively instead of throwing,
//! and every field deserializes from an older shape via serde defaults.

use bitflags::bitflags;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

use crate::frame::{Frame, total_ticks};

/// Fraction of the postflight cutoff the preflight cutoff must exceed for a
/// recording to count as snapshot-only. Kept at the historical value for
/// behavioral compatibility.
pub const SNAPSHOT_ONLY_MARGIN: f64 = 0.99;

bitflags! {
    /// Recording feature flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RecordingFlags: u8 {
        /// Playback of this recording must not mirror frames into a new capture
        const NO_RECAPTURE = 0b0000_0001;
        /// Frame list was materialized from a time-sight speculative window
        const TIME_SIGHT_WINDOW = 0b0000_0010;
    }
}

// Manual serde implementation so flags persist as their raw bits and unknown
// future bits are dropped instead of failing the load.
impl Serialize for RecordingFlags {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.bits().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RecordingFlags {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bits = u8::deserialize(deserializer)?;
        Ok(RecordingFlags::from_bits_truncate(bits))
    }
}

/// A captured session: metadata, initial snapshot, frames, playback window.
///
/// Owned by persistent storage. A live session holds at most one recording
/// being written and at most one being read; frames are never mutated after
/// the recording is finalized - cutoff edits touch only the window bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recording {
    /// Wall-clock time recording began
    pub started_at: DateTime<Utc>,
    /// Scene this recording belongs to
    pub scene: String,
    /// Opaque simulation parameters needed to rebuild the instance
    #[serde(default)]
    pub sim_params: serde_json::Value,
    /// Opaque blob of whatever the simulation exposes as initial state
    #[serde(default)]
    pub initial_snapshot: serde_json::Value,
    /// xxh3 checksum of the serialized initial snapshot
    #[serde(default)]
    pub snapshot_checksum: u64,
    /// Compressed frame list
    #[serde(default)]
    pub frames: Vec<Frame>,
    /// Total ticks represented, accounting for repeats
    #[serde(default)]
    pub tick_count: u64,
    /// Ticks executed synchronously before live-paced playback begins
    #[serde(default)]
    pub preflight_cutoff: u64,
    /// Tick index at which playback ends
    #[serde(default)]
    pub postflight_cutoff: u64,
    /// Preflight cutoff as originally captured; edits never touch this
    #[serde(default)]
    pub original_preflight_cutoff: u64,
    /// Zero live-simulated ticks; exists purely to restore the snapshot
    #[serde(default)]
    pub snapshot_only: bool,
    #[serde(default)]
    pub flags: RecordingFlags,
}

impl Recording {
    /// Checksum an initial-state snapshot the way recordings store it.
    pub fn checksum_snapshot(snapshot: &serde_json::Value) -> u64 {
        // Serialization is stable for a given value, so the checksum is too.
        match serde_json::to_vec(snapshot) {
            Ok(bytes) => xxh3_64(&bytes),
            Err(_) => 0,
        }
    }

    /// Whether the stored checksum still matches the stored snapshot.
    pub fn snapshot_intact(&self) -> bool {
        self.snapshot_checksum == Self::checksum_snapshot(&self.initial_snapshot)
    }

    /// Edit the playback window, clamping into range and re-deriving
    /// `snapshot_only`. Never touches `frames`, so edits are non-destructive
    /// and reversible via `original_preflight_cutoff`.
    pub fn edit_cutoffs(&mut self, preflight: u64, postflight: u64) {
        let postflight = postflight.min(self.tick_count);
        let preflight = preflight.min(postflight);
        self.preflight_cutoff = preflight;
        self.postflight_cutoff = postflight;
        self.snapshot_only = preflight as f64 > postflight as f64 * SNAPSHOT_ONLY_MARGIN;
    }

    /// Defensive repair pass for recordings loaded from storage.
    ///
    /// Recordings are long-lived artifacts that must tolerate schema drift:
    /// a tick count disagreeing with the frame list is re-derived, and
    /// out-of-range cutoffs are clamped rather than rejected.
    pub fn clamp_loaded(&mut self) {
        let derived = total_ticks(&self.frames);
        if self.tick_count != derived {
            tracing::warn!(
                scene = self.scene.as_str(),
                stored = self.tick_count,
                derived,
                "recording tick count disagrees with frame list; re-deriving"
            );
            self.tick_count = derived;
        }
        if self.postflight_cutoff > self.tick_count || self.preflight_cutoff > self.postflight_cutoff
        {
            let (pre, post) = (self.preflight_cutoff, self.postflight_cutoff);
            self.edit_cutoffs(pre, post);
            tracing::warn!(
                scene = self.scene.as_str(),
                "recording cutoffs were out of range; clamped to ({}, {})",
                self.preflight_cutoff,
                self.postflight_cutoff
            );
        }
        self.original_preflight_cutoff = self
            .original_preflight_cutoff
            .min(self.tick_count);
    }

    /// Playable tick count inside the current window.
    pub fn window_len(&self) -> u64 {
        self.postflight_cutoff.saturating_sub(self.preflight_cutoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::append_frame;

    fn recording(ticks: u64) -> Recording {
        let mut frames = Vec::new();
        for i in 0..ticks {
            // Alternate so the list does not collapse into one entry
            let frame = if i % 2 == 0 {
                Frame::held(["run"])
            } else {
                Frame::default()
            };
            append_frame(&mut frames, frame, false);
        }
        Recording {
            started_at: Utc::now(),
            scene: "level_1".to_string(),
            sim_params: serde_json::Value::Null,
            initial_snapshot: serde_json::json!({"x": 3}),
            snapshot_checksum: Recording::checksum_snapshot(&serde_json::json!({"x": 3})),
            frames,
            tick_count: ticks,
            preflight_cutoff: 0,
            postflight_cutoff: ticks,
            original_preflight_cutoff: 0,
            snapshot_only: false,
            flags: RecordingFlags::empty(),
        }
    }

    #[test]
    fn edit_cutoffs_clamps_and_orders() {
        let mut rec = recording(100);
        rec.edit_cutoffs(10, 50);
        assert_eq!((rec.preflight_cutoff, rec.postflight_cutoff), (10, 50));

        rec.edit_cutoffs(60, 50);
        assert_eq!((rec.preflight_cutoff, rec.postflight_cutoff), (50, 50));

        rec.edit_cutoffs(0, 500);
        assert_eq!((rec.preflight_cutoff, rec.postflight_cutoff), (0, 100));
    }

    #[test]
    fn snapshot_only_follows_the_margin() {
        let mut rec = recording(100);

        rec.edit_cutoffs(10, 50);
        assert!(!rec.snapshot_only);

        // 49 > 49.5 is false
        rec.edit_cutoffs(49, 50);
        assert!(!rec.snapshot_only);

        // 50 > 49.5 is true
        rec.edit_cutoffs(50, 50);
        assert!(rec.snapshot_only);
    }

    #[test]
    fn edits_never_touch_frames_and_are_reversible() {
        let mut rec = recording(100);
        let frames_before = rec.frames.clone();
        let original = rec.original_preflight_cutoff;

        rec.edit_cutoffs(30, 70);
        rec.edit_cutoffs(0, 100);

        assert_eq!(rec.frames, frames_before);
        assert_eq!(rec.original_preflight_cutoff, original);
    }

    #[test]
    fn clamp_loaded_rederives_tick_count() {
        let mut rec = recording(20);
        rec.tick_count = 999;
        rec.postflight_cutoff = 999;
        rec.clamp_loaded();

        assert_eq!(rec.tick_count, 20);
        assert_eq!(rec.postflight_cutoff, 20);
    }

    #[test]
    fn checksum_detects_snapshot_tampering() {
        let mut rec = recording(10);
        assert!(rec.snapshot_intact());

        rec.initial_snapshot = serde_json::json!({"x": 4});
        assert!(!rec.snapshot_intact());
    }

    #[test]
    fn recording_survives_a_serde_round_trip() {
        let rec = recording(30);
        let json = serde_json::to_value(&rec).unwrap();
        let back: Recording = serde_json::from_value(json).unwrap();

        assert_eq!(back.tick_count, rec.tick_count);
        assert_eq!(back.frames, rec.frames);
        assert_eq!(back.snapshot_checksum, rec.snapshot_checksum);
    }

    #[test]
    fn older_schema_without_new_fields_still_loads() {
        let json = serde_json::json!({
            "started_at": "2026-01-04T10:00:00Z",
            "scene": "level_1",
        });
        let mut rec: Recording = serde_json::from_value(json).unwrap();
        rec.clamp_loaded();

        assert_eq!(rec.tick_count, 0);
        assert!(rec.frames.is_empty());
        assert_eq!(rec.flags, RecordingFlags::empty());
    }
}
