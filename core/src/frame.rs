//! Per-tick captured input state
//!
//! A [`Frame`] is one tick's worth of sampled input: the set of held command
//! names (sparse - absent means not held), any pointer events, and the
//! identifiers of out-of-band actions invoked that tick. Frames are immutable
//! once appended to a recording.
//!
//! Idle and held-steady ticks dominate typical sessions, so consecutive
//! identical frames are collapsed into a single entry with a repeat count.
//! This is the only compression mechanism; it preserves exact tick counts.

use glam::Vec2;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeSet;

/// A pointer event captured during one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointerEvent {
    /// Event name (e.g. "press", "release", "move")
    pub name: String,
    /// Pointer x position in scene coordinates
    pub x: f32,
    /// Pointer y position in scene coordinates
    pub y: f32,
}

impl PointerEvent {
    /// Position as a vector
    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }
}

/// One tick's worth of captured input state.
///
/// `repeats > 0` means this frame stands for `repeats + 1` identical
/// consecutive ticks. A frame carrying pointer events or executed-prop
/// entries is never compressed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Held command names this tick (sparse - absent means not held)
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub commands: BTreeSet<String>,
    /// Pointer events queued during this tick, in arrival order
    #[serde(default, skip_serializing_if = "SmallVec::is_empty")]
    pub pointer_events: SmallVec<[PointerEvent; 2]>,
    /// Identifiers of out-of-band actions invoked this tick, in order
    #[serde(default, skip_serializing_if = "SmallVec::is_empty")]
    pub executed_props: SmallVec<[String; 2]>,
    /// Number of additional identical ticks this frame stands for
    #[serde(default, skip_serializing_if = "is_zero")]
    pub repeats: u32,
}

fn is_zero(v: &u32) -> bool {
    *v == 0
}

impl Frame {
    /// Frame holding the given commands and nothing else
    pub fn held<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            commands: commands.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Number of ticks this frame stands for
    pub fn tick_span(&self) -> u64 {
        u64::from(self.repeats) + 1
    }

    /// Whether this frame may take part in repeat compression.
    ///
    /// Pointer events and executed props are ordered, one-shot payloads;
    /// a frame carrying either always forces a new entry.
    pub fn compressible(&self) -> bool {
        self.pointer_events.is_empty() && self.executed_props.is_empty()
    }

    /// Field-for-field equality ignoring the repeat count
    pub fn same_content(&self, other: &Frame) -> bool {
        self.commands == other.commands
            && self.pointer_events == other.pointer_events
            && self.executed_props == other.executed_props
    }
}

/// Append `frame` to `list`, collapsing it into the previous entry when it is
/// identical (ignoring repeat count), both entries are compressible, and
/// `suppress_repeat` is false.
///
/// Returns true when the frame was folded into the previous entry. Must be
/// applied identically whether frames originate from live capture or from a
/// nested speculative capture, or replay timing drifts.
pub fn append_frame(list: &mut Vec<Frame>, frame: Frame, suppress_repeat: bool) -> bool {
    if !suppress_repeat
        && frame.compressible()
        && let Some(last) = list.last_mut()
        && last.compressible()
        && last.same_content(&frame)
    {
        last.repeats += 1;
        return true;
    }
    list.push(frame);
    false
}

/// Total number of ticks a frame list stands for, accounting for repeats.
pub fn total_ticks(list: &[Frame]) -> u64 {
    list.iter().map(Frame::tick_span).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn identical_frames_collapse_into_one_entry() {
        let mut list = Vec::new();
        for _ in 0..5 {
            append_frame(&mut list, Frame::held(["jump"]), false);
        }

        assert_eq!(list.len(), 1);
        assert_eq!(list[0].repeats, 4);
        assert_eq!(total_ticks(&list), 5);
    }

    #[test]
    fn differing_commands_break_the_run() {
        let mut list = Vec::new();
        append_frame(&mut list, Frame::held(["jump"]), false);
        append_frame(&mut list, Frame::held(["jump"]), false);
        append_frame(&mut list, Frame::held(["left"]), false);
        append_frame(&mut list, Frame::held(["left"]), false);

        assert_eq!(list.len(), 2);
        assert_eq!(list[0].repeats, 1);
        assert_eq!(list[1].repeats, 1);
        assert_eq!(total_ticks(&list), 4);
    }

    #[test]
    fn pointer_events_force_a_new_entry() {
        let mut list = Vec::new();
        append_frame(&mut list, Frame::held(["jump"]), false);

        let mut with_pointer = Frame::held(["jump"]);
        with_pointer.pointer_events = smallvec![PointerEvent {
            name: "press".to_string(),
            x: 4.0,
            y: 8.0,
        }];
        append_frame(&mut list, with_pointer, false);
        // A frame after an uncompressible one starts a fresh run
        append_frame(&mut list, Frame::held(["jump"]), false);

        assert_eq!(list.len(), 3);
        assert_eq!(total_ticks(&list), 3);
    }

    #[test]
    fn executed_props_force_a_new_entry() {
        let mut list = Vec::new();
        let mut with_prop = Frame::default();
        with_prop.executed_props = smallvec!["door.open".to_string()];

        append_frame(&mut list, Frame::default(), false);
        append_frame(&mut list, with_prop, false);
        append_frame(&mut list, Frame::default(), false);

        assert_eq!(list.len(), 3);
    }

    #[test]
    fn suppress_repeat_disables_compression() {
        let mut list = Vec::new();
        append_frame(&mut list, Frame::held(["jump"]), true);
        append_frame(&mut list, Frame::held(["jump"]), true);

        assert_eq!(list.len(), 2);
        assert_eq!(total_ticks(&list), 2);
    }

    #[test]
    fn frame_serde_is_sparse() {
        let frame = Frame::held(["jump"]);
        let json = serde_json::to_string(&frame).unwrap();
        assert!(!json.contains("pointer_events"));
        assert!(!json.contains("repeats"));

        let back: Frame = serde_json::from_str(&json).unwrap();
        assert_eq!(back, frame);
    }
}
