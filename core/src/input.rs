//! Physical input polling abstraction
//!
//! The engine never talks to a windowing or gamepad layer directly; the
//! platform supplies an [`InputPoller`] with boolean/float reads plus queues
//! for pointer events and out-of-band action identifiers. [`ManualPoller`]
//! is a stateful implementation for headless runs and tests.

use glam::Vec2;
use hashbrown::{HashMap, HashSet};
use std::collections::VecDeque;

use crate::frame::PointerEvent;
use crate::spec::StickAxis;

/// Minimum stick magnitude before an axis registers at all.
pub const STICK_THRESHOLD: f32 = 0.2;

/// Dominant-axis magnitude above which the minor axis is snapped to zero.
pub const STICK_SNAP: f32 = 0.9;

/// Physical input reads supplied by the platform layer.
///
/// Drain methods hand over everything queued since the previous tick;
/// sampling calls each of them at most once per tick.
pub trait InputPoller {
    /// Whether the named keyboard key is down
    fn key_down(&self, code: &str) -> bool;
    /// Whether the named gamepad button is down
    fn pad_button_down(&self, button: &str) -> bool;
    /// Raw axis value in -1.0..=1.0, before thresholding
    fn stick_axis(&self, axis: StickAxis) -> f32;
    /// Whether the given pointer button is down
    fn pointer_button_down(&self, button: u8) -> bool;
    /// Take pointer events queued since the previous tick
    fn drain_pointer_events(&mut self) -> Vec<PointerEvent>;
    /// Take out-of-band action identifiers queued since the previous tick
    fn drain_queued_props(&mut self) -> Vec<String>;
}

/// Apply the stick deadzone and dominant-axis snap to a raw axis pair.
///
/// Below [`STICK_THRESHOLD`] magnitude the stick reads as centered. Above
/// [`STICK_SNAP`] on one axis, the other axis is zeroed so near-cardinal
/// pushes sample as exactly cardinal - without this, replaying keyboard
/// sessions and stick sessions would disagree on diagonal boundaries.
pub fn resolve_stick(x: f32, y: f32) -> Vec2 {
    let raw = Vec2::new(x, y);
    if raw.length() < STICK_THRESHOLD {
        return Vec2::ZERO;
    }
    if raw.x.abs() > STICK_SNAP && raw.x.abs() >= raw.y.abs() {
        return Vec2::new(raw.x, 0.0);
    }
    if raw.y.abs() > STICK_SNAP && raw.y.abs() > raw.x.abs() {
        return Vec2::new(0.0, raw.y);
    }
    raw
}

/// Manually driven input poller.
///
/// The embedding layer (or a test) sets key/button/axis state and queues
/// pointer events and props; the engine samples it like any other source.
#[derive(Debug, Default)]
pub struct ManualPoller {
    keys: HashSet<String>,
    pad_buttons: HashSet<String>,
    axes: HashMap<StickAxis, f32>,
    pointer_buttons: HashSet<u8>,
    pointer_queue: VecDeque<PointerEvent>,
    prop_queue: VecDeque<String>,
}

impl ManualPoller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a keyboard key up or down
    pub fn set_key(&mut self, code: &str, down: bool) {
        if down {
            self.keys.insert(code.to_string());
        } else {
            self.keys.remove(code);
        }
    }

    /// Set a gamepad button up or down
    pub fn set_pad_button(&mut self, button: &str, down: bool) {
        if down {
            self.pad_buttons.insert(button.to_string());
        } else {
            self.pad_buttons.remove(button);
        }
    }

    /// Set a raw axis value
    pub fn set_axis(&mut self, axis: StickAxis, value: f32) {
        self.axes.insert(axis, value.clamp(-1.0, 1.0));
    }

    /// Set a pointer button up or down
    pub fn set_pointer_button(&mut self, button: u8, down: bool) {
        if down {
            self.pointer_buttons.insert(button);
        } else {
            self.pointer_buttons.remove(&button);
        }
    }

    /// Queue a pointer event for the next sample
    pub fn push_pointer_event(&mut self, name: &str, x: f32, y: f32) {
        self.pointer_queue.push_back(PointerEvent {
            name: name.to_string(),
            x,
            y,
        });
    }

    /// Queue an out-of-band action identifier for the next sample
    pub fn push_prop(&mut self, id: &str) {
        self.prop_queue.push_back(id.to_string());
    }

    /// Release everything and clear both queues
    pub fn clear(&mut self) {
        self.keys.clear();
        self.pad_buttons.clear();
        self.axes.clear();
        self.pointer_buttons.clear();
        self.pointer_queue.clear();
        self.prop_queue.clear();
    }
}

impl InputPoller for ManualPoller {
    fn key_down(&self, code: &str) -> bool {
        self.keys.contains(code)
    }

    fn pad_button_down(&self, button: &str) -> bool {
        self.pad_buttons.contains(button)
    }

    fn stick_axis(&self, axis: StickAxis) -> f32 {
        self.axes.get(&axis).copied().unwrap_or(0.0)
    }

    fn pointer_button_down(&self, button: u8) -> bool {
        self.pointer_buttons.contains(&button)
    }

    fn drain_pointer_events(&mut self) -> Vec<PointerEvent> {
        self.pointer_queue.drain(..).collect()
    }

    fn drain_queued_props(&mut self) -> Vec<String> {
        self.prop_queue.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stick_below_threshold_reads_centered() {
        assert_eq!(resolve_stick(0.1, 0.1), Vec2::ZERO);
        assert_eq!(resolve_stick(0.0, 0.19), Vec2::ZERO);
    }

    #[test]
    fn stick_above_threshold_passes_through() {
        let v = resolve_stick(0.5, 0.3);
        assert_eq!(v, Vec2::new(0.5, 0.3));
    }

    #[test]
    fn dominant_axis_snaps_minor_axis_to_zero() {
        let v = resolve_stick(0.95, 0.2);
        assert_eq!(v, Vec2::new(0.95, 0.0));

        let v = resolve_stick(-0.1, -0.97);
        assert_eq!(v, Vec2::new(0.0, -0.97));
    }

    #[test]
    fn snap_requires_dominant_magnitude() {
        // Once the dominant axis clears the snap magnitude the minor axis
        // drops, even near a diagonal; x wins exact ties.
        let v = resolve_stick(0.92, 0.91);
        assert_eq!(v, Vec2::new(0.92, 0.0));

        let v = resolve_stick(0.7, 0.7);
        assert_eq!(v, Vec2::new(0.7, 0.7));
    }

    #[test]
    fn manual_poller_drains_queues_once() {
        let mut poller = ManualPoller::new();
        poller.push_pointer_event("press", 1.0, 2.0);
        poller.push_prop("door.open");

        assert_eq!(poller.drain_pointer_events().len(), 1);
        assert!(poller.drain_pointer_events().is_empty());
        assert_eq!(poller.drain_queued_props(), vec!["door.open".to_string()]);
        assert!(poller.drain_queued_props().is_empty());
    }
}
