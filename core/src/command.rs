//! Command state bank and frame codec
//!
//! The bank holds one [`CommandState`] per declared command and is mutated
//! exactly once per tick. The codec converts live input into an immutable
//! [`Frame`] ([`CommandBank::sample_held`]) and converts a frame back into
//! command state during replay ([`CommandBank::apply_frame`]), so the
//! simulation cannot distinguish live play from playback.
//!
//! Per-tick order is fixed: sample (or inject) -> apply -> advance -> step.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::frame::{Frame, PointerEvent};
use crate::input::{InputPoller, resolve_stick};
use crate::spec::{
    ActionRegistry, AxisDirection, CommandSpecTable, InputBinding, SpecDelta, StickAxis,
};

/// Per-command runtime state.
///
/// `started` is true only on the tick `held_frames` transitions 0 -> 1;
/// `released` is true only on the first tick after the command stops being
/// held.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandState {
    /// Whether the command is held this tick
    pub held: bool,
    /// Consecutive ticks held (0 when not held)
    pub held_frames: u32,
    /// Accumulated seconds held
    pub held_duration: f32,
    /// True only on the first held tick
    pub started: bool,
    /// True on every held tick after the first
    pub continued: bool,
    /// True only on the first tick after release
    pub released: bool,
    /// Consecutive ticks since release (0 while held)
    pub released_frames: u32,
    /// Accumulated seconds since release
    pub released_duration: f32,
}

/// Runtime state for every declared command.
///
/// Exclusively owned by the topmost simulation instance; a time-sight target
/// gets its own bank.
#[derive(Debug, Default)]
pub struct CommandBank {
    states: HashMap<String, CommandState>,
    pointer_events: SmallVec<[PointerEvent; 2]>,
}

impl CommandBank {
    /// One fresh state per command in the table.
    pub fn new(table: &CommandSpecTable) -> Self {
        Self {
            states: table
                .iter()
                .map(|spec| (spec.name.clone(), CommandState::default()))
                .collect(),
            pointer_events: SmallVec::new(),
        }
    }

    /// Pointer events carried by the frame applied this tick.
    ///
    /// Identical whether the frame came from live sampling or from storage,
    /// so pointer-driven gameplay replays faithfully.
    pub fn pointer_events(&self) -> &[PointerEvent] {
        &self.pointer_events
    }

    /// State for a command, if declared.
    pub fn state(&self, name: &str) -> Option<&CommandState> {
        self.states.get(name)
    }

    /// Number of tracked commands.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Sample every physical input source into a frame.
    ///
    /// Only commands currently held appear (sparse encoding). With
    /// `only_unignorable` set - used while a higher-priority scene such as a
    /// frozen time-sight target is active - ignorable commands are skipped
    /// and the pointer/prop queues are left alone for the owner to drain.
    pub fn sample_held(
        poller: &mut dyn InputPoller,
        table: &CommandSpecTable,
        only_unignorable: bool,
    ) -> Frame {
        let left = resolve_stick(
            poller.stick_axis(StickAxis::LeftX),
            poller.stick_axis(StickAxis::LeftY),
        );
        let right = resolve_stick(
            poller.stick_axis(StickAxis::RightX),
            poller.stick_axis(StickAxis::RightY),
        );

        let mut frame = Frame::default();
        for spec in table.iter() {
            if only_unignorable && !spec.unignorable {
                continue;
            }
            let held = spec.bindings.iter().any(|binding| match binding {
                InputBinding::Key { code } => poller.key_down(code),
                InputBinding::PadButton { button } => poller.pad_button_down(button),
                InputBinding::PointerButton { button } => poller.pointer_button_down(*button),
                InputBinding::StickAxis { axis, direction } => {
                    let value = match axis {
                        StickAxis::LeftX => left.x,
                        StickAxis::LeftY => left.y,
                        StickAxis::RightX => right.x,
                        StickAxis::RightY => right.y,
                    };
                    match direction {
                        AxisDirection::Negative => value < 0.0,
                        AxisDirection::Positive => value > 0.0,
                    }
                }
            });
            if held {
                frame.commands.insert(spec.name.clone());
            }
        }

        if !only_unignorable {
            frame.pointer_events = SmallVec::from_vec(poller.drain_pointer_events());
            frame.executed_props = SmallVec::from_vec(poller.drain_queued_props());
        }
        frame
    }

    /// Set each command's held flag from a frame.
    ///
    /// With `restored` set (frame came from storage), commands flagged
    /// `unreplayable` are forced to not-held regardless of frame content,
    /// and frame entries naming commands no longer in the table raise a
    /// migration warning instead of failing playback.
    pub fn apply_frame(&mut self, frame: &Frame, table: &CommandSpecTable, restored: bool) {
        self.pointer_events = frame.pointer_events.clone();
        for (name, state) in self.states.iter_mut() {
            let mut held = frame.commands.contains(name);
            if restored
                && held
                && let Some(spec) = table.get(name)
                && spec.unreplayable
            {
                held = false;
            }
            state.held = held;
        }

        if restored {
            for name in &frame.commands {
                if !table.contains(name) {
                    tracing::warn!(
                        command = name.as_str(),
                        "stored frame references a command no longer declared; \
                         it will not be restored"
                    );
                }
            }
        }
    }

    /// Per-tick timer update.
    ///
    /// Forces disabled commands - and, under `ignore_all`, every ignorable
    /// command - to not-held first, then recomputes timers and the
    /// started/continued/released edges, then invokes each `execute` action
    /// exactly once on its start tick.
    pub fn advance(
        &mut self,
        dt: f32,
        table: &CommandSpecTable,
        ignore_all: bool,
        actions: &mut ActionRegistry,
    ) {
        let mut executed: SmallVec<[&str; 2]> = SmallVec::new();

        for spec in table.iter() {
            let Some(state) = self.states.get_mut(&spec.name) else {
                continue;
            };

            if !spec.enabled || (ignore_all && !spec.unignorable) {
                state.held = false;
            }

            if state.held {
                state.held_frames += 1;
                state.held_duration += dt;
                state.started = state.held_frames == 1;
                state.continued = state.held_frames > 1;
                state.released = false;
                state.released_frames = 0;
                state.released_duration = 0.0;
            } else {
                let was_held = state.held_frames > 0;
                state.held_frames = 0;
                state.held_duration = 0.0;
                state.started = false;
                state.continued = false;
                state.released = was_held;
                if was_held {
                    state.released_frames = 0;
                    state.released_duration = 0.0;
                }
                state.released_frames += 1;
                state.released_duration += dt;
            }

            if state.started && let Some(action) = &spec.execute {
                executed.push(action.as_str());
            }
        }

        for action in executed {
            actions.invoke(action);
        }
    }

    /// Carry state across a spec hot swap.
    ///
    /// Kept commands retain their timers mid-hold, added commands start
    /// fresh, removed commands are dropped.
    pub fn rebuild(&mut self, new_table: &CommandSpecTable, delta: &SpecDelta) {
        for name in &delta.removed {
            self.states.remove(name);
        }
        for spec in new_table.iter() {
            self.states.entry(spec.name.clone()).or_default();
        }
    }

    /// Snapshot of every command's state, for assertions and debugging.
    pub fn snapshot(&self) -> HashMap<String, CommandState> {
        self.states.clone()
    }
}
