//! Ghostline Core - deterministic input capture and replay
//!
//! This crate turns live player input into a compact, lossless, re-playable
//! event log and can re-drive a simulation from that log to reproduce an
//! identical run.
//!
//! # Architecture
//!
//! - [`CommandSpecTable`] - declares every logical command and its bindings
//! - [`CommandBank`] - per-command runtime state, mutated once per tick
//! - [`Frame`] - one tick's captured input, with repeat compression
//! - [`Recorder`] / [`Replayer`] - capture into and playback from a
//!   [`Recording`]
//! - [`Session`] - session-scoped context wiring it all to a [`Simulation`]
//! - time-sight ([`timesight`]) - free-runs an isolated second instance to
//!   pre-render ghost snapshots along a replay's timeline
//!
//! Live input and playback drive the same command bank and the same
//! simulation step callback, so the simulation cannot distinguish live play
//! from replay.

pub mod command;
pub mod frame;
pub mod input;
#[cfg(test)]
mod integration;
pub mod recorder;
pub mod recording;
pub mod replayer;
pub mod scene;
pub mod scheduler;
pub mod session;
pub mod sim;
pub mod spec;
pub mod store;
pub mod timesight;

// Re-export core types
pub use command::{CommandBank, CommandState};
pub use frame::{Frame, PointerEvent, append_frame, total_ticks};
pub use input::{InputPoller, ManualPoller, STICK_SNAP, STICK_THRESHOLD, resolve_stick};
pub use recorder::{Recorder, RecordingMeta};
pub use recording::{Recording, RecordingFlags, SNAPSHOT_ONLY_MARGIN};
pub use replayer::{ReplayCursor, ReplayError, ReplayPhase, Replayer};
pub use scene::{IgnoreFlags, SceneAttachment, SceneRegistry};
pub use scheduler::{MAX_CONSECUTIVE_FAULTS, Scheduler, SchedulerConfig};
pub use session::{Session, SessionEvent};
pub use sim::{Simulation, SimulationFactory};
pub use spec::{
    ActionRegistry, AxisDirection, CommandSpec, CommandSpecTable, InputBinding, SpecDelta,
    SpecError, StickAxis,
};
pub use store::{
    BlobStore, FileStore, MemoryStore, StoreError, load_recording, recording_key, save_recording,
};
pub use timesight::{
    GhostPresentation, GhostVisibility, TimeSightConfig, TimeSightFrame, run_target,
};
