//! Time-sight: speculative ghost snapshots along a replay's timeline
//!
//! A time-sight run spins up a second, fully isolated simulation instance,
//! replays the same recording into it in one synchronous free-run, and
//! harvests periodic visual snapshots ("ghosts") before tearing the instance
//! down. The live session keeps its own command bank and scene attachment;
//! the only shared state is the read-only recording and spec table.
//!
//! Ghost density follows a fixed minimum Euclidean distance between
//! successive captured positions - not elapsed time - so spacing stays
//! visually uniform regardless of simulated speed. The final tick is always
//! captured.

use glam::Vec2;
use std::sync::Arc;

use crate::command::CommandBank;
use crate::frame::{Frame, append_frame, total_ticks};
use crate::recording::{Recording, RecordingFlags};
use crate::replayer::{ReplayError, Replayer};
use crate::scene::SceneAttachment;
use crate::scheduler::MAX_CONSECUTIVE_FAULTS;
use crate::sim::{Simulation, SimulationFactory};
use crate::spec::{ActionRegistry, CommandSpecTable};

/// Time-sight tuning.
#[derive(Debug, Clone)]
pub struct TimeSightConfig {
    /// Minimum distance between successive captured positions
    pub min_spacing: f32,
    /// Seconds a ghost takes to fade in
    pub fade_in: f32,
    /// Seconds a ghost holds at full visibility
    pub hold: f32,
    /// Seconds a ghost takes to fade out
    pub fade_out: f32,
    /// Per-frame-index delay of the presentation schedule
    pub stagger: f32,
}

impl Default for TimeSightConfig {
    fn default() -> Self {
        Self {
            min_spacing: 24.0,
            fade_in: 0.25,
            hold: 0.6,
            fade_out: 0.35,
            stagger: 0.05,
        }
    }
}

/// One captured ghost: display objects, the prop values to show while it is
/// pinned, and the frame material needed to seek to this point.
#[derive(Debug)]
pub struct TimeSightFrame<G> {
    /// Ephemeral display objects materialized by the sample callback
    pub objects: Vec<G>,
    /// Prop/config values at capture time
    pub prop_snapshot: serde_json::Value,
    /// Speculative frame window: everything injected up to this capture
    pub window: Vec<Frame>,
    /// Simulated time at capture
    pub sim_time: f64,
}

/// Free-run a target instance over `recording` and harvest ghost frames.
///
/// The target is created, driven to completion synchronously with no
/// real-time pacing, and dropped before this returns. `sample` is invoked
/// before the step on each capturing tick and materializes the display
/// objects; `target_actions` receives the execute/prop invocations the
/// target run re-plays (pass an empty registry to skip them all).
pub fn run_target<F, G>(
    factory: &mut F,
    recording: Arc<Recording>,
    table: &CommandSpecTable,
    target_actions: &mut ActionRegistry,
    config: &TimeSightConfig,
    dt: f32,
    mut sample: impl FnMut(&F::Sim, f64, f32, &[Frame], bool) -> Vec<G>,
) -> Result<Vec<TimeSightFrame<G>>, ReplayError>
where
    F: SimulationFactory,
{
    let mut sim = factory
        .create(&recording.sim_params)
        .map_err(|e| ReplayError::TargetCreate(e.to_string()))?;
    if !recording.initial_snapshot.is_null() {
        sim.restore(&recording.initial_snapshot)
            .map_err(|e| ReplayError::Restore(e.to_string()))?;
    }

    let mut bank = CommandBank::new(table);
    let mut attachment = SceneAttachment::new(format!("{}#target", recording.scene));
    let mut replayer = Replayer::new();
    // The sub-replay never runs time-sight itself and ignores the preflight
    // cutoff: the whole run is one synchronous pass.
    replayer.begin(Arc::clone(&recording));

    let mut captured = Vec::new();
    let mut window: Vec<Frame> = Vec::new();
    let mut last_position: Option<Vec2> = None;
    let mut sim_time = 0.0f64;
    let mut faults = 0u32;

    while let Some(frame) = replayer.inject_next() {
        let is_last = replayer.at_end();
        // Nested capture compresses exactly like a live recording
        append_frame(&mut window, frame.clone(), false);

        bank.apply_frame(&frame, table, true);
        bank.advance(dt, table, false, target_actions);
        for prop in &frame.executed_props {
            target_actions.invoke(prop);
        }

        let position = sim.probe_position();
        let due = match last_position {
            None => true,
            Some(last) => last.distance(position) >= config.min_spacing,
        };
        if due || is_last {
            let objects = sample(&sim, sim_time, dt, &window, is_last);
            captured.push(TimeSightFrame {
                objects,
                prop_snapshot: sim.prop_snapshot(),
                window: window.clone(),
                sim_time,
            });
            last_position = Some(position);
        }

        if let Err(e) = sim.step(&bank, sim_time, dt) {
            faults += 1;
            tracing::warn!(error = %e, faults, "time-sight target step failed");
            if faults >= MAX_CONSECUTIVE_FAULTS {
                return Err(ReplayError::Suspended(faults));
            }
        } else {
            faults = 0;
        }

        attachment.consume(&frame);
        sim_time += f64::from(dt);
    }

    tracing::info!(
        scene = recording.scene.as_str(),
        ghosts = captured.len(),
        ticks = attachment.tick_counter,
        "time-sight run complete"
    );
    Ok(captured)
}

/// Visibility of one ghost in the presentation loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GhostVisibility {
    Hidden,
    FadingIn(f32),
    Holding,
    FadingOut(f32),
    /// Hover-pinned at full visibility, stagger cancelled
    Pinned,
}

impl GhostVisibility {
    /// Alpha in `0.0..=1.0` for rendering.
    pub fn alpha(self) -> f32 {
        match self {
            GhostVisibility::Hidden => 0.0,
            GhostVisibility::FadingIn(a) | GhostVisibility::FadingOut(a) => a,
            GhostVisibility::Holding | GhostVisibility::Pinned => 1.0,
        }
    }
}

/// Looping fade-in/hold/fade-out presentation over captured ghosts.
///
/// Each frame's schedule is offset by `stagger * index`; hovering a frame
/// pins it at full visibility and surfaces its prop snapshot; selecting it
/// yields a recording that seeks to that point deterministically.
#[derive(Debug)]
pub struct GhostPresentation<G> {
    frames: Vec<TimeSightFrame<G>>,
    source: Arc<Recording>,
    config: TimeSightConfig,
    clock: f32,
    pinned: Option<usize>,
}

impl<G> GhostPresentation<G> {
    pub fn new(
        frames: Vec<TimeSightFrame<G>>,
        source: Arc<Recording>,
        config: TimeSightConfig,
    ) -> Self {
        Self {
            frames,
            source,
            config,
            clock: 0.0,
            pinned: None,
        }
    }

    /// The recording the target run was driven by.
    pub fn source(&self) -> &Arc<Recording> {
        &self.source
    }

    pub fn frames(&self) -> &[TimeSightFrame<G>] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Advance the presentation clock.
    pub fn advance(&mut self, dt: f32) {
        self.clock += dt;
    }

    fn cycle_len(&self) -> f32 {
        let span = self.config.fade_in + self.config.hold + self.config.fade_out;
        let max_delay = self.config.stagger * self.frames.len().saturating_sub(1) as f32;
        span + max_delay
    }

    /// Current visibility of the ghost at `index`.
    pub fn visibility(&self, index: usize) -> GhostVisibility {
        if self.pinned == Some(index) {
            return GhostVisibility::Pinned;
        }
        if index >= self.frames.len() {
            return GhostVisibility::Hidden;
        }

        let c = &self.config;
        let delay = c.stagger * index as f32;
        let local = (self.clock - delay).rem_euclid(self.cycle_len());
        if self.clock < delay {
            // Not yet reached on the very first cycle
            GhostVisibility::Hidden
        } else if local < c.fade_in {
            GhostVisibility::FadingIn(local / c.fade_in)
        } else if local < c.fade_in + c.hold {
            GhostVisibility::Holding
        } else if local < c.fade_in + c.hold + c.fade_out {
            let t = (local - c.fade_in - c.hold) / c.fade_out;
            GhostVisibility::FadingOut(1.0 - t)
        } else {
            GhostVisibility::Hidden
        }
    }

    /// Pin a ghost at full visibility, returning the prop snapshot to show.
    pub fn hover(&mut self, index: usize) -> Option<&serde_json::Value> {
        if index >= self.frames.len() {
            return None;
        }
        self.pinned = Some(index);
        Some(&self.frames[index].prop_snapshot)
    }

    /// Release the hover pin; the stagger schedule resumes.
    pub fn unhover(&mut self) {
        self.pinned = None;
    }

    pub fn pinned(&self) -> Option<usize> {
        self.pinned
    }

    /// Convert a ghost into a "jump to this point" recording.
    ///
    /// The ghost's speculative window becomes the frame list; the whole
    /// window is preflighted so playback lands exactly at the captured
    /// point, with recapture disabled - seeking by frame material already
    /// computed for the target run.
    pub fn jump_recording(&self, index: usize) -> Option<Recording> {
        let frame = self.frames.get(index)?;
        let source = &*self.source;
        let tick_count = total_ticks(&frame.window);
        let mut recording = Recording {
            started_at: source.started_at,
            scene: source.scene.clone(),
            sim_params: source.sim_params.clone(),
            initial_snapshot: source.initial_snapshot.clone(),
            snapshot_checksum: source.snapshot_checksum,
            frames: frame.window.clone(),
            tick_count,
            preflight_cutoff: 0,
            postflight_cutoff: tick_count,
            original_preflight_cutoff: tick_count,
            snapshot_only: false,
            flags: RecordingFlags::NO_RECAPTURE | RecordingFlags::TIME_SIGHT_WINDOW,
        };
        recording.edit_cutoffs(tick_count, tick_count);
        Some(recording)
    }
}
