//! Session context
//!
//! One [`Session`] owns everything a live simulation instance needs: the
//! command spec table, action registry, command state bank, scene registry,
//! recorder, replayer and scheduler. There are no ambient globals; every
//! component receives what it needs from the session.
//!
//! Per-tick ordering is fixed and identical for live play and playback:
//! input sampling (or frame injection), then the timer update, then the
//! simulation step, then recorder mirroring. Replay fidelity depends on
//! this order never changing.

use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;

use crate::command::CommandBank;
use crate::frame::Frame;
use crate::recorder::{Recorder, RecordingMeta};
use crate::recording::{Recording, RecordingFlags};
use crate::replayer::{ReplayError, ReplayPhase, Replayer};
use crate::scene::{SceneAttachment, SceneRegistry};
use crate::scheduler::{Scheduler, SchedulerConfig};
use crate::sim::{Simulation, SimulationFactory};
use crate::spec::{ActionRegistry, CommandSpecTable, SpecDelta, SpecError};
use crate::input::InputPoller;
use crate::timesight::{GhostPresentation, TimeSightConfig, run_target};

/// Session state transitions, delivered synchronously to registered hooks.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    RecordBegin { scene: String },
    RecordStop { scene: String, ticks: u64 },
    ReplayBegin { scene: String },
    ReplayEnd,
    ReplayStop,
    SpecSwapped { delta: SpecDelta },
    SchedulerSuspended { faults: u32 },
}

type EventHook = Box<dyn FnMut(&SessionEvent)>;

/// Session-scoped context driving one live simulation instance.
pub struct Session<S: Simulation, P: InputPoller> {
    table: CommandSpecTable,
    actions: ActionRegistry,
    bank: CommandBank,
    scenes: SceneRegistry,
    recorder: Recorder,
    replayer: Replayer,
    scheduler: Scheduler,
    sim: S,
    poller: P,
    hooks: Vec<EventHook>,
    /// Time-sight freeze: only unignorable commands are sampled
    frozen: bool,
    sim_time: f64,
}

impl<S: Simulation, P: InputPoller> Session<S, P> {
    /// Build a session, failing fast on configuration errors.
    pub fn new(
        table: CommandSpecTable,
        actions: ActionRegistry,
        sim: S,
        poller: P,
        config: SchedulerConfig,
    ) -> Result<Self, SpecError> {
        table.validate(&actions)?;
        let bank = CommandBank::new(&table);
        Ok(Self {
            table,
            actions,
            bank,
            scenes: SceneRegistry::new(),
            recorder: Recorder::new(),
            replayer: Replayer::new(),
            scheduler: Scheduler::new(config),
            sim,
            poller,
            hooks: Vec::new(),
            frozen: false,
            sim_time: 0.0,
        })
    }

    /// Register a synchronous event hook.
    pub fn on_event(&mut self, hook: impl FnMut(&SessionEvent) + 'static) {
        self.hooks.push(Box::new(hook));
    }

    fn fire(&mut self, event: SessionEvent) {
        let mut hooks = std::mem::take(&mut self.hooks);
        for hook in &mut hooks {
            hook(&event);
        }
        // Hooks registered from inside a hook land after the existing ones
        hooks.append(&mut self.hooks);
        self.hooks = hooks;
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn sim(&self) -> &S {
        &self.sim
    }

    pub fn sim_mut(&mut self) -> &mut S {
        &mut self.sim
    }

    pub fn poller_mut(&mut self) -> &mut P {
        &mut self.poller
    }

    pub fn bank(&self) -> &CommandBank {
        &self.bank
    }

    pub fn table(&self) -> &CommandSpecTable {
        &self.table
    }

    pub fn actions_mut(&mut self) -> &mut ActionRegistry {
        &mut self.actions
    }

    pub fn scenes(&self) -> &SceneRegistry {
        &self.scenes
    }

    pub fn sim_time(&self) -> f64 {
        self.sim_time
    }

    pub fn replay_phase(&self) -> ReplayPhase {
        self.replayer.phase()
    }

    pub fn replay_progress(&self) -> f32 {
        self.replayer.progress()
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    pub fn is_suspended(&self) -> bool {
        self.scheduler.is_suspended()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Attach a scene as the new topmost input consumer.
    pub fn attach_scene(&mut self, attachment: SceneAttachment) {
        self.scenes.attach(attachment);
    }

    /// Detach a scene, returning its attachment record.
    pub fn detach_scene(&mut self, scene: &str) -> Option<SceneAttachment> {
        self.scenes.detach(scene)
    }

    // ------------------------------------------------------------------
    // Recording
    // ------------------------------------------------------------------

    /// Begin mirroring consumed frames into a new recording.
    pub fn begin_recording(&mut self, meta: RecordingMeta) -> Result<(), ReplayError> {
        if self.recorder.is_active() {
            return Err(ReplayError::RecordingActive);
        }
        let scene = meta.scene.clone();
        let origin = self
            .scenes
            .topmost()
            .map(|a| a.tick_counter)
            .unwrap_or_default();
        self.recorder
            .begin(meta, self.sim.snapshot(), origin, Utc::now());
        self.fire(SessionEvent::RecordBegin { scene });
        Ok(())
    }

    /// Finalize the active recording and hand it over for persistence.
    pub fn stop_recording(&mut self) -> Option<Recording> {
        let recording = self.recorder.stop()?;
        self.fire(SessionEvent::RecordStop {
            scene: recording.scene.clone(),
            ticks: recording.tick_count,
        });
        Some(recording)
    }

    // ------------------------------------------------------------------
    // Replay
    // ------------------------------------------------------------------

    /// Load a recording for playback.
    ///
    /// Restores the initial snapshot into the simulation and enters
    /// `Preflighting` when the recording asks for one; the preflight
    /// free-run itself happens on the next [`Session::tick`] (or an explicit
    /// [`Session::pump_preflight`]).
    pub fn begin_replay(&mut self, recording: Arc<Recording>) -> Result<ReplayPhase, ReplayError> {
        if self.replayer.is_playing() {
            return Err(ReplayError::ReplayActive);
        }

        if !recording.snapshot_intact() {
            tracing::warn!(
                scene = recording.scene.as_str(),
                "initial snapshot checksum mismatch; replay may diverge"
            );
        }
        if !recording.initial_snapshot.is_null() {
            self.sim
                .restore(&recording.initial_snapshot)
                .map_err(|e| ReplayError::Restore(e.to_string()))?;
        }
        // Playback drives the bank from the recording alone; start it from
        // the same neutral state the recording's first tick saw, or timers
        // carried over from live play would diverge the run.
        self.bank = CommandBank::new(&self.table);

        let scene = recording.scene.clone();
        let phase = self.replayer.begin(recording);
        self.fire(SessionEvent::ReplayBegin { scene });
        Ok(phase)
    }

    /// Free-run the preflight window synchronously, without real-time
    /// pacing.
    ///
    /// With a tick `limit` the loop yields early and reports false so the
    /// caller may cancel between chunks; `None` runs to the cutoff. On
    /// completion the delta accumulator is reset - the banked real time
    /// would otherwise land as a burst of catch-up ticks.
    pub fn pump_preflight(&mut self, limit: Option<u64>) -> bool {
        if self.replayer.phase() != ReplayPhase::Preflighting {
            return true;
        }

        let mut ran = 0u64;
        while self.replayer.in_preflight() {
            if let Some(limit) = limit
                && ran >= limit
            {
                return false;
            }
            let Some(frame) = self.replayer.inject_next() else {
                break;
            };
            self.drive(frame, true);
            ran += 1;
            if self.scheduler.is_suspended() {
                break;
            }
        }

        self.scheduler.reset_accumulator();
        if self.replayer.phase() == ReplayPhase::Ended {
            self.fire(SessionEvent::ReplayEnd);
            self.replayer.clear();
        } else {
            self.replayer.finish_preflight();
        }
        true
    }

    /// Cancel the active replay. Always safe; the cursor is discarded.
    pub fn stop_replay(&mut self) {
        if !self.replayer.is_playing() {
            return;
        }
        let was_preflight = self.replayer.phase() == ReplayPhase::Preflighting;
        self.replayer.stop();
        // Discarding banked time covers the mid-preflight case too: without
        // the reset the next frame would show a visible time jump.
        self.scheduler.reset_accumulator();
        if was_preflight {
            // The discarded cursor must not leak started/released edges
            // into the next live tick.
            self.bank = CommandBank::new(&self.table);
        }
        self.fire(SessionEvent::ReplayStop);
    }

    /// Edit the active replay's playback window and restart it so the edit
    /// is observed immediately.
    ///
    /// Returns false when no replay is active. Frame material is never
    /// touched; for recordings at rest use [`Recording::edit_cutoffs`].
    pub fn edit_replay_cutoffs(
        &mut self,
        preflight: u64,
        postflight: u64,
    ) -> Result<bool, ReplayError> {
        let Some(active) = self.replayer.recording() else {
            return Ok(false);
        };
        let mut recording = Arc::clone(active);
        Arc::make_mut(&mut recording).edit_cutoffs(preflight, postflight);

        self.replayer.stop();
        self.scheduler.reset_accumulator();
        self.begin_replay(recording)?;
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Time-sight
    // ------------------------------------------------------------------

    /// Freeze the live instance, free-run an isolated target over
    /// `recording`, and return the harvested ghosts as a presentation.
    ///
    /// The target owns its own command bank and scene attachment; the live
    /// session shares nothing with it but the read-only recording and spec
    /// table. While frozen, only unignorable commands are sampled from live
    /// input. The target instance is torn down before this returns.
    pub fn run_time_sight<F, G>(
        &mut self,
        factory: &mut F,
        recording: Arc<Recording>,
        config: &TimeSightConfig,
        target_actions: &mut ActionRegistry,
        sample: impl FnMut(&F::Sim, f64, f32, &[Frame], bool) -> Vec<G>,
    ) -> Result<GhostPresentation<G>, ReplayError>
    where
        F: SimulationFactory,
    {
        self.frozen = true;
        self.sim.freeze_visuals();

        let dt = self.scheduler.dt();
        let result = run_target(
            factory,
            Arc::clone(&recording),
            &self.table,
            target_actions,
            config,
            dt,
            sample,
        );

        self.sim.unfreeze_visuals();
        self.frozen = false;
        // The free-run blocked the loop; do not let that time catch up
        self.scheduler.reset_accumulator();

        let frames = result?;
        Ok(GhostPresentation::new(frames, recording, config.clone()))
    }

    /// Activate a ghost: stop any active replay and seek to the ghost's
    /// point by replaying its speculative window with recapture disabled.
    pub fn jump_to_ghost<G>(
        &mut self,
        presentation: &GhostPresentation<G>,
        index: usize,
    ) -> Result<bool, ReplayError> {
        let Some(jump) = presentation.jump_recording(index) else {
            return Ok(false);
        };
        self.stop_replay();
        self.begin_replay(Arc::new(jump))?;
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Spec hot swap
    // ------------------------------------------------------------------

    /// Atomically replace the command spec table.
    ///
    /// Only the delta is re-subscribed: kept commands retain their runtime
    /// state mid-hold. Stored recordings stay valid - frames reference
    /// command names, not bindings - and removed names degrade to a
    /// playback warning.
    pub fn command_spec_changed(
        &mut self,
        mut new_table: CommandSpecTable,
    ) -> Result<SpecDelta, SpecError> {
        new_table.validate(&self.actions)?;
        new_table.version = self.table.version + 1;

        let delta = self.table.diff(&new_table);
        self.bank.rebuild(&new_table, &delta);
        tracing::info!(
            version = new_table.version,
            added = delta.added.len(),
            removed = delta.removed.len(),
            rebound = delta.rebound.len(),
            "command spec table swapped"
        );
        self.table = new_table;
        if !delta.is_empty() {
            self.fire(SessionEvent::SpecSwapped {
                delta: delta.clone(),
            });
        }
        Ok(delta)
    }

    // ------------------------------------------------------------------
    // The tick loop
    // ------------------------------------------------------------------

    /// Run one real-time frame: finish any pending preflight, then execute
    /// every due tick.
    pub fn tick(&mut self, now: Instant) {
        if self.scheduler.is_suspended() {
            return;
        }
        if self.replayer.phase() == ReplayPhase::Preflighting {
            self.pump_preflight(None);
        }

        let due = self.scheduler.due_ticks(now);
        for _ in 0..due {
            if self.scheduler.is_suspended() {
                break;
            }
            self.run_tick();
        }
    }

    /// Execute exactly one tick, regardless of pacing. Exposed for embedders
    /// with their own frame loop and for tests.
    pub fn run_tick(&mut self) {
        if self.replayer.phase() == ReplayPhase::Preflighting {
            self.pump_preflight(None);
        }
        let tick_start = Instant::now();

        let (frame, restored) = if self.replayer.phase() == ReplayPhase::Live {
            match self.replayer.inject_next() {
                Some(mut frame) => {
                    self.merge_live_unignorable(&mut frame);
                    (frame, true)
                }
                None => {
                    // Cursor exhausted or cutoff reached: fall back to live
                    // sampling from this tick on
                    self.fire(SessionEvent::ReplayEnd);
                    self.replayer.clear();
                    (self.sample_live(), false)
                }
            }
        } else {
            (self.sample_live(), false)
        };

        self.drive(frame, restored);
        self.scheduler.check_budget(tick_start.elapsed());
    }

    /// Sample live input, honoring the time-sight freeze and the topmost
    /// attachment's category suppressions.
    fn sample_live(&mut self) -> Frame {
        let mut frame = CommandBank::sample_held(&mut self.poller, &self.table, self.frozen);
        if let Some(top) = self.scenes.topmost() {
            if top.ignore.contains(crate::scene::IgnoreFlags::POINTER) {
                frame.pointer_events.clear();
            }
            if top.ignore.contains(crate::scene::IgnoreFlags::PROPS) {
                frame.executed_props.clear();
            }
        }
        frame
    }

    /// Merge live unignorable commands on top of a replayed frame, so the
    /// operator can still pause or quit during playback. Live value wins if
    /// held; commands that are also unreplayable stay out.
    fn merge_live_unignorable(&mut self, frame: &mut Frame) {
        let live = CommandBank::sample_held(&mut self.poller, &self.table, true);
        for name in live.commands {
            if self.table.get(&name).is_some_and(|spec| !spec.unreplayable) {
                frame.commands.insert(name);
            }
        }
    }

    /// The per-tick pipeline: apply -> advance -> step -> mirror.
    fn drive(&mut self, frame: Frame, restored: bool) {
        let dt = self.scheduler.dt();
        let ignore_all = self.scenes.ignore_all();

        self.bank.apply_frame(&frame, &self.table, restored);
        self.bank
            .advance(dt, &self.table, ignore_all, &mut self.actions);
        if restored {
            // Re-invoke recorded out-of-band actions; unresolvable ones are
            // logged and skipped inside the registry
            for prop in &frame.executed_props {
                self.actions.invoke(prop);
            }
        }

        match self.sim.step(&self.bank, self.sim_time, dt) {
            Ok(()) => self.scheduler.record_success(),
            Err(e) => {
                tracing::warn!(error = %e, "simulation step failed");
                if self.scheduler.record_fault() {
                    let faults = self.scheduler.consecutive_faults();
                    self.fire(SessionEvent::SchedulerSuspended { faults });
                }
            }
        }

        let recapture_blocked = self
            .replayer
            .recording()
            .is_some_and(|r| r.flags.contains(RecordingFlags::NO_RECAPTURE));
        if !recapture_blocked {
            self.recorder.mirror(&frame);
        }
        if let Some(top) = self.scenes.topmost_mut() {
            top.consume(&frame);
        }

        self.sim_time += f64::from(dt);
    }
}
