//! Cross-module integration tests
//!
//! Exercises the whole engine through [`Session`]: live capture, playback,
//! preflight, spec hot swaps and time-sight, driven by a small input-driven
//! test simulation.

mod replay_tests;

use glam::Vec2;

use crate::command::CommandBank;
use crate::input::ManualPoller;
use crate::scene::SceneAttachment;
use crate::scheduler::SchedulerConfig;
use crate::session::Session;
use crate::sim::{Simulation, SimulationFactory};
use crate::spec::{ActionRegistry, AxisDirection, CommandSpec, CommandSpecTable, InputBinding, StickAxis};

/// Test simulation: moves one unit per held direction tick, jumps on the
/// start edge, and records its trajectory for comparisons.
#[derive(Debug, Default)]
pub(super) struct Runner {
    pub x: f32,
    pub y: f32,
    pub steps: u32,
    /// Remaining induced step failures
    pub fail_steps: u32,
    pub trajectory: Vec<(f32, f32)>,
}

impl Simulation for Runner {
    fn step(&mut self, commands: &CommandBank, _sim_time: f64, _dt: f32) -> anyhow::Result<()> {
        if self.fail_steps > 0 {
            self.fail_steps -= 1;
            anyhow::bail!("induced step failure");
        }
        self.steps += 1;

        if commands.state("left").is_some_and(|s| s.held) {
            self.x -= 1.0;
        }
        if commands.state("right").is_some_and(|s| s.held) {
            self.x += 1.0;
        }
        if commands.state("jump").is_some_and(|s| s.started) {
            self.y += 10.0;
        }
        self.trajectory.push((self.x, self.y));
        Ok(())
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({"x": self.x, "y": self.y})
    }

    fn restore(&mut self, snapshot: &serde_json::Value) -> anyhow::Result<()> {
        self.x = snapshot["x"].as_f64().unwrap_or(0.0) as f32;
        self.y = snapshot["y"].as_f64().unwrap_or(0.0) as f32;
        Ok(())
    }

    fn probe_position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    fn prop_snapshot(&self) -> serde_json::Value {
        serde_json::json!({"x": self.x})
    }
}

pub(super) struct RunnerFactory;

impl SimulationFactory for RunnerFactory {
    type Sim = Runner;

    fn create(&mut self, _params: &serde_json::Value) -> anyhow::Result<Runner> {
        Ok(Runner::default())
    }
}

fn key(code: &str) -> InputBinding {
    InputBinding::Key {
        code: code.to_string(),
    }
}

fn command(name: &str, bindings: Vec<InputBinding>) -> CommandSpec {
    CommandSpec {
        name: name.to_string(),
        bindings,
        unignorable: false,
        unreplayable: false,
        execute: None,
        enabled: true,
    }
}

pub(super) fn test_table() -> CommandSpecTable {
    let mut pause = command("pause", vec![key("Escape")]);
    pause.unignorable = true;

    let mut editor_drag = command("editor_drag", vec![InputBinding::PointerButton { button: 0 }]);
    editor_drag.unreplayable = true;

    CommandSpecTable::new(vec![
        command(
            "left",
            vec![
                key("ArrowLeft"),
                InputBinding::StickAxis {
                    axis: StickAxis::LeftX,
                    direction: AxisDirection::Negative,
                },
            ],
        ),
        command(
            "right",
            vec![
                key("ArrowRight"),
                InputBinding::StickAxis {
                    axis: StickAxis::LeftX,
                    direction: AxisDirection::Positive,
                },
            ],
        ),
        command("jump", vec![key("Space")]),
        pause,
        editor_drag,
    ])
    .unwrap()
}

pub(super) fn test_session() -> Session<Runner, ManualPoller> {
    test_session_with(test_table())
}

/// Install a test subscriber so `RUST_LOG=debug cargo test` shows engine
/// logs inline with test output.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub(super) fn test_session_with(table: CommandSpecTable) -> Session<Runner, ManualPoller> {
    init_tracing();
    let mut session = Session::new(
        table,
        ActionRegistry::new(),
        Runner::default(),
        ManualPoller::new(),
        SchedulerConfig::default(),
    )
    .unwrap();
    session.attach_scene(SceneAttachment::new("level_1"));
    session
}

/// Drive one tick per script entry, each entry holding exactly the listed
/// keys for that tick.
pub(super) fn play_script(session: &mut Session<Runner, ManualPoller>, script: &[&[&str]]) {
    for keys in script {
        session.poller_mut().clear();
        for code in *keys {
            session.poller_mut().set_key(code, true);
        }
        session.run_tick();
    }
    session.poller_mut().clear();
}

/// A short session script mixing movement, idle stretches and a jump.
pub(super) fn sample_script() -> Vec<&'static [&'static str]> {
    vec![
        &["ArrowRight"],
        &["ArrowRight"],
        &["ArrowRight"],
        &["ArrowRight", "Space"],
        &["ArrowRight", "Space"],
        &[],
        &[],
        &[],
        &["ArrowLeft"],
        &["ArrowLeft"],
        &["Space"],
        &[],
    ]
}
