//! Simulation collaborator traits
//!
//! The gameplay layer is an external collaborator: the engine drives it
//! through [`Simulation`] once per tick and never looks inside. A
//! [`SimulationFactory`] builds additional isolated instances for time-sight
//! target runs.

use glam::Vec2;

use crate::command::CommandBank;

/// One simulation instance driven by the engine.
///
/// The command bank is handed in explicitly each step - there are no ambient
/// globals - so a time-sight target reading its own bank is indistinguishable
/// from the live instance reading the live one. State exposed for persistence
/// is an opaque JSON blob; the engine stores, checksums and restores it
/// without interpreting it.
pub trait Simulation {
    /// Advance by one fixed step. Errors are counted as per-tick faults.
    fn step(&mut self, commands: &CommandBank, sim_time: f64, dt: f32) -> anyhow::Result<()>;

    /// Serialize whatever this simulation exposes as restorable state.
    fn snapshot(&self) -> serde_json::Value;

    /// Restore state captured by [`Simulation::snapshot`].
    fn restore(&mut self, snapshot: &serde_json::Value) -> anyhow::Result<()>;

    /// Position probe used for time-sight ghost spacing.
    fn probe_position(&self) -> Vec2;

    /// Configuration/prop values shown while a ghost frame is pinned.
    fn prop_snapshot(&self) -> serde_json::Value {
        serde_json::Value::Null
    }

    /// Stop in-flight cosmetic motion that must not survive a freeze.
    /// Default does nothing; purely-logical simulations have nothing to halt.
    fn freeze_visuals(&mut self) {}

    /// Resume after [`Simulation::freeze_visuals`].
    fn unfreeze_visuals(&mut self) {}
}

/// Builds isolated simulation instances.
///
/// A time-sight target is created through this factory with the recording's
/// original parameters; it shares no mutable state with the live instance.
pub trait SimulationFactory {
    type Sim: Simulation;

    fn create(&mut self, params: &serde_json::Value) -> anyhow::Result<Self::Sim>;
}
