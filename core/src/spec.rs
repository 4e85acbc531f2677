//! Command spec table
//!
//! Declares every logical command the engine knows about: its physical input
//! bindings and its capture flags. Tables are plain serde data loadable from
//! TOML, validated once at load time. Stored frames reference command *names*,
//! never physical bindings, so rebinding a key can never invalidate a
//! recording already on disk.
//!
//! Hot swapping is modelled as versioned tables: a new table replaces the old
//! one atomically and [`CommandSpecTable::diff`] reports exactly which
//! commands changed so only the affected listeners are re-subscribed.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stick axis identifiers for directional bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StickAxis {
    LeftX,
    LeftY,
    RightX,
    RightY,
}

/// Which side of an axis a binding listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisDirection {
    Negative,
    Positive,
}

/// A physical input a command can bind to.
///
/// Resolved to a typed identifier once at spec-load time; nothing is looked
/// up by path string per tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputBinding {
    /// Keyboard key, by platform key code name
    Key { code: String },
    /// Gamepad button, by button name
    PadButton { button: String },
    /// One direction of an analog stick axis
    StickAxis {
        axis: StickAxis,
        direction: AxisDirection,
    },
    /// Pointer button index (0 = primary)
    PointerButton { button: u8 },
}

impl std::fmt::Display for InputBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputBinding::Key { code } => write!(f, "key:{code}"),
            InputBinding::PadButton { button } => write!(f, "pad:{button}"),
            InputBinding::StickAxis { axis, direction } => {
                write!(f, "stick:{axis:?}:{direction:?}")
            }
            InputBinding::PointerButton { button } => write!(f, "pointer:{button}"),
        }
    }
}

/// One logical command declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Unique command name; this is what stored frames reference
    pub name: String,
    /// Physical bindings sampled for this command, in priority order
    #[serde(default)]
    pub bindings: Vec<InputBinding>,
    /// Still sampled while a scene-level suppression or a replay is active
    #[serde(default)]
    pub unignorable: bool,
    /// Never restored from a stored frame during playback
    #[serde(default)]
    pub unreplayable: bool,
    /// Action invoked exactly once on the tick the command starts
    #[serde(default)]
    pub execute: Option<String>,
    /// Disabled commands are forced to not-held before every timer update
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Errors raised while loading or validating a command spec table.
///
/// These are configuration errors: they fail fast at load time and are
/// surfaced to the operator rather than tolerated.
#[derive(Debug, Error)]
pub enum SpecError {
    #[error("duplicate command name `{0}`")]
    DuplicateCommand(String),
    #[error("command `{command}` has an empty binding identifier")]
    EmptyBinding { command: String },
    #[error("command `{command}` executes unknown action `{action}`")]
    UnknownAction { command: String, action: String },
    #[error("failed to parse command table: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Registry of named out-of-band actions.
///
/// `execute` targets and recorded executed-prop identifiers both resolve
/// here. Lookups that fail after a live spec update are a warning, not a
/// crash: playback continues best-effort.
#[derive(Default)]
pub struct ActionRegistry {
    actions: HashMap<String, Box<dyn FnMut()>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action under `id`, replacing any previous registration.
    pub fn register(&mut self, id: impl Into<String>, action: impl FnMut() + 'static) {
        self.actions.insert(id.into(), Box::new(action));
    }

    pub fn remove(&mut self, id: &str) {
        self.actions.remove(id);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.actions.contains_key(id)
    }

    /// Invoke `id` if it resolves; log and skip otherwise.
    ///
    /// Returns whether the action ran.
    pub fn invoke(&mut self, id: &str) -> bool {
        match self.actions.get_mut(id) {
            Some(action) => {
                action();
                true
            }
            None => {
                tracing::warn!(action = id, "executed prop no longer resolves, skipping");
                false
            }
        }
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Immutable, versioned table of command specs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSpecTable {
    /// Monotonic version, bumped by the session on every hot swap
    #[serde(default)]
    pub version: u64,
    /// Declared commands, in declaration order
    #[serde(default)]
    pub commands: Vec<CommandSpec>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl CommandSpecTable {
    /// Build a table from command declarations, checking name uniqueness.
    pub fn new(commands: Vec<CommandSpec>) -> Result<Self, SpecError> {
        let mut table = Self {
            version: 0,
            commands,
            index: HashMap::new(),
        };
        table.reindex()?;
        Ok(table)
    }

    /// Parse a table from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, SpecError> {
        let mut table: CommandSpecTable = toml::from_str(text)?;
        table.reindex()?;
        Ok(table)
    }

    fn reindex(&mut self) -> Result<(), SpecError> {
        self.index.clear();
        for (i, spec) in self.commands.iter().enumerate() {
            if self.index.insert(spec.name.clone(), i).is_some() {
                return Err(SpecError::DuplicateCommand(spec.name.clone()));
            }
        }
        Ok(())
    }

    /// Validate bindings and `execute` targets against the action registry.
    pub fn validate(&self, actions: &ActionRegistry) -> Result<(), SpecError> {
        for spec in &self.commands {
            for binding in &spec.bindings {
                let empty = match binding {
                    InputBinding::Key { code } => code.is_empty(),
                    InputBinding::PadButton { button } => button.is_empty(),
                    _ => false,
                };
                if empty {
                    return Err(SpecError::EmptyBinding {
                        command: spec.name.clone(),
                    });
                }
            }
            if let Some(action) = &spec.execute
                && !actions.contains(action)
            {
                return Err(SpecError::UnknownAction {
                    command: spec.name.clone(),
                    action: action.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&CommandSpec> {
        self.index.get(name).map(|&i| &self.commands[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommandSpec> {
        self.commands.iter()
    }

    /// Diff against a replacement table.
    ///
    /// The delta drives re-subscription: only commands listed here need their
    /// physical-input listeners re-attached.
    pub fn diff(&self, new: &CommandSpecTable) -> SpecDelta {
        let mut delta = SpecDelta::default();
        for spec in &self.commands {
            match new.get(&spec.name) {
                None => delta.removed.push(spec.name.clone()),
                Some(replacement) if replacement.bindings != spec.bindings => {
                    delta.rebound.push(spec.name.clone());
                }
                Some(_) => {}
            }
        }
        for spec in &new.commands {
            if !self.contains(&spec.name) {
                delta.added.push(spec.name.clone());
            }
        }
        delta
    }
}

/// Commands affected by a spec hot swap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecDelta {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub rebound: Vec<String>,
}

impl SpecDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.rebound.is_empty()
    }
}
