//! Scene attachment registry
//!
//! Tracks which simulation instances are currently consuming input. The
//! registry is a stack: the topmost attachment owns the command state bank,
//! and anything below it is sampled only for unignorable commands. Each
//! attachment carries its own ignore flags and, optionally, its own captured
//! frame list for debugging.

use bitflags::bitflags;

use crate::frame::{Frame, append_frame};

bitflags! {
    /// Input categories an attachment can suppress.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct IgnoreFlags: u8 {
        /// Suppress every ignorable command
        const ALL = 0b0000_0001;
        /// Drop pointer events
        const POINTER = 0b0000_0010;
        /// Drop queued out-of-band action identifiers
        const PROPS = 0b0000_0100;
    }
}

/// One simulation instance's claim on input.
///
/// Created when the instance begins consuming input, destroyed when it ends.
#[derive(Debug)]
pub struct SceneAttachment {
    /// Scene identifier, matching `Recording::scene`
    pub scene: String,
    /// Categories this attachment suppresses
    pub ignore: IgnoreFlags,
    /// Frames captured for debugging (None when not capturing)
    pub captured_frames: Option<Vec<Frame>>,
    /// Ticks consumed since attach
    pub tick_counter: u64,
}

impl SceneAttachment {
    pub fn new(scene: impl Into<String>) -> Self {
        Self {
            scene: scene.into(),
            ignore: IgnoreFlags::empty(),
            captured_frames: None,
            tick_counter: 0,
        }
    }

    /// Enable the debug frame capture list.
    pub fn with_capture(mut self) -> Self {
        self.captured_frames = Some(Vec::new());
        self
    }

    pub fn with_ignore(mut self, ignore: IgnoreFlags) -> Self {
        self.ignore = ignore;
        self
    }

    /// Record a consumed frame: bump the tick counter and mirror into the
    /// capture list when present. Capture uses the same repeat compression
    /// as recordings.
    pub fn consume(&mut self, frame: &Frame) {
        self.tick_counter += 1;
        if let Some(list) = &mut self.captured_frames {
            append_frame(list, frame.clone(), false);
        }
    }
}

/// Stack of scene attachments; the topmost one owns input.
#[derive(Debug, Default)]
pub struct SceneRegistry {
    stack: Vec<SceneAttachment>,
}

impl SceneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push an attachment on top of the stack.
    pub fn attach(&mut self, attachment: SceneAttachment) {
        tracing::debug!(scene = attachment.scene.as_str(), "scene attached");
        self.stack.push(attachment);
    }

    /// Remove the named attachment, returning it if present.
    pub fn detach(&mut self, scene: &str) -> Option<SceneAttachment> {
        let idx = self.stack.iter().rposition(|a| a.scene == scene)?;
        tracing::debug!(scene, "scene detached");
        Some(self.stack.remove(idx))
    }

    /// The attachment currently owning input.
    pub fn topmost(&self) -> Option<&SceneAttachment> {
        self.stack.last()
    }

    pub fn topmost_mut(&mut self) -> Option<&mut SceneAttachment> {
        self.stack.last_mut()
    }

    /// Whether the topmost attachment suppresses ignorable commands.
    pub fn ignore_all(&self) -> bool {
        self.topmost()
            .is_some_and(|a| a.ignore.contains(IgnoreFlags::ALL))
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}
