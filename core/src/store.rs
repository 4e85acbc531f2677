//! Opaque key/value blob persistence
//!
//! Recordings and other engine artifacts persist through a [`BlobStore`]:
//! JSON-serializable values keyed by string, with no schema knowledge on the
//! store side. [`MemoryStore`] backs tests and ephemeral sessions;
//! [`FileStore`] keeps everything in one JSON file written atomically
//! (temp file + rename) so a crash mid-flush can never corrupt saves.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use thiserror::Error;

use crate::recording::Recording;

/// Current on-disk format version for [`FileStore`].
pub const STORE_VERSION: u32 = 1;

/// Errors raised by blob persistence.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("store path has no file name")]
    BadPath,
}

/// Opaque key/value persistence consumed by the engine.
pub trait BlobStore {
    /// Store `value` under `key`, replacing any previous value.
    fn save(&mut self, key: &str, value: serde_json::Value) -> Result<(), StoreError>;
    /// Fetch the value under `key`, or None when absent.
    fn load(&self, key: &str) -> Option<serde_json::Value>;
    /// Delete the value under `key`.
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;
    /// All stored keys, unordered.
    fn keys(&self) -> Vec<String>;
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, serde_json::Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryStore {
    fn save(&mut self, key: &str, value: serde_json::Value) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn load(&self, key: &str) -> Option<serde_json::Value> {
        self.entries.get(key).cloned()
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

#[derive(Debug, Deserialize)]
struct StoreFile {
    version: u32,
    entries: HashMap<String, serde_json::Value>,
}

#[derive(Serialize)]
struct StoreFileRef<'a> {
    version: u32,
    entries: &'a HashMap<String, serde_json::Value>,
}

/// Single-file JSON store with atomic flushes.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: HashMap<String, serde_json::Value>,
    dirty: bool,
}

impl FileStore {
    /// Load the store at `path`, or start empty when the file is missing.
    ///
    /// A corrupt or wrong-version file logs a warning and starts empty -
    /// stores are user data and must not brick a session.
    pub fn load_or_new(path: PathBuf) -> Result<Self, StoreError> {
        let entries = match fs::read(&path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
            Ok(bytes) => match serde_json::from_slice::<StoreFile>(&bytes) {
                Ok(file) if file.version == STORE_VERSION => file.entries,
                Ok(file) => {
                    tracing::warn!(
                        path = %path.display(),
                        version = file.version,
                        "store file has an unknown version; starting empty"
                    );
                    HashMap::new()
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "store file is unreadable; starting empty"
                    );
                    HashMap::new()
                }
            },
        };
        Ok(Self {
            path,
            entries,
            dirty: false,
        })
    }

    /// Write pending changes to disk atomically. No-op when clean.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        if !self.dirty {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = match self.path.file_name() {
            Some(name) => {
                let mut tmp_name = OsString::from(name);
                tmp_name.push(".tmp");
                self.path.with_file_name(tmp_name)
            }
            None => return Err(StoreError::BadPath),
        };

        let bytes = serde_json::to_vec(&StoreFileRef {
            version: STORE_VERSION,
            entries: &self.entries,
        })?;

        {
            let mut f = fs::File::create(&tmp_path)?;
            f.write_all(&bytes)?;
            f.sync_all()?;
        }

        #[cfg(windows)]
        {
            if self.path.exists() {
                // Windows rename fails if the destination exists.
                fs::remove_file(&self.path)?;
            }
        }

        fs::rename(&tmp_path, &self.path)?;
        self.dirty = false;
        Ok(())
    }
}

impl BlobStore for FileStore {
    fn save(&mut self, key: &str, value: serde_json::Value) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value);
        self.dirty = true;
        Ok(())
    }

    fn load(&self, key: &str) -> Option<serde_json::Value> {
        self.entries.get(key).cloned()
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        if self.entries.remove(key).is_some() {
            self.dirty = true;
        }
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

/// Storage key for a scene's recording.
pub fn recording_key(scene: &str) -> String {
    format!("recording/{scene}")
}

/// Persist a recording under its scene key.
pub fn save_recording(store: &mut dyn BlobStore, recording: &Recording) -> Result<(), StoreError> {
    let value = serde_json::to_value(recording)?;
    store.save(&recording_key(&recording.scene), value)
}

/// Load a scene's recording, repairing out-of-range fields.
///
/// Returns None when absent or structurally unreadable (logged, not raised) -
/// a damaged recording should degrade to "nothing to replay".
pub fn load_recording(store: &dyn BlobStore, scene: &str) -> Option<Recording> {
    let value = store.load(&recording_key(scene))?;
    match serde_json::from_value::<Recording>(value) {
        Ok(mut recording) => {
            recording.clamp_loaded();
            Some(recording)
        }
        Err(e) => {
            tracing::warn!(scene, error = %e, "stored recording is unreadable; ignoring");
            None
        }
    }
}
