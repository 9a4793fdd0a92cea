//! Durable local moderation overrides.
//!
//! Keeps a small id-to-flags map that survives restarts, used as the
//! source of truth for `pinned` and `hidden` whenever the remote schema
//! lacks those columns or a remote write fails. Reads never fail and
//! writes never surface errors to callers; a failed persist is logged
//! and leaves the in-memory map untouched.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Namespace key the override map is stored under.
pub const STATUS_KEY: &str = "corkboard-comment-status";

/// Moderation flags for a single comment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationFlags {
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub hidden: bool,
}

impl ModerationFlags {
    /// True when neither flag is set.
    #[must_use]
    pub const fn is_clear(self) -> bool {
        !self.pinned && !self.hidden
    }
}

/// Key-value backend the override store persists through.
pub trait StatusPersistence: Clone + Send + Sync + 'static {
    /// Load the raw value stored under `key`.
    fn load(&self, key: &str) -> Result<Option<String>>;
    /// Store `value` under `key`.
    fn save(&self, key: &str, value: &str) -> Result<()>;
}

/// Id-to-flags map with write-through persistence.
#[derive(Debug, Clone)]
pub struct OverrideStore<P: StatusPersistence> {
    persistence: P,
    entries: BTreeMap<String, ModerationFlags>,
}

impl<P: StatusPersistence> OverrideStore<P> {
    /// Open the store, loading any previously persisted map.
    ///
    /// An unreadable or unparsable payload falls back to the empty map.
    pub fn open(persistence: P) -> Self {
        let entries = match Self::load_entries(&persistence) {
            Ok(entries) => entries,
            Err(error) => {
                tracing::warn!("Failed to load moderation overrides: {error}");
                BTreeMap::new()
            }
        };
        Self {
            persistence,
            entries,
        }
    }

    fn load_entries(persistence: &P) -> Result<BTreeMap<String, ModerationFlags>> {
        let Some(raw) = persistence.load(STATUS_KEY)? else {
            return Ok(BTreeMap::new());
        };
        Ok(serde_json::from_str(&raw)?)
    }

    /// Flags stored for `id`, or clear flags when absent.
    #[must_use]
    pub fn status(&self, id: &str) -> ModerationFlags {
        self.entries.get(id).copied().unwrap_or_default()
    }

    pub fn set_pinned(&mut self, id: &str, value: bool) {
        let mut flags = self.status(id);
        flags.pinned = value;
        self.stage(id, flags);
    }

    pub fn set_hidden(&mut self, id: &str, value: bool) {
        let mut flags = self.status(id);
        flags.hidden = value;
        self.stage(id, flags);
    }

    /// Drop the entry for `id` if present.
    pub fn remove(&mut self, id: &str) {
        if !self.entries.contains_key(id) {
            return;
        }
        let mut staged = self.entries.clone();
        staged.remove(id);
        self.commit(staged);
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        self.commit(BTreeMap::new());
    }

    /// All stored overrides, keyed by comment id.
    #[must_use]
    pub const fn entries(&self) -> &BTreeMap<String, ModerationFlags> {
        &self.entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn stage(&mut self, id: &str, flags: ModerationFlags) {
        let mut staged = self.entries.clone();
        staged.insert(id.to_string(), flags);
        self.commit(staged);
    }

    fn commit(&mut self, staged: BTreeMap<String, ModerationFlags>) {
        match serde_json::to_string(&staged) {
            Ok(raw) => match self.persistence.save(STATUS_KEY, &raw) {
                Ok(()) => self.entries = staged,
                Err(error) => {
                    tracing::warn!("Failed to persist moderation overrides: {error}");
                }
            },
            Err(error) => {
                tracing::warn!("Failed to serialize moderation overrides: {error}");
            }
        }
    }
}

/// Persistence backend storing each key as a JSON file in a directory.
#[derive(Debug, Clone)]
pub struct FileStatusPersistence {
    dir: PathBuf,
}

impl FileStatusPersistence {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl StatusPersistence for FileStatusPersistence {
    fn load(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?))
    }

    fn save(&self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.path_for(key), value)?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryPersistenceInner {
    values: BTreeMap<String, String>,
    fail_saves: bool,
}

/// In-memory persistence backend for tests. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStatusPersistence {
    inner: Arc<Mutex<MemoryPersistenceInner>>,
}

impl MemoryStatusPersistence {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Force subsequent saves to fail.
    pub fn set_fail_saves(&self, value: bool) {
        self.lock().fail_saves = value;
    }

    /// Raw stored value for `key`, for inspection.
    #[must_use]
    pub fn raw(&self, key: &str) -> Option<String> {
        self.lock().values.get(key).cloned()
    }

    /// Store a raw value directly, bypassing failure switches.
    pub fn put_raw(&self, key: &str, value: &str) {
        self.lock().values.insert(key.to_string(), value.to_string());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryPersistenceInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StatusPersistence for MemoryStatusPersistence {
    fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().values.get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<()> {
        let mut inner = self.lock();
        if inner.fail_saves {
            return Err(Error::Io(std::io::Error::other(
                "status persistence unavailable",
            )));
        }
        inner.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
