//! View-state persistence collaborator.
//!
//! Forms and data views push their state to a [`ViewStateStore`] and pull it
//! back when they are recreated. Three stores ship with the crate:
//! [`NoopStore`], [`MemoryStore`] (entries in a shared, thread-safe
//! [`MemoryBackend`] with a history stack for `popstate`) and [`FileStore`]
//! (one JSON document on disk).

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

use crate::config::EngineConfig;
use crate::form::value::Value;
use crate::hooks::observable::{Listeners, Subscription};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to write view state {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode view state: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("store has been disposed")]
    Disposed,
}

pub trait ViewStateStore {
    /// Last stored state, if any.
    fn get(&self) -> Option<Value>;

    /// Store `data`. A snapshot also becomes a history entry.
    fn set(&self, data: Value, snapshot: bool) -> Result<(), StoreError>;

    /// Called with the restored state when history is popped.
    fn on_pop_state(&self, callback: Rc<dyn Fn(&Value)>) -> Subscription {
        let _ = callback;
        Subscription::empty()
    }

    fn dispose(&self) {}
}

/// Stores nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStore;

impl ViewStateStore for NoopStore {
    fn get(&self) -> Option<Value> {
        None
    }

    fn set(&self, _data: Value, _snapshot: bool) -> Result<(), StoreError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MemoryEntry {
    current: Option<Value>,
    history: Vec<Value>,
}

/// Keyed entries shared by any number of [`MemoryStore`]s. Cloning shares
/// the same entries, and the backend may be read from other threads.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    entries: Arc<RwLock<HashMap<String, MemoryEntry>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().get(key).and_then(|e| e.current.clone())
    }

    pub fn history_len(&self, key: &str) -> usize {
        self.entries.read().get(key).map_or(0, |e| e.history.len())
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }
}

/// A [`ViewStateStore`] over one key of a [`MemoryBackend`].
pub struct MemoryStore {
    backend: MemoryBackend,
    key: String,
    pop_listeners: Rc<Listeners<dyn Fn(&Value)>>,
}

impl MemoryStore {
    pub fn new(backend: &MemoryBackend, key: impl Into<String>) -> Self {
        Self {
            backend: backend.clone(),
            key: key.into(),
            pop_listeners: Listeners::new(),
        }
    }

    /// Go back one history entry and notify `popstate` listeners.
    /// Returns the restored state.
    pub fn pop_state(&self) -> Option<Value> {
        let restored = {
            let mut entries = self.backend.entries.write();
            let entry = entries.get_mut(&self.key)?;
            entry.history.pop();
            let restored = entry.history.last().cloned()?;
            entry.current = Some(restored.clone());
            restored
        };
        tracing::debug!(key = %self.key, "view state popped");
        for listener in self.pop_listeners.snapshot() {
            listener(&restored);
        }
        Some(restored)
    }
}

impl ViewStateStore for MemoryStore {
    fn get(&self) -> Option<Value> {
        self.backend.get(&self.key)
    }

    fn set(&self, data: Value, snapshot: bool) -> Result<(), StoreError> {
        let mut entries = self.backend.entries.write();
        let entry = entries.entry(self.key.clone()).or_default();
        if snapshot {
            entry.history.push(data.clone());
        }
        entry.current = Some(data);
        Ok(())
    }

    fn on_pop_state(&self, callback: Rc<dyn Fn(&Value)>) -> Subscription {
        self.pop_listeners.add(callback)
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("key", &self.key)
            .field("pop_listeners", &self.pop_listeners.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// FileStore
// ---------------------------------------------------------------------------

/// One JSON document on disk.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    disposed: std::cell::Cell<bool>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            disposed: std::cell::Cell::new(false),
        }
    }

    /// `{data_dir}/bindery`, or `None` when the platform has no data dir.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("bindery"))
    }

    /// Store named `name` in the configured persistence directory, falling
    /// back to [`default_dir`](Self::default_dir).
    pub fn for_config(config: &EngineConfig, name: &str) -> Option<Self> {
        let dir = config.persistence.dir.clone().or_else(Self::default_dir)?;
        Some(Self::new(dir.join(format!("{name}.json"))))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ViewStateStore for FileStore {
    fn get(&self) -> Option<Value> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to read view state");
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "ignoring corrupt view state");
                None
            }
        }
    }

    fn set(&self, data: Value, _snapshot: bool) -> Result<(), StoreError> {
        if self.disposed.get() {
            return Err(StoreError::Disposed);
        }
        let content = serde_json::to_string_pretty(&data)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&self.path, content).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })
    }

    fn dispose(&self) {
        self.disposed.set(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;

    #[test]
    fn memory_stores_share_backend_by_key() {
        let backend = MemoryBackend::new();
        let a = MemoryStore::new(&backend, "form");
        a.set(Value::from(json!({"x": 1})), false).unwrap();

        let b = MemoryStore::new(&backend, "form");
        assert_eq!(b.get(), Some(Value::from(json!({"x": 1}))));
        assert_eq!(MemoryStore::new(&backend, "other").get(), None);
    }

    #[test]
    fn pop_state_restores_previous_snapshot() {
        let backend = MemoryBackend::new();
        let store = MemoryStore::new(&backend, "view");
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        let _sub = store.on_pop_state(Rc::new(move |v: &Value| s.borrow_mut().push(v.clone())));

        store.set(Value::from(1), true).unwrap();
        store.set(Value::from(2), true).unwrap();
        assert_eq!(store.pop_state(), Some(Value::from(1)));
        assert_eq!(store.get(), Some(Value::from(1)));
        assert_eq!(*seen.borrow(), vec![Value::from(1)]);
        assert_eq!(store.pop_state(), None);
    }

    #[test]
    fn file_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested/form.json"));
        assert_eq!(store.get(), None);
        store.set(Value::from(json!({"a": [1, 2]})), false).unwrap();
        assert_eq!(store.get(), Some(Value::from(json!({"a": [1, 2]}))));
    }

    #[test]
    fn disposed_file_store_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("form.json"));
        store.dispose();
        assert!(matches!(store.set(Value::Null, false), Err(StoreError::Disposed)));
    }
}
