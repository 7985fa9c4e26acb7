//! Key/value persistence collaborator
//!
//! Baselines and session snapshots are persisted through a tiny string store,
//! modelled on browser local storage. Backends report failures; callers inside the
//! engine log them and fall back to in-memory state.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::error::StorageError;

/// Synchronous string store.
///
/// Methods take `&self` so one store can be shared between the baseline store and
/// the session controller; backends use interior mutability.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Store handle shared within a single execution context
pub type SharedStore = Rc<dyn KeyValueStore>;

/// Process-lifetime store backed by a hash map
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedStore {
        Rc::new(Self::new())
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

/// Store persisted as a flat JSON object on disk.
///
/// The file is read once on first access and rewritten in full on every change.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: RefCell<Option<BTreeMap<String, String>>>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: RefCell::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All entries currently in the file
    pub fn entries(&self) -> Result<BTreeMap<String, String>, StorageError> {
        self.ensure_loaded()?;
        Ok(self.entries.borrow().clone().unwrap_or_default())
    }

    fn ensure_loaded(&self) -> Result<(), StorageError> {
        if self.entries.borrow().is_some() {
            return Ok(());
        }
        let loaded = if self.path.exists() {
            let content = fs::read_to_string(&self.path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content)
                    .map_err(|e| StorageError::Corrupt(format!("{}: {}", self.path.display(), e)))?
            }
        } else {
            BTreeMap::new()
        };
        *self.entries.borrow_mut() = Some(loaded);
        Ok(())
    }

    fn flush(&self) -> Result<(), StorageError> {
        let entries = self.entries.borrow();
        let map = entries.as_ref().cloned().unwrap_or_default();
        let json = serde_json::to_string_pretty(&map)
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, json)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.ensure_loaded()?;
        Ok(self
            .entries
            .borrow()
            .as_ref()
            .and_then(|map| map.get(key).cloned()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.ensure_loaded()?;
        if let Some(map) = self.entries.borrow_mut().as_mut() {
            map.insert(key.to_string(), value.to_string());
        }
        self.flush()
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.ensure_loaded()?;
        let removed = self
            .entries
            .borrow_mut()
            .as_mut()
            .and_then(|map| map.remove(key))
            .is_some();
        if removed {
            self.flush()?;
        }
        Ok(())
    }
}
