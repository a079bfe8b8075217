//! Persisted execution handle
//!
//! Only the execution id is ever persisted, never the step list. The file
//! store behaves like a small key/value store: it owns one string key inside
//! a JSON object and leaves every other key alone.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use super::{ExecutionHandle, TrackerError};
use crate::config::StoreConfig;

pub trait HandleStore: Send + Sync {
    fn load(&self) -> Result<Option<ExecutionHandle>, TrackerError>;
    fn save(&self, handle: &ExecutionHandle) -> Result<(), TrackerError>;
    fn clear(&self) -> Result<(), TrackerError>;
}

/// Build the store described by the config
pub fn open_store(config: &StoreConfig) -> Box<dyn HandleStore> {
    match config {
        StoreConfig::Memory => Box::new(MemoryStore::new()),
        StoreConfig::File { path, key } => Box::new(FileStore::new(path, key)),
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    value: Mutex<Option<ExecutionHandle>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handle(handle: impl Into<ExecutionHandle>) -> Self {
        Self {
            value: Mutex::new(Some(handle.into())),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<ExecutionHandle>>, TrackerError> {
        self.value
            .lock()
            .map_err(|_| TrackerError::Store("memory store lock poisoned".to_string()))
    }
}

impl HandleStore for MemoryStore {
    fn load(&self) -> Result<Option<ExecutionHandle>, TrackerError> {
        Ok(self.lock()?.clone())
    }

    fn save(&self, handle: &ExecutionHandle) -> Result<(), TrackerError> {
        *self.lock()? = Some(handle.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), TrackerError> {
        *self.lock()? = None;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    key: String,
}

impl FileStore {
    pub fn new(path: impl AsRef<Path>, key: &str) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            key: key.to_string(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, TrackerError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<(), TrackerError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(entries)?)?;
        Ok(())
    }
}

impl HandleStore for FileStore {
    fn load(&self) -> Result<Option<ExecutionHandle>, TrackerError> {
        Ok(self
            .read_all()?
            .get(&self.key)
            .map(|id| ExecutionHandle::new(id.as_str())))
    }

    fn save(&self, handle: &ExecutionHandle) -> Result<(), TrackerError> {
        let mut entries = self.read_all()?;
        entries.insert(self.key.clone(), handle.as_str().to_string());
        self.write_all(&entries)?;
        debug!(path = %self.path.display(), execution_id = %handle, "Persisted execution id");
        Ok(())
    }

    fn clear(&self) -> Result<(), TrackerError> {
        let mut entries = self.read_all()?;
        if entries.remove(&self.key).is_some() {
            self.write_all(&entries)?;
            debug!(path = %self.path.display(), "Cleared persisted execution id");
        }
        Ok(())
    }
}
