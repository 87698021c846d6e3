//! Name to open-store mapping.
//!
//! The registry is the only place that opens LMDB environments. Each store
//! name maps to at most one open [`StoreHandle`] for the lifetime of the
//! process, so a reopen always returns the same environment.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tally_core::{StorageError, StoreName, TallyError, TallyResult};
use tracing::{debug, info};

use crate::engine::{EngineOptions, StoreHandle};

/// Directory-per-store registry rooted at a data directory.
#[derive(Debug)]
pub struct Registry {
    root: PathBuf,
    options: EngineOptions,
    open: RwLock<HashMap<StoreName, StoreHandle>>,
}

impl Registry {
    /// Create a registry rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>, options: EngineOptions) -> TallyResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| {
            TallyError::Storage(StorageError::Backend {
                reason: format!("cannot create data directory {}: {e}", root.display()),
            })
        })?;
        Ok(Self {
            root,
            options,
            open: RwLock::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store_path(&self, name: &StoreName) -> PathBuf {
        self.root.join(name.as_str())
    }

    /// Whether a store with this name exists on disk.
    pub fn exists(&self, name: &StoreName) -> TallyResult<bool> {
        match std::fs::metadata(self.store_path(name)) {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(TallyError::Storage(StorageError::Backend {
                reason: e.to_string(),
            })),
        }
    }

    /// Open an existing store. Fails with `NotFound` if it is absent.
    pub fn open(&self, name: &StoreName) -> TallyResult<StoreHandle> {
        self.open_with(name, false)
    }

    /// Open a store, creating it on first use.
    pub fn create(&self, name: &StoreName) -> TallyResult<StoreHandle> {
        self.open_with(name, true)
    }

    fn open_with(&self, name: &StoreName, create: bool) -> TallyResult<StoreHandle> {
        // Fast path: read lock.
        {
            let open = self.open.read().map_err(|_| StorageError::LockPoisoned)?;
            if let Some(handle) = open.get(name) {
                return Ok(handle.clone());
            }
        }

        let mut open = self.open.write().map_err(|_| StorageError::LockPoisoned)?;
        // Double-check after acquiring the write lock.
        if let Some(handle) = open.get(name) {
            return Ok(handle.clone());
        }

        if !create && !self.exists(name)? {
            return Err(StorageError::NotFound {
                name: name.to_string(),
            }
            .into());
        }

        let handle = StoreHandle::open(name.clone(), &self.store_path(name), self.options)?;
        if create {
            info!(store = %name, "Opened store");
        } else {
            debug!(store = %name, "Opened store");
        }
        open.insert(name.clone(), handle.clone());
        Ok(handle)
    }

    /// Close and remove a store's on-disk directory.
    ///
    /// The environment is closed before its files are unlinked, so a later
    /// `create` maps fresh files. Fails with `DeleteFailed` while any clone of
    /// the handle is still alive; callers are expected to hold the store's name
    /// exclusively.
    pub fn delete(&self, name: &StoreName) -> TallyResult<()> {
        // Held throughout so the name cannot be reopened mid-delete.
        let mut open = self.open.write().map_err(|_| StorageError::LockPoisoned)?;
        if let Some(handle) = open.remove(name) {
            if let Err(handle) = handle.close() {
                open.insert(name.clone(), handle);
                return Err(StorageError::DeleteFailed {
                    name: name.to_string(),
                    reason: "store is still in use".to_string(),
                }
                .into());
            }
            debug!(store = %name, "Closed store environment");
        }

        match std::fs::remove_dir_all(self.store_path(name)) {
            Ok(()) => {
                info!(store = %name, "Deleted store");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StorageError::NotFound {
                name: name.to_string(),
            }
            .into()),
            Err(e) => Err(StorageError::DeleteFailed {
                name: name.to_string(),
                reason: e.to_string(),
            }
            .into()),
        }
    }

    /// Number of stores currently held open.
    pub fn open_count(&self) -> usize {
        self.open.read().map(|open| open.len()).unwrap_or(0)
    }

    pub fn is_open(&self, name: &StoreName) -> bool {
        self.open
            .read()
            .map(|open| open.contains_key(name))
            .unwrap_or(false)
    }

    /// Names of all stores on disk, sorted.
    pub fn list(&self) -> TallyResult<Vec<StoreName>> {
        let entries = std::fs::read_dir(&self.root).map_err(|e| StorageError::Backend {
            reason: e.to_string(),
        })?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::Backend {
                reason: e.to_string(),
            })?;
            if !entry.path().is_dir() {
                continue;
            }
            if let Some(name) = entry
                .file_name()
                .to_str()
                .and_then(|s| StoreName::new(s).ok())
            {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}
