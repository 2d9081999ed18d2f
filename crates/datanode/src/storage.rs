// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local storage collaborators.
//!
//! The namespace service manager only drives the seams defined here; the
//! block data itself is owned by the block store. `DiskStorage` keeps a
//! `VERSION` file under each data directory's `current/` tree plus one per
//! namespace under `current/NS-<id>/`. `SimulatedStorage` synthesizes the
//! same bookkeeping from the handshake result and never touches disk.

use crate::config::StartupOption;
use fs2::FileExt;
use hafs_core::{NamespaceId, StorageId, LAYOUT_VERSION};
use hafs_wire::{NamespaceInfo, StorageInfo};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("data directory {0} is not usable: {1}")]
    Disk(PathBuf, String),

    #[error("no usable data directories")]
    NoDirectories,

    #[error("on-disk layout version {found}, this node writes {expected}")]
    Layout { found: i32, expected: i32 },

    #[error("corrupt VERSION file at {0}: {1}")]
    Corrupt(PathBuf, String),

    #[error("namespace {0} has no storage directory")]
    MissingNamespace(NamespaceId),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Data-node-wide storage state. Recovery calls are serialised by the
/// caller via the node-wide storage gate.
pub trait Storage: Send + Sync {
    fn storage_id(&self) -> StorageId;
    fn info(&self) -> StorageInfo;

    /// Top-level recovery across all data directories: verify or create
    /// the storage tree, handling rollback when requested.
    fn recover_transition(
        &self,
        info: &NamespaceInfo,
        opt: StartupOption,
    ) -> Result<(), StorageError>;

    /// Per-namespace recovery. Returns the namespace directory to hand to
    /// the block store.
    fn recover_namespace(
        &self,
        info: &NamespaceInfo,
        opt: StartupOption,
    ) -> Result<PathBuf, StorageError>;

    /// Adopt a server-minted storage id and persist it everywhere.
    fn adopt_storage_id(&self, id: &StorageId) -> Result<(), StorageError>;

    /// Rewrite all VERSION files from in-memory state.
    fn write_all(&self) -> Result<(), StorageError>;

    fn remove_namespace(&self, ns: NamespaceId) -> Result<(), StorageError>;
    fn has_namespace(&self, ns: NamespaceId) -> bool;
}

/// Per-namespace hooks on the block store.
pub trait BlockStore: Send + Sync {
    fn add_namespace(&self, ns: NamespaceId, dir: &Path) -> Result<(), StorageError>;
    fn remove_namespace(&self, ns: NamespaceId) -> Result<(), StorageError>;
}

/// Per-namespace hooks on the block integrity scanner.
pub trait Scanner: Send + Sync {
    fn add_namespace(&self, ns: NamespaceId);
    fn remove_namespace(&self, ns: NamespaceId);
}

/// Validate configured data directories, dropping the unusable ones.
/// Startup proceeds as long as at least one survives.
pub fn check_data_dirs(dirs: &[PathBuf]) -> Result<Vec<PathBuf>, StorageError> {
    let mut usable = Vec::with_capacity(dirs.len());
    for dir in dirs {
        match probe_dir(dir) {
            Ok(()) => usable.push(dir.clone()),
            Err(e) => warn!(dir = %dir.display(), error = %e, "dropping unusable data directory"),
        }
    }
    if usable.is_empty() {
        return Err(StorageError::NoDirectories);
    }
    Ok(usable)
}

fn probe_dir(dir: &Path) -> Result<(), StorageError> {
    fs::create_dir_all(dir)
        .map_err(|e| StorageError::Disk(dir.to_path_buf(), e.to_string()))?;
    let probe = dir.join(".probe");
    File::create(&probe)
        .and_then(|_| fs::remove_file(&probe))
        .map_err(|e| StorageError::Disk(dir.to_path_buf(), e.to_string()))?;
    Ok(())
}

#[derive(Debug, Serialize, Deserialize)]
struct VersionProps {
    storage_id: String,
    layout_version: i32,
    c_time: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct NsVersionProps {
    namespace_id: u32,
    layout_version: i32,
    c_time: u64,
}

#[derive(Default)]
struct DiskState {
    storage_id: StorageId,
    layout_version: i32,
    c_time: u64,
    namespaces: HashMap<NamespaceId, PathBuf>,
    recovered: bool,
}

/// Disk-backed storage across one or more data directories.
pub struct DiskStorage {
    dirs: Vec<PathBuf>,
    state: Mutex<DiskState>,
    // Held for the lifetime of the node; releases on drop.
    _locks: Vec<File>,
}

impl DiskStorage {
    /// Lock every directory and read any existing top-level VERSION.
    pub fn open(dirs: Vec<PathBuf>) -> Result<Self, StorageError> {
        if dirs.is_empty() {
            return Err(StorageError::NoDirectories);
        }
        let mut locks = Vec::with_capacity(dirs.len());
        for dir in &dirs {
            fs::create_dir_all(dir.join("current"))?;
            let lock_path = dir.join("in_use.lock");
            let lock = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(false)
                .open(&lock_path)?;
            lock.try_lock_exclusive().map_err(|e| {
                StorageError::Disk(
                    dir.clone(),
                    format!("already in use by another node: {e}"),
                )
            })?;
            locks.push(lock);
        }

        let mut state = DiskState {
            layout_version: LAYOUT_VERSION,
            ..DiskState::default()
        };
        // Adopt whatever the first directory with a VERSION file says.
        for dir in &dirs {
            let path = version_path(dir);
            if !path.exists() {
                continue;
            }
            let props = read_version(&path)?;
            state.storage_id = StorageId::new(props.storage_id);
            state.layout_version = props.layout_version;
            state.c_time = props.c_time;
            break;
        }
        Ok(DiskStorage { dirs, state: Mutex::new(state), _locks: locks })
    }

    fn write_version_files(&self, state: &DiskState) -> Result<(), StorageError> {
        for dir in &self.dirs {
            let props = VersionProps {
                storage_id: state.storage_id.as_str().to_string(),
                layout_version: state.layout_version,
                c_time: state.c_time,
            };
            write_version(&version_path(dir), &props)?;
        }
        Ok(())
    }
}

fn version_path(dir: &Path) -> PathBuf {
    dir.join("current").join("VERSION")
}

fn read_version(path: &Path) -> Result<VersionProps, StorageError> {
    let text = fs::read_to_string(path)?;
    toml::from_str(&text).map_err(|e| StorageError::Corrupt(path.to_path_buf(), e.to_string()))
}

fn write_version(path: &Path, props: &VersionProps) -> Result<(), StorageError> {
    let text = toml::to_string(props)
        .map_err(|e| StorageError::Corrupt(path.to_path_buf(), e.to_string()))?;
    fs::write(path, text)?;
    Ok(())
}

fn read_ns_version(path: &Path) -> Result<NsVersionProps, StorageError> {
    let text = fs::read_to_string(path)?;
    toml::from_str(&text).map_err(|e| StorageError::Corrupt(path.to_path_buf(), e.to_string()))
}

impl Storage for DiskStorage {
    fn storage_id(&self) -> StorageId {
        self.state.lock().storage_id.clone()
    }

    fn info(&self) -> StorageInfo {
        let state = self.state.lock();
        StorageInfo {
            layout_version: state.layout_version,
            namespace_id: NamespaceId::UNKNOWN,
            c_time: state.c_time,
        }
    }

    fn recover_transition(
        &self,
        info: &NamespaceInfo,
        opt: StartupOption,
    ) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        if state.recovered {
            return Ok(());
        }
        let mut adopted = false;
        for dir in &self.dirs {
            // Rollback restores the previous tree before any analysis.
            if opt == StartupOption::Rollback {
                let previous = dir.join("previous");
                if previous.exists() {
                    info!(dir = %dir.display(), "rolling back to previous storage state");
                    let current = dir.join("current");
                    fs::remove_dir_all(&current)?;
                    fs::rename(&previous, &current)?;
                } else {
                    warn!(dir = %dir.display(), "rollback requested but no previous state");
                }
            }
            let path = version_path(dir);
            if !path.exists() {
                // Fresh directory: format it.
                info!(dir = %dir.display(), "formatting data directory");
                fs::create_dir_all(dir.join("current"))?;
                let props = VersionProps {
                    storage_id: state.storage_id.as_str().to_string(),
                    layout_version: LAYOUT_VERSION,
                    c_time: info.c_time,
                };
                write_version(&path, &props)?;
                continue;
            }
            let props = read_version(&path)?;
            if props.layout_version != LAYOUT_VERSION {
                return Err(StorageError::Layout {
                    found: props.layout_version,
                    expected: LAYOUT_VERSION,
                });
            }
            // A rollback may have restored an older VERSION than the one
            // read at open time; the first verified directory wins.
            if !adopted {
                state.storage_id = StorageId::new(props.storage_id);
                state.c_time = props.c_time;
                adopted = true;
            }
        }
        state.layout_version = LAYOUT_VERSION;
        if state.c_time == 0 {
            state.c_time = info.c_time;
        }
        state.recovered = true;
        Ok(())
    }

    fn recover_namespace(
        &self,
        info: &NamespaceInfo,
        _opt: StartupOption,
    ) -> Result<PathBuf, StorageError> {
        let ns = info.namespace_id;
        for dir in &self.dirs {
            let ns_dir = dir.join("current").join(ns.to_string());
            fs::create_dir_all(&ns_dir)?;
            let version = ns_dir.join("VERSION");
            if version.exists() {
                let props = read_ns_version(&version)?;
                if props.layout_version != info.layout_version {
                    return Err(StorageError::Layout {
                        found: props.layout_version,
                        expected: info.layout_version,
                    });
                }
                if props.namespace_id != ns.0 {
                    return Err(StorageError::Corrupt(
                        version,
                        format!("directory belongs to NS-{}", props.namespace_id),
                    ));
                }
            } else {
                let props = NsVersionProps {
                    namespace_id: ns.0,
                    layout_version: info.layout_version,
                    c_time: info.c_time,
                };
                let text = toml::to_string(&props)
                    .map_err(|e| StorageError::Corrupt(version.clone(), e.to_string()))?;
                fs::write(&version, text)?;
            }
        }
        let primary = self.dirs[0].join("current").join(ns.to_string());
        self.state.lock().namespaces.insert(ns, primary.clone());
        Ok(primary)
    }

    fn adopt_storage_id(&self, id: &StorageId) -> Result<(), StorageError> {
        {
            let mut state = self.state.lock();
            state.storage_id = id.clone();
        }
        self.write_all()
    }

    fn write_all(&self) -> Result<(), StorageError> {
        let state = self.state.lock();
        self.write_version_files(&state)
    }

    fn remove_namespace(&self, ns: NamespaceId) -> Result<(), StorageError> {
        let removed = self.state.lock().namespaces.remove(&ns);
        if removed.is_none() {
            return Ok(());
        }
        for dir in &self.dirs {
            let ns_dir = dir.join("current").join(ns.to_string());
            match fs::remove_dir_all(&ns_dir) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn has_namespace(&self, ns: NamespaceId) -> bool {
        self.state.lock().namespaces.contains_key(&ns)
    }
}

#[derive(Default)]
struct SimState {
    storage_id: StorageId,
    info: StorageInfo,
    namespaces: HashMap<NamespaceId, PathBuf>,
}

/// In-memory stand-in for `DiskStorage`: storage info is synthesized from
/// the handshake result and nothing is persisted.
#[derive(Default)]
pub struct SimulatedStorage {
    state: Mutex<SimState>,
}

impl SimulatedStorage {
    pub fn new() -> Self {
        SimulatedStorage::default()
    }
}

impl Storage for SimulatedStorage {
    fn storage_id(&self) -> StorageId {
        self.state.lock().storage_id.clone()
    }

    fn info(&self) -> StorageInfo {
        self.state.lock().info
    }

    fn recover_transition(
        &self,
        info: &NamespaceInfo,
        _opt: StartupOption,
    ) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        state.info = StorageInfo {
            layout_version: info.layout_version,
            namespace_id: NamespaceId::UNKNOWN,
            c_time: info.c_time,
        };
        Ok(())
    }

    fn recover_namespace(
        &self,
        info: &NamespaceInfo,
        _opt: StartupOption,
    ) -> Result<PathBuf, StorageError> {
        let dir = PathBuf::from("/simulated").join(info.namespace_id.to_string());
        self.state.lock().namespaces.insert(info.namespace_id, dir.clone());
        Ok(dir)
    }

    fn adopt_storage_id(&self, id: &StorageId) -> Result<(), StorageError> {
        self.state.lock().storage_id = id.clone();
        Ok(())
    }

    fn write_all(&self) -> Result<(), StorageError> {
        Ok(())
    }

    fn remove_namespace(&self, ns: NamespaceId) -> Result<(), StorageError> {
        self.state.lock().namespaces.remove(&ns);
        Ok(())
    }

    fn has_namespace(&self, ns: NamespaceId) -> bool {
        self.state.lock().namespaces.contains_key(&ns)
    }
}

/// Block store that materialises one directory per namespace.
#[derive(Default)]
pub struct FsBlockStore {
    namespaces: Mutex<HashMap<NamespaceId, PathBuf>>,
}

impl BlockStore for FsBlockStore {
    fn add_namespace(&self, ns: NamespaceId, dir: &Path) -> Result<(), StorageError> {
        fs::create_dir_all(dir.join("blocks"))?;
        self.namespaces.lock().insert(ns, dir.to_path_buf());
        Ok(())
    }

    fn remove_namespace(&self, ns: NamespaceId) -> Result<(), StorageError> {
        self.namespaces.lock().remove(&ns);
        Ok(())
    }
}

/// Block store for simulated deployments: tracks namespaces, owns no disk.
#[derive(Default)]
pub struct MemBlockStore {
    namespaces: Mutex<HashMap<NamespaceId, PathBuf>>,
}

impl BlockStore for MemBlockStore {
    fn add_namespace(&self, ns: NamespaceId, dir: &Path) -> Result<(), StorageError> {
        self.namespaces.lock().insert(ns, dir.to_path_buf());
        Ok(())
    }

    fn remove_namespace(&self, ns: NamespaceId) -> Result<(), StorageError> {
        self.namespaces.lock().remove(&ns);
        Ok(())
    }
}

#[cfg(test)]
#[path = "storage_tests.rs"]
mod tests;
