use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backend::WorkspaceDirectory;
use crate::error::Result;
use crate::storage;

/// A registered workspace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: String,

    /// Root path of the project, if the workspace has one on this machine
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Human-readable name (folder name, or the id)
    pub name: String,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub last_accessed: Option<DateTime<Utc>>,
}

impl Workspace {
    pub fn new(id: impl Into<String>, path: Option<PathBuf>) -> Self {
        let id = id.into();
        let name = path
            .as_deref()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| id.clone());

        Self {
            id,
            path,
            name,
            created_at: Utc::now(),
            last_accessed: None,
        }
    }

    pub fn touch(&mut self) {
        self.last_accessed = Some(Utc::now());
    }
}

/// Persisted set of workspaces, keyed by id
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct WorkspaceRegistry {
    #[serde(default)]
    workspaces: BTreeMap<String, Workspace>,
}

impl WorkspaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a workspace. Re-adding an existing id only touches it.
    /// Returns true if the workspace is new.
    pub fn add(&mut self, id: &str, path: Option<PathBuf>) -> Result<bool> {
        storage::validate_id("workspace", id)?;

        if let Some(ws) = self.workspaces.get_mut(id) {
            if path.is_some() {
                ws.path = path;
            }
            ws.touch();
            return Ok(false);
        }

        // Canonicalize for consistent display; keep the given path if that fails
        let path = path.map(|p| p.canonicalize().unwrap_or(p));
        let mut workspace = Workspace::new(id, path);
        workspace.touch();
        self.workspaces.insert(id.to_string(), workspace);
        Ok(true)
    }

    pub fn remove(&mut self, id: &str) -> Option<Workspace> {
        self.workspaces.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&Workspace> {
        self.workspaces.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.workspaces.contains_key(id)
    }

    /// Most recently accessed first
    pub fn list(&self) -> Vec<&Workspace> {
        let mut workspaces: Vec<_> = self.workspaces.values().collect();
        workspaces.sort_by(|a, b| b.last_accessed.cmp(&a.last_accessed).then_with(|| a.id.cmp(&b.id)));
        workspaces
    }

    pub fn len(&self) -> usize {
        self.workspaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workspaces.is_empty()
    }

    /// Load from `path`; a missing or corrupt file is an empty registry
    pub fn load(path: &Path) -> Result<Self> {
        Ok(storage::read_json_or_recover(path)?.unwrap_or_default())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        storage::write_json_atomic(path, self)
    }
}

/// Shared, persisted registry handle.
///
/// The CLI edits the same file from another process, so every access first
/// compares the file's mtime and length with what was last loaded and
/// reloads on any difference.
pub struct WorkspaceStore {
    path: PathBuf,
    loaded: RwLock<Loaded>,
}

struct Loaded {
    registry: WorkspaceRegistry,
    stamp: Option<FileStamp>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: SystemTime,
    len: u64,
}

fn file_stamp(path: &Path) -> Option<FileStamp> {
    let meta = std::fs::metadata(path).ok()?;
    Some(FileStamp {
        modified: meta.modified().ok()?,
        len: meta.len(),
    })
}

impl WorkspaceStore {
    /// Open the registry at `<data_dir>/workspaces.json`
    pub fn open(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join("workspaces.json");
        let stamp = file_stamp(&path);
        let registry = WorkspaceRegistry::load(&path)?;
        Ok(Self {
            path,
            loaded: RwLock::new(Loaded { registry, stamp }),
        })
    }

    /// Reload `loaded` if the file changed behind its back
    fn sync(&self, loaded: &mut Loaded) -> Result<()> {
        let stamp = file_stamp(&self.path);
        if stamp == loaded.stamp {
            return Ok(());
        }
        loaded.registry = WorkspaceRegistry::load(&self.path)?;
        loaded.stamp = stamp;
        debug!("Reloaded workspace registry ({} entries)", loaded.registry.len());
        Ok(())
    }

    fn read<T>(&self, f: impl FnOnce(&WorkspaceRegistry) -> T) -> T {
        {
            let loaded = self.loaded.read().unwrap_or_else(PoisonError::into_inner);
            if file_stamp(&self.path) == loaded.stamp {
                return f(&loaded.registry);
            }
        }
        let mut loaded = self.loaded.write().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = self.sync(&mut loaded) {
            warn!("Keeping cached workspace registry: {}", e);
        }
        f(&loaded.registry)
    }

    fn write<T>(&self, f: impl FnOnce(&mut WorkspaceRegistry) -> Result<T>) -> Result<T> {
        let mut loaded = self.loaded.write().unwrap_or_else(PoisonError::into_inner);
        self.sync(&mut loaded)?;
        let out = f(&mut loaded.registry)?;
        loaded.registry.save(&self.path)?;
        loaded.stamp = file_stamp(&self.path);
        Ok(out)
    }

    pub fn add(&self, id: &str, path: Option<PathBuf>) -> Result<bool> {
        let created = self.write(|registry| registry.add(id, path))?;
        if created {
            info!("Registered workspace {}", id);
        }
        Ok(created)
    }

    /// Deregister a workspace. Its conversations stay on disk.
    pub fn remove(&self, id: &str) -> Result<Option<Workspace>> {
        let removed = self.write(|registry| Ok(registry.remove(id)))?;
        if removed.is_some() {
            info!("Removed workspace {}", id);
        }
        Ok(removed)
    }

    pub fn get(&self, id: &str) -> Option<Workspace> {
        self.read(|registry| registry.get(id).cloned())
    }

    pub fn list(&self) -> Vec<Workspace> {
        self.read(|registry| registry.list().into_iter().cloned().collect())
    }
}

impl WorkspaceDirectory for WorkspaceStore {
    fn exists(&self, workspace_id: &str) -> bool {
        self.read(|registry| registry.contains(workspace_id))
    }
}
