//! JSON document persistence shared by all stores.
//!
//! Every document is written with the same pattern as the config file:
//! exclusive `fs2` lock on a sibling `.lock` file, write to `.tmp`, fsync,
//! rename over the target. Readers never see a half-written document.

mod locks;

pub use locks::KeyedLocks;

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{Result, SessionError};

const MAX_ID_LEN: usize = 128;

/// Check that an identifier is safe to use as a single path component
pub fn validate_id(kind: &str, id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(SessionError::invalid(format!("{kind} id must not be empty")));
    }
    if id.len() > MAX_ID_LEN {
        return Err(SessionError::invalid(format!(
            "{kind} id must be at most {MAX_ID_LEN} characters"
        )));
    }
    if id.starts_with('.') {
        return Err(SessionError::invalid(format!(
            "{kind} id must not start with '.'"
        )));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(SessionError::invalid(format!(
            "{kind} id '{id}' may only contain letters, digits, '-', '_' and '.'"
        )));
    }
    Ok(())
}

/// Serialize `value` and atomically replace the file at `path`
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &content)
}

/// Atomically replace the file at `path` with `content`
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Lock lives next to the document so the rename never touches it
    let lock_path = sibling(path, "lock");
    let lock_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&lock_path)?;
    lock_file.lock_exclusive()?;

    let temp_path = sibling(path, "tmp");
    let mut temp_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)?;
    temp_file.write_all(content)?;
    temp_file.sync_all()?;

    std::fs::rename(&temp_path, path)?;
    debug!("Wrote {} ({} bytes)", path.display(), content.len());

    // Lock is released when lock_file is dropped
    Ok(())
}

/// Read a document strictly. Missing file is `Ok(None)`, garbage is `CorruptState`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| SessionError::CorruptState {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Read a document, recovering from corruption.
///
/// An unparseable document is logged, its bytes are copied to a
/// `.corrupt-<unix ts>` sibling so the next write cannot destroy them, and
/// `Ok(None)` is returned so callers fall back to an empty/default document.
pub fn read_json_or_recover<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match read_json(path) {
        Err(SessionError::CorruptState { path, reason }) => {
            let backup = quarantine(&path);
            warn!(
                "Corrupt document {} ({}); continuing with empty state{}",
                path.display(),
                reason,
                backup
                    .map(|p| format!(", original kept at {}", p.display()))
                    .unwrap_or_default()
            );
            Ok(None)
        }
        other => other,
    }
}

/// Copy a damaged document aside. Returns the backup path on success.
pub fn quarantine(path: &Path) -> Option<PathBuf> {
    let backup = sibling(
        path,
        &format!("corrupt-{}", chrono::Utc::now().timestamp()),
    );
    match std::fs::copy(path, &backup) {
        Ok(_) => Some(backup),
        Err(e) => {
            warn!("Failed to back up corrupt document {}: {}", path.display(), e);
            None
        }
    }
}

/// Remove a document and its lock file. Returns false if it did not exist.
pub fn remove_json(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            let _ = std::fs::remove_file(sibling(path, "lock"));
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// `name.json` -> `name.json.<suffix>`
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// List `*.json` document stems in a directory (missing directory = empty)
pub fn list_json_stems(dir: &Path) -> Result<Vec<String>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut stems = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            stems.push(stem.to_string());
        }
    }
    stems.sort();
    Ok(stems)
}
