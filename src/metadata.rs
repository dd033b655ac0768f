//! Per-worktree identity metadata.
//!
//! Each managed worktree carries one JSON file at
//! `<worktree>/.warren/worktree.json`, written once at creation and destroyed
//! with the worktree directory. The set of live worktrees is never stored
//! anywhere — it is derived by scanning the base directory.

use std::fs::{self, File};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Location of the metadata file relative to the worktree root.
pub const METADATA_RELPATH: &str = ".warren/worktree.json";

/// Identity of a single worktree. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorktreeInfo {
    pub name: String,
    pub agent_id: String,
    /// Positive, unique among live worktrees of a repository, never reused.
    pub id: u32,
    pub base_branch: String,
    pub created: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("no worktree metadata at {0}")]
    NotFound(PathBuf),
    #[error("corrupt worktree metadata at {path}: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to serialize worktree metadata: {0}")]
    Serialize(serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub fn metadata_path(worktree: &Path) -> PathBuf {
    worktree.join(METADATA_RELPATH)
}

/// Write metadata, creating the containing directory if needed. The file is
/// synced to disk before returning — a freshly assigned id must be visible
/// to the next scanner even through a crash.
pub fn write(path: &Path, info: &WorktreeInfo) -> Result<(), MetadataError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(info).map_err(MetadataError::Serialize)?;
    let mut file = File::create(path)?;
    file.write_all(json.as_bytes())?;
    file.write_all(b"\n")?;
    file.sync_all()?;
    Ok(())
}

pub fn read(path: &Path) -> Result<WorktreeInfo, MetadataError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(MetadataError::NotFound(path.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };
    serde_json::from_str(&content).map_err(|source| MetadataError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

/// A live worktree found by `scan`.
#[derive(Debug, Clone)]
pub struct ScannedWorktree {
    pub path: PathBuf,
    pub info: WorktreeInfo,
}

/// Enumerate immediate subdirectories of `base_dir` with valid metadata,
/// ordered by id. Subdirectories without parsable metadata are not managed
/// worktrees and are silently skipped; an absent base directory means no
/// worktrees yet, not an error.
pub fn scan(base_dir: &Path) -> Result<Vec<ScannedWorktree>, MetadataError> {
    let entries = match fs::read_dir(base_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut found = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        if let Ok(info) = read(&metadata_path(&path)) {
            found.push(ScannedWorktree { path, info });
        }
    }
    found.sort_by_key(|w| w.info.id);
    Ok(found)
}
