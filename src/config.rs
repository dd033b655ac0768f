use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Directory holding this tool's config, hooks, and per-worktree metadata.
pub const CONTROL_DIR: &str = ".warren";

const CONFIG_PATH: &str = ".warren/config.toml";

/// Project-level configuration from `.warren/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root directory for worktrees. Default: `~/.warren/worktrees`.
    #[serde(default)]
    pub worktree_base: Option<PathBuf>,

    /// Seconds to wait for the identity-assignment lock.
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,

    /// Seconds a lifecycle hook may run before being killed.
    #[serde(default = "default_hook_timeout_secs")]
    pub hook_timeout_secs: u64,

    /// Merge retry budget when the target branch keeps advancing.
    #[serde(default = "default_merge_attempts")]
    pub merge_attempts: u32,
}

fn default_lock_timeout_secs() -> u64 {
    5
}

fn default_hook_timeout_secs() -> u64 {
    120
}

fn default_merge_attempts() -> u32 {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worktree_base: None,
            lock_timeout_secs: default_lock_timeout_secs(),
            hook_timeout_secs: default_hook_timeout_secs(),
            merge_attempts: default_merge_attempts(),
        }
    }
}

impl Config {
    /// Load configuration from `.warren/config.toml` under `repo_root`.
    ///
    /// Falls back to defaults if the file is missing.
    pub fn load(repo_root: &Path) -> Result<Config> {
        let path = repo_root.join(CONFIG_PATH);
        if !path.exists() {
            return Ok(Config::default());
        }
        let contents = std::fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    pub fn hook_timeout(&self) -> Duration {
        Duration::from_secs(self.hook_timeout_secs)
    }

    /// Per-repository worktree base directory: `<root>/<project>`, where
    /// project is the main worktree's directory name.
    pub fn worktree_dir(&self, repo_root: &Path) -> std::io::Result<PathBuf> {
        let root = match &self.worktree_base {
            Some(base) => base.clone(),
            None => {
                let home = std::env::var_os("HOME").ok_or_else(|| {
                    std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        "HOME not set; set worktree_base in .warren/config.toml or pass --worktree-base",
                    )
                })?;
                PathBuf::from(home).join(".warren").join("worktrees")
            }
        };
        let project = repo_root.file_name().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "could not determine a project name from the repository root",
            )
        })?;
        Ok(root.join(project))
    }
}
