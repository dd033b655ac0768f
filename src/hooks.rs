//! Lifecycle hook execution.
//!
//! Hooks are executables at fixed paths under the main repository's
//! `.warren/hooks/` directory. A missing hook is a no-op; a present but
//! non-executable one is an error — silently skipping it would hide a broken
//! script. Hooks run with the invocation directory as working directory,
//! inherited stdout/stderr, and the inherited environment plus the
//! `WARREN_*` values below, passed in explicitly so runs are deterministic.

use std::fmt;
use std::os::unix::fs::PermissionsExt as _;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

use crate::metadata::WorktreeInfo;

/// Hook directory relative to the main repository root.
pub const HOOKS_DIR: &str = ".warren/hooks";

/// How long a signalled hook gets to exit before the hard kill.
const TERM_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    PostCreate,
    PreDelete,
}

impl HookKind {
    pub fn file_name(self) -> &'static str {
        match self {
            HookKind::PostCreate => "post-create",
            HookKind::PreDelete => "pre-delete",
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// Values exposed to the hook process as environment variables.
#[derive(Debug, Clone)]
pub struct HookEnv {
    pub id: u32,
    pub agent_id: String,
    pub name: String,
    pub worktree_path: PathBuf,
    pub base_branch: String,
    pub repo_root: PathBuf,
    pub source_dir: PathBuf,
}

impl HookEnv {
    pub fn from_info(
        info: &WorktreeInfo,
        worktree_path: &Path,
        repo_root: &Path,
        source_dir: &Path,
    ) -> Self {
        Self {
            id: info.id,
            agent_id: info.agent_id.clone(),
            name: info.name.clone(),
            worktree_path: worktree_path.to_path_buf(),
            base_branch: info.base_branch.clone(),
            repo_root: repo_root.to_path_buf(),
            source_dir: source_dir.to_path_buf(),
        }
    }

    fn vars(&self) -> Vec<(&'static str, String)> {
        vec![
            ("WARREN_ID", self.id.to_string()),
            ("WARREN_AGENT_ID", self.agent_id.clone()),
            ("WARREN_NAME", self.name.clone()),
            (
                "WARREN_WORKTREE_PATH",
                self.worktree_path.display().to_string(),
            ),
            ("WARREN_BASE_BRANCH", self.base_branch.clone()),
            ("WARREN_REPO_ROOT", self.repo_root.display().to_string()),
            ("WARREN_SOURCE_DIR", self.source_dir.display().to_string()),
        ]
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("{kind} hook at {path} is not executable — chmod +x it or remove it")]
    NotExecutable { kind: HookKind, path: PathBuf },
    #[error("{kind} hook exceeded {timeout:?} and was killed")]
    Timeout { kind: HookKind, timeout: Duration },
    #[error("{kind} hook exited with {status}")]
    Failed {
        kind: HookKind,
        status: std::process::ExitStatus,
    },
    #[error("{kind} hook interrupted")]
    Interrupted { kind: HookKind },
    #[error("failed to run {kind} hook: {source}")]
    Io {
        kind: HookKind,
        source: std::io::Error,
    },
}

/// Run the given hook if the repository has one configured.
///
/// Absent script means success. A running hook is bounded by `timeout` and
/// by the cancellation token; either kills the process rather than leaving
/// it behind.
pub async fn run(
    repo_root: &Path,
    kind: HookKind,
    env: &HookEnv,
    working_dir: &Path,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<(), HookError> {
    let script = repo_root.join(HOOKS_DIR).join(kind.file_name());

    let meta = match std::fs::metadata(&script) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(source) => return Err(HookError::Io { kind, source }),
    };
    if meta.permissions().mode() & 0o111 == 0 {
        return Err(HookError::NotExecutable { kind, path: script });
    }

    tracing::debug!(hook = %kind, script = %script.display(), "running hook");
    let mut child = Command::new(&script)
        .current_dir(working_dir)
        .envs(env.vars())
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| HookError::Io { kind, source })?;

    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    let status = tokio::select! {
        status = child.wait() => status.map_err(|source| HookError::Io { kind, source })?,
        () = &mut deadline => {
            let _ = child.kill().await;
            return Err(HookError::Timeout { kind, timeout });
        }
        () = cancel.cancelled() => {
            terminate(&mut child).await;
            return Err(HookError::Interrupted { kind });
        }
    };

    if status.success() {
        Ok(())
    } else {
        Err(HookError::Failed { kind, status })
    }
}

/// SIGTERM first so the hook can clean up; hard-kill if it lingers.
async fn terminate(child: &mut Child) {
    if let Some(pid) = child.id() {
        // SAFETY: signalling our own child process.
        unsafe {
            libc::kill(pid.cast_signed(), libc::SIGTERM);
        }
        if tokio::time::timeout(TERM_GRACE, child.wait()).await.is_ok() {
            return;
        }
    }
    let _ = child.kill().await;
}
