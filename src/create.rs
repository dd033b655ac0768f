//! Worktree creation.
//!
//! Create is a multi-step state machine: identity assignment and the git
//! worktree creation run under the base directory lock (the new worktree is
//! the only durable place the assigned id can be recorded, so it must exist
//! and carry metadata before the next scanner runs); the lock is released
//! the moment metadata is synced, and the slow tail — content copy and the
//! post-create hook — runs unlocked. Any failure after the worktree exists
//! rolls it back before the original error is returned.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::git::{self, GitError};
use crate::hooks::{self, HookEnv, HookError, HookKind};
use crate::lock::{BaseDirLock, LOCK_FILE, LockError};
use crate::metadata::{self, MetadataError, WorktreeInfo};
use crate::names::{self, PoolExhausted};

pub struct CreateOptions {
    /// Name for the worktree and its branch; the generated agent id if None.
    pub name: Option<String>,
    /// Branch to fork from; the invocation directory's current branch if None.
    pub base_branch: Option<String>,
    /// Copy uncommitted changes from the invocation directory into the new
    /// worktree.
    pub copy_changes: bool,
}

#[derive(Debug)]
pub struct CreatedWorktree {
    pub info: WorktreeInfo,
    pub path: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum CreateError {
    #[error("name '{0}' is already used by a live worktree")]
    NameInUse(String),
    #[error("branch '{0}' already exists — delete it or pick another name")]
    BranchExists(String),
    #[error("base branch '{0}' does not exist")]
    BaseBranchMissing(String),
    #[error("cannot infer a base branch from a detached HEAD — pass --base")]
    DetachedHead,
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error(transparent)]
    Names(#[from] PoolExhausted),
    #[error(transparent)]
    Git(#[from] GitError),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error(transparent)]
    Hook(#[from] HookError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("{source}; rollback incomplete: {}", .issues.join("; "))]
    RollbackPartial {
        source: Box<CreateError>,
        issues: Vec<String>,
    },
}

/// Create a worktree with a fresh identity.
pub async fn create(
    source_dir: &Path,
    opts: &CreateOptions,
    config: &Config,
    cancel: &CancellationToken,
    writer: &mut impl Write,
) -> Result<CreatedWorktree, CreateError> {
    let repo_root = git::main_worktree(source_dir, cancel).await?;

    let base_branch = match &opts.base_branch {
        Some(branch) => {
            if !git::branch_exists(source_dir, branch, cancel).await? {
                return Err(CreateError::BaseBranchMissing(branch.clone()));
            }
            branch.clone()
        }
        None => {
            let branch = git::current_branch(source_dir, cancel).await?;
            if branch == "HEAD" {
                return Err(CreateError::DetachedHead);
            }
            branch
        }
    };

    let base_dir = config.worktree_dir(&repo_root)?;
    std::fs::create_dir_all(&base_dir)?;

    let mut lock =
        BaseDirLock::acquire(&base_dir.join(LOCK_FILE), config.lock_timeout(), cancel).await?;

    let existing = metadata::scan(&base_dir)?;
    let id = names::next_id(&existing);
    let mut taken: HashSet<String> = HashSet::new();
    for worktree in &existing {
        taken.insert(worktree.info.name.clone());
        taken.insert(worktree.info.agent_id.clone());
    }

    let agent_id = names::generate_agent_id(&taken, &mut rand::rng())?;
    let name = match &opts.name {
        Some(name) => {
            if taken.contains(name) {
                return Err(CreateError::NameInUse(name.clone()));
            }
            name.clone()
        }
        None => agent_id.clone(),
    };
    if git::branch_exists(source_dir, &name, cancel).await? {
        return Err(CreateError::BranchExists(name));
    }

    let worktree_path = base_dir.join(&name);
    git::worktree_add(&repo_root, &worktree_path, &name, &base_branch, cancel).await?;

    // The worktree exists from here on; every failure path must tear it
    // back down.
    let info = WorktreeInfo {
        name: name.clone(),
        agent_id,
        id,
        base_branch,
        created: Utc::now(),
    };

    if let Err(e) = metadata::write(&metadata::metadata_path(&worktree_path), &info) {
        return Err(rollback(&repo_root, &worktree_path, &name, e.into()).await);
    }

    lock.release();
    tracing::debug!(name = %info.name, id = info.id, "worktree created, identity lock released");

    if opts.copy_changes {
        if let Err(e) = copy_uncommitted(source_dir, &worktree_path, writer, cancel).await {
            return Err(rollback(&repo_root, &worktree_path, &name, e).await);
        }
    }

    let env = HookEnv::from_info(&info, &worktree_path, &repo_root, source_dir);
    if let Err(e) = hooks::run(
        &repo_root,
        HookKind::PostCreate,
        &env,
        source_dir,
        config.hook_timeout(),
        cancel,
    )
    .await
    {
        return Err(rollback(&repo_root, &worktree_path, &name, e.into()).await);
    }

    Ok(CreatedWorktree {
        info,
        path: worktree_path,
    })
}

/// Tear down a partially created worktree, joining any compensation failures
/// to the triggering error.
///
/// Runs under a fresh token: rollback must still execute when the triggering
/// failure was itself a cancellation.
async fn rollback(
    repo_root: &Path,
    worktree_path: &Path,
    branch: &str,
    cause: CreateError,
) -> CreateError {
    let cancel = CancellationToken::new();
    let mut issues = Vec::new();

    if let Err(e) = git::worktree_remove(repo_root, worktree_path, true, &cancel).await {
        issues.push(format!(
            "failed to remove worktree {}: {e}",
            worktree_path.display()
        ));
    }
    if let Err(e) = git::branch_delete(repo_root, branch, true, &cancel).await {
        issues.push(format!("failed to delete branch '{branch}': {e}"));
    }

    if issues.is_empty() {
        cause
    } else {
        CreateError::RollbackPartial {
            source: Box::new(cause),
            issues,
        }
    }
}

/// Copy staged, unstaged, and untracked-but-not-ignored files from the
/// invocation worktree, preserving relative paths. Files git listed but that
/// are gone by copy time (e.g. staged deletions) are skipped.
async fn copy_uncommitted(
    source_dir: &Path,
    dest: &Path,
    writer: &mut impl Write,
    cancel: &CancellationToken,
) -> Result<(), CreateError> {
    let source_root = git::repo_root(source_dir, cancel).await?;
    let files = git::changed_files(&source_root, cancel).await?;

    let mut copied = 0usize;
    for rel in &files {
        let from = source_root.join(rel);
        if !from.is_file() {
            continue;
        }
        let to = dest.join(rel);
        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(&from, &to)?;
        copied += 1;
    }

    if copied > 0 {
        writeln!(writer, "Copied {copied} uncommitted file(s) into the new worktree")?;
    }
    Ok(())
}
