//! Worktree teardown, shared by `warren delete` and post-merge cleanup.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::{self, Config};
use crate::git::{self, GitError};
use crate::hooks::{self, HookEnv, HookError, HookKind};
use crate::metadata::WorktreeInfo;

const REMOVE_ATTEMPTS: u32 = 3;
const REMOVE_RETRY_DELAY: Duration = Duration::from_millis(100);

pub struct CleanupRequest<'a> {
    pub info: &'a WorktreeInfo,
    pub worktree_path: &'a Path,
    pub delete_branch: bool,
    /// Remove even with uncommitted changes present.
    pub force: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum CleanupError {
    #[error("worktree at {0} has uncommitted changes — commit them or pass --force")]
    DirtyWorktree(PathBuf),
    #[error(transparent)]
    Hook(#[from] HookError),
    #[error(transparent)]
    Git(#[from] GitError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Tear down a worktree: pre-delete hook, uncommitted-changes guard,
/// worktree removal, optional branch deletion, administrative prune.
///
/// A hook failure or a dirty worktree aborts with nothing changed. Once the
/// worktree is gone, a failed branch deletion or prune is only a warning —
/// the primary resource was already reclaimed.
pub async fn cleanup(
    repo_root: &Path,
    req: &CleanupRequest<'_>,
    source_dir: &Path,
    config: &Config,
    cancel: &CancellationToken,
    writer: &mut impl Write,
) -> Result<(), CleanupError> {
    let env = HookEnv::from_info(req.info, req.worktree_path, repo_root, source_dir);
    hooks::run(
        repo_root,
        HookKind::PreDelete,
        &env,
        source_dir,
        config.hook_timeout(),
        cancel,
    )
    .await?;

    if !req.force && git::is_dirty(req.worktree_path, &[config::CONTROL_DIR], cancel).await? {
        return Err(CleanupError::DirtyWorktree(req.worktree_path.to_path_buf()));
    }

    tracing::debug!(worktree = %req.worktree_path.display(), "removing worktree");
    remove_worktree(repo_root, req.worktree_path, cancel).await?;

    if req.delete_branch {
        if let Err(e) = git::branch_delete(repo_root, &req.info.name, true, cancel).await {
            writeln!(
                writer,
                "warning: worktree removed but branch '{}' was not deleted: {e}",
                req.info.name
            )?;
        }
    }

    if let Err(e) = git::worktree_prune(repo_root, cancel).await {
        writeln!(writer, "warning: failed to prune worktree metadata: {e}")?;
    }

    Ok(())
}

/// `git worktree remove` touches shared administrative state under the
/// common git dir; concurrent teardowns can collide on its lock files, so
/// retry briefly before giving up.
async fn remove_worktree(
    repo_root: &Path,
    path: &Path,
    cancel: &CancellationToken,
) -> Result<(), CleanupError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        // The uncommitted-changes guard already ran (or was overridden), so
        // git's own guard — which would trip on our metadata file — is
        // always bypassed.
        match git::worktree_remove(repo_root, path, true, cancel).await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_lock_contention() && attempt < REMOVE_ATTEMPTS => {
                tokio::time::sleep(REMOVE_RETRY_DELAY).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt as _;
    use tempfile::TempDir;

    use crate::create::{self, CreateOptions};
    use crate::metadata;

    fn init_repo(dir: &Path) {
        let run = |args: &[&str]| {
            std::process::Command::new("git")
                .arg("-C")
                .arg(dir)
                .args(args)
                .output()
                .unwrap_or_else(|e| panic!("git {args:?} failed: {e}"));
        };
        run(&["init", "-b", "main"]);
        run(&["config", "user.email", "test@test.com"]);
        run(&["config", "user.name", "Test"]);
        fs::write(dir.join("README.md"), "# test repo\n").unwrap();
        run(&["add", "."]);
        run(&["commit", "-m", "initial commit"]);
    }

    fn test_config(base: &Path) -> Config {
        Config {
            worktree_base: Some(base.to_path_buf()),
            ..Config::default()
        }
    }

    async fn spawn_worktree(repo: &Path, config: &Config, name: &str) -> create::CreatedWorktree {
        let cancel = CancellationToken::new();
        let mut out = Vec::new();
        create::create(
            repo,
            &CreateOptions {
                name: Some(name.to_string()),
                base_branch: None,
                copy_changes: false,
            },
            config,
            &cancel,
            &mut out,
        )
        .await
        .unwrap()
    }

    fn branch_exists_sync(repo: &Path, branch: &str) -> bool {
        std::process::Command::new("git")
            .arg("-C")
            .arg(repo)
            .args([
                "show-ref",
                "--verify",
                "--quiet",
                &format!("refs/heads/{branch}"),
            ])
            .status()
            .unwrap()
            .success()
    }

    fn write_pre_delete_hook(repo_root: &Path, body: &str) {
        let dir = repo_root.join(hooks::HOOKS_DIR);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("pre-delete");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[tokio::test]
    async fn cleanup_removes_worktree_and_branch() {
        let repo = TempDir::new().unwrap();
        let base = TempDir::new().unwrap();
        init_repo(repo.path());
        let config = test_config(base.path());

        let created = spawn_worktree(repo.path(), &config, "short-lived").await;

        let cancel = CancellationToken::new();
        let mut out = Vec::new();
        cleanup(
            repo.path(),
            &CleanupRequest {
                info: &created.info,
                worktree_path: &created.path,
                delete_branch: true,
                force: false,
            },
            repo.path(),
            &config,
            &cancel,
            &mut out,
        )
        .await
        .unwrap();

        assert!(!created.path.exists());
        assert!(!branch_exists_sync(repo.path(), "short-lived"));
    }

    #[tokio::test]
    async fn keeping_the_branch_is_possible() {
        let repo = TempDir::new().unwrap();
        let base = TempDir::new().unwrap();
        init_repo(repo.path());
        let config = test_config(base.path());

        let created = spawn_worktree(repo.path(), &config, "keeper").await;

        let cancel = CancellationToken::new();
        let mut out = Vec::new();
        cleanup(
            repo.path(),
            &CleanupRequest {
                info: &created.info,
                worktree_path: &created.path,
                delete_branch: false,
                force: false,
            },
            repo.path(),
            &config,
            &cancel,
            &mut out,
        )
        .await
        .unwrap();

        assert!(!created.path.exists());
        assert!(branch_exists_sync(repo.path(), "keeper"));
    }

    #[tokio::test]
    async fn dirty_worktree_blocks_without_force() {
        let repo = TempDir::new().unwrap();
        let base = TempDir::new().unwrap();
        init_repo(repo.path());
        let config = test_config(base.path());

        let created = spawn_worktree(repo.path(), &config, "dirty").await;
        fs::write(created.path.join("scratch.txt"), "wip\n").unwrap();

        let cancel = CancellationToken::new();
        let mut out = Vec::new();
        let result = cleanup(
            repo.path(),
            &CleanupRequest {
                info: &created.info,
                worktree_path: &created.path,
                delete_branch: true,
                force: false,
            },
            repo.path(),
            &config,
            &cancel,
            &mut out,
        )
        .await;

        assert!(matches!(result, Err(CleanupError::DirtyWorktree(_))));
        assert!(created.path.join("scratch.txt").exists());
    }

    #[tokio::test]
    async fn force_overrides_the_dirty_guard() {
        let repo = TempDir::new().unwrap();
        let base = TempDir::new().unwrap();
        init_repo(repo.path());
        let config = test_config(base.path());

        let created = spawn_worktree(repo.path(), &config, "dirty-forced").await;
        fs::write(created.path.join("scratch.txt"), "wip\n").unwrap();

        let cancel = CancellationToken::new();
        let mut out = Vec::new();
        cleanup(
            repo.path(),
            &CleanupRequest {
                info: &created.info,
                worktree_path: &created.path,
                delete_branch: true,
                force: true,
            },
            repo.path(),
            &config,
            &cancel,
            &mut out,
        )
        .await
        .unwrap();

        assert!(!created.path.exists());
    }

    #[tokio::test]
    async fn metadata_file_does_not_count_as_dirt() {
        let repo = TempDir::new().unwrap();
        let base = TempDir::new().unwrap();
        init_repo(repo.path());
        let config = test_config(base.path());

        // A freshly created worktree carries only its metadata file; a
        // non-forced cleanup must go through.
        let created = spawn_worktree(repo.path(), &config, "pristine").await;

        let cancel = CancellationToken::new();
        let mut out = Vec::new();
        cleanup(
            repo.path(),
            &CleanupRequest {
                info: &created.info,
                worktree_path: &created.path,
                delete_branch: true,
                force: false,
            },
            repo.path(),
            &config,
            &cancel,
            &mut out,
        )
        .await
        .unwrap();

        assert!(!created.path.exists());
    }

    #[tokio::test]
    async fn failing_pre_delete_hook_leaves_worktree_untouched() {
        let repo = TempDir::new().unwrap();
        let base = TempDir::new().unwrap();
        init_repo(repo.path());
        write_pre_delete_hook(repo.path(), "exit 1");
        let config = test_config(base.path());

        let created = spawn_worktree(repo.path(), &config, "protected").await;

        let cancel = CancellationToken::new();
        let mut out = Vec::new();
        let result = cleanup(
            repo.path(),
            &CleanupRequest {
                info: &created.info,
                worktree_path: &created.path,
                delete_branch: true,
                force: true,
            },
            repo.path(),
            &config,
            &cancel,
            &mut out,
        )
        .await;

        assert!(matches!(result, Err(CleanupError::Hook(_))));
        assert!(created.path.exists());
        assert!(branch_exists_sync(repo.path(), "protected"));

        // Still listed by a scan
        let repo_root = repo.path().canonicalize().unwrap();
        let base_dir = config.worktree_dir(&repo_root).unwrap();
        let scanned = metadata::scan(&base_dir).unwrap();
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].info.name, "protected");
    }
}
