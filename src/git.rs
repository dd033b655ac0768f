//! Thin façade over the `git` command line.
//!
//! Every call takes an explicit working directory and a cancellation token;
//! nothing here relies on the process-wide current directory. Cancelling the
//! token kills the in-flight git process and returns `Interrupted`.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("not a git repository")]
    NotARepository,
    #[error("fast-forward not possible — the target branch has advanced")]
    NotFastForward,
    #[error("git {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },
    #[error("git {0} interrupted")]
    Interrupted(String),
    #[error("failed to run git: {0}")]
    Spawn(#[from] std::io::Error),
}

impl GitError {
    /// Transient ref/index lock contention from concurrent git processes
    /// sharing one repository. Safe to retry after a short delay.
    pub fn is_lock_contention(&self) -> bool {
        match self {
            GitError::CommandFailed { stderr, .. } => {
                stderr.contains("index.lock")
                    || stderr.contains("cannot lock ref")
                    || stderr.contains("could not lock")
                    || stderr.contains("Another git process")
            }
            _ => false,
        }
    }
}

fn path_str(path: &Path) -> Result<&str, GitError> {
    path.to_str().ok_or_else(|| GitError::CommandFailed {
        command: String::new(),
        stderr: "path is not valid UTF-8".into(),
    })
}

/// Run a git command in the given directory and return stdout.
async fn git(dir: &Path, args: &[&str], cancel: &CancellationToken) -> Result<String, GitError> {
    let child = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let wait = child.wait_with_output();
    let output = tokio::select! {
        output = wait => output?,
        () = cancel.cancelled() => return Err(GitError::Interrupted(args.join(" "))),
    };

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if stderr.contains("not a git repository") {
            return Err(GitError::NotARepository);
        }
        Err(GitError::CommandFailed {
            command: args.join(" "),
            stderr,
        })
    }
}

/// Run a git command and return whether it exited successfully.
async fn git_ok(dir: &Path, args: &[&str], cancel: &CancellationToken) -> Result<bool, GitError> {
    let mut child = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()?;

    let wait = child.wait();
    let status = tokio::select! {
        status = wait => status?,
        () = cancel.cancelled() => return Err(GitError::Interrupted(args.join(" "))),
    };
    Ok(status.success())
}

/// Resolve the toplevel of the worktree containing `dir`.
pub async fn repo_root(dir: &Path, cancel: &CancellationToken) -> Result<PathBuf, GitError> {
    let output = git(dir, &["rev-parse", "--show-toplevel"], cancel).await?;
    Ok(PathBuf::from(output.trim()))
}

/// Current branch name; "HEAD" when detached.
pub async fn current_branch(dir: &Path, cancel: &CancellationToken) -> Result<String, GitError> {
    let output = git(dir, &["rev-parse", "--abbrev-ref", "HEAD"], cancel).await?;
    Ok(output.trim().to_string())
}

pub async fn branch_exists(
    dir: &Path,
    branch: &str,
    cancel: &CancellationToken,
) -> Result<bool, GitError> {
    git_ok(
        dir,
        &[
            "show-ref",
            "--verify",
            "--quiet",
            &format!("refs/heads/{branch}"),
        ],
        cancel,
    )
    .await
}

pub async fn branch_delete(
    dir: &Path,
    branch: &str,
    force: bool,
    cancel: &CancellationToken,
) -> Result<(), GitError> {
    let flag = if force { "-D" } else { "-d" };
    git(dir, &["branch", flag, branch], cancel).await?;
    Ok(())
}

pub async fn checkout(
    dir: &Path,
    branch: &str,
    cancel: &CancellationToken,
) -> Result<(), GitError> {
    git(dir, &["checkout", branch], cancel).await?;
    Ok(())
}

/// Check for uncommitted changes (staged, unstaged, or untracked), skipping
/// status entries under any of `ignored_prefixes` — the tool's own metadata
/// must not count as dirt.
pub async fn is_dirty(
    dir: &Path,
    ignored_prefixes: &[&str],
    cancel: &CancellationToken,
) -> Result<bool, GitError> {
    let output = git(dir, &["status", "--porcelain"], cancel).await?;
    Ok(output.lines().any(|line| {
        let path = line.get(3..).unwrap_or("").trim_start_matches('"');
        !path.is_empty() && !ignored_prefixes.iter().any(|p| path.starts_with(p))
    }))
}

/// Paths with uncommitted content relative to the worktree root: staged and
/// unstaged modifications plus untracked, non-ignored files.
pub async fn changed_files(
    dir: &Path,
    cancel: &CancellationToken,
) -> Result<Vec<String>, GitError> {
    let tracked = git(dir, &["diff", "--name-only", "HEAD"], cancel).await?;
    let untracked = git(dir, &["ls-files", "--others", "--exclude-standard"], cancel).await?;

    let mut files: Vec<String> = tracked
        .lines()
        .chain(untracked.lines())
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect();
    files.sort();
    files.dedup();
    Ok(files)
}

/// Create a worktree at `path` on a new branch rooted at `base`.
pub async fn worktree_add(
    repo: &Path,
    path: &Path,
    branch: &str,
    base: &str,
    cancel: &CancellationToken,
) -> Result<(), GitError> {
    let wt = path_str(path)?;
    git(repo, &["worktree", "add", "-b", branch, wt, base], cancel).await?;
    Ok(())
}

pub async fn worktree_remove(
    repo: &Path,
    path: &Path,
    force: bool,
    cancel: &CancellationToken,
) -> Result<(), GitError> {
    let wt = path_str(path)?;
    if force {
        git(repo, &["worktree", "remove", "--force", wt], cancel).await?;
    } else {
        git(repo, &["worktree", "remove", wt], cancel).await?;
    }
    Ok(())
}

/// Drop stale administrative entries for worktrees whose directories are gone.
pub async fn worktree_prune(repo: &Path, cancel: &CancellationToken) -> Result<(), GitError> {
    git(repo, &["worktree", "prune"], cancel).await?;
    Ok(())
}

/// A worktree entry from `git worktree list --porcelain`.
#[derive(Debug, Clone)]
pub struct WorktreeEntry {
    pub path: PathBuf,
    /// Branch name (without refs/heads/ prefix). None for detached HEAD.
    pub branch: Option<String>,
    /// Whether this is the main worktree (first entry in the list).
    pub is_main: bool,
}

/// List all worktrees of the repository containing `dir`.
pub async fn list_worktrees(
    dir: &Path,
    cancel: &CancellationToken,
) -> Result<Vec<WorktreeEntry>, GitError> {
    let output = git(dir, &["worktree", "list", "--porcelain"], cancel).await?;

    let mut entries = Vec::new();
    let mut current_path = None;
    let mut current_branch = None;

    for line in output.lines() {
        if let Some(p) = line.strip_prefix("worktree ") {
            current_path = Some(PathBuf::from(p));
        } else if let Some(b) = line.strip_prefix("branch refs/heads/") {
            current_branch = Some(b.to_string());
        } else if line.is_empty() {
            if let Some(path) = current_path.take() {
                let is_main = entries.is_empty();
                entries.push(WorktreeEntry {
                    path,
                    branch: current_branch.take(),
                    is_main,
                });
            }
            current_branch = None;
        }
    }
    // Porcelain output may not end with a blank line
    if let Some(path) = current_path {
        let is_main = entries.is_empty();
        entries.push(WorktreeEntry {
            path,
            branch: current_branch,
            is_main,
        });
    }

    Ok(entries)
}

/// Locate the main worktree of the repository containing `dir`.
pub async fn main_worktree(dir: &Path, cancel: &CancellationToken) -> Result<PathBuf, GitError> {
    let worktrees = list_worktrees(dir, cancel).await?;
    worktrees
        .into_iter()
        .find(|w| w.is_main)
        .map(|w| w.path)
        .ok_or_else(|| GitError::CommandFailed {
            command: "worktree list --porcelain".into(),
            stderr: "no worktrees listed".into(),
        })
}

pub async fn rebase(dir: &Path, onto: &str, cancel: &CancellationToken) -> Result<(), GitError> {
    git(dir, &["rebase", onto], cancel).await?;
    Ok(())
}

pub async fn rebase_abort(dir: &Path, cancel: &CancellationToken) -> Result<(), GitError> {
    git(dir, &["rebase", "--abort"], cancel).await?;
    Ok(())
}

/// Check if a rebase is currently in progress in the worktree.
pub async fn is_rebase_in_progress(
    dir: &Path,
    cancel: &CancellationToken,
) -> Result<bool, GitError> {
    let output = git(dir, &["rev-parse", "--git-dir"], cancel).await?;
    let git_dir = PathBuf::from(output.trim());
    Ok(git_dir.join("rebase-merge").exists() || git_dir.join("rebase-apply").exists())
}

/// Paths currently in conflict (unmerged in the index).
pub async fn conflicting_paths(
    dir: &Path,
    cancel: &CancellationToken,
) -> Result<Vec<String>, GitError> {
    let output = git(dir, &["diff", "--name-only", "--diff-filter=U"], cancel).await?;
    Ok(output
        .lines()
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}

/// Fast-forward-only merge of `branch` into the branch checked out in `dir`.
pub async fn merge_ff_only(
    dir: &Path,
    branch: &str,
    cancel: &CancellationToken,
) -> Result<(), GitError> {
    match git(dir, &["merge", "--ff-only", branch], cancel).await {
        Ok(_) => Ok(()),
        Err(GitError::CommandFailed { stderr, .. })
            if stderr.to_lowercase().contains("fast-forward") =>
        {
            Err(GitError::NotFastForward)
        }
        Err(e) => Err(e),
    }
}

/// Number of commits on HEAD that `target` lacks.
pub async fn ahead_count(
    dir: &Path,
    target: &str,
    cancel: &CancellationToken,
) -> Result<u64, GitError> {
    let output = git(
        dir,
        &["rev-list", "--count", &format!("{target}..HEAD")],
        cancel,
    )
    .await?;
    output
        .trim()
        .parse()
        .map_err(|e| GitError::CommandFailed {
            command: "rev-list --count".into(),
            stderr: format!("failed to parse commit count: {e}"),
        })
}
