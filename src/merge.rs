//! Reintegration of a worktree branch into its target branch.
//!
//! Many worktrees may merge into the same target at once, so the core is a
//! bounded retry loop: rebase onto the target, then fast-forward the target
//! to the rebased tip. Losing the fast-forward race (or hitting git's own
//! ref/index lock contention — unavoidable when several processes share one
//! repository) means the target moved underneath us; wait a jittered backoff
//! and start over. A real conflict is never retried.

use std::io::Write;
use std::path::{Path, PathBuf};

use rand::prelude::*;
use tokio_util::sync::CancellationToken;

use crate::backoff;
use crate::cleanup::{self, CleanupError, CleanupRequest};
use crate::config::{self, Config};
use crate::git::{self, GitError};
use crate::metadata::{self, MetadataError};

pub struct MergeOptions {
    /// Branch to merge into; the worktree's recorded base branch if None.
    pub target: Option<String>,
    /// Keep the worktree and branch after a successful merge.
    pub keep: bool,
    /// Run the pre-checks and print the plan without mutating anything.
    pub dry_run: bool,
    /// Retry budget for the fast-forward race.
    pub max_attempts: u32,
}

#[derive(Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    Merged { target: String, commits: u64 },
    DryRun,
}

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("target branch '{0}' does not exist")]
    TargetMissing(String),
    #[error("'{0}' is already checked out here — nothing to merge")]
    TargetIsCurrent(String),
    #[error("worktree at {0} has uncommitted changes — commit or stash them first")]
    DirtyWorktree(PathBuf),
    #[error(
        "rebase onto '{target}' hit conflicts in: {}\n\
         resolve them manually:\n  git rebase {target}\n  \
         (fix the conflicts, git add each file)\n  git rebase --continue\n  warren merge",
        .files.join(", ")
    )]
    Conflict { target: String, files: Vec<String> },
    #[error("target branch kept advancing — gave up after {attempts} attempts")]
    ContentionExhausted { attempts: u32 },
    #[error("merge interrupted")]
    Interrupted,
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error(transparent)]
    Git(#[from] GitError),
    #[error(transparent)]
    Cleanup(#[from] CleanupError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Merge the worktree containing `worktree_dir` into its target branch.
pub async fn merge(
    worktree_dir: &Path,
    opts: &MergeOptions,
    config: &Config,
    cancel: &CancellationToken,
    writer: &mut impl Write,
) -> Result<MergeOutcome, MergeError> {
    let worktree_root = git::repo_root(worktree_dir, cancel).await?;
    let info = metadata::read(&metadata::metadata_path(&worktree_root))?;
    let current = git::current_branch(&worktree_root, cancel).await?;
    let target = opts
        .target
        .clone()
        .unwrap_or_else(|| info.base_branch.clone());

    // Pre-checks: nothing below mutates until all of them pass.
    if current == target {
        return Err(MergeError::TargetIsCurrent(target));
    }
    if !git::branch_exists(&worktree_root, &target, cancel).await? {
        return Err(MergeError::TargetMissing(target));
    }
    if git::is_dirty(&worktree_root, &[config::CONTROL_DIR], cancel).await? {
        return Err(MergeError::DirtyWorktree(worktree_root));
    }

    let worktrees = git::list_worktrees(&worktree_root, cancel).await?;
    let main_path = worktrees
        .iter()
        .find(|w| w.is_main)
        .map(|w| w.path.clone())
        .ok_or(GitError::NotARepository)?;
    let target_holder = worktrees
        .iter()
        .find(|w| w.branch.as_deref() == Some(target.as_str()))
        .map(|w| w.path.clone());

    // The fast-forward happens in whichever worktree has the target checked
    // out; that worktree must be clean too. When none does, the main
    // worktree will check it out, so it needs the same guarantee.
    let merge_dir = target_holder.clone().unwrap_or_else(|| main_path.clone());
    if git::is_dirty(&merge_dir, &[config::CONTROL_DIR], cancel).await? {
        return Err(MergeError::DirtyWorktree(merge_dir));
    }

    let commits = git::ahead_count(&worktree_root, &target, cancel).await?;

    if opts.dry_run {
        writeln!(
            writer,
            "Would rebase {commits} commit(s) from '{current}' onto '{target}'"
        )?;
        match &target_holder {
            Some(path) => writeln!(
                writer,
                "Would fast-forward '{target}' in {}",
                path.display()
            )?,
            None => writeln!(
                writer,
                "Would check out '{target}' in {} and fast-forward it",
                main_path.display()
            )?,
        }
        if opts.keep {
            writeln!(writer, "Would keep the worktree at {}", worktree_root.display())?;
        } else {
            writeln!(
                writer,
                "Would remove the worktree at {} and delete branch '{current}'",
                worktree_root.display()
            )?;
        }
        return Ok(MergeOutcome::DryRun);
    }

    if target_holder.is_none() {
        git::checkout(&main_path, &target, cancel).await?;
    }

    // StdRng rather than the thread-local rng: the merge future must stay
    // Send so callers can spawn it onto a task.
    let mut rng = rand::rngs::StdRng::from_rng(&mut rand::rng());
    let max_attempts = opts.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;

        match git::rebase(&worktree_root, &target, cancel).await {
            Ok(()) => {}
            Err(e) if e.is_lock_contention() => {
                let _ = git::rebase_abort(&worktree_root, cancel).await;
                if attempt >= max_attempts {
                    return Err(MergeError::ContentionExhausted {
                        attempts: max_attempts,
                    });
                }
                wait_out(&target, attempt, max_attempts, &mut rng, writer, cancel).await?;
                continue;
            }
            Err(e @ GitError::CommandFailed { .. }) => {
                let files = git::conflicting_paths(&worktree_root, cancel)
                    .await
                    .unwrap_or_default();
                let _ = git::rebase_abort(&worktree_root, cancel).await;
                if files.is_empty() {
                    return Err(e.into());
                }
                return Err(MergeError::Conflict { target, files });
            }
            Err(e) => return Err(e.into()),
        }

        match git::merge_ff_only(&merge_dir, &current, cancel).await {
            Ok(()) => break,
            Err(e) if matches!(e, GitError::NotFastForward) || e.is_lock_contention() => {
                if attempt >= max_attempts {
                    return Err(MergeError::ContentionExhausted {
                        attempts: max_attempts,
                    });
                }
                wait_out(&target, attempt, max_attempts, &mut rng, writer, cancel).await?;
            }
            Err(e) => return Err(e.into()),
        }
    }

    writeln!(writer, "Merged '{current}' into '{target}' ({commits} commit(s))")?;

    if opts.keep {
        writeln!(writer, "Keeping worktree at {}", worktree_root.display())?;
        return Ok(MergeOutcome::Merged { target, commits });
    }

    cleanup::cleanup(
        &main_path,
        &CleanupRequest {
            info: &info,
            worktree_path: &worktree_root,
            delete_branch: true,
            force: false,
        },
        &worktree_root,
        config,
        cancel,
        writer,
    )
    .await?;
    writeln!(writer, "Removed worktree and deleted branch '{current}'")?;

    Ok(MergeOutcome::Merged { target, commits })
}

/// Announce the retry and sleep a jittered backoff, honoring cancellation.
async fn wait_out(
    target: &str,
    attempt: u32,
    max_attempts: u32,
    rng: &mut impl Rng,
    writer: &mut impl Write,
    cancel: &CancellationToken,
) -> Result<(), MergeError> {
    writeln!(
        writer,
        "'{target}' advanced during merge — retrying ({attempt}/{max_attempts})"
    )?;
    let delay = backoff::delay(attempt, rng);
    tracing::debug!(branch = target, attempt, ?delay, "backing off before merge retry");
    tokio::select! {
        () = tokio::time::sleep(delay) => Ok(()),
        () = cancel.cancelled() => Err(MergeError::Interrupted),
    }
}
