use std::io::{BufRead, IsTerminal as _, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::cleanup::{self, CleanupError, CleanupRequest};
use crate::config::{self, Config};
use crate::git;
use crate::metadata;

pub struct DeleteArgs {
    /// Worktree to delete; the current worktree if None.
    pub name: Option<String>,
    pub force: bool,
    /// Branch fate when decided by a flag; None means ask (or keep when not
    /// on a terminal).
    pub delete_branch: Option<bool>,
    /// Override for the invocation directory (used by tests).
    pub working_dir: Option<PathBuf>,
}

pub async fn delete(
    args: DeleteArgs,
    cancel: &CancellationToken,
    input: &mut impl BufRead,
    writer: &mut impl Write,
) -> Result<()> {
    let source_dir = super::invocation_dir(args.working_dir)?;
    let repo_root = git::main_worktree(&source_dir, cancel).await?;
    let config = Config::load(&repo_root)?;

    let (worktree_path, info) = match &args.name {
        Some(name) => {
            let base_dir = config.worktree_dir(&repo_root)?;
            metadata::scan(&base_dir)?
                .into_iter()
                .find(|w| w.info.name == *name)
                .map(|w| (w.path, w.info))
                .with_context(|| format!("no worktree named '{name}'"))?
        }
        None => {
            let root = git::repo_root(&source_dir, cancel).await?;
            let info = metadata::read(&metadata::metadata_path(&root))
                .context("the current directory is not a managed worktree — pass a name")?;
            (root, info)
        }
    };

    // Check before running the pre-delete hook, so a blocked delete has no
    // side effects at all.
    if !args.force && git::is_dirty(&worktree_path, &[config::CONTROL_DIR], cancel).await? {
        return Err(CleanupError::DirtyWorktree(worktree_path).into());
    }

    let delete_branch = match args.delete_branch {
        Some(choice) => choice,
        None if std::io::stdin().is_terminal() => {
            confirm_branch_delete(&info.name, input, writer)?
        }
        None => false,
    };

    cleanup::cleanup(
        &repo_root,
        &CleanupRequest {
            info: &info,
            worktree_path: &worktree_path,
            delete_branch,
            force: args.force,
        },
        &source_dir,
        &config,
        cancel,
        writer,
    )
    .await?;

    writeln!(writer, "Deleted worktree '{}'", info.name)?;
    if !delete_branch {
        writeln!(writer, "Branch '{}' kept", info.name)?;
    }
    Ok(())
}

/// Ask whether to delete the branch. Anything but an explicit yes keeps it.
fn confirm_branch_delete(
    branch: &str,
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> std::io::Result<bool> {
    write!(output, "Delete branch '{branch}'? [y/N] ")?;
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    let answer = line.trim().to_lowercase();
    Ok(answer == "y" || answer == "yes")
}
