use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::git;
use crate::metadata;

pub async fn list(
    working_dir: Option<PathBuf>,
    cancel: &CancellationToken,
    writer: &mut impl Write,
) -> Result<()> {
    let source_dir = super::invocation_dir(working_dir)?;
    let repo_root = git::main_worktree(&source_dir, cancel).await?;
    let config = Config::load(&repo_root)?;
    let base_dir = config.worktree_dir(&repo_root)?;

    let worktrees = metadata::scan(&base_dir)?;
    if worktrees.is_empty() {
        writeln!(writer, "No worktrees.")?;
        return Ok(());
    }

    for worktree in &worktrees {
        writeln!(
            writer,
            "{:>4}  {:<24} {:<16} {}  {}",
            worktree.info.id,
            worktree.info.name,
            worktree.info.base_branch,
            worktree.info.created.format("%Y-%m-%d %H:%M"),
            worktree.path.display()
        )?;
    }
    Ok(())
}
