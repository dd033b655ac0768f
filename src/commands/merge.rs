use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::git;
use crate::merge::{self, MergeOptions};

pub struct MergeArgs {
    pub target: Option<String>,
    pub keep: bool,
    pub dry_run: bool,
    /// Override for the invocation directory (used by tests).
    pub working_dir: Option<PathBuf>,
}

pub async fn merge(
    args: MergeArgs,
    cancel: &CancellationToken,
    writer: &mut impl Write,
) -> Result<()> {
    let source_dir = super::invocation_dir(args.working_dir)?;
    let repo_root = git::main_worktree(&source_dir, cancel).await?;
    let config = Config::load(&repo_root)?;

    let opts = MergeOptions {
        target: args.target,
        keep: args.keep,
        dry_run: args.dry_run,
        max_attempts: config.merge_attempts,
    };
    merge::merge(&source_dir, &opts, &config, cancel, writer).await?;
    Ok(())
}
