use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::create::{self, CreateOptions};
use crate::git;

pub struct CreateArgs {
    pub name: Option<String>,
    pub base: Option<String>,
    pub copy_changes: bool,
    pub worktree_base: Option<PathBuf>,
    /// Override for the invocation directory (used by tests).
    pub working_dir: Option<PathBuf>,
}

pub async fn create(
    args: CreateArgs,
    cancel: &CancellationToken,
    writer: &mut impl Write,
) -> Result<()> {
    let source_dir = super::invocation_dir(args.working_dir)?;
    let repo_root = git::main_worktree(&source_dir, cancel).await?;

    let mut config = Config::load(&repo_root)?;
    if let Some(base) = args.worktree_base {
        config.worktree_base = Some(base);
    }

    let opts = CreateOptions {
        name: args.name,
        base_branch: args.base,
        copy_changes: args.copy_changes,
    };
    let created = create::create(&source_dir, &opts, &config, cancel, writer).await?;

    writeln!(
        writer,
        "Created worktree '{}' (id {}) at {}",
        created.info.name,
        created.info.id,
        created.path.display()
    )?;
    writeln!(writer, "  branched from '{}'", created.info.base_branch)?;
    Ok(())
}
