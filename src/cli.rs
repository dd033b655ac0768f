use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "warren",
    about = "Short-lived git worktrees for parallel development and agent workflows",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a worktree with a fresh identity on its own branch.
    Create {
        /// Name for the worktree and its branch (random adjective-animal if omitted).
        #[arg(long)]
        name: Option<String>,

        /// Branch to fork from. Default: current branch of the invocation directory.
        #[arg(long)]
        base: Option<String>,

        /// Copy uncommitted changes from the invocation directory into the new worktree.
        #[arg(long)]
        copy_changes: bool,

        /// Root directory for worktrees. Default: ~/.warren/worktrees.
        #[arg(long)]
        worktree_base: Option<PathBuf>,
    },

    /// Delete a worktree (the current one if no name is given).
    Delete {
        /// Name of the worktree to delete.
        name: Option<String>,

        /// Delete even if the worktree has uncommitted changes.
        #[arg(long)]
        force: bool,

        /// Delete the branch without prompting.
        #[arg(long, conflicts_with = "keep_branch")]
        delete_branch: bool,

        /// Keep the branch without prompting.
        #[arg(long)]
        keep_branch: bool,
    },

    /// Rebase onto the target branch, fast-forward it, then clean up.
    Merge {
        /// Branch to merge into. Default: the worktree's recorded base branch.
        #[arg(long)]
        target: Option<String>,

        /// Keep the worktree and branch after a successful merge.
        #[arg(long)]
        keep: bool,

        /// Run the pre-checks and print the plan without changing anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// List live worktrees.
    List,

    /// Set up .warren/ with a default config and sample hooks.
    Init,
}
