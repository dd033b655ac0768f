mod cli;

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use warren::commands;

use cli::{Cli, Command};

/// How long in-flight cleanup gets after the first interrupt.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cancel = CancellationToken::new();

    // The command body runs below; this task watches for interruption. The
    // first Ctrl-C starts cooperative cancellation with a grace period for
    // cleanup; a second Ctrl-C, or the grace period expiring, forces exit.
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        eprintln!("\nInterrupted — cleaning up (Ctrl-C again to force exit)");
        signal_cancel.cancel();
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            () = tokio::time::sleep(SHUTDOWN_GRACE) => {}
        }
        std::process::exit(130);
    });

    run(cli, &cancel).await
}

async fn run(cli: Cli, cancel: &CancellationToken) -> Result<()> {
    let mut stdout = std::io::stdout();
    match cli.command {
        Command::Create {
            name,
            base,
            copy_changes,
            worktree_base,
        } => {
            commands::create::create(
                commands::create::CreateArgs {
                    name,
                    base,
                    copy_changes,
                    worktree_base,
                    working_dir: None,
                },
                cancel,
                &mut stdout,
            )
            .await
        }
        Command::Delete {
            name,
            force,
            delete_branch,
            keep_branch,
        } => {
            let delete_branch = if delete_branch {
                Some(true)
            } else if keep_branch {
                Some(false)
            } else {
                None
            };
            let mut stdin = std::io::stdin().lock();
            commands::delete::delete(
                commands::delete::DeleteArgs {
                    name,
                    force,
                    delete_branch,
                    working_dir: None,
                },
                cancel,
                &mut stdin,
                &mut stdout,
            )
            .await
        }
        Command::Merge {
            target,
            keep,
            dry_run,
        } => {
            commands::merge::merge(
                commands::merge::MergeArgs {
                    target,
                    keep,
                    dry_run,
                    working_dir: None,
                },
                cancel,
                &mut stdout,
            )
            .await
        }
        Command::List => commands::list::list(None, cancel, &mut stdout).await,
        Command::Init => commands::init::init(None, cancel, &mut stdout).await,
    }
}
