//! Race properties across concurrent invocations sharing one repository.
//!
//! Everything here drives real git processes; the tasks stand in for the
//! independent CLI processes that would normally compete.

#![allow(clippy::unwrap_used, clippy::panic)]

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use warren::config::Config;
use warren::create::{self, CreateOptions};
use warren::merge::{self, MergeOptions};
use warren::metadata;

fn git_sync(dir: &Path, args: &[&str]) -> String {
    let output = std::process::Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("git {args:?} failed: {e}"));
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn init_repo(dir: &Path) {
    git_sync(dir, &["init", "-b", "main"]);
    git_sync(dir, &["config", "user.email", "test@test.com"]);
    git_sync(dir, &["config", "user.name", "Test"]);
    fs::write(dir.join("README.md"), "# test repo\n").unwrap();
    git_sync(dir, &["add", "."]);
    git_sync(dir, &["commit", "-m", "initial commit"]);
}

fn commit_file(dir: &Path, name: &str, content: &str, message: &str) {
    fs::write(dir.join(name), content).unwrap();
    git_sync(dir, &["add", name]);
    git_sync(dir, &["commit", "-m", message]);
}

fn test_config(base: &Path) -> Config {
    Config {
        worktree_base: Some(base.to_path_buf()),
        ..Config::default()
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_creates_assign_exactly_one_through_n() {
    const N: usize = 4;

    let repo = TempDir::new().unwrap();
    let base = TempDir::new().unwrap();
    init_repo(repo.path());

    let mut handles = Vec::new();
    for _ in 0..N {
        let repo_path: PathBuf = repo.path().to_path_buf();
        let config = test_config(base.path());
        handles.push(tokio::spawn(async move {
            let cancel = CancellationToken::new();
            let mut out = Vec::new();
            create::create(
                &repo_path,
                &CreateOptions {
                    name: None,
                    base_branch: None,
                    copy_changes: false,
                },
                &config,
                &cancel,
                &mut out,
            )
            .await
        }));
    }

    let mut ids = Vec::new();
    let mut names = HashSet::new();
    for handle in handles {
        let created = handle.await.unwrap().unwrap();
        ids.push(created.info.id);
        names.insert(created.info.name.clone());
    }

    ids.sort_unstable();
    let expected: Vec<u32> = (1..=u32::try_from(N).unwrap()).collect();
    assert_eq!(ids, expected, "ids must be exactly 1..=N, no gaps or dups");
    assert_eq!(names.len(), N, "names must be unique");

    // The scan agrees with what the creators were told
    let repo_root = repo.path().canonicalize().unwrap();
    let base_dir = test_config(base.path()).worktree_dir(&repo_root).unwrap();
    let scanned = metadata::scan(&base_dir).unwrap();
    let scanned_ids: Vec<u32> = scanned.iter().map(|w| w.info.id).collect();
    assert_eq!(scanned_ids, expected);
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_merges_all_land_on_the_target() {
    const N: usize = 5;

    let repo = TempDir::new().unwrap();
    let base = TempDir::new().unwrap();
    init_repo(repo.path());
    let config = test_config(base.path());

    // One worktree per task, each with a unique commit off the same base
    let mut worktrees = Vec::new();
    for i in 0..N {
        let cancel = CancellationToken::new();
        let mut out = Vec::new();
        let created = create::create(
            repo.path(),
            &CreateOptions {
                name: Some(format!("racer-{i}")),
                base_branch: None,
                copy_changes: false,
            },
            &config,
            &cancel,
            &mut out,
        )
        .await
        .unwrap();
        commit_file(
            &created.path,
            &format!("change-{i}.txt"),
            &format!("payload {i}\n"),
            &format!("racer {i} payload"),
        );
        worktrees.push(created);
    }

    let mut handles = Vec::new();
    for created in &worktrees {
        let path = created.path.clone();
        let config = test_config(base.path());
        handles.push(tokio::spawn(async move {
            let cancel = CancellationToken::new();
            let mut out = Vec::new();
            merge::merge(
                &path,
                &MergeOptions {
                    target: None,
                    keep: false,
                    dry_run: false,
                    max_attempts: 10,
                },
                &config,
                &cancel,
                &mut out,
            )
            .await
        }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // Every commit made it to main
    let log = git_sync(repo.path(), &["log", "--oneline", "main"]);
    for i in 0..N {
        assert!(
            log.contains(&format!("racer {i} payload")),
            "commit from racer {i} missing from main:\n{log}"
        );
    }

    // No worktree directories or metadata remain
    for created in &worktrees {
        assert!(!created.path.exists(), "{} still exists", created.path.display());
    }
    let repo_root = repo.path().canonicalize().unwrap();
    let base_dir = config.worktree_dir(&repo_root).unwrap();
    assert!(metadata::scan(&base_dir).unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn ids_stay_unique_among_live_worktrees() {
    let repo = TempDir::new().unwrap();
    let base = TempDir::new().unwrap();
    init_repo(repo.path());
    let config = test_config(base.path());
    let cancel = CancellationToken::new();

    let mut out = Vec::new();
    let first = create::create(
        repo.path(),
        &CreateOptions {
            name: Some("first".to_string()),
            base_branch: None,
            copy_changes: false,
        },
        &config,
        &cancel,
        &mut out,
    )
    .await
    .unwrap();
    assert_eq!(first.info.id, 1);

    let second = create::create(
        repo.path(),
        &CreateOptions {
            name: Some("second".to_string()),
            base_branch: None,
            copy_changes: false,
        },
        &config,
        &cancel,
        &mut out,
    )
    .await
    .unwrap();
    assert_eq!(second.info.id, 2);

    // Remove the higher-id worktree; the next id still moves forward from
    // the surviving maximum.
    warren::cleanup::cleanup(
        repo.path(),
        &warren::cleanup::CleanupRequest {
            info: &second.info,
            worktree_path: &second.path,
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

    let third = create::create(
        repo.path(),
        &CreateOptions {
            name: Some("third".to_string()),
            base_branch: None,
            copy_changes: false,
        },
        &config,
        &cancel,
        &mut out,
    )
    .await
    .unwrap();
    // id 2's metadata died with its worktree, so scan-based assignment
    // hands out max+1 of the survivors
    assert_eq!(third.info.id, 2);
}
