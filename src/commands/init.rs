use std::fs;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::git;
use crate::hooks::HOOKS_DIR;

const CONFIG_TEMPLATE: &str = r#"# warren configuration. Every field is optional.

# Root directory for worktrees (default: ~/.warren/worktrees).
# worktree_base = "/path/to/worktrees"

# Seconds to wait for the identity-assignment lock.
# lock_timeout_secs = 5

# Seconds a lifecycle hook may run before being killed.
# hook_timeout_secs = 120

# Merge retry budget when the target branch keeps advancing.
# merge_attempts = 5
"#;

const POST_CREATE_SAMPLE: &str = r#"#!/bin/sh
# Runs after a worktree is created, before it is handed back.
# Rename to "post-create" and chmod +x to enable.
#
# Environment: WARREN_ID, WARREN_AGENT_ID, WARREN_NAME, WARREN_WORKTREE_PATH,
# WARREN_BASE_BRANCH, WARREN_REPO_ROOT, WARREN_SOURCE_DIR.
#
# A non-zero exit rolls the new worktree back.

echo "post-create: $WARREN_NAME (id $WARREN_ID) at $WARREN_WORKTREE_PATH"
"#;

const PRE_DELETE_SAMPLE: &str = r#"#!/bin/sh
# Runs before a worktree is removed (by delete or by a successful merge).
# Rename to "pre-delete" and chmod +x to enable.
#
# Environment: WARREN_ID, WARREN_AGENT_ID, WARREN_NAME, WARREN_WORKTREE_PATH,
# WARREN_BASE_BRANCH, WARREN_REPO_ROOT, WARREN_SOURCE_DIR.
#
# A non-zero exit aborts the deletion.

echo "pre-delete: $WARREN_NAME at $WARREN_WORKTREE_PATH"
"#;

struct TemplateFile {
    path: &'static str,
    content: &'static str,
}

const TEMPLATES: &[TemplateFile] = &[
    TemplateFile {
        path: ".warren/config.toml",
        content: CONFIG_TEMPLATE,
    },
    TemplateFile {
        path: ".warren/hooks/post-create.sample",
        content: POST_CREATE_SAMPLE,
    },
    TemplateFile {
        path: ".warren/hooks/pre-delete.sample",
        content: PRE_DELETE_SAMPLE,
    },
];

/// Set up `.warren/` in the main repository with a default config and
/// sample hook scripts.
pub async fn init(
    working_dir: Option<PathBuf>,
    cancel: &CancellationToken,
    writer: &mut impl Write,
) -> Result<()> {
    let source_dir = super::invocation_dir(working_dir)?;
    let repo_root = git::main_worktree(&source_dir, cancel).await?;

    let hooks_dir = repo_root.join(HOOKS_DIR);
    fs::create_dir_all(&hooks_dir)
        .with_context(|| format!("failed to create {}", hooks_dir.display()))?;

    let mut created = Vec::new();
    let mut skipped = Vec::new();

    for template in TEMPLATES {
        let path = repo_root.join(template.path);
        if path.exists() {
            skipped.push(template.path);
        } else {
            fs::write(&path, template.content)
                .with_context(|| format!("failed to write {}", path.display()))?;
            created.push(template.path);
        }
    }

    if created.is_empty() {
        writeln!(writer, "Nothing to do — all files already exist.")?;
    } else {
        writeln!(writer, "Created:")?;
        for path in &created {
            writeln!(writer, "  {path}")?;
        }
    }

    if !skipped.is_empty() {
        writeln!(writer, "Skipped (already exist):")?;
        for path in &skipped {
            writeln!(writer, "  {path}")?;
        }
    }

    Ok(())
}
