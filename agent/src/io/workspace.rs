//! Workspace allocation for task runs.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use tracing::info;

/// Number of task characters used in a workspace name.
const SLUG_CHARS: usize = 30;

/// Create `<projects_dir>/<timestamp>_<slug>` for `task`.
pub fn create_workspace(projects_dir: &Path, task: &str) -> Result<PathBuf> {
    let name = build_workspace_name(&generate_timestamp(), task);
    let root = projects_dir.join(name);
    fs::create_dir_all(&root).with_context(|| format!("create workspace {}", root.display()))?;
    info!(workspace = %root.display(), "created workspace");
    Ok(root)
}

/// Reuse `existing`, creating the directory if it is missing.
pub fn ensure_workspace(existing: &Path) -> Result<PathBuf> {
    fs::create_dir_all(existing)
        .with_context(|| format!("create workspace {}", existing.display()))?;
    Ok(existing.to_path_buf())
}

pub fn build_workspace_name(timestamp: &str, task: &str) -> String {
    format!("{timestamp}_{}", slugify(task))
}

/// First 30 characters of `task`, non-alphanumerics replaced by `_`, lowercased.
pub fn slugify(task: &str) -> String {
    task.chars()
        .take(SLUG_CHARS)
        .map(|ch| {
            if ch.is_ascii_alphanumeric() {
                ch.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

fn generate_timestamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}
