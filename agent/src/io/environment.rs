//! Environment snapshot taken once per task run.

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;
use walkdir::WalkDir;

/// Development tools probed on `PATH`.
pub const KNOWN_TOOLS: &[&str] = &[
    "python", "python3", "git", "docker", "node", "npm", "gcc", "g++", "make", "cmake", "go",
    "rustc", "cargo", "java", "javac", "mvn", "gradle",
];

/// Number of workspace files included in the snapshot.
pub const FILE_LISTING_LIMIT: usize = 20;

/// Read-only description of where the plan will run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentContext {
    pub os: String,
    pub shell: String,
    /// Tool name to resolved executable path.
    pub tools: BTreeMap<String, PathBuf>,
    /// Workspace files relative to `cwd`, sorted, capped at [`FILE_LISTING_LIMIT`].
    pub files: Vec<String>,
    pub cwd: PathBuf,
}

impl EnvironmentContext {
    /// Probe the host and list the files of `workspace`.
    pub fn capture(workspace: &Path) -> Self {
        let context = Self {
            os: detect_os(),
            shell: detect_shell(),
            tools: scan_tools(KNOWN_TOOLS),
            files: list_files(workspace, FILE_LISTING_LIMIT),
            cwd: workspace.to_path_buf(),
        };
        debug!(
            os = %context.os,
            shell = %context.shell,
            tools = context.tools.len(),
            files = context.files.len(),
            "environment captured"
        );
        context
    }

    /// Plain-text rendering for prompts.
    pub fn render(&self) -> String {
        let mut buf = String::new();
        buf.push_str(&format!("os: {}\n", self.os));
        buf.push_str(&format!("shell: {}\n", self.shell));
        buf.push_str(&format!("cwd: {}\n", self.cwd.display()));
        if self.tools.is_empty() {
            buf.push_str("tools: none detected\n");
        } else {
            buf.push_str("tools:\n");
            for (name, path) in &self.tools {
                buf.push_str(&format!("- {}: {}\n", name, path.display()));
            }
        }
        buf
    }
}

pub fn detect_os() -> String {
    match env::consts::OS {
        "linux" => "Linux".to_string(),
        "macos" => "Darwin".to_string(),
        "windows" => "Windows".to_string(),
        other => other.to_string(),
    }
}

/// `$SHELL` basename, else the platform default.
pub fn detect_shell() -> String {
    if let Some(shell) = env::var_os("SHELL")
        && let Some(name) = Path::new(&shell).file_name()
    {
        return name.to_string_lossy().into_owned();
    }
    if cfg!(target_os = "windows") {
        "powershell".to_string()
    } else {
        "bash".to_string()
    }
}

/// Resolve each tool on `PATH`, keeping the ones found.
pub fn scan_tools(tools: &[&str]) -> BTreeMap<String, PathBuf> {
    let Some(path_var) = env::var_os("PATH") else {
        return BTreeMap::new();
    };
    let dirs: Vec<PathBuf> = env::split_paths(&path_var).collect();
    tools
        .iter()
        .filter_map(|tool| find_executable(&dirs, tool).map(|path| (tool.to_string(), path)))
        .collect()
}

fn find_executable(dirs: &[PathBuf], name: &str) -> Option<PathBuf> {
    for dir in dirs {
        let candidate = dir.join(name);
        if is_executable(&candidate) {
            return Some(candidate);
        }
        if cfg!(target_os = "windows") {
            let exe = dir.join(format!("{name}.exe"));
            if exe.is_file() {
                return Some(exe);
            }
        }
    }
    None
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Files under `dir` relative to it, skipping `.git`.
pub fn list_files(dir: &Path, limit: usize) -> Vec<String> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.file_name() != ".git")
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            entry
                .path()
                .strip_prefix(dir)
                .ok()
                .map(|rel| rel.display().to_string())
        })
        .take(limit)
        .collect()
}
