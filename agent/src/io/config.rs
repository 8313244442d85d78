//! Agent configuration stored in `agent.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::io::executor::ExecutorConfig;

/// Default config file name, resolved against the current directory.
pub const DEFAULT_CONFIG_PATH: &str = "agent.toml";

/// Agent configuration (TOML).
///
/// Missing fields default to the values below, so an absent or partial file is valid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Attempt ceiling for one task run.
    pub max_attempts: u32,

    /// Timeout for a single foreground `command` or `verify` step.
    pub command_timeout_secs: u64,

    /// Truncate captured stdout/stderr of a step beyond this many bytes per stream.
    pub output_limit_bytes: usize,

    /// Maximum number of lines returned by a `search_files` step.
    pub search_max_matches: usize,

    /// Directory new workspaces are created under.
    pub projects_dir: PathBuf,

    /// Trace store document.
    pub memory_path: PathBuf,

    pub reasoner: ReasonerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReasonerConfig {
    /// Command that reads a prompt on stdin and writes the response to stdout
    /// (e.g. `["codex", "exec", "-"]`). Empty selects the offline mock.
    pub command: Vec<String>,

    pub timeout_secs: u64,

    /// Truncate reasoning output beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for ReasonerConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            timeout_secs: 5 * 60,
            output_limit_bytes: 1_000_000,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_attempts: 50,
            command_timeout_secs: 60,
            output_limit_bytes: 100_000,
            search_max_matches: 50,
            projects_dir: PathBuf::from("projects"),
            memory_path: PathBuf::from("memory.json"),
            reasoner: ReasonerConfig::default(),
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(anyhow!("max_attempts must be > 0"));
        }
        if self.command_timeout_secs == 0 {
            return Err(anyhow!("command_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.search_max_matches == 0 {
            return Err(anyhow!("search_max_matches must be > 0"));
        }
        if self.reasoner.timeout_secs == 0 {
            return Err(anyhow!("reasoner.timeout_secs must be > 0"));
        }
        if self.reasoner.output_limit_bytes == 0 {
            return Err(anyhow!("reasoner.output_limit_bytes must be > 0"));
        }
        if let Some(program) = self.reasoner.command.first()
            && program.trim().is_empty()
        {
            return Err(anyhow!("reasoner.command must start with a program name"));
        }
        Ok(())
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            command_timeout: Duration::from_secs(self.command_timeout_secs),
            output_limit_bytes: self.output_limit_bytes,
            search_max_matches: self.search_max_matches,
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AgentConfig::default()`.
pub fn load_config(path: &Path) -> Result<AgentConfig> {
    if !path.exists() {
        let cfg = AgentConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AgentConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AgentConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, AgentConfig::default());
        assert_eq!(cfg.max_attempts, 50);
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("agent.toml");
        let cfg = AgentConfig {
            max_attempts: 3,
            reasoner: ReasonerConfig {
                command: vec!["codex".to_string(), "exec".to_string(), "-".to_string()],
                ..ReasonerConfig::default()
            },
            ..AgentConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("agent.toml");
        fs::write(&path, "max_attempts = 5\n\n[reasoner]\ncommand = [\"llm\"]\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.max_attempts, 5);
        assert_eq!(cfg.command_timeout_secs, 60);
        assert_eq!(cfg.reasoner.command, vec!["llm"]);
        assert_eq!(cfg.reasoner.timeout_secs, 300);
    }

    #[test]
    fn rejects_zero_attempts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("agent.toml");
        fs::write(&path, "max_attempts = 0\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("max_attempts must be > 0"));
    }
}
