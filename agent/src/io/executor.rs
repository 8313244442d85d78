//! Step interpreter: turns one [`Step`] into a concrete OS action.
//!
//! Every handler returns an [`ExecutionResult`]; nothing here propagates an error to
//! the caller. The interactive `ask_user` channel sits behind the [`Prompter`] trait so
//! tests can script answers without a terminal.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::core::result::{ExecutionResult, StepStatus};
use crate::core::step::Step;
use crate::io::process::{run_command_with_timeout, shell_command, spawn_detached};
use crate::io::search::search_tree;

/// Exit status POSIX shells use when the executable could not be found.
const SHELL_COMMAND_NOT_FOUND: i32 = 127;

/// Source of free-text answers for `ask_user` steps.
pub trait Prompter {
    /// Ask `question` and block for an answer. `Ok(None)` means the channel is closed.
    fn ask(&self, question: &str) -> io::Result<Option<String>>;
}

/// Prompter that writes the question to stdout and reads one line from stdin.
pub struct StdinPrompter;

impl Prompter for StdinPrompter {
    fn ask(&self, question: &str) -> io::Result<Option<String>> {
        let mut stdout = io::stdout().lock();
        write!(stdout, "{question}\n> ")?;
        stdout.flush()?;
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line))
    }
}

/// Limits applied while executing steps.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub command_timeout: Duration,
    pub output_limit_bytes: usize,
    pub search_max_matches: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(60),
            output_limit_bytes: 100_000,
            search_max_matches: 50,
        }
    }
}

/// Executes steps against a working directory.
pub struct StepExecutor<P: Prompter> {
    config: ExecutorConfig,
    prompter: P,
}

impl<P: Prompter> StepExecutor<P> {
    pub fn new(config: ExecutorConfig, prompter: P) -> Self {
        Self { config, prompter }
    }

    pub fn prompter(&self) -> &P {
        &self.prompter
    }

    /// Execute `step` in `cwd`.
    #[instrument(skip_all, fields(kind = step.kind()))]
    pub fn execute(&self, step: &Step, cwd: &Path) -> ExecutionResult {
        let result = match step {
            Step::Command {
                command,
                background: true,
            } => self.run_background(command, cwd),
            Step::Command { command, .. } => self.run_blocking(command, cwd),
            Step::Verify { command } => {
                info!(tag = "verify", %command, "running verification");
                let result = self.run_blocking(command, cwd);
                if !result.is_success() {
                    warn!(tag = "verify", status = result.status.as_str(), "verification failed");
                }
                result
            }
            Step::WriteFile { filename, content } => write_file(cwd, filename, content),
            Step::ReadFile { filename } => read_file(cwd, filename),
            Step::SearchFiles { pattern, path } => {
                self.search_files(cwd, pattern, path.as_deref())
            }
            Step::AskUser { question } => self.ask_user(question),
            Step::Unknown { kind, .. } => {
                warn!(kind = %kind, "skipping unknown step type");
                ExecutionResult::skipped(format!("unknown step type: {kind}"))
            }
        };
        debug!(status = result.status.as_str(), "step finished");
        result
    }

    fn run_blocking(&self, command: &str, cwd: &Path) -> ExecutionResult {
        info!(cwd = %cwd.display(), %command, "executing command");
        let output = match run_command_with_timeout(
            shell_command(command, cwd),
            None,
            self.config.command_timeout,
            self.config.output_limit_bytes,
        ) {
            Ok(output) => output,
            Err(err) => {
                warn!(err = %format!("{err:#}"), "command could not run");
                return ExecutionResult::error(format!("{err:#}"));
            }
        };
        if output.timed_out {
            return ExecutionResult::failure(format!(
                "command timed out after {}s",
                self.config.command_timeout.as_secs()
            ));
        }
        let mut result = ExecutionResult::from_output(
            output.stdout_text(),
            output.stderr_text(),
            output.status.code(),
        );
        if cfg!(unix) && output.status.code() == Some(SHELL_COMMAND_NOT_FOUND) {
            result.status = StepStatus::Error;
        }
        result
    }

    fn run_background(&self, command: &str, cwd: &Path) -> ExecutionResult {
        info!(cwd = %cwd.display(), %command, "starting background command");
        match spawn_detached(shell_command(command, cwd)) {
            Ok(pid) => ExecutionResult::background(pid),
            Err(err) => ExecutionResult::error(format!("{err:#}")),
        }
    }

    fn search_files(&self, cwd: &Path, pattern: &str, path: Option<&str>) -> ExecutionResult {
        let dir = match path {
            Some(rel) => cwd.join(rel),
            None => cwd.to_path_buf(),
        };
        if !dir.exists() {
            return ExecutionResult::error(format!("search path {} does not exist", dir.display()));
        }
        let hits = search_tree(cwd, &dir, pattern, self.config.search_max_matches);
        debug!(total = hits.total, returned = hits.matches.len(), "search finished");
        ExecutionResult::matches(hits.matches, hits.total)
    }

    fn ask_user(&self, question: &str) -> ExecutionResult {
        match self.prompter.ask(question) {
            Ok(Some(answer)) => {
                ExecutionResult::answer(answer.trim_end_matches(['\r', '\n']).to_string())
            }
            Ok(None) => ExecutionResult::failure("input channel closed"),
            Err(err) => ExecutionResult::error(format!("read answer: {err}")),
        }
    }
}

fn write_file(cwd: &Path, filename: &str, content: &str) -> ExecutionResult {
    let path = cwd.join(filename);
    info!(path = %path.display(), "writing file");
    if let Some(parent) = path.parent()
        && let Err(err) = fs::create_dir_all(parent)
    {
        return ExecutionResult::error(format!("create directory {}: {err}", parent.display()));
    }
    match fs::write(&path, content) {
        Ok(()) => ExecutionResult::message(format!("File {filename} written.")),
        Err(err) => ExecutionResult::error(format!("write {}: {err}", path.display())),
    }
}

fn read_file(cwd: &Path, filename: &str) -> ExecutionResult {
    let path = cwd.join(filename);
    info!(path = %path.display(), "reading file");
    match fs::read_to_string(&path) {
        Ok(content) => ExecutionResult::content(content),
        Err(err) => ExecutionResult::error(format!("read {}: {err}", path.display())),
    }
}
