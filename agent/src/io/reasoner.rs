//! Reasoning backends that turn a prompt into raw text.
//!
//! The [`Reasoner`] trait decouples planning from the actual backend. The default
//! backend spawns an external CLI (prompt on stdin, response on stdout). Tests use
//! scripted reasoners that return predetermined responses without spawning processes.

use std::process::Command;
use std::time::Duration;

use anyhow::{Result, anyhow};
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::io::config::ReasonerConfig;
use crate::io::process::run_command_with_timeout;

/// One call to the reasoning service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReasoningRequest {
    /// Standing instructions (allowed step types, output format).
    pub instruction: String,
    /// The task being planned.
    pub task: String,
    /// Rendered context: environment, files, feedback, known plans.
    pub prompt: String,
}

impl ReasoningRequest {
    /// Single text payload for backends without a separate system channel.
    pub fn combined(&self) -> String {
        format!("System: {}\n\nUser: {}", self.instruction, self.prompt)
    }
}

/// Abstraction over reasoning backends.
pub trait Reasoner {
    fn generate(&self, request: &ReasoningRequest) -> Result<String>;
}

impl<R: Reasoner + ?Sized> Reasoner for Box<R> {
    fn generate(&self, request: &ReasoningRequest) -> Result<String> {
        (**self).generate(request)
    }
}

/// Select the backend named by `config`, falling back to [`MockReasoner`] when no
/// command is configured.
pub fn reasoner_from_config(config: &ReasonerConfig) -> Result<Box<dyn Reasoner>> {
    if config.command.is_empty() {
        warn!("no reasoner.command configured; using offline mock reasoner");
        return Ok(Box::new(MockReasoner));
    }
    Ok(Box::new(CommandReasoner::from_config(config)?))
}

/// Reasoner that pipes the prompt through an external command.
#[derive(Debug, Clone)]
pub struct CommandReasoner {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandReasoner {
    pub fn from_config(config: &ReasonerConfig) -> Result<Self> {
        let (program, args) = config
            .command
            .split_first()
            .ok_or_else(|| anyhow!("reasoner.command is empty"))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout: Duration::from_secs(config.timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
        })
    }
}

impl Reasoner for CommandReasoner {
    #[instrument(skip_all, fields(program = %self.program, timeout_secs = self.timeout.as_secs()))]
    fn generate(&self, request: &ReasoningRequest) -> Result<String> {
        info!("calling reasoning command");
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        let payload = request.combined();
        let output = run_command_with_timeout(
            cmd,
            Some(payload.as_bytes()),
            self.timeout,
            self.output_limit_bytes,
        )
        .map_err(|err| err.context(format!("run reasoner {}", self.program)))?;

        if output.timed_out {
            warn!("reasoning command timed out");
            return Err(anyhow!(
                "reasoner {} timed out after {:?}",
                self.program,
                self.timeout
            ));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "reasoning command failed");
            return Err(anyhow!(
                "reasoner {} failed with status {:?}: {}",
                self.program,
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        let response = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(bytes = response.len(), "reasoning command completed");
        Ok(response)
    }
}

/// Offline reasoner with canned plans keyed on task keywords.
///
/// Anything it does not recognize gets a plain-text reply with no plan in it.
#[derive(Debug, Default, Clone)]
pub struct MockReasoner;

impl Reasoner for MockReasoner {
    fn generate(&self, request: &ReasoningRequest) -> Result<String> {
        let task = request.task.to_lowercase();
        let show = if cfg!(target_os = "windows") {
            "type"
        } else {
            "cat"
        };
        let plan = if task.contains("fibonacci") {
            json!([{
                "type": "write_file",
                "filename": "fib.py",
                "content": "def fib(n):\n    if n <= 1: return n\n    return fib(n-1) + fib(n-2)\n\nprint(fib(10))\n"
            }])
        } else if task.contains("verify") {
            json!([
                {"type": "write_file", "filename": "verification_test.txt", "content": "PASSED"},
                {"type": "verify", "command": format!("{show} verification_test.txt")}
            ])
        } else if task.contains("ask") {
            json!([
                {"type": "ask_user", "question": "What is your favorite color?"},
                {"type": "command", "command": "echo 'User said their favorite color is...'"}
            ])
        } else {
            return Ok("Mock LLM Response".to_string());
        };
        Ok(plan.to_string())
    }
}
