//! Interactive task shell used when the CLI is started without a task.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{error, info};

use crate::io::executor::Prompter;

pub const SHELL_PROMPT: &str = "Task ('new' for a fresh workspace, 'exit' to quit):";

/// One parsed line of shell input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Exit,
    NewWorkspace,
    Blank,
    Task(String),
}

pub fn parse_line(line: &str) -> ShellCommand {
    let trimmed = line.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "" => ShellCommand::Blank,
        "exit" | "quit" => ShellCommand::Exit,
        "new" => ShellCommand::NewWorkspace,
        _ => ShellCommand::Task(trimmed.to_string()),
    }
}

/// Read tasks from `input` until `exit`, `quit` or end of input.
///
/// Consecutive tasks share the workspace returned by the previous `run_task` call;
/// `new` drops it so the next task allocates a fresh one. A failing `run_task` is
/// logged and the shell keeps going.
pub fn run_shell<P, F>(input: &P, mut run_task: F) -> Result<()>
where
    P: Prompter,
    F: FnMut(&str, Option<&Path>) -> Result<PathBuf>,
{
    let mut workspace: Option<PathBuf> = None;
    loop {
        let Some(line) = input.ask(SHELL_PROMPT).context("read shell input")? else {
            info!("input closed; leaving shell");
            return Ok(());
        };
        match parse_line(&line) {
            ShellCommand::Exit => return Ok(()),
            ShellCommand::Blank => {}
            ShellCommand::NewWorkspace => {
                info!("workspace reset");
                workspace = None;
            }
            ShellCommand::Task(task) => match run_task(&task, workspace.as_deref()) {
                Ok(used) => workspace = Some(used),
                Err(err) => error!(err = %format!("{err:#}"), task = %task, "task run failed"),
            },
        }
    }
}
