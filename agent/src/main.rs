//! Autonomous task-execution agent.
//!
//! Runs a single task when one is given on the command line, otherwise reads tasks
//! interactively. Each task runs in a workspace directory under `projects_dir` and is
//! retried with feedback until it succeeds or `max_attempts` is reached.

use std::path::{Path, PathBuf};

use agent::coordinator::{Coordinator, CoordinatorConfig, RunOutcome};
use agent::core::trace::ExecutionTrace;
use agent::exit_codes;
use agent::io::config::{AgentConfig, DEFAULT_CONFIG_PATH, load_config};
use agent::io::executor::{StdinPrompter, StepExecutor};
use agent::io::reasoner::{Reasoner, reasoner_from_config};
use agent::io::trace_store::TraceStore;
use agent::logging;
use agent::planner::Planner;
use agent::shell::run_shell;
use anyhow::{Context, Result};
use clap::Parser;

#[derive(Parser)]
#[command(
    name = "agent",
    version,
    about = "Plan, execute and retry tasks in an isolated workspace"
)]
struct Cli {
    /// Task to run. Omit to start the interactive shell.
    task: Option<String>,

    /// Run in this workspace instead of allocating a new one.
    #[arg(short, long)]
    workspace: Option<PathBuf>,

    /// Config file (TOML). Missing file means defaults.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    let mut coordinator = build_coordinator(&config)?;

    match cli.task {
        Some(task) => {
            let outcome = run_task(&mut coordinator, &task, cli.workspace.as_deref())?;
            Ok(if outcome.succeeded() {
                exit_codes::OK
            } else {
                exit_codes::EXHAUSTED
            })
        }
        None => {
            let mut workspace = cli.workspace;
            run_shell(&StdinPrompter, |task, current| {
                // The command-line workspace only seeds the first task.
                let seed = workspace.take();
                let outcome = run_task(&mut coordinator, task, current.or(seed.as_deref()))?;
                Ok(outcome.workspace)
            })?;
            Ok(exit_codes::OK)
        }
    }
}

fn build_coordinator(
    config: &AgentConfig,
) -> Result<Coordinator<Box<dyn Reasoner>, StdinPrompter>> {
    let reasoner = reasoner_from_config(&config.reasoner)?;
    let store = TraceStore::load(&config.memory_path)
        .with_context(|| format!("open trace store {}", config.memory_path.display()))?;
    Ok(Coordinator::new(
        CoordinatorConfig {
            max_attempts: config.max_attempts,
            projects_dir: config.projects_dir.clone(),
        },
        Planner::new(reasoner),
        StepExecutor::new(config.executor_config(), StdinPrompter),
        store,
    ))
}

fn run_task<R: Reasoner>(
    coordinator: &mut Coordinator<R, StdinPrompter>,
    task: &str,
    workspace: Option<&Path>,
) -> Result<RunOutcome> {
    println!("Task: {task}");
    let outcome = coordinator.run(task, workspace, print_attempt)?;
    println!("Workspace: {}", outcome.workspace.display());
    if outcome.succeeded() {
        println!("Task completed after {} attempt(s).", outcome.attempts);
    } else {
        println!(
            "Task failed after {} attempt(s); giving up.",
            outcome.attempts
        );
    }
    Ok(outcome)
}

fn print_attempt(trace: &ExecutionTrace) {
    println!(
        "Attempt {}: {} ({}/{} steps run)",
        trace.attempt,
        if trace.is_success() { "success" } else { "failure" },
        trace.steps.len(),
        trace.plan.len()
    );
    if let Some((index, record)) = trace.failing_step() {
        println!(
            "  step {} ({}) {}: {}",
            index + 1,
            record.step.kind(),
            record.result.status.as_str(),
            record.result.explanation()
        );
    }
}
