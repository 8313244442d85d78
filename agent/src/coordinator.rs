//! Attempt/retry loop for one task run.
//!
//! A run moves through `Initializing → Planning → Executing`, returning to `Planning`
//! after each failed attempt until it either succeeds or hits the attempt ceiling, then
//! `Reflecting → Done`. Exhausting the ceiling is a normal outcome reported in
//! [`RunOutcome::stop`], not an error.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::Local;
use tracing::{debug, info, info_span, warn};

use crate::core::feedback::AttemptState;
use crate::core::step::Plan;
use crate::core::trace::{ExecutionTrace, ProceduralRule, StepRecord};
use crate::io::environment::EnvironmentContext;
use crate::io::executor::{Prompter, StepExecutor};
use crate::io::reasoner::Reasoner;
use crate::io::trace_store::TraceStore;
use crate::io::workspace::{create_workspace, ensure_workspace};
use crate::planner::Planner;
use crate::reflector::reflect;

/// Phase of a task run, used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Initializing,
    Planning,
    Executing,
    Reflecting,
    Done,
}

/// Terminal outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStop {
    /// An attempt succeeded within the attempt budget.
    Succeeded,
    /// Every attempt up to the ceiling failed.
    ExhaustedRetries,
}

/// Summary of one [`Coordinator::run`] call.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub workspace: PathBuf,
    /// Attempts performed (1-indexed count).
    pub attempts: u32,
    pub stop: RunStop,
    pub final_trace: ExecutionTrace,
    /// Rule recorded by reflection, if the run succeeded.
    pub rule: Option<ProceduralRule>,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        self.stop == RunStop::Succeeded
    }
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub max_attempts: u32,
    /// Parent directory for newly allocated workspaces.
    pub projects_dir: PathBuf,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 50,
            projects_dir: PathBuf::from("projects"),
        }
    }
}

/// Owns the collaborators of a task run and drives the attempt loop.
pub struct Coordinator<R: Reasoner, P: Prompter> {
    config: CoordinatorConfig,
    planner: Planner<R>,
    executor: StepExecutor<P>,
    store: TraceStore,
}

impl<R: Reasoner, P: Prompter> Coordinator<R, P> {
    pub fn new(
        config: CoordinatorConfig,
        planner: Planner<R>,
        executor: StepExecutor<P>,
        store: TraceStore,
    ) -> Self {
        Self {
            config,
            planner,
            executor,
            store,
        }
    }

    pub fn store(&self) -> &TraceStore {
        &self.store
    }

    pub fn planner(&self) -> &Planner<R> {
        &self.planner
    }

    /// Run `task` to success or until the attempt ceiling.
    ///
    /// Reuses `existing_workspace` when given, otherwise allocates a new one. Every
    /// attempt's trace is persisted before `on_attempt` sees it. Only infrastructure
    /// failures (workspace creation, trace persistence) return `Err`.
    pub fn run<F: FnMut(&ExecutionTrace)>(
        &mut self,
        task: &str,
        existing_workspace: Option<&Path>,
        mut on_attempt: F,
    ) -> Result<RunOutcome> {
        let span = info_span!("run", task = %task);
        let _guard = span.enter();
        debug!(phase = ?RunPhase::Initializing, "starting task");

        let workspace = match existing_workspace {
            Some(path) => ensure_workspace(path)?,
            None => create_workspace(&self.config.projects_dir, task)?,
        };
        let environment = EnvironmentContext::capture(&workspace);
        info!(workspace = %workspace.display(), "environment captured");

        let mut state = AttemptState::first();
        let mut last_trace: Option<ExecutionTrace> = None;
        for attempt in 1..=self.config.max_attempts {
            debug_assert_eq!(state.attempt, attempt);
            let trace = self.run_attempt(task, &workspace, &environment, &state)?;
            on_attempt(&trace);

            if trace.is_success() {
                info!(attempt, "attempt succeeded");
                last_trace = Some(trace);
                break;
            }
            state = AttemptState::after(&trace);
            warn!(attempt, "attempt failed");
            last_trace = Some(trace);
        }

        let final_trace =
            last_trace.ok_or_else(|| anyhow!("max_attempts must be > 0 to run a task"))?;
        let stop = if final_trace.is_success() {
            RunStop::Succeeded
        } else {
            warn!(
                max_attempts = self.config.max_attempts,
                "attempt ceiling reached without success"
            );
            RunStop::ExhaustedRetries
        };

        debug!(phase = ?RunPhase::Reflecting, "reflecting on final trace");
        let rule = reflect(&final_trace, &mut self.store).context("record procedural rule")?;
        debug!(phase = ?RunPhase::Done, stop = ?stop, "task finished");

        Ok(RunOutcome {
            workspace,
            attempts: final_trace.attempt,
            stop,
            final_trace,
            rule,
        })
    }

    fn run_attempt(
        &mut self,
        task: &str,
        workspace: &Path,
        environment: &EnvironmentContext,
        state: &AttemptState,
    ) -> Result<ExecutionTrace> {
        let span = info_span!("attempt", attempt = state.attempt);
        let _guard = span.enter();

        debug!(phase = ?RunPhase::Planning, has_feedback = state.feedback.is_some(), "planning");
        let plan = {
            let rules: Vec<&ProceduralRule> = self.store.rules_for(task).collect();
            self.planner.create_plan(task, environment, state, &rules)
        };

        debug!(phase = ?RunPhase::Executing, steps = plan.len(), "executing plan");
        let steps = self.execute_plan(&plan, workspace);

        let mut trace = ExecutionTrace::finalize(task, state.attempt, plan, steps, workspace);
        trace.recorded_at = Some(Local::now().to_rfc3339());
        self.store
            .append_trace(trace.clone())
            .context("persist execution trace")?;
        Ok(trace)
    }

    /// Execute `plan` in order, stopping after the first halting result.
    fn execute_plan(&self, plan: &Plan, cwd: &Path) -> Vec<StepRecord> {
        let mut records = Vec::with_capacity(plan.len());
        for (index, step) in plan.iter().enumerate() {
            let result = self.executor.execute(step, cwd);
            let halts = result.status.halts();
            if halts {
                warn!(
                    index,
                    kind = step.kind(),
                    status = result.status.as_str(),
                    reason = %result.explanation(),
                    "step did not succeed; stopping plan"
                );
            }
            records.push(StepRecord {
                step: step.clone(),
                result,
            });
            if halts {
                break;
            }
        }
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::step::Step;
    use crate::core::trace::TraceStatus;
    use crate::io::executor::ExecutorConfig;
    use crate::test_support::{ScriptedPrompter, ScriptedReasoner, plan_response};

    fn coordinator(
        root: &Path,
        responses: Vec<std::result::Result<String, String>>,
        max_attempts: u32,
    ) -> Coordinator<ScriptedReasoner, ScriptedPrompter> {
        Coordinator::new(
            CoordinatorConfig {
                max_attempts,
                projects_dir: root.join("projects"),
            },
            Planner::new(ScriptedReasoner::new(responses)),
            StepExecutor::new(ExecutorConfig::default(), ScriptedPrompter::new(Vec::new())),
            TraceStore::load(root.join("memory.json")).expect("store"),
        )
    }

    #[test]
    fn short_circuits_at_first_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let plan = vec![
            Step::write_file("first.txt", "1"),
            Step::command("exit 1"),
            Step::write_file("third.txt", "3"),
        ];
        let mut coordinator = coordinator(temp.path(), vec![plan_response(&plan)], 1);

        let outcome = coordinator.run("task", None, |_| {}).expect("run");
        assert_eq!(outcome.stop, RunStop::ExhaustedRetries);
        assert_eq!(outcome.final_trace.steps.len(), 2);
        assert_eq!(outcome.final_trace.plan.len(), 3);
        assert!(outcome.workspace.join("first.txt").exists());
        assert!(!outcome.workspace.join("third.txt").exists());
    }

    #[test]
    fn empty_plan_succeeds_with_no_steps() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut coordinator = coordinator(temp.path(), vec![Ok("[]".to_string())], 3);

        let outcome = coordinator.run("nothing to do", None, |_| {}).expect("run");
        assert_eq!(outcome.stop, RunStop::Succeeded);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.final_trace.status, TraceStatus::Success);
        assert!(outcome.final_trace.steps.is_empty());
        assert_eq!(coordinator.store().traces().len(), 1);
        assert_eq!(coordinator.store().rules().len(), 1);
    }

    #[test]
    fn reuses_existing_workspace() {
        let temp = tempfile::tempdir().expect("tempdir");
        let existing = temp.path().join("mine");
        let plan = vec![Step::write_file("out.txt", "x")];
        let mut coordinator = coordinator(temp.path(), vec![plan_response(&plan)], 1);

        let outcome = coordinator.run("task", Some(&existing), |_| {}).expect("run");
        assert_eq!(outcome.workspace, existing);
        assert!(existing.join("out.txt").exists());
        assert!(!temp.path().join("projects").exists());
    }

    #[test]
    fn skipped_steps_do_not_stop_the_plan() {
        let temp = tempfile::tempdir().expect("tempdir");
        let response =
            r#"[{"type": "deploy"}, {"type": "write_file", "filename": "a", "content": ""}]"#;
        let mut coordinator = coordinator(temp.path(), vec![Ok(response.to_string())], 1);

        let outcome = coordinator.run("task", None, |_| {}).expect("run");
        assert!(outcome.succeeded());
        assert_eq!(outcome.final_trace.steps.len(), 2);
    }
}
