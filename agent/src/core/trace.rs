//! Episodic traces and the procedural rules derived from them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::result::ExecutionResult;
use crate::core::step::{Plan, Step};

/// Overall outcome of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceStatus {
    Success,
    Failure,
}

/// One executed step paired with its result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: Step,
    pub result: ExecutionResult,
}

/// Record of one attempt: the plan used and the prefix of it that actually ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionTrace {
    pub task: String,
    /// 1-indexed attempt number within its run.
    #[serde(default)]
    pub attempt: u32,
    pub plan: Plan,
    pub steps: Vec<StepRecord>,
    pub workspace: PathBuf,
    pub status: TraceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<String>,
}

impl ExecutionTrace {
    /// Build a finalized trace from the executed prefix of `plan`.
    ///
    /// The status is `success` when no executed step halted the plan. An empty plan has
    /// no halting step and is therefore `success` with zero executed steps.
    pub fn finalize(
        task: &str,
        attempt: u32,
        plan: Plan,
        steps: Vec<StepRecord>,
        workspace: &Path,
    ) -> Self {
        let status = if steps.iter().any(|record| record.result.status.halts()) {
            TraceStatus::Failure
        } else {
            TraceStatus::Success
        };
        Self {
            task: task.to_string(),
            attempt,
            plan,
            steps,
            workspace: workspace.to_path_buf(),
            status,
            recorded_at: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TraceStatus::Success
    }

    /// The step that halted the attempt, with its 0-based index in the plan.
    pub fn failing_step(&self) -> Option<(usize, &StepRecord)> {
        self.steps
            .iter()
            .enumerate()
            .find(|(_, record)| record.result.status.halts())
    }
}

/// A successful plan remembered for reuse under the task that triggered it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProceduralRule {
    pub trigger: String,
    pub action: Plan,
}

impl ProceduralRule {
    /// Whether this rule was recorded for `task` (case-insensitive, whitespace-trimmed).
    pub fn matches(&self, task: &str) -> bool {
        self.trigger.trim().to_lowercase() == task.trim().to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(step: Step, result: ExecutionResult) -> StepRecord {
        StepRecord { step, result }
    }

    #[test]
    fn empty_plan_is_success() {
        let trace = ExecutionTrace::finalize("noop", 1, Vec::new(), Vec::new(), Path::new("ws"));
        assert_eq!(trace.status, TraceStatus::Success);
        assert!(trace.steps.is_empty());
        assert!(trace.failing_step().is_none());
    }

    #[test]
    fn skipped_steps_do_not_fail_trace() {
        let steps = vec![
            record(
                Step::command("true"),
                ExecutionResult::from_output(String::new(), String::new(), Some(0)),
            ),
            record(
                Step::Unknown {
                    kind: "deploy".to_string(),
                    raw: serde_json::json!({"type": "deploy"}),
                },
                ExecutionResult::skipped("unknown step type: deploy"),
            ),
        ];
        let trace = ExecutionTrace::finalize("t", 1, Vec::new(), steps, Path::new("ws"));
        assert!(trace.is_success());
    }

    #[test]
    fn failing_step_reports_index() {
        let steps = vec![
            record(
                Step::write_file("a", "b"),
                ExecutionResult::message("File a written."),
            ),
            record(
                Step::command("false"),
                ExecutionResult::from_output(String::new(), String::new(), Some(1)),
            ),
        ];
        let trace = ExecutionTrace::finalize("t", 2, Vec::new(), steps, Path::new("ws"));
        assert_eq!(trace.status, TraceStatus::Failure);
        let (index, failing) = trace.failing_step().expect("failing step");
        assert_eq!(index, 1);
        assert_eq!(failing.step.kind(), "command");
    }

    #[test]
    fn rule_matching_ignores_case_and_whitespace() {
        let rule = ProceduralRule {
            trigger: "Build the site".to_string(),
            action: Vec::new(),
        };
        assert!(rule.matches("  build the SITE "));
        assert!(!rule.matches("build the docs"));
    }
}
