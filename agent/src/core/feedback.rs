//! Attempt state carried from one planning cycle into the next.

use crate::core::result::ResultDetail;
use crate::core::step::Step;
use crate::core::trace::ExecutionTrace;

/// Immutable input to one planning call.
///
/// Attempt 1 carries no feedback; every later attempt carries the summary of the
/// previous attempt's failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptState {
    pub attempt: u32,
    pub feedback: Option<String>,
}

impl AttemptState {
    pub fn first() -> Self {
        Self {
            attempt: 1,
            feedback: None,
        }
    }

    /// State for the attempt following `trace`.
    pub fn after(trace: &ExecutionTrace) -> Self {
        Self {
            attempt: trace.attempt + 1,
            feedback: build_feedback(trace),
        }
    }
}

/// Summarize why `trace` failed, for the next planning call.
///
/// Returns `None` for successful traces. Failed `verify` steps are labeled as
/// verification failures. Answers collected from `ask_user` steps are appended so the
/// next plan can use them.
pub fn build_feedback(trace: &ExecutionTrace) -> Option<String> {
    let (index, record) = trace.failing_step()?;
    let label = match record.step {
        Step::Verify { .. } => "Verification failed",
        _ => "Step failed",
    };
    let mut buf = format!(
        "Attempt {} failed. {} at step {} ({}): {} [{}]\n{}",
        trace.attempt,
        label,
        index + 1,
        record.step.kind(),
        record.step.describe(),
        record.result.status.as_str(),
        record.result.explanation(),
    );

    let answers: Vec<String> = trace
        .steps
        .iter()
        .filter_map(|record| match (&record.step, &record.result.detail) {
            (Step::AskUser { question }, ResultDetail::Answer { answer }) => {
                Some(format!("- {question} => {answer}"))
            }
            _ => None,
        })
        .collect();
    if !answers.is_empty() {
        buf.push_str("\n\nUser answers so far:\n");
        buf.push_str(&answers.join("\n"));
    }
    Some(buf)
}
