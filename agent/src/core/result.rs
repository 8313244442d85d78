//! Uniform result contract for executed steps.

use serde::{Deserialize, Serialize};

/// Outcome classification of one executed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// The step completed and met its own success criterion.
    Success,
    /// The step ran but did not meet its criterion (nonzero exit, timeout, closed input).
    Failure,
    /// The step could not run at all (launch failure, missing file).
    Error,
    /// The step kind was not recognized; recorded as a no-op.
    Skipped,
}

impl StepStatus {
    /// Whether this status stops the remaining steps of the attempt.
    ///
    /// `Skipped` is a recorded no-op and never halts a plan.
    pub fn halts(self) -> bool {
        matches!(self, StepStatus::Failure | StepStatus::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Success => "success",
            StepStatus::Failure => "failure",
            StepStatus::Error => "error",
            StepStatus::Skipped => "skipped",
        }
    }
}

/// Kind-specific payload, serialized flat next to `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultDetail {
    Output {
        stdout: String,
        stderr: String,
        returncode: Option<i32>,
    },
    Background {
        pid: u32,
    },
    Content {
        content: String,
    },
    Matches {
        matches: Vec<String>,
        count: usize,
    },
    Message {
        message: String,
    },
    Answer {
        answer: String,
    },
    Error {
        error: String,
    },
    Skipped {
        reason: String,
    },
}

/// Result of executing one [`Step`](crate::core::step::Step).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: StepStatus,
    #[serde(flatten)]
    pub detail: ResultDetail,
}

impl ExecutionResult {
    /// Foreground process output; `success` iff the exit code is zero.
    pub fn from_output(stdout: String, stderr: String, returncode: Option<i32>) -> Self {
        let status = if returncode == Some(0) {
            StepStatus::Success
        } else {
            StepStatus::Failure
        };
        Self {
            status,
            detail: ResultDetail::Output {
                stdout,
                stderr,
                returncode,
            },
        }
    }

    pub fn background(pid: u32) -> Self {
        Self::success(ResultDetail::Background { pid })
    }

    pub fn content(content: String) -> Self {
        Self::success(ResultDetail::Content { content })
    }

    pub fn matches(matches: Vec<String>, count: usize) -> Self {
        Self::success(ResultDetail::Matches { matches, count })
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self::success(ResultDetail::Message {
            message: message.into(),
        })
    }

    pub fn answer(answer: String) -> Self {
        Self::success(ResultDetail::Answer { answer })
    }

    /// The action ran but did not meet its criterion.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Failure,
            detail: ResultDetail::Error {
                error: error.into(),
            },
        }
    }

    /// The action could not run.
    pub fn error(error: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Error,
            detail: ResultDetail::Error {
                error: error.into(),
            },
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Skipped,
            detail: ResultDetail::Skipped {
                reason: reason.into(),
            },
        }
    }

    fn success(detail: ResultDetail) -> Self {
        Self {
            status: StepStatus::Success,
            detail,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }

    /// Most informative explanation of a non-success result.
    ///
    /// Preference: error text, then stderr, then skip reason, then stdout, then the
    /// exit code.
    pub fn explanation(&self) -> String {
        match &self.detail {
            ResultDetail::Error { error } => error.trim().to_string(),
            ResultDetail::Output {
                stdout,
                stderr,
                returncode,
            } => {
                if !stderr.trim().is_empty() {
                    stderr.trim().to_string()
                } else if !stdout.trim().is_empty() {
                    stdout.trim().to_string()
                } else {
                    match returncode {
                        Some(code) => format!("exited with status {code}"),
                        None => "terminated by signal".to_string(),
                    }
                }
            }
            ResultDetail::Skipped { reason } => reason.trim().to_string(),
            ResultDetail::Background { pid } => format!("started in background (pid {pid})"),
            ResultDetail::Content { .. } => "file read".to_string(),
            ResultDetail::Matches { count, .. } => format!("{count} matches"),
            ResultDetail::Message { message } => message.clone(),
            ResultDetail::Answer { answer } => answer.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nonzero_exit_is_failure_not_error() {
        let result = ExecutionResult::from_output(String::new(), "boom".to_string(), Some(2));
        assert_eq!(result.status, StepStatus::Failure);
        assert_eq!(result.explanation(), "boom");
    }

    #[test]
    fn serializes_flat_with_status() {
        let result = ExecutionResult::from_output("hi\n".to_string(), String::new(), Some(0));
        let value = serde_json::to_value(&result).expect("serialize");
        assert_eq!(
            value,
            json!({"status": "success", "stdout": "hi\n", "stderr": "", "returncode": 0})
        );
    }

    #[test]
    fn deserializes_each_payload_shape() {
        let cases = [
            (json!({"status": "success", "pid": 42}), ResultDetail::Background { pid: 42 }),
            (
                json!({"status": "success", "matches": ["a.txt:1: x"], "count": 3}),
                ResultDetail::Matches {
                    matches: vec!["a.txt:1: x".to_string()],
                    count: 3,
                },
            ),
            (
                json!({"status": "skipped", "reason": "unknown step type: deploy"}),
                ResultDetail::Skipped {
                    reason: "unknown step type: deploy".to_string(),
                },
            ),
        ];
        for (value, detail) in cases {
            let result: ExecutionResult = serde_json::from_value(value).expect("deserialize");
            assert_eq!(result.detail, detail);
        }
    }

    #[test]
    fn skipped_does_not_halt() {
        assert!(!StepStatus::Skipped.halts());
        assert!(!StepStatus::Success.halts());
        assert!(StepStatus::Failure.halts());
        assert!(StepStatus::Error.halts());
    }

    #[test]
    fn explanation_falls_back_to_exit_code() {
        let result = ExecutionResult::from_output(String::new(), "  ".to_string(), Some(1));
        assert_eq!(result.explanation(), "exited with status 1");
    }
}
