//! Typed plan steps.
//!
//! Steps arrive as loosely structured JSON objects tagged by a `type` field. They are
//! converted into a closed [`Step`] enum once, at the planner boundary, so the executor
//! dispatches with an exhaustive match. Unrecognized kinds survive as [`Step::Unknown`]
//! so they can be recorded as `skipped` instead of rejected.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Ordered sequence of steps for one attempt. Order is execution order.
pub type Plan = Vec<Step>;

/// One unit of OS interaction produced by the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum Step {
    /// Run a shell command. `background` starts it detached and returns immediately.
    Command { command: String, background: bool },
    WriteFile { filename: String, content: String },
    ReadFile { filename: String },
    /// Literal substring search; `path` is relative to the working directory.
    SearchFiles {
        pattern: String,
        path: Option<String>,
    },
    /// Same execution as `Command`, but acts as the success gate for the plan.
    Verify { command: String },
    AskUser { question: String },
    /// Any `type` the agent does not understand. The raw object is kept for traces.
    Unknown { kind: String, raw: Value },
}

impl Step {
    /// Wire name of the step's `type` field.
    pub fn kind(&self) -> &str {
        match self {
            Step::Command { .. } => "command",
            Step::WriteFile { .. } => "write_file",
            Step::ReadFile { .. } => "read_file",
            Step::SearchFiles { .. } => "search_files",
            Step::Verify { .. } => "verify",
            Step::AskUser { .. } => "ask_user",
            Step::Unknown { kind, .. } => kind,
        }
    }

    pub fn command(command: impl Into<String>) -> Self {
        Step::Command {
            command: command.into(),
            background: false,
        }
    }

    pub fn background(command: impl Into<String>) -> Self {
        Step::Command {
            command: command.into(),
            background: true,
        }
    }

    pub fn write_file(filename: impl Into<String>, content: impl Into<String>) -> Self {
        Step::WriteFile {
            filename: filename.into(),
            content: content.into(),
        }
    }

    pub fn read_file(filename: impl Into<String>) -> Self {
        Step::ReadFile {
            filename: filename.into(),
        }
    }

    pub fn verify(command: impl Into<String>) -> Self {
        Step::Verify {
            command: command.into(),
        }
    }

    /// Short human-readable description used in logs and feedback.
    pub fn describe(&self) -> String {
        match self {
            Step::Command {
                command,
                background: true,
            } => format!("command (background) `{command}`"),
            Step::Command { command, .. } => format!("command `{command}`"),
            Step::WriteFile { filename, .. } => format!("write_file {filename}"),
            Step::ReadFile { filename } => format!("read_file {filename}"),
            Step::SearchFiles { pattern, path } => match path {
                Some(path) => format!("search_files {pattern:?} in {path}"),
                None => format!("search_files {pattern:?}"),
            },
            Step::Verify { command } => format!("verify `{command}`"),
            Step::AskUser { question } => format!("ask_user {question:?}"),
            Step::Unknown { kind, .. } => format!("unknown step type {kind}"),
        }
    }
}

/// Reason a JSON value could not be converted into a [`Step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepParseError {
    NotAnObject,
    MissingType,
    MissingField { kind: String, field: &'static str },
    InvalidField { kind: String, field: &'static str },
}

impl fmt::Display for StepParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepParseError::NotAnObject => write!(f, "step must be a JSON object"),
            StepParseError::MissingType => write!(f, "step is missing a string `type` field"),
            StepParseError::MissingField { kind, field } => {
                write!(f, "{kind} step is missing required field `{field}`")
            }
            StepParseError::InvalidField { kind, field } => {
                write!(f, "{kind} step has invalid field `{field}`")
            }
        }
    }
}

impl std::error::Error for StepParseError {}

impl TryFrom<Value> for Step {
    type Error = StepParseError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Object(obj) = value else {
            return Err(StepParseError::NotAnObject);
        };
        let kind = obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or(StepParseError::MissingType)?
            .to_string();

        let fields = Fields { kind: &kind, obj: &obj };
        let step = match kind.as_str() {
            "command" => Step::Command {
                command: fields.required_str("command")?,
                background: fields.optional_bool("background")?.unwrap_or(false),
            },
            "write_file" => Step::WriteFile {
                filename: fields.required_str("filename")?,
                content: fields.required_str("content")?,
            },
            "read_file" => Step::ReadFile {
                filename: fields.required_str("filename")?,
            },
            "search_files" => Step::SearchFiles {
                pattern: fields.required_str("pattern")?,
                path: fields.optional_str("path")?,
            },
            "verify" => Step::Verify {
                command: fields.required_str("command")?,
            },
            "ask_user" => Step::AskUser {
                question: fields.required_str("question")?,
            },
            _ => Step::Unknown {
                kind: kind.clone(),
                raw: Value::Object(obj.clone()),
            },
        };
        Ok(step)
    }
}

impl From<Step> for Value {
    fn from(step: Step) -> Self {
        match step {
            Step::Command {
                command,
                background: false,
            } => json!({"type": "command", "command": command}),
            Step::Command {
                command,
                background: true,
            } => json!({"type": "command", "command": command, "background": true}),
            Step::WriteFile { filename, content } => {
                json!({"type": "write_file", "filename": filename, "content": content})
            }
            Step::ReadFile { filename } => json!({"type": "read_file", "filename": filename}),
            Step::SearchFiles {
                pattern,
                path: Some(path),
            } => json!({"type": "search_files", "pattern": pattern, "path": path}),
            Step::SearchFiles { pattern, path: None } => {
                json!({"type": "search_files", "pattern": pattern})
            }
            Step::Verify { command } => json!({"type": "verify", "command": command}),
            Step::AskUser { question } => json!({"type": "ask_user", "question": question}),
            Step::Unknown { raw, .. } => raw,
        }
    }
}

struct Fields<'a> {
    kind: &'a str,
    obj: &'a Map<String, Value>,
}

impl Fields<'_> {
    fn required_str(&self, field: &'static str) -> Result<String, StepParseError> {
        self.optional_str(field)?
            .ok_or_else(|| StepParseError::MissingField {
                kind: self.kind.to_string(),
                field,
            })
    }

    fn optional_str(&self, field: &'static str) -> Result<Option<String>, StepParseError> {
        match self.obj.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(self.invalid(field)),
        }
    }

    fn optional_bool(&self, field: &'static str) -> Result<Option<bool>, StepParseError> {
        match self.obj.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(_) => Err(self.invalid(field)),
        }
    }

    fn invalid(&self, field: &'static str) -> StepParseError {
        StepParseError::InvalidField {
            kind: self.kind.to_string(),
            field,
        }
    }
}
