//! Test-only helpers: scripted backends and deterministic fixtures.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};

use crate::core::step::Plan;
use crate::io::environment::EnvironmentContext;
use crate::io::executor::Prompter;
use crate::io::reasoner::{Reasoner, ReasoningRequest};

/// Reasoner that replays queued responses and records every request it sees.
///
/// `Err(message)` entries simulate backend failures. Once the queue is drained every
/// further call fails.
#[derive(Debug, Default)]
pub struct ScriptedReasoner {
    responses: RefCell<VecDeque<std::result::Result<String, String>>>,
    requests: RefCell<Vec<ReasoningRequest>>,
}

impl ScriptedReasoner {
    pub fn new(responses: Vec<std::result::Result<String, String>>) -> Self {
        Self {
            responses: RefCell::new(responses.into()),
            requests: RefCell::new(Vec::new()),
        }
    }

    /// Requests received so far, in call order.
    pub fn requests(&self) -> Vec<ReasoningRequest> {
        self.requests.borrow().clone()
    }
}

impl Reasoner for ScriptedReasoner {
    fn generate(&self, request: &ReasoningRequest) -> Result<String> {
        self.requests.borrow_mut().push(request.clone());
        match self.responses.borrow_mut().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("scripted reasoner has no responses left")),
        }
    }
}

/// Prompter that replays queued answers; `None` simulates a closed input channel.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: RefCell<VecDeque<Option<String>>>,
    questions: RefCell<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn new(answers: Vec<Option<String>>) -> Self {
        Self {
            answers: RefCell::new(answers.into()),
            questions: RefCell::new(Vec::new()),
        }
    }

    /// Questions asked so far, in call order.
    pub fn questions(&self) -> Vec<String> {
        self.questions.borrow().clone()
    }
}

impl Prompter for ScriptedPrompter {
    fn ask(&self, question: &str) -> io::Result<Option<String>> {
        self.questions.borrow_mut().push(question.to_string());
        Ok(self.answers.borrow_mut().pop_front().flatten())
    }
}

/// Serialize `plan` as a bare JSON list, the way a reasoning service would answer.
pub fn plan_response(plan: &Plan) -> std::result::Result<String, String> {
    serde_json::to_string(plan).map_err(|err| err.to_string())
}

/// Create a deterministic environment snapshot rooted at `cwd`.
pub fn sample_environment(cwd: impl AsRef<Path>) -> EnvironmentContext {
    EnvironmentContext {
        os: "Linux".to_string(),
        shell: "bash".to_string(),
        tools: BTreeMap::from([("git".to_string(), PathBuf::from("/usr/bin/git"))]),
        files: vec!["main.py".to_string()],
        cwd: cwd.as_ref().to_path_buf(),
    }
}
