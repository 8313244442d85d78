//! Planner prompt builder.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use tracing::debug;

use crate::core::feedback::AttemptState;
use crate::core::step::Plan;
use crate::io::environment::EnvironmentContext;
use crate::io::reasoner::ReasoningRequest;

const INSTRUCTION: &str = include_str!("prompts/instruction.md");
const PLANNER_TEMPLATE: &str = include_str!("prompts/planner.md");

/// Inputs for one planning prompt.
#[derive(Debug, Clone)]
pub struct PromptInputs<'a> {
    pub task: &'a str,
    pub environment: &'a EnvironmentContext,
    pub attempt: &'a AttemptState,
    /// Plans that previously succeeded for the same task.
    pub known_plans: Vec<&'a Plan>,
}

/// Template engine wrapper around minijinja.
pub struct PromptBuilder {
    env: Environment<'static>,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptBuilder {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("planner", PLANNER_TEMPLATE)
            .expect("planner template should be valid");
        Self { env }
    }

    pub fn build(&self, input: &PromptInputs<'_>) -> Result<ReasoningRequest> {
        let known_plans = input
            .known_plans
            .iter()
            .map(|plan| serde_json::to_string(plan))
            .collect::<Result<Vec<_>, _>>()
            .context("serialize known plans")?;
        let template = self.env.get_template("planner")?;
        let prompt = template
            .render(context! {
                task => input.task.trim(),
                environment => input.environment.render().trim_end(),
                files => &input.environment.files,
                known_plans => known_plans,
                attempt => input.attempt.attempt,
                feedback => input
                    .attempt
                    .feedback
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty()),
            })
            .context("render planner prompt")?;
        debug!(
            attempt = input.attempt.attempt,
            bytes = prompt.len(),
            has_feedback = input.attempt.feedback.is_some(),
            "planner prompt rendered"
        );
        Ok(ReasoningRequest {
            instruction: INSTRUCTION.trim().to_string(),
            task: input.task.to_string(),
            prompt,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::step::Step;
    use crate::test_support::sample_environment;

    #[test]
    fn first_attempt_has_no_feedback_section() {
        let env = sample_environment("/tmp/ws");
        let attempt = AttemptState::first();
        let request = PromptBuilder::new()
            .build(&PromptInputs {
                task: "write hello world",
                environment: &env,
                attempt: &attempt,
                known_plans: Vec::new(),
            })
            .expect("build");
        assert!(request.prompt.starts_with("Task: write hello world"));
        assert!(request.prompt.contains("shell: bash"));
        assert!(request.prompt.contains("- main.py"));
        assert!(!request.prompt.contains("previous attempt failed"));
        assert!(request.instruction.contains("\"type\": \"verify\""));
    }

    #[test]
    fn later_attempt_includes_feedback_and_known_plans() {
        let env = sample_environment("/tmp/ws");
        let attempt = AttemptState {
            attempt: 2,
            feedback: Some("Step failed at step 1 (command): boom".to_string()),
        };
        let plan = vec![Step::command("make")];
        let request = PromptBuilder::new()
            .build(&PromptInputs {
                task: "build",
                environment: &env,
                attempt: &attempt,
                known_plans: vec![&plan],
            })
            .expect("build");
        assert!(request.prompt.contains("Attempt 2. The previous attempt failed:"));
        assert!(request.prompt.contains("boom"));
        assert!(request.prompt.contains(r#""command":"make""#));
    }
}
