//! Planner adapter: one reasoning call per attempt, reduced to a [`Plan`].

use tracing::{info, instrument, warn};

use crate::core::extract::extract_plan;
use crate::core::feedback::AttemptState;
use crate::core::step::{Plan, Step};
use crate::core::trace::ProceduralRule;
use crate::io::environment::EnvironmentContext;
use crate::io::prompt::{PromptBuilder, PromptInputs};
use crate::io::reasoner::{Reasoner, ReasoningRequest};

/// Single-step plan used whenever no plan can be obtained.
///
/// Running it fails with the message on stderr, so a planning failure becomes an
/// ordinary step failure that the next attempt is told about.
pub fn fallback_plan(task: &str) -> Plan {
    let escaped = task.replace('\'', "'\\''");
    vec![Step::command(format!(
        "echo 'Could not parse plan for: {escaped}' >&2; exit 1"
    ))]
}

/// Turns (task, environment, attempt state) into a plan via a [`Reasoner`].
pub struct Planner<R: Reasoner> {
    reasoner: R,
    prompts: PromptBuilder,
}

impl<R: Reasoner> Planner<R> {
    pub fn new(reasoner: R) -> Self {
        Self {
            reasoner,
            prompts: PromptBuilder::new(),
        }
    }

    pub fn reasoner(&self) -> &R {
        &self.reasoner
    }

    /// Produce a plan. Never fails: prompt, backend and parse problems all yield
    /// [`fallback_plan`].
    #[instrument(skip_all, fields(attempt = attempt.attempt))]
    pub fn create_plan(
        &self,
        task: &str,
        environment: &EnvironmentContext,
        attempt: &AttemptState,
        rules: &[&ProceduralRule],
    ) -> Plan {
        let inputs = PromptInputs {
            task,
            environment,
            attempt,
            known_plans: rules.iter().map(|rule| &rule.action).collect(),
        };
        let request = match self.prompts.build(&inputs) {
            Ok(request) => request,
            Err(err) => {
                warn!(err = %format!("{err:#}"), "failed to build planner prompt");
                return fallback_plan(task);
            }
        };
        self.plan_from(&request)
    }

    fn plan_from(&self, request: &ReasoningRequest) -> Plan {
        let response = match self.reasoner.generate(request) {
            Ok(response) => response,
            Err(err) => {
                warn!(err = %format!("{err:#}"), "reasoning call failed; using fallback plan");
                return fallback_plan(&request.task);
            }
        };
        match extract_plan(&response) {
            Ok((plan, source)) => {
                info!(steps = plan.len(), source = ?source, "plan extracted");
                plan
            }
            Err(err) => {
                warn!(%err, response = %response, "failed to parse plan; using fallback plan");
                fallback_plan(&request.task)
            }
        }
    }
}
