//! Derives procedural rules from finished traces.

use anyhow::Result;
use tracing::{debug, info};

use crate::core::trace::{ExecutionTrace, ProceduralRule};
use crate::io::trace_store::TraceStore;

/// Rule for a successful trace; `None` otherwise.
pub fn derive_rule(trace: &ExecutionTrace) -> Option<ProceduralRule> {
    trace.is_success().then(|| ProceduralRule {
        trigger: trace.task.clone(),
        action: trace.plan.clone(),
    })
}

/// Append the rule derived from `trace`, if any, to the store.
pub fn reflect(trace: &ExecutionTrace, store: &mut TraceStore) -> Result<Option<ProceduralRule>> {
    let Some(rule) = derive_rule(trace) else {
        debug!(status = ?trace.status, "no rule derived from trace");
        return Ok(None);
    };
    info!(trigger = %rule.trigger, steps = rule.action.len(), "recording procedural rule");
    store.append_rule(rule.clone())?;
    Ok(Some(rule))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::result::ExecutionResult;
    use crate::core::step::Step;
    use crate::core::trace::StepRecord;
    use std::path::Path;

    fn trace(result: ExecutionResult) -> ExecutionTrace {
        let step = Step::command("make");
        ExecutionTrace::finalize(
            "build",
            1,
            vec![step.clone()],
            vec![StepRecord { step, result }],
            Path::new("ws"),
        )
    }

    #[test]
    fn success_appends_rule() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut store = TraceStore::load(temp.path().join("memory.json")).expect("load");
        let ok = trace(ExecutionResult::from_output(String::new(), String::new(), Some(0)));

        let rule = reflect(&ok, &mut store).expect("reflect").expect("rule");
        assert_eq!(rule.trigger, "build");
        assert_eq!(rule.action, vec![Step::command("make")]);
        assert_eq!(store.rules(), &[rule]);
    }

    #[test]
    fn failure_leaves_rules_unchanged() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("memory.json");
        let mut store = TraceStore::load(&path).expect("load");
        let failed = trace(ExecutionResult::from_output(String::new(), String::new(), Some(1)));

        assert_eq!(reflect(&failed, &mut store).expect("reflect"), None);
        assert!(store.rules().is_empty());
        assert!(!path.exists(), "no-op reflection must not write the store");
    }
}
