//! Durable store for episodic traces and procedural rules.
//!
//! The whole document is rewritten on every append (temp file + rename), which keeps
//! the on-disk file consistent with memory after each mutation.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::trace::{ExecutionTrace, ProceduralRule};

/// On-disk shape: `{ "episodic": [...], "procedural": [...] }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct StoreDocument {
    episodic: Vec<ExecutionTrace>,
    procedural: Vec<ProceduralRule>,
}

/// Exclusive owner of the trace and rule collections.
#[derive(Debug)]
pub struct TraceStore {
    path: PathBuf,
    doc: StoreDocument,
}

impl TraceStore {
    /// Load the store at `path`. A missing file yields empty collections.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let doc = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("read trace store {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("parse trace store {}", path.display()))?
        } else {
            StoreDocument::default()
        };
        debug!(
            path = %path.display(),
            traces = doc.episodic.len(),
            rules = doc.procedural.len(),
            "trace store loaded"
        );
        Ok(Self { path, doc })
    }

    /// Traces in chronological (insertion) order.
    pub fn traces(&self) -> &[ExecutionTrace] {
        &self.doc.episodic
    }

    pub fn rules(&self) -> &[ProceduralRule] {
        &self.doc.procedural
    }

    /// Rules recorded for `task`, oldest first.
    pub fn rules_for<'a>(&'a self, task: &'a str) -> impl Iterator<Item = &'a ProceduralRule> {
        self.doc.procedural.iter().filter(move |rule| rule.matches(task))
    }

    pub fn append_trace(&mut self, trace: ExecutionTrace) -> Result<()> {
        self.doc.episodic.push(trace);
        self.save()
    }

    pub fn append_rule(&mut self, rule: ProceduralRule) -> Result<()> {
        self.doc.procedural.push(rule);
        self.save()
    }

    fn save(&self) -> Result<()> {
        debug!(
            path = %self.path.display(),
            traces = self.doc.episodic.len(),
            rules = self.doc.procedural.len(),
            "writing trace store"
        );
        let mut buf = serde_json::to_string_pretty(&self.doc).context("serialize trace store")?;
        buf.push('\n');
        write_atomic(&self.path, &buf)
    }
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp trace store {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("replace trace store {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::result::ExecutionResult;
    use crate::core::step::Step;
    use crate::core::trace::{StepRecord, TraceStatus};

    fn sample_trace(task: &str) -> ExecutionTrace {
        let step = Step::command("echo hi");
        ExecutionTrace::finalize(
            task,
            1,
            vec![step.clone()],
            vec![StepRecord {
                step,
                result: ExecutionResult::from_output("hi\n".to_string(), String::new(), Some(0)),
            }],
            Path::new("projects/ws"),
        )
    }

    #[test]
    fn missing_file_starts_empty() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = TraceStore::load(temp.path().join("memory.json")).expect("load");
        assert!(store.traces().is_empty());
        assert!(store.rules().is_empty());
    }

    #[test]
    fn appends_persist_across_reload() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("state/memory.json");
        let mut store = TraceStore::load(&path).expect("load");
        store.append_trace(sample_trace("first")).expect("append trace");
        store.append_trace(sample_trace("second")).expect("append trace");
        store
            .append_rule(ProceduralRule {
                trigger: "first".to_string(),
                action: vec![Step::command("echo hi")],
            })
            .expect("append rule");

        let reloaded = TraceStore::load(&path).expect("reload");
        let tasks: Vec<&str> = reloaded.traces().iter().map(|t| t.task.as_str()).collect();
        assert_eq!(tasks, vec!["first", "second"]);
        assert_eq!(reloaded.traces()[0].status, TraceStatus::Success);
        assert_eq!(reloaded.rules().len(), 1);
        assert_eq!(reloaded.rules_for("FIRST").count(), 1);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn document_has_two_top_level_keys() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("memory.json");
        let mut store = TraceStore::load(&path).expect("load");
        store.append_trace(sample_trace("task")).expect("append");

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("json");
        let keys: Vec<&String> = value.as_object().expect("object").keys().collect();
        assert_eq!(keys, vec!["episodic", "procedural"]);
        assert_eq!(value["episodic"][0]["steps"][0]["result"]["stdout"], "hi\n");
    }

    #[test]
    fn loads_documents_with_missing_keys() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("memory.json");
        fs::write(&path, "{\"procedural\": []}").expect("write");
        let store = TraceStore::load(&path).expect("load");
        assert!(store.traces().is_empty());
    }
}
