//! Structured plan extraction from free-form reasoning output.
//!
//! Candidates are tried in order of preference:
//!
//! 1. a fenced block tagged `json`,
//! 2. the first bracket-delimited list in the raw response,
//! 3. the whole response.
//!
//! Each candidate must parse as JSON and conform to `schemas/plan.schema.json`.

use std::fmt;
use std::sync::LazyLock;

use jsonschema::Validator;
use regex::Regex;
use serde_json::Value;

use crate::core::step::{Plan, Step};

const PLAN_SCHEMA: &str = include_str!("../../schemas/plan.schema.json");

static FENCED_JSON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```json\s*(.*?)\s*```").unwrap());
static BRACKET_LIST_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\[.*\]").unwrap());
static PLAN_VALIDATOR: LazyLock<Validator> = LazyLock::new(|| {
    let schema: Value = serde_json::from_str(PLAN_SCHEMA).expect("plan schema should be JSON");
    jsonschema::validator_for(&schema).expect("plan schema should compile")
});

/// Where in the response a plan was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanSource {
    FencedBlock,
    BracketList,
    WholeResponse,
}

impl PlanSource {
    fn as_str(self) -> &'static str {
        match self {
            PlanSource::FencedBlock => "fenced block",
            PlanSource::BracketList => "bracket list",
            PlanSource::WholeResponse => "whole response",
        }
    }
}

/// Every candidate failed; one reason per candidate tried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    pub reasons: Vec<String>,
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no parseable plan: {}", self.reasons.join("; "))
    }
}

impl std::error::Error for ParseFailure {}

/// Extract an ordered plan from `response`.
pub fn extract_plan(response: &str) -> Result<(Plan, PlanSource), ParseFailure> {
    let mut candidates = Vec::new();
    if let Some(caps) = FENCED_JSON_RE.captures(response)
        && let Some(body) = caps.get(1)
    {
        candidates.push((PlanSource::FencedBlock, body.as_str()));
    }
    if let Some(m) = BRACKET_LIST_RE.find(response) {
        candidates.push((PlanSource::BracketList, m.as_str()));
    }
    candidates.push((PlanSource::WholeResponse, response.trim()));

    let mut reasons = Vec::new();
    for (source, candidate) in candidates {
        match parse_candidate(candidate) {
            Ok(plan) => return Ok((plan, source)),
            Err(reason) => reasons.push(format!("{}: {}", source.as_str(), reason)),
        }
    }
    Err(ParseFailure { reasons })
}

fn parse_candidate(candidate: &str) -> Result<Plan, String> {
    let value: Value = serde_json::from_str(candidate).map_err(|err| err.to_string())?;
    let messages: Vec<String> = PLAN_VALIDATOR
        .iter_errors(&value)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(format!("schema validation failed: {}", messages.join(", ")));
    }
    let Value::Array(items) = value else {
        return Err("plan must be a JSON array".to_string());
    };
    items
        .into_iter()
        .map(|item| Step::try_from(item).map_err(|err| err.to_string()))
        .collect()
}
