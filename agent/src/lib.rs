//! Autonomous task-execution agent.
//!
//! A task is turned into a plan of typed steps by a reasoning service, the steps are
//! executed in an isolated workspace, and failed attempts feed their trace back into
//! the next plan until an attempt succeeds or the attempt ceiling is reached.
//!
//! - **[`core`]**: Pure logic (step model, results, traces, feedback, plan extraction).
//!   No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (processes, filesystem, config, persistence,
//!   reasoning backends).
//!
//! Orchestration modules ([`planner`], [`coordinator`], [`reflector`], [`shell`])
//! coordinate core logic with I/O to implement the CLI.

pub mod coordinator;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod planner;
pub mod reflector;
pub mod shell;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
