//! I/O helpers for the agent: processes, filesystem, persistence and backends.

pub mod config;
pub mod environment;
pub mod executor;
pub mod process;
pub mod prompt;
pub mod reasoner;
pub mod search;
pub mod trace_store;
pub mod workspace;
