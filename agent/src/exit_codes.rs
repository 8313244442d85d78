//! Stable exit codes for the agent CLI.

/// Task succeeded, or the interactive shell exited normally.
pub const OK: i32 = 0;
/// Infrastructure failure: invalid config, unwritable workspace or trace store.
pub const INVALID: i32 = 1;
/// Every attempt up to `max_attempts` failed.
pub const EXHAUSTED: i32 = 2;
