//! Stable exit codes for agent CLI commands.

/// Command succeeded, including runs where the model planned no changes.
pub const OK: i32 = 0;
/// Command failed due to missing configuration, tracker/LLM/git errors or bad input.
pub const INVALID: i32 = 1;
