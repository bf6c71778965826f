//! I/O helpers for agent commands.

pub mod apply;
pub mod config;
pub mod git;
pub mod github;
pub mod http;
pub mod llm;
pub mod process;
pub mod prompt;
pub mod repo_context;
pub mod workspace;
