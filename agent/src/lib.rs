//! Issue-to-pull-request coding agent.
//!
//! The agent reads an issue, asks a language model for a plan of full-file
//! edits, applies it to a working copy, pushes a branch and opens a pull
//! request. A second command reviews pull requests. The architecture keeps a
//! strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (plan extraction and repair, path
//!   safety, remote URLs). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (filesystem, git, HTTP, config).
//!   Isolated behind traits to enable fakes in tests.
//! - **[`agents`]**: Prompting and plan production on top of a chat client.
//!
//! Orchestration modules ([`code`], [`review`], [`parse`]) coordinate core
//! logic with I/O to implement CLI commands.

pub mod agents;
pub mod code;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod parse;
pub mod review;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
