//! Deterministic, pure logic shared by the agent.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and return deterministic outputs suitable for tests; the only side
//! effect allowed is emitting `tracing` events.

pub mod path;
pub mod plan;
pub mod remote;
pub mod types;
