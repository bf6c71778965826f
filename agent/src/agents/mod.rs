//! Model-backed agents: plan producers, the code agent and the reviewer.

pub mod code;
pub mod planner;
pub mod reviewer;
