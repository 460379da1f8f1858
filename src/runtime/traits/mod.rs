// ABOUTME: Capability traits for the node's container runtime.
// ABOUTME: Defines TaskEngine, Task and RuntimeProcess plus shared types.

mod engine;
mod shared_types;
mod task;

pub use engine::{EngineError, TaskEngine, TaskMap};
pub use shared_types::*;
pub use task::{RuntimeProcess, Task};
