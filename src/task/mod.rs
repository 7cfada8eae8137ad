// src/task/mod.rs

//! Tasks: the handle exposed to actions, the state table, and conditions.

pub mod condition;
pub mod state;
#[allow(clippy::module_inception)]
pub mod task;

pub use condition::Condition;
pub use state::{Action, TaskState};
pub use task::{action, Task, TaskCallback, TaskFn, UNNAMED};
