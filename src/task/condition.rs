// src/task/condition.rs

use std::cell::RefCell;

use tracing::trace;

use crate::task::Task;
use crate::types::TaskId;

/// Condition variable over tasks.
///
/// A waiting task holds one extra permit until the next [`Condition::notify`].
#[derive(Debug, Default)]
pub struct Condition {
    waiters: RefCell<Vec<Task>>,
}

impl Condition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block `task` until the next `notify`. Waiting twice is a no-op.
    pub fn wait(&self, task: &Task) {
        if self.waiters.borrow().contains(task) {
            trace!(task = %task.id(), "already waiting on condition");
            return;
        }
        self.waiters.borrow_mut().push(task.clone());
        task.block(1);
        trace!(task = %task.id(), name = %task.name(), "waiting on condition");
    }

    /// Release every waiting task, in the order they started waiting.
    ///
    /// Returns how many tasks were released.
    pub fn notify(&self) -> usize {
        let waiters = std::mem::take(&mut *self.waiters.borrow_mut());
        for task in &waiters {
            trace!(task = %task.id(), "condition notified");
            task.unblock(1);
        }
        waiters.len()
    }

    pub fn is_waiting(&self, id: TaskId) -> bool {
        self.waiters.borrow().iter().any(|task| task.id() == id)
    }

    pub fn waiter_count(&self) -> usize {
        self.waiters.borrow().len()
    }
}
