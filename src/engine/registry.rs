// src/engine/registry.rs

//! Per-type FIFO queues of root tasks.
//!
//! Semantics:
//! - The *existence* of a queue for a type means "a task of this type is
//!   active". The head of the queue is that task; the rest are parked in
//!   submission order.
//! - Queues are deleted, never left empty, once they drain.

use std::collections::{BTreeMap, HashMap, VecDeque};

use thiserror::Error;
use tracing::debug;

use crate::task::Task;
use crate::types::{TaskId, TaskType};

/// Inconsistency detected when a root task finishes.
///
/// These can only happen when a task is driven outside its own lifecycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueViolation {
    #[error("task queue missing for type '{task_type}' (task {task})")]
    Missing { task_type: TaskType, task: TaskId },

    #[error("task queue empty for type '{task_type}' (task {task})")]
    Empty { task_type: TaskType, task: TaskId },

    #[error("task {task} is not first in queue for type '{task_type}' (head is {head})")]
    NotHead {
        task_type: TaskType,
        task: TaskId,
        head: TaskId,
    },
}

#[derive(Debug, Default)]
pub struct TypeQueueRegistry {
    queues: HashMap<TaskType, VecDeque<Task>>,
}

impl TypeQueueRegistry {
    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    /// Number of types with an active task.
    pub fn type_count(&self) -> usize {
        self.queues.len()
    }

    /// Queue length for `task_type`, head included.
    pub fn len(&self, task_type: &TaskType) -> usize {
        self.queues.get(task_type).map_or(0, VecDeque::len)
    }

    /// Append a root task to its type's queue.
    ///
    /// Returns `true` if the queue did not exist, i.e. the task is now the
    /// head and must be started by the caller.
    pub fn enqueue(&mut self, task: Task) -> bool {
        let task_type = task.task_type().clone();
        match self.queues.get_mut(&task_type) {
            Some(queue) => {
                queue.push_back(task);
                false
            }
            None => {
                self.queues.insert(task_type, VecDeque::from([task]));
                true
            }
        }
    }

    /// Remove a finished root from the head of its queue.
    ///
    /// Returns the next task of that type, which the caller must start, or
    /// `None` if the queue drained (and was deleted).
    pub fn complete(&mut self, task: &Task) -> Result<Option<Task>, QueueViolation> {
        let task_type = task.task_type();
        let Some(queue) = self.queues.get_mut(task_type) else {
            return Err(QueueViolation::Missing {
                task_type: task_type.clone(),
                task: task.id(),
            });
        };

        match queue.front() {
            None => {
                return Err(QueueViolation::Empty {
                    task_type: task_type.clone(),
                    task: task.id(),
                });
            }
            Some(head) if head != task => {
                return Err(QueueViolation::NotHead {
                    task_type: task_type.clone(),
                    task: task.id(),
                    head: head.id(),
                });
            }
            Some(_) => {}
        }

        queue.pop_front();
        if let Some(next) = queue.front().cloned() {
            return Ok(Some(next));
        }

        self.queues.remove(task_type);
        debug!(%task_type, "type queue drained");
        Ok(None)
    }

    /// Whether `task` is waiting in a queue behind another task.
    pub fn is_parked(&self, task: &Task) -> bool {
        self.queues
            .get(task.task_type())
            .is_some_and(|queue| queue.iter().skip(1).any(|t| t == task))
    }

    /// Remove a parked (not head) task from its queue.
    pub fn remove_parked(&mut self, task: &Task) -> bool {
        let Some(queue) = self.queues.get_mut(task.task_type()) else {
            return false;
        };
        match queue.iter().skip(1).position(|t| t == task) {
            Some(pos) => {
                queue.remove(pos + 1);
                true
            }
            None => false,
        }
    }

    /// Keep only the head of `task_type`'s queue; return the dropped tasks.
    pub fn truncate(&mut self, task_type: &TaskType) -> Vec<Task> {
        match self.queues.get_mut(task_type) {
            Some(queue) if queue.len() > 1 => queue.drain(1..).collect(),
            _ => Vec::new(),
        }
    }

    /// Ids per type, in queue order.
    pub fn snapshot(&self) -> BTreeMap<TaskType, Vec<TaskId>> {
        self.queues
            .iter()
            .map(|(task_type, queue)| (task_type.clone(), queue.iter().map(Task::id).collect()))
            .collect()
    }
}
