// src/engine/scheduler.rs

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::time::Instant;

use tracing::debug;

use crate::config::SchedulerConfig;
use crate::engine::registry::TypeQueueRegistry;
use crate::host::Host;
use crate::task::condition::Condition;
use crate::task::state::{Action, TaskState};
use crate::task::task::{NewTask, Task, TaskCallback, TaskFn, UNNAMED};
use crate::types::{TaskId, TaskType};

/// Options for launching a root task with [`Scheduler::start`].
pub struct StartOptions {
    task_type: TaskType,
    run: TaskFn,
    name: Option<String>,
    success: Option<TaskCallback>,
    failure: Option<TaskCallback>,
}

impl StartOptions {
    pub fn new<F>(task_type: impl Into<TaskType>, run: F) -> Self
    where
        F: Fn(&Task) -> anyhow::Result<()> + 'static,
    {
        Self::from_action(task_type.into(), Rc::new(run))
    }

    pub fn from_action(task_type: TaskType, run: TaskFn) -> Self {
        Self {
            task_type,
            run,
            name: None,
            success: None,
            failure: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Called once when the root completes without error.
    pub fn on_success<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Task) + 'static,
    {
        self.success = Some(Rc::new(callback));
        self
    }

    /// Called once when the operation fails. Receives the task that failed.
    pub fn on_failure<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Task) + 'static,
    {
        self.failure = Some(Rc::new(callback));
        self
    }
}

impl fmt::Debug for StartOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartOptions")
            .field("task_type", &self.task_type)
            .field("name", &self.name)
            .field("success", &self.success.is_some())
            .field("failure", &self.failure.is_some())
            .finish_non_exhaustive()
    }
}

/// Read-only view of a live task, for debugging tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub name: String,
    pub task_type: TaskType,
    pub state: TaskState,
    pub blocks: u32,
    pub pending_subtasks: usize,
    pub root: bool,
}

/// State owned by one scheduler instance.
pub(crate) struct Shared {
    pub(crate) config: SchedulerConfig,
    pub(crate) host: Rc<dyn Host>,
    /// Every live task, by id. This table keeps suspended tasks alive.
    pub(crate) tasks: RefCell<BTreeMap<TaskId, Task>>,
    pub(crate) registry: RefCell<TypeQueueRegistry>,
    next_id: Cell<u64>,
}

/// Cooperative scheduler for trees of tasks.
///
/// Owns the table of live tasks, the per-type FIFO queues of root tasks and
/// the id counter. Cloning yields another handle to the same scheduler;
/// independent instances share nothing.
#[derive(Clone)]
pub struct Scheduler {
    shared: Rc<Shared>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, host: Rc<dyn Host>) -> Self {
        let shared = Shared {
            config,
            host,
            tasks: RefCell::new(BTreeMap::new()),
            registry: RefCell::new(TypeQueueRegistry::default()),
            next_id: Cell::new(TaskId::FIRST),
        };
        Self {
            shared: Rc::new(shared),
        }
    }

    pub(crate) fn from_shared(shared: Rc<Shared>) -> Self {
        Self { shared }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    pub fn host(&self) -> &Rc<dyn Host> {
        &self.shared.host
    }

    pub(crate) fn shared(&self) -> &Shared {
        &self.shared
    }

    pub(crate) fn now(&self) -> Instant {
        self.shared.host.now()
    }

    /// Launch a root task, or park it behind the running task of its type.
    ///
    /// The task's action never runs inside this call: a task that can start
    /// right away is started from a deferred host callback.
    pub fn start(&self, options: StartOptions) -> Task {
        let task = self.create_task(NewTask {
            name: options.name.unwrap_or_else(|| UNNAMED.to_string()),
            parent: None,
            task_type: options.task_type,
            run: options.run,
            success: options.success,
            failure: options.failure,
        });

        let is_head = self.shared.registry.borrow_mut().enqueue(task.clone());
        if is_head {
            self.launch(&task);
        } else {
            debug!(
                task = %task.id(),
                name = %task.name(),
                task_type = %task.task_type(),
                "type busy; task parked"
            );
        }
        task
    }

    /// Drop every not-yet-started task of `task_type`, keeping only the one
    /// currently running. Returns how many tasks were dropped.
    ///
    /// Dropped tasks never run and fire no callbacks.
    pub fn cancel(&self, task_type: impl Into<TaskType>) -> usize {
        let task_type = task_type.into();
        let dropped = self.shared.registry.borrow_mut().truncate(&task_type);

        for task in &dropped {
            task.apply(Action::Cancel);
            task.cell.finished.set(true);
            self.forget(task);
        }

        if !dropped.is_empty() {
            debug!(%task_type, dropped = dropped.len(), "cancelled queued tasks");
        }
        dropped.len()
    }

    /// A condition variable for tasks of this scheduler.
    pub fn create_condition(&self) -> Condition {
        Condition::new()
    }

    /// Number of live (not yet finished) tasks.
    pub fn task_count(&self) -> usize {
        self.shared.tasks.borrow().len()
    }

    /// Look up a live task by id.
    pub fn task(&self, id: TaskId) -> Option<Task> {
        self.shared.tasks.borrow().get(&id).cloned()
    }

    /// Snapshot of every live task, ordered by id.
    pub fn tasks(&self) -> Vec<TaskSnapshot> {
        self.shared
            .tasks
            .borrow()
            .values()
            .map(|task| TaskSnapshot {
                id: task.id(),
                name: task.name().to_string(),
                task_type: task.task_type().clone(),
                state: task.state(),
                blocks: task.blocks(),
                pending_subtasks: task.pending_subtasks(),
                root: task.is_root(),
            })
            .collect()
    }

    /// Snapshot of every type queue: running task first, then parked ones.
    pub fn queues(&self) -> BTreeMap<TaskType, Vec<TaskId>> {
        self.shared.registry.borrow().snapshot()
    }

    /// Length of the queue for `task_type`, running task included.
    pub fn queue_len(&self, task_type: &TaskType) -> usize {
        self.shared.registry.borrow().len(task_type)
    }

    /// No live tasks and no type queues.
    pub fn is_idle(&self) -> bool {
        self.task_count() == 0 && self.shared.registry.borrow().is_empty()
    }

    pub(crate) fn create_task(&self, params: NewTask) -> Task {
        let mut counter = self.shared.next_id.get();
        let id = TaskId::take_next(&mut counter);
        self.shared.next_id.set(counter);

        let task = Task::new(id, Rc::downgrade(&self.shared), params);
        self.shared.tasks.borrow_mut().insert(id, task.clone());
        task
    }

    /// Remove a task from the live table.
    pub(crate) fn forget(&self, task: &Task) {
        self.shared.tasks.borrow_mut().remove(&task.id());
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.shared.config)
            .field("tasks", &self.task_count())
            .field("queues", &self.shared.registry.borrow().type_count())
            .finish_non_exhaustive()
    }
}
