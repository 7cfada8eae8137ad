// src/task/task.rs

//! The task handle and the operations available inside every action.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::engine::scheduler::{Scheduler, Shared};
use crate::engine::StartOptions;
use crate::host::TimerId;
use crate::task::state::{Action, TaskState};
use crate::types::{TaskId, TaskType};

/// Unit of work run by a task. Returning `Err` fails the task.
pub type TaskFn = Rc<dyn Fn(&Task) -> anyhow::Result<()>>;

/// Terminal notification hook (`success` / `failure`).
pub type TaskCallback = Rc<dyn Fn(&Task)>;

/// Wrap a closure into a shareable [`TaskFn`], e.g. for [`Task::parallel`].
pub fn action<F>(f: F) -> TaskFn
where
    F: Fn(&Task) -> anyhow::Result<()> + 'static,
{
    Rc::new(f)
}

/// Name given to tasks started without one.
pub const UNNAMED: &str = "unnamed";

/// Handle to a node in a scheduler's task tree.
///
/// Cloning is cheap and yields another handle to the same task. Handles
/// compare equal when they point at the same task.
#[derive(Clone)]
pub struct Task {
    pub(crate) cell: Rc<TaskCell>,
}

/// Shared state behind a [`Task`] handle.
///
/// Everything mutable lives in a `Cell`/`RefCell` that is never borrowed
/// across a call into user code, so actions may freely re-enter the task.
pub(crate) struct TaskCell {
    pub(crate) id: TaskId,
    pub(crate) name: String,
    pub(crate) parent: Option<Weak<TaskCell>>,
    pub(crate) task_type: TaskType,
    pub(crate) run: TaskFn,
    pub(crate) success: Option<TaskCallback>,
    pub(crate) failure: Option<TaskCallback>,
    pub(crate) scheduler: Weak<Shared>,

    pub(crate) state: Cell<TaskState>,
    pub(crate) subtasks: RefCell<VecDeque<Task>>,
    pub(crate) blocks: Cell<u32>,
    pub(crate) error: Cell<bool>,
    pub(crate) cause: RefCell<Option<Rc<anyhow::Error>>>,
    pub(crate) sleep_timer: Cell<Option<TimerId>>,
    pub(crate) swap_time: Cell<Option<Instant>>,
    pub(crate) user_data: RefCell<Option<Rc<dyn Any>>>,

    /// Set once the task left its parent's queue (subtasks) or its action
    /// first ran (roots).
    pub(crate) started: Cell<bool>,
    /// Set while the task's own action is executing.
    pub(crate) in_action: Cell<bool>,
    /// Set once `finish` ran; finishing is idempotent.
    pub(crate) finished: Cell<bool>,
    /// Bumped on every suspension so stale deferred continuations are dropped.
    pub(crate) epoch: Cell<u64>,
    /// Subtask currently running under this task, until it finishes.
    pub(crate) in_flight: RefCell<Option<Task>>,
}

pub(crate) struct NewTask {
    pub(crate) name: String,
    pub(crate) parent: Option<Task>,
    pub(crate) task_type: TaskType,
    pub(crate) run: TaskFn,
    pub(crate) success: Option<TaskCallback>,
    pub(crate) failure: Option<TaskCallback>,
}

impl Task {
    pub(crate) fn new(id: TaskId, scheduler: Weak<Shared>, params: NewTask) -> Self {
        let cell = TaskCell {
            id,
            name: params.name,
            parent: params.parent.as_ref().map(|p| Rc::downgrade(&p.cell)),
            task_type: params.task_type,
            run: params.run,
            success: params.success,
            failure: params.failure,
            scheduler,
            state: Cell::new(TaskState::Ready),
            subtasks: RefCell::new(VecDeque::new()),
            blocks: Cell::new(0),
            error: Cell::new(false),
            cause: RefCell::new(None),
            sleep_timer: Cell::new(None),
            swap_time: Cell::new(None),
            user_data: RefCell::new(None),
            started: Cell::new(false),
            in_action: Cell::new(false),
            finished: Cell::new(false),
            epoch: Cell::new(0),
            in_flight: RefCell::new(None),
        };
        Self {
            cell: Rc::new(cell),
        }
    }

    pub fn id(&self) -> TaskId {
        self.cell.id
    }

    pub fn name(&self) -> &str {
        &self.cell.name
    }

    /// Owning task, or `None` for a root task.
    pub fn parent(&self) -> Option<Task> {
        let weak = self.cell.parent.as_ref()?;
        weak.upgrade().map(|cell| Task { cell })
    }

    pub fn is_root(&self) -> bool {
        self.cell.parent.is_none()
    }

    /// Type of the root this task belongs to.
    pub fn task_type(&self) -> &TaskType {
        &self.cell.task_type
    }

    pub fn state(&self) -> TaskState {
        self.cell.state.get()
    }

    /// Outstanding permits; the task cannot advance while this is non-zero.
    pub fn blocks(&self) -> u32 {
        self.cell.blocks.get()
    }

    /// Whether a failure was signalled anywhere along this task's chain
    /// during the current execution.
    pub fn error(&self) -> bool {
        self.cell.error.get()
    }

    /// Error returned by this task's own action, if that is why it failed.
    pub fn cause(&self) -> Option<Rc<anyhow::Error>> {
        self.cell.cause.borrow().clone()
    }

    /// Subtasks appended but not yet run.
    pub fn pending_subtasks(&self) -> usize {
        self.cell.subtasks.borrow().len()
    }

    /// Payload carried across suspension points, if it holds a `T`.
    pub fn user_data<T: Any>(&self) -> Option<Rc<T>> {
        let data = self.cell.user_data.borrow().clone()?;
        data.downcast::<T>().ok()
    }

    pub fn set_user_data<T: Any>(&self, value: T) {
        *self.cell.user_data.borrow_mut() = Some(Rc::new(value));
    }

    pub fn clear_user_data(&self) {
        self.cell.user_data.borrow_mut().take();
    }

    /// Append a subtask that inherits this task's name.
    ///
    /// Subtasks run one at a time in append order, each one's own subtasks
    /// draining before the next sibling starts.
    pub fn next<F>(&self, action: F) -> &Self
    where
        F: Fn(&Task) -> anyhow::Result<()> + 'static,
    {
        self.push_subtask(self.name().to_string(), Rc::new(action))
    }

    /// Append a named subtask. See [`Task::next`].
    pub fn next_named<F>(&self, name: impl Into<String>, action: F) -> &Self
    where
        F: Fn(&Task) -> anyhow::Result<()> + 'static,
    {
        self.push_subtask(name.into(), Rc::new(action))
    }

    /// Append a subtask that runs `actions` concurrently and continues once
    /// every branch has either succeeded or failed.
    ///
    /// Each branch is an independent root task under a synthetic type, so
    /// branches never queue behind each other or behind any named type.
    /// A failing branch does not fail this task.
    pub fn parallel<I>(&self, actions: I) -> &Self
    where
        I: IntoIterator<Item = TaskFn>,
    {
        self.parallel_named(self.name().to_string(), actions)
    }

    /// Named variant of [`Task::parallel`].
    pub fn parallel_named<I>(&self, name: impl Into<String>, actions: I) -> &Self
    where
        I: IntoIterator<Item = TaskFn>,
    {
        let name = name.into();
        let actions: Vec<TaskFn> = actions.into_iter().collect();
        let branch_prefix = name.clone();

        self.push_subtask(
            name,
            Rc::new(move |task: &Task| {
                let scheduler = task.scheduler()?;
                let permits = u32::try_from(actions.len())?;
                task.block(permits);

                for (branch, run) in actions.iter().enumerate() {
                    let on_success = task.clone();
                    let on_failure = task.clone();
                    let options = StartOptions::from_action(
                        TaskType::Parallel {
                            spawner: task.id(),
                            branch,
                        },
                        Rc::clone(run),
                    )
                    .name(format!("{branch_prefix}[{branch}]"))
                    .on_success(move |_| {
                        on_success.unblock(1);
                    })
                    .on_failure(move |_| {
                        on_failure.unblock(1);
                    });
                    scheduler.start(options);
                }

                debug!(
                    task = %task.id(),
                    name = %task.name(),
                    branches = actions.len(),
                    "parallel branches started"
                );
                Ok(())
            }),
        )
    }

    /// Take `n` permits. The task stops advancing while any are outstanding.
    pub fn block(&self, n: u32) {
        if self.state().is_terminal() {
            trace!(task = %self.id(), "block ignored; task already ended");
            return;
        }
        let blocks = self.cell.blocks.get().saturating_add(n);
        self.cell.blocks.set(blocks);

        if blocks > 0 {
            let before = self.state();
            let after = self.apply(Action::Block);
            if before != after {
                self.bump_epoch();
            }
        }

        trace!(task = %self.id(), name = %self.name(), blocks, "block");
    }

    /// Release `n` permits and return how many remain.
    ///
    /// The count floors at zero: releasing more than was taken is allowed,
    /// so several independent completions can signal one waiter. A blocked
    /// task resumes exactly once, when the count first reaches zero.
    pub fn unblock(&self, n: u32) -> u32 {
        let before = self.cell.blocks.get();
        let blocks = before.saturating_sub(n);
        self.cell.blocks.set(blocks);

        trace!(task = %self.id(), name = %self.name(), blocks, "unblock");

        if before > 0 && blocks == 0 && self.state() == TaskState::Blocked {
            if let Some(scheduler) = self.scheduler_opt() {
                scheduler.resume(self);
            }
        }
        blocks
    }

    /// Suspend the task for `duration`, or until [`Task::wakeup`].
    pub fn sleep(&self, duration: Duration) {
        if self.apply(Action::Sleep) != TaskState::Sleeping {
            debug!(
                task = %self.id(),
                state = %self.state(),
                "sleep ignored; task is not running"
            );
            return;
        }
        self.bump_epoch();

        let Some(scheduler) = self.scheduler_opt() else {
            return;
        };
        scheduler.cancel_sleep_timer(self);

        let task = self.clone();
        let timer = scheduler.host().set_timer(
            duration,
            Box::new(move || {
                task.cell.sleep_timer.set(None);
                if task.state() == TaskState::Sleeping {
                    trace!(task = %task.id(), "sleep timer fired");
                    task.wake();
                }
            }),
        );
        self.cell.sleep_timer.set(Some(timer));

        trace!(task = %self.id(), name = %self.name(), ?duration, "sleep");
    }

    /// End a sleep early, cancelling its timer. No-op unless sleeping.
    pub fn wakeup(&self) {
        if self.state() != TaskState::Sleeping {
            return;
        }
        if let Some(scheduler) = self.scheduler_opt() {
            scheduler.cancel_sleep_timer(self);
        }
        trace!(task = %self.id(), name = %self.name(), "wakeup");
        self.wake();
    }

    /// Cooperatively cancel the task: it becomes `Done`, its timer is
    /// cleared and its not-yet-run subtasks are discarded. The subtask
    /// currently running under it, if any, is cancelled too, and the task
    /// completes once that subtask has climbed back. An action that is
    /// already executing runs to completion.
    pub fn cancel(&self) {
        let before = self.state();
        if before.is_terminal() {
            return;
        }
        self.apply(Action::Cancel);
        self.bump_epoch();
        self.cell.blocks.set(0);

        debug!(task = %self.id(), name = %self.name(), "cancel");

        if let Some(scheduler) = self.scheduler_opt() {
            scheduler.cancelled(self);
        }
    }

    /// Pause a running task. It will not advance until [`Task::start`].
    pub fn stop(&self) {
        let before = self.state();
        if self.apply(Action::Stop) != before {
            self.bump_epoch();
            debug!(task = %self.id(), name = %self.name(), "stop");
        }
    }

    /// Resume a stopped task: re-runs its action, then its subtasks.
    ///
    /// Only a `Ready` task restarts; on any other state this is a no-op.
    pub fn start(&self) {
        if let Some(scheduler) = self.scheduler_opt() {
            scheduler.restart(self);
        }
    }

    /// Fail the whole operation: every ancestor is aborted, the root's
    /// type queue moves on, and the failure callback fires once.
    pub fn fail(&self) {
        if let Some(scheduler) = self.scheduler_opt() {
            scheduler.fail(self, None);
        }
    }

    /// Fail up to `next`: tasks between this one and `next` are abandoned
    /// and execution resumes at `next` with the error flag set.
    pub fn fail_to(&self, next: &Task) {
        if let Some(scheduler) = self.scheduler_opt() {
            scheduler.fail(self, Some(next));
        }
    }

    /// Scheduler owning this task, as an error if it has been dropped.
    pub fn scheduler(&self) -> anyhow::Result<Scheduler> {
        self.scheduler_opt()
            .ok_or_else(|| anyhow::anyhow!("scheduler for task {} was dropped", self.id()))
    }

    pub(crate) fn scheduler_opt(&self) -> Option<Scheduler> {
        let shared = self.cell.scheduler.upgrade();
        if shared.is_none() {
            warn!(task = %self.id(), "scheduler dropped; ignoring task operation");
        }
        shared.map(Scheduler::from_shared)
    }

    pub(crate) fn apply(&self, action: Action) -> TaskState {
        let next = self.state().transition(action);
        self.cell.state.set(next);
        next
    }

    pub(crate) fn set_state(&self, state: TaskState) {
        self.cell.state.set(state);
    }

    pub(crate) fn bump_epoch(&self) {
        self.cell.epoch.set(self.cell.epoch.get().wrapping_add(1));
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.cell.epoch.get()
    }

    pub(crate) fn swap_time(&self) -> Option<Instant> {
        self.cell.swap_time.get()
    }

    pub(crate) fn set_swap_time(&self, at: Instant) {
        self.cell.swap_time.set(Some(at));
    }

    pub(crate) fn in_flight(&self) -> Option<Task> {
        self.cell.in_flight.borrow().clone()
    }

    pub(crate) fn set_in_flight(&self, subtask: Option<Task>) {
        *self.cell.in_flight.borrow_mut() = subtask;
    }

    pub(crate) fn pop_subtask(&self) -> Option<Task> {
        self.cell.subtasks.borrow_mut().pop_front()
    }

    pub(crate) fn take_subtasks(&self) -> VecDeque<Task> {
        std::mem::take(&mut *self.cell.subtasks.borrow_mut())
    }

    /// Copy the context that flows along the chain: error flag, swap time
    /// and user data.
    pub(crate) fn inherit_from(&self, other: &Task) {
        self.cell.error.set(other.cell.error.get());
        self.cell.swap_time.set(other.cell.swap_time.get());
        let data = other.cell.user_data.borrow().clone();
        *self.cell.user_data.borrow_mut() = data;
    }

    /// Timer fired or `wakeup` called: continue, unless permits are still
    /// outstanding, in which case the final `unblock` resumes the task.
    fn wake(&self) {
        if self.blocks() > 0 {
            self.set_state(TaskState::Blocked);
            return;
        }
        if let Some(scheduler) = self.scheduler_opt() {
            scheduler.resume(self);
        }
    }

    fn push_subtask(&self, name: String, run: TaskFn) -> &Self {
        let Some(scheduler) = self.scheduler_opt() else {
            return self;
        };

        let subtask = scheduler.create_task(NewTask {
            name,
            parent: Some(self.clone()),
            task_type: self.cell.task_type.clone(),
            run,
            success: self.cell.success.clone(),
            failure: self.cell.failure.clone(),
        });
        subtask.set_state(TaskState::Running);

        trace!(
            task = %self.id(),
            subtask = %subtask.id(),
            name = %subtask.name(),
            "subtask appended"
        );
        self.cell.subtasks.borrow_mut().push_back(subtask);
        self
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }
}

impl Eq for Task {}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("type", self.task_type())
            .field("state", &self.state())
            .field("blocks", &self.blocks())
            .field("error", &self.error())
            .field("pending_subtasks", &self.pending_subtasks())
            .finish_non_exhaustive()
    }
}
