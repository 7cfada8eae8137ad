// src/engine/run_loop.rs

//! The execution loop: advancing tasks through their subtask queues.
//!
//! Advancing is an explicit trampoline rather than host-stack recursion.
//! Each step either runs the next subtask's action and descends into it, or
//! finishes the task and climbs back to its parent. Every step counts
//! towards a depth budget; once the budget or the time slice is used up the
//! loop hands control back to the host with a deferred continuation.

use std::rc::Rc;

use tracing::{debug, error, trace, warn};

use crate::engine::scheduler::Scheduler;
use crate::task::state::{Action, TaskState};
use crate::task::Task;

/// Marks a task as executing its own action for the guard's lifetime.
struct ActionGuard<'a> {
    task: &'a Task,
    outer: bool,
}

impl<'a> ActionGuard<'a> {
    fn enter(task: &'a Task) -> Self {
        let outer = task.cell.in_action.replace(true);
        Self { task, outer }
    }
}

impl Drop for ActionGuard<'_> {
    fn drop(&mut self) {
        self.task.cell.in_action.set(self.outer);
    }
}

impl Scheduler {
    /// Start a root task that just became the head of its type queue.
    ///
    /// The action runs from a deferred host callback, never inline.
    pub(crate) fn launch(&self, task: &Task) {
        task.cell.error.set(false);
        task.apply(Action::Start);

        debug!(
            task = %task.id(),
            name = %task.name(),
            task_type = %task.task_type(),
            "launching root task"
        );
        self.schedule_launch(task);
    }

    /// Defer the first run of a head root's action.
    ///
    /// Until the callback runs the root counts as not started: permits,
    /// sleeps and stops taken in the meantime apply once the action returns.
    fn schedule_launch(&self, task: &Task) {
        let scheduler = self.clone();
        let task = task.clone();
        self.host().defer(Box::new(move || {
            let state = task.state();
            if task.cell.started.get() || state == TaskState::Ready || state.is_terminal() {
                trace!(task = %task.id(), %state, "launch superseded; skipping");
                return;
            }
            task.cell.started.set(true);
            scheduler.run_and_advance(&task);
        }));
    }

    /// Instance-level `start`: resume a stopped task by re-running its
    /// action and then its subtasks.
    pub(crate) fn restart(&self, task: &Task) {
        if task.state() != TaskState::Ready {
            debug!(task = %task.id(), state = %task.state(), "start ignored; task is not ready");
            return;
        }
        if task.is_root() && self.shared().registry.borrow().is_parked(task) {
            warn!(
                task = %task.id(),
                task_type = %task.task_type(),
                "start ignored; root task is queued behind its type"
            );
            return;
        }

        task.cell.error.set(false);
        task.apply(Action::Start);

        if !task.cell.started.get() {
            if task.is_root() {
                // Stopped before its first run; the pending launch was skipped.
                self.schedule_launch(task);
            }
            // A subtask still queued under its parent runs when its turn comes.
            return;
        }

        debug!(task = %task.id(), name = %task.name(), "restarting task");
        self.run_and_advance(task);
    }

    /// Continue a task whose permits reached zero or whose sleep ended.
    pub(crate) fn resume(&self, task: &Task) {
        task.set_state(TaskState::Running);
        trace!(task = %task.id(), name = %task.name(), "resume");

        // Inside its own action, the loop that called the action continues
        // the task once it returns. A task that never left its parent's queue
        // runs when popped, and a root awaiting launch from its launch callback.
        if task.cell.in_action.get() || !task.cell.started.get() {
            return;
        }
        self.drive(task.clone(), 0);
    }

    /// Follow-up for [`Task::cancel`]: drop queued work, then make sure the
    /// task still completes so its parent (or type queue) moves on.
    pub(crate) fn cancelled(&self, task: &Task) {
        self.cancel_sleep_timer(task);
        for subtask in task.take_subtasks() {
            self.discard(&subtask);
        }

        if task.is_root() && self.shared().registry.borrow().is_parked(task) {
            let removed = self.shared().registry.borrow_mut().remove_parked(task);
            task.cell.finished.set(true);
            self.forget(task);
            debug!(task = %task.id(), removed, "parked root cancelled");
            return;
        }

        // The running subtask is cancelled as well; this task completes when
        // it climbs back.
        if let Some(child) = task.in_flight() {
            trace!(task = %task.id(), subtask = %child.id(), "cancelling in-flight subtask");
            child.cancel();
            return;
        }

        if Self::completes_on_cancel(task) && !task.cell.in_action.get() {
            let scheduler = self.clone();
            let task = task.clone();
            self.host().defer(Box::new(move || scheduler.drive(task, 0)));
        }
    }

    /// A cancelled task the loop still has to complete: a subtask that left
    /// its queue, or a head root (launched or not).
    fn completes_on_cancel(task: &Task) -> bool {
        !task.cell.finished.get() && (task.cell.started.get() || task.is_root())
    }

    pub(crate) fn cancel_sleep_timer(&self, task: &Task) {
        if let Some(timer) = task.cell.sleep_timer.take() {
            self.host().clear_timer(timer);
        }
    }

    /// Fail `task`, then either resume at `next` or abort the whole tree.
    pub(crate) fn fail(&self, task: &Task, next: Option<&Task>) {
        if task.cell.finished.get() {
            task.apply(Action::Fail);
            debug!(task = %task.id(), "fail on finished task; nothing to unwind");
            return;
        }

        task.cell.error.set(true);
        task.apply(Action::Fail);
        task.bump_epoch();

        warn!(
            task = %task.id(),
            name = %task.name(),
            target = ?next.map(Task::id),
            "task failed"
        );

        if task.is_root() && self.shared().registry.borrow().is_parked(task) {
            self.shared().registry.borrow_mut().remove_parked(task);
            self.discard(task);
            if let Some(callback) = task.cell.failure.clone() {
                callback(task);
            }
            return;
        }

        for subtask in task.take_subtasks() {
            self.discard(&subtask);
        }

        let orphaned = Self::ancestor_finished(task);
        self.finish(task, true);
        if orphaned {
            debug!(task = %task.id(), "tree above already finished; failure not reported");
            return;
        }

        match next {
            Some(next) => {
                match Self::between(task, next) {
                    Some(abandoned) => {
                        for ancestor in abandoned {
                            ancestor.inherit_from(task);
                            self.abort(&ancestor);
                        }
                    }
                    None => warn!(
                        task = %task.id(),
                        target = %next.id(),
                        "fail target is not an ancestor; the failing chain will not resume"
                    ),
                }
                next.inherit_from(task);
                debug!(task = %task.id(), resume_at = %next.id(), "resuming after failure");
                self.drive(next.clone(), 0);
            }
            None => {
                let mut cursor = task.parent();
                while let Some(ancestor) = cursor {
                    ancestor.inherit_from(task);
                    cursor = ancestor.parent();
                    self.abort(&ancestor);
                }
                if let Some(callback) = task.cell.failure.clone() {
                    callback(task);
                }
            }
        }
    }

    /// Whether an ancestor of `task` already finished or was dropped.
    fn ancestor_finished(task: &Task) -> bool {
        let mut cursor = task.clone();
        while !cursor.is_root() {
            match cursor.parent() {
                Some(parent) if !parent.cell.finished.get() => cursor = parent,
                _ => return true,
            }
        }
        false
    }

    /// Ancestors of `task` strictly below `next`, nearest first, or `None`
    /// when `next` is not an ancestor of `task`.
    fn between(task: &Task, next: &Task) -> Option<Vec<Task>> {
        let mut chain = Vec::new();
        let mut cursor = task.parent();
        while let Some(ancestor) = cursor {
            if &ancestor == next {
                return Some(chain);
            }
            cursor = ancestor.parent();
            chain.push(ancestor);
        }
        None
    }

    /// Terminate a task as part of failure unwinding, without callbacks.
    fn abort(&self, task: &Task) {
        task.cell.error.set(true);
        task.apply(Action::Fail);
        task.bump_epoch();
        for subtask in task.take_subtasks() {
            self.discard(&subtask);
        }
        self.finish(task, true);
    }

    /// Drop a task that will never run, with its queued subtasks.
    fn discard(&self, task: &Task) {
        task.apply(Action::Cancel);
        self.cancel_sleep_timer(task);
        for subtask in task.take_subtasks() {
            self.discard(&subtask);
        }
        task.cell.finished.set(true);
        self.forget(task);
    }

    /// Run `task`'s action, then advance it unless the action failed it or
    /// it still holds permits.
    fn run_and_advance(&self, task: &Task) {
        task.set_swap_time(self.now());
        self.invoke(task);
        if task.state() != TaskState::Error && !self.hold_if_blocked(task) {
            self.drive(task.clone(), 0);
        }
    }

    /// Park a running task whose action returned with permits outstanding.
    ///
    /// Permits taken while the task was not running (parked, stopped, or
    /// before its first run) only raise the count; they take effect here.
    fn hold_if_blocked(&self, task: &Task) -> bool {
        if task.blocks() == 0 || task.state() != TaskState::Running {
            return false;
        }
        task.set_state(TaskState::Blocked);
        task.bump_epoch();
        trace!(task = %task.id(), blocks = task.blocks(), "holding task until unblocked");
        true
    }

    /// Advance from `task` until the chain suspends, finishes or yields.
    pub(crate) fn drive(&self, task: Task, depth: u32) {
        let mut cursor = Some((task, depth));
        while let Some((task, depth)) = cursor.take() {
            if self.should_yield(&task, depth) {
                self.yield_to_host(task);
                return;
            }
            cursor = self.step(&task, depth, false);
        }
    }

    fn should_yield(&self, task: &Task, depth: u32) -> bool {
        let config = self.config();
        if depth > config.max_recursions {
            return true;
        }
        task.swap_time()
            .is_some_and(|at| self.now().saturating_duration_since(at) > config.time_slice())
    }

    fn yield_to_host(&self, task: Task) {
        trace!(task = %task.id(), name = %task.name(), "yielding to host");

        let epoch = task.epoch();
        let scheduler = self.clone();
        self.host().defer(Box::new(move || {
            if task.epoch() != epoch {
                trace!(task = %task.id(), "continuation superseded; dropping");
                return;
            }
            if let Some((next, depth)) = scheduler.step(&task, 0, true) {
                scheduler.drive(next, depth);
            }
        }));
    }

    /// One loop step. Returns the task to advance next, if any.
    fn step(&self, task: &Task, depth: u32, swapped: bool) -> Option<(Task, u32)> {
        let depth = depth + 1;

        match task.state() {
            TaskState::Running => {}
            TaskState::Done if Self::completes_on_cancel(task) => {
                debug!(task = %task.id(), name = %task.name(), "completing cancelled task");
                return self.complete(task, depth);
            }
            // Blocked, sleeping or stopped tasks resume themselves later.
            _ => return None,
        }

        if swapped {
            task.set_swap_time(self.now());
        }

        while let Some(subtask) = task.pop_subtask() {
            if subtask.state().is_terminal() {
                // Cancelled or failed before its turn came.
                self.discard(&subtask);
                continue;
            }

            subtask.inherit_from(task);
            subtask.cell.started.set(true);
            task.set_in_flight(Some(subtask.clone()));
            trace!(
                task = %task.id(),
                subtask = %subtask.id(),
                name = %subtask.name(),
                depth,
                "running subtask"
            );
            self.invoke(&subtask);

            if subtask.state() == TaskState::Error || self.hold_if_blocked(&subtask) {
                // Failed (unwinding already happened inside `fail`) or held.
                return None;
            }
            return Some((subtask, depth));
        }

        self.complete(task, depth)
    }

    /// Finish a task whose queue drained and climb back to its parent.
    fn complete(&self, task: &Task, depth: u32) -> Option<(Task, u32)> {
        self.finish(task, false);
        let parent = task.parent()?;
        parent.inherit_from(task);
        Some((parent, depth))
    }

    /// Invoke the task's action. An `Err` result fails the task.
    fn invoke(&self, task: &Task) {
        let run = Rc::clone(&task.cell.run);
        let result = {
            let _guard = ActionGuard::enter(task);
            run(task)
        };

        if let Err(err) = result {
            warn!(
                task = %task.id(),
                name = %task.name(),
                error = %format!("{err:#}"),
                "task action returned an error"
            );
            *task.cell.cause.borrow_mut() = Some(Rc::new(err));
            if !task.cell.finished.get() {
                self.fail(task, None);
            }
        }
    }

    /// Mark a task finished and drop it from the live table.
    ///
    /// For a root task this also releases its type queue (starting the next
    /// task of that type) and, unless suppressed, fires the success or
    /// failure callback according to the accumulated error flag.
    pub(crate) fn finish(&self, task: &Task, suppress_callbacks: bool) {
        if task.cell.finished.replace(true) {
            return;
        }
        if task.state() != TaskState::Error {
            task.set_state(TaskState::Done);
        }
        self.cancel_sleep_timer(task);
        self.forget(task);
        if let Some(parent) = task.parent() {
            if parent.in_flight().as_ref() == Some(task) {
                parent.set_in_flight(None);
            }
        }

        debug!(
            task = %task.id(),
            name = %task.name(),
            state = %task.state(),
            error = task.error(),
            "finish"
        );

        if !task.is_root() {
            return;
        }

        let next = self.shared().registry.borrow_mut().complete(task);
        match next {
            Ok(Some(next)) => self.launch(&next),
            Ok(None) => {}
            Err(violation) => {
                error!(%violation, "scheduler consistency violation");
                if cfg!(debug_assertions) {
                    panic!("scheduler consistency violation: {violation}");
                }
            }
        }

        if suppress_callbacks {
            return;
        }

        let callback = if task.error() {
            task.cell.failure.clone()
        } else {
            task.cell.success.clone()
        };
        if let Some(callback) = callback {
            callback(task);
        }
    }
}
