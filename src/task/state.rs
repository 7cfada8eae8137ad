// src/task/state.rs

//! Task states and the fixed transition table.
//!
//! The table only governs the abstract action. Counting permits and
//! cancelling timers is done by the task operations themselves, which force
//! the state back to `Running` when a blocked or sleeping task resumes.

use std::fmt;

/// Scheduling state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    Ready,
    Running,
    Blocked,
    Sleeping,
    Done,
    Error,
}

/// Abstract action applied to a task's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Stop,
    Start,
    Block,
    Unblock,
    Sleep,
    Wakeup,
    Cancel,
    Fail,
}

impl TaskState {
    pub const ALL: [TaskState; 6] = [
        TaskState::Ready,
        TaskState::Running,
        TaskState::Blocked,
        TaskState::Sleeping,
        TaskState::Done,
        TaskState::Error,
    ];

    /// Look up the state reached by applying `action`.
    ///
    /// `Done` and `Error` are terminal: only `Fail` moves them (to `Error`).
    /// `Cancel` and `Fail` are reachable from every other state.
    pub fn transition(self, action: Action) -> TaskState {
        use Action as A;
        use TaskState as S;

        match (self, action) {
            (_, A::Fail) => S::Error,
            (S::Done | S::Error, _) => self,
            (_, A::Cancel) => S::Done,

            (S::Ready, A::Start) => S::Running,

            (S::Running, A::Stop) => S::Ready,
            (S::Running, A::Block) => S::Blocked,
            (S::Running, A::Sleep) => S::Sleeping,

            // Everything else is a self-loop, including any action on a
            // blocked or sleeping task other than cancel/fail.
            _ => self,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Done | TaskState::Error)
    }
}

impl Action {
    pub const ALL: [Action; 8] = [
        Action::Stop,
        Action::Start,
        Action::Block,
        Action::Unblock,
        Action::Sleep,
        Action::Wakeup,
        Action::Cancel,
        Action::Fail,
    ];
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Ready => "READY",
            TaskState::Running => "RUNNING",
            TaskState::Blocked => "BLOCKED",
            TaskState::Sleeping => "SLEEPING",
            TaskState::Done => "DONE",
            TaskState::Error => "ERROR",
        };
        f.write_str(s)
    }
}
