use std::fmt;
use std::num::NonZeroU64;

/// Identifier of a task, unique within one [`Scheduler`](crate::engine::Scheduler).
///
/// Ids are handed out in creation order and are only used for diagnostics
/// and registry lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(NonZeroU64);

impl TaskId {
    /// First id handed out by a fresh scheduler.
    pub(crate) const FIRST: u64 = 1;

    /// Build an id from a raw counter value, advancing the counter.
    pub(crate) fn take_next(counter: &mut u64) -> Self {
        let raw = *counter;
        *counter = counter.wrapping_add(1);

        // Even at a billion tasks per second this takes centuries to wrap.
        let Some(id) = NonZeroU64::new(raw) else {
            Self::exhausted();
        };

        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }

    #[cold]
    fn exhausted() -> ! {
        panic!("failed to generate unique task id: id space exhausted")
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Key of a family of root tasks that run one at a time, in FIFO order.
///
/// - `Named`: a caller-chosen identifier (e.g. `"login"`). Two roots with the
///   same name never run concurrently.
/// - `Parallel`: synthetic key given to each branch of
///   [`Task::parallel`](crate::task::Task::parallel). It can never equal a
///   `Named` key, and `(spawner, branch)` is unique within a scheduler, so
///   parallel branches never serialize against anything.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskType {
    Named(String),
    Parallel { spawner: TaskId, branch: usize },
}

impl TaskType {
    pub fn named(name: impl Into<String>) -> Self {
        TaskType::Named(name.into())
    }

    pub fn is_parallel(&self) -> bool {
        matches!(self, TaskType::Parallel { .. })
    }
}

impl From<&str> for TaskType {
    fn from(name: &str) -> Self {
        TaskType::Named(name.to_string())
    }
}

impl From<String> for TaskType {
    fn from(name: String) -> Self {
        TaskType::Named(name)
    }
}

impl From<&String> for TaskType {
    fn from(name: &String) -> Self {
        TaskType::Named(name.clone())
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskType::Named(name) => f.write_str(name),
            TaskType::Parallel { spawner, branch } => {
                write!(f, "parallel[{spawner}.{branch}]")
            }
        }
    }
}
