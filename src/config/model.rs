// src/config/model.rs

use std::time::Duration;

use serde::Deserialize;

/// Scheduler tuning, from the optional `[scheduler]` section.
///
/// ```toml
/// [scheduler]
/// max_recursions = 30
/// time_slice_ms = 20
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Loop steps one synchronous chain may take before yielding to the host.
    #[serde(default = "default_max_recursions")]
    pub max_recursions: u32,

    /// Wall time one chain may run before yielding to the host.
    #[serde(default = "default_time_slice_ms")]
    pub time_slice_ms: u64,
}

pub const DEFAULT_MAX_RECURSIONS: u32 = 30;
pub const DEFAULT_TIME_SLICE_MS: u64 = 20;

fn default_max_recursions() -> u32 {
    DEFAULT_MAX_RECURSIONS
}

fn default_time_slice_ms() -> u64 {
    DEFAULT_TIME_SLICE_MS
}

impl SchedulerConfig {
    pub fn time_slice(&self) -> Duration {
        Duration::from_millis(self.time_slice_ms)
    }

    pub fn with_max_recursions(mut self, max_recursions: u32) -> Self {
        self.max_recursions = max_recursions;
        self
    }

    /// Sub-millisecond slices round down to zero, which yields as soon as
    /// any time at all has passed.
    pub fn with_time_slice(mut self, time_slice: Duration) -> Self {
        self.time_slice_ms = u64::try_from(time_slice.as_millis()).unwrap_or(u64::MAX);
        self
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_recursions: default_max_recursions(),
            time_slice_ms: default_time_slice_ms(),
        }
    }
}

/// Plan file as read from TOML, before validation.
///
/// ```toml
/// [scheduler]
/// time_slice_ms = 20
///
/// [[task]]
/// type = "sync"
/// name = "fetch"
/// steps = [
///   { log = "fetching" },
///   { sleep_ms = 50 },
///   { parallel = [[{ log = "a" }], [{ log = "b" }]] },
/// ]
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawPlanFile {
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Root tasks, submitted in file order.
    #[serde(default)]
    pub task: Vec<PlanTask>,
}

/// A validated plan. Build one with `PlanFile::try_from(raw)` or
/// [`load_and_validate`](crate::config::load_and_validate).
#[derive(Debug, Clone)]
pub struct PlanFile {
    scheduler: SchedulerConfig,
    tasks: Vec<PlanTask>,
}

impl PlanFile {
    /// Callers must have validated the parts.
    pub(crate) fn new_unchecked(scheduler: SchedulerConfig, tasks: Vec<PlanTask>) -> Self {
        Self { scheduler, tasks }
    }

    pub fn scheduler(&self) -> &SchedulerConfig {
        &self.scheduler
    }

    pub fn tasks(&self) -> &[PlanTask] {
        &self.tasks
    }

    /// Distinct task types, in first-appearance order.
    pub fn task_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = Vec::new();
        for task in &self.tasks {
            if !types.contains(&task.task_type.as_str()) {
                types.push(&task.task_type);
            }
        }
        types
    }
}

/// One `[[task]]` entry: a root task.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanTask {
    /// Roots sharing a type run one after another, in file order.
    #[serde(rename = "type")]
    pub task_type: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub steps: Vec<Step>,
}

impl PlanTask {
    /// Display name; falls back to the type.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.task_type)
    }
}

/// One step of a task, run as its own subtask.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Log a message at `info`.
    Log(String),
    /// Sleep for this many milliseconds.
    SleepMs(u64),
    /// Fail the whole task with this message.
    Fail(String),
    /// Abandon the enclosing `group` and continue after it, marking the
    /// task as failed.
    AbortGroup(String),
    /// Nested steps, run as one subtask.
    Group(Vec<Step>),
    /// Branches run concurrently; the step ends when all have ended.
    Parallel(Vec<Vec<Step>>),
}

impl Step {
    /// Short name used in logs and dry-run output.
    pub fn kind(&self) -> &'static str {
        match self {
            Step::Log(_) => "log",
            Step::SleepMs(_) => "sleep_ms",
            Step::Fail(_) => "fail",
            Step::AbortGroup(_) => "abort_group",
            Step::Group(_) => "group",
            Step::Parallel(_) => "parallel",
        }
    }
}
