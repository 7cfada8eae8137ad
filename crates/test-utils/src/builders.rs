#![allow(dead_code)]

use tasktree::config::{PlanFile, PlanTask, RawPlanFile, SchedulerConfig, Step};

/// Builder for `PlanFile` to simplify test setup.
pub struct PlanBuilder {
    plan: RawPlanFile,
}

impl PlanBuilder {
    pub fn new() -> Self {
        Self {
            plan: RawPlanFile {
                scheduler: SchedulerConfig::default(),
                task: Vec::new(),
            },
        }
    }

    pub fn with_task(mut self, task: PlanTask) -> Self {
        self.plan.task.push(task);
        self
    }

    pub fn max_recursions(mut self, value: u32) -> Self {
        self.plan.scheduler.max_recursions = value;
        self
    }

    pub fn time_slice_ms(mut self, value: u64) -> Self {
        self.plan.scheduler.time_slice_ms = value;
        self
    }

    /// The raw plan, for exercising validation failures.
    pub fn raw(self) -> RawPlanFile {
        self.plan
    }

    pub fn build(self) -> PlanFile {
        PlanFile::try_from(self.plan).expect("Failed to build valid plan from builder")
    }
}

impl Default for PlanBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for one `[[task]]` entry.
pub struct PlanTaskBuilder {
    task: PlanTask,
}

impl PlanTaskBuilder {
    pub fn new(task_type: &str) -> Self {
        Self {
            task: PlanTask {
                task_type: task_type.to_string(),
                name: None,
                steps: Vec::new(),
            },
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.task.name = Some(name.to_string());
        self
    }

    pub fn step(mut self, step: Step) -> Self {
        self.task.steps.push(step);
        self
    }

    pub fn log(self, message: &str) -> Self {
        self.step(Step::Log(message.to_string()))
    }

    pub fn sleep_ms(self, ms: u64) -> Self {
        self.step(Step::SleepMs(ms))
    }

    pub fn fail(self, message: &str) -> Self {
        self.step(Step::Fail(message.to_string()))
    }

    pub fn group(self, steps: Vec<Step>) -> Self {
        self.step(Step::Group(steps))
    }

    pub fn parallel(self, branches: Vec<Vec<Step>>) -> Self {
        self.step(Step::Parallel(branches))
    }

    pub fn build(self) -> PlanTask {
        self.task
    }
}
