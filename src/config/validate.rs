// src/config/validate.rs

use crate::config::model::{PlanFile, PlanTask, RawPlanFile, SchedulerConfig, Step};
use crate::errors::{Result, TasktreeError};

impl TryFrom<RawPlanFile> for PlanFile {
    type Error = TasktreeError;

    fn try_from(raw: RawPlanFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_plan(&raw)?;
        Ok(PlanFile::new_unchecked(raw.scheduler, raw.task))
    }
}

/// Check a raw plan without consuming it.
pub fn validate_raw_plan(plan: &RawPlanFile) -> Result<()> {
    ensure_has_tasks(plan)?;
    validate_scheduler(&plan.scheduler)?;
    for (index, task) in plan.task.iter().enumerate() {
        validate_task(index, task)?;
    }
    Ok(())
}

fn ensure_has_tasks(plan: &RawPlanFile) -> Result<()> {
    if plan.task.is_empty() {
        return Err(TasktreeError::ConfigError(
            "plan must contain at least one [[task]] entry".to_string(),
        ));
    }
    Ok(())
}

fn validate_scheduler(cfg: &SchedulerConfig) -> Result<()> {
    if cfg.max_recursions == 0 {
        return Err(TasktreeError::ConfigError(
            "[scheduler].max_recursions must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.time_slice_ms == 0 {
        return Err(TasktreeError::ConfigError(
            "[scheduler].time_slice_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_task(index: usize, task: &PlanTask) -> Result<()> {
    if task.task_type.trim().is_empty() {
        return Err(TasktreeError::ConfigError(format!(
            "task #{} has an empty `type`",
            index + 1
        )));
    }
    validate_steps(task.display_name(), &task.steps, false)
}

fn validate_steps(task: &str, steps: &[Step], in_group: bool) -> Result<()> {
    for step in steps {
        match step {
            Step::Log(_) | Step::SleepMs(_) | Step::Fail(_) => {}
            Step::AbortGroup(_) if !in_group => {
                return Err(TasktreeError::ConfigError(format!(
                    "task '{task}': `abort_group` is only allowed inside a `group`"
                )));
            }
            Step::AbortGroup(_) => {}
            Step::Group(children) => {
                if children.is_empty() {
                    return Err(TasktreeError::ConfigError(format!(
                        "task '{task}': `group` must contain at least one step"
                    )));
                }
                validate_steps(task, children, true)?;
            }
            Step::Parallel(branches) => {
                if branches.is_empty() {
                    return Err(TasktreeError::ConfigError(format!(
                        "task '{task}': `parallel` must contain at least one branch"
                    )));
                }
                // A branch is its own root task; it has no enclosing group.
                for branch in branches {
                    validate_steps(task, branch, false)?;
                }
            }
        }
    }
    Ok(())
}
