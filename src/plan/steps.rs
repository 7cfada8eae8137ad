// src/plan/steps.rs

//! Compiling plan steps into task actions.
//!
//! A list of steps becomes one action that appends every step as a subtask
//! of the task running it, so steps run strictly in order and a `group`
//! drains completely before the step after it starts.

use std::rc::Rc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use tracing::{info, warn};

use crate::config::Step;
use crate::task::{action, Task, TaskFn};

/// Build the action that runs `steps` in order.
pub fn compile(steps: &[Step]) -> TaskFn {
    let steps: Rc<[Step]> = steps.into();
    action(move |task| {
        for step in steps.iter() {
            append(task, step);
        }
        Ok(())
    })
}

fn append(task: &Task, step: &Step) {
    match step {
        Step::Log(message) => {
            let message = message.clone();
            task.next(move |task| {
                info!(task = %task.id(), name = %task.name(), "{message}");
                Ok(())
            });
        }
        Step::SleepMs(ms) => {
            let duration = Duration::from_millis(*ms);
            task.next(move |task| {
                task.sleep(duration);
                Ok(())
            });
        }
        Step::Fail(message) => {
            let message = message.clone();
            task.next(move |_| Err(anyhow!("{message}")));
        }
        Step::AbortGroup(message) => {
            let message = message.clone();
            task.next(move |task| {
                let group = task.parent().context("abort_group has no enclosing group")?;
                let resume_at = group
                    .parent()
                    .context("abort_group has no task to resume at")?;
                warn!(
                    task = %task.id(),
                    group = %group.id(),
                    resume_at = %resume_at.id(),
                    "group aborted: {message}"
                );
                task.fail_to(&resume_at);
                Ok(())
            });
        }
        Step::Group(children) => {
            let run = compile(children);
            task.next(move |task| run(task));
        }
        Step::Parallel(branches) => {
            task.parallel(branches.iter().map(|branch| compile(branch)));
        }
    }
}
