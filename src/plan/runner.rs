// src/plan/runner.rs

//! Submitting a plan to a scheduler and collecting outcomes.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tokio::sync::Notify;
use tracing::{debug, info};

use crate::config::{PlanFile, PlanTask};
use crate::engine::{Scheduler, StartOptions};
use crate::plan::steps::compile;
use crate::task::Task;

/// How a root task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    /// `failed_task` is the task that signalled the failure; `cause` the
    /// error its action returned, if any.
    Failed {
        failed_task: String,
        cause: Option<String>,
    },
    /// Dropped before it ran, or still running when the run was interrupted.
    Cancelled,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Succeeded => f.write_str("ok"),
            Outcome::Failed {
                failed_task,
                cause: Some(cause),
            } => write!(f, "failed in '{failed_task}': {cause}"),
            Outcome::Failed { failed_task, .. } => write!(f, "failed in '{failed_task}'"),
            Outcome::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Result line for one plan task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    pub task_type: String,
    pub name: String,
    pub outcome: Outcome,
}

/// A plan submitted to a scheduler.
pub struct PlanRun {
    plan: Vec<PlanTask>,
    outcomes: Rc<RefCell<Vec<Option<Outcome>>>>,
    done: Rc<Notify>,
}

impl PlanRun {
    /// Start every plan task, in file order.
    pub fn submit(scheduler: &Scheduler, plan: &PlanFile) -> Self {
        let outcomes = Rc::new(RefCell::new(vec![None; plan.tasks().len()]));
        let done = Rc::new(Notify::new());

        for (index, entry) in plan.tasks().iter().enumerate() {
            let record = {
                let outcomes = Rc::clone(&outcomes);
                let done = Rc::clone(&done);
                move |outcome: Outcome| {
                    outcomes.borrow_mut()[index] = Some(outcome);
                    done.notify_one();
                }
            };
            let on_failure = record.clone();

            let options = StartOptions::from_action(entry.task_type.clone().into(), compile(&entry.steps))
                .name(entry.display_name())
                .on_success(move |_| record(Outcome::Succeeded))
                .on_failure(move |task: &Task| {
                    on_failure(Outcome::Failed {
                        failed_task: task.name().to_string(),
                        cause: task.cause().map(|err| format!("{err:#}")),
                    })
                });

            let task = scheduler.start(options);
            debug!(task = %task.id(), name = %task.name(), task_type = %entry.task_type, "plan task submitted");
        }

        info!(tasks = plan.tasks().len(), "plan submitted");
        Self {
            plan: plan.tasks().to_vec(),
            outcomes,
            done,
        }
    }

    /// Tasks that have not reported an outcome yet.
    pub fn remaining(&self) -> usize {
        self.outcomes.borrow().iter().filter(|o| o.is_none()).count()
    }

    /// Wait until every task has fired its success or failure callback.
    pub async fn wait(&self) {
        while self.remaining() > 0 {
            self.done.notified().await;
        }
    }

    /// One report per plan task, in file order. Tasks without an outcome
    /// are reported as cancelled.
    pub fn reports(&self) -> Vec<TaskReport> {
        let outcomes = self.outcomes.borrow();
        self.plan
            .iter()
            .zip(outcomes.iter())
            .map(|(entry, outcome)| TaskReport {
                task_type: entry.task_type.clone(),
                name: entry.display_name().to_string(),
                outcome: outcome.clone().unwrap_or(Outcome::Cancelled),
            })
            .collect()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes
            .borrow()
            .iter()
            .filter(|o| matches!(o, Some(Outcome::Failed { .. })))
            .count()
    }
}
