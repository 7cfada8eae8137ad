// src/lib.rs

//! Cooperative, single-threaded scheduler for trees of tasks.
//!
//! A root task is started under a *type*; roots of the same type run one at
//! a time in submission order. Inside its action a task appends subtasks
//! ([`Task::next`]), fans out ([`Task::parallel`]), suspends
//! ([`Task::block`], [`Task::sleep`]) or fails ([`Task::fail`],
//! [`Task::fail_to`]). Long synchronous chains periodically yield back to
//! the [`Host`](host::Host) so they never monopolize it.
//!
//! ```no_run
//! use std::rc::Rc;
//! use tasktree::{EventLoop, Scheduler, SchedulerConfig, StartOptions};
//!
//! let host = Rc::new(EventLoop::virtual_clock());
//! let scheduler = Scheduler::new(SchedulerConfig::default(), host.clone());
//! scheduler.start(
//!     StartOptions::new("sync", |task| {
//!         task.next(|_| Ok(()));
//!         Ok(())
//!     })
//!     .on_success(|_| println!("synced")),
//! );
//! host.run_until_idle();
//! ```

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod host;
pub mod logging;
pub mod plan;
pub mod task;
pub mod types;

pub use config::SchedulerConfig;
pub use engine::{Scheduler, StartOptions, TaskSnapshot};
pub use host::{EventLoop, Host, TokioHost};
pub use task::{action, Condition, Task, TaskState};
pub use types::{TaskId, TaskType};

use std::rc::Rc;

use anyhow::{bail, Context, Result};
use tokio::task::LocalSet;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::{PlanFile, Step};
use crate::plan::{Outcome, PlanRun, TaskReport};

/// High-level entry point used by `main.rs`.
///
/// Loads the plan, runs it on a [`TokioHost`] inside a `LocalSet`, prints
/// a summary, and fails if any task failed.
pub async fn run(args: CliArgs) -> Result<()> {
    let plan = load_and_validate(&args.plan)
        .with_context(|| format!("failed to load plan '{}'", args.plan.display()))?;

    if args.dry_run {
        print_dry_run(&plan);
        return Ok(());
    }

    let reports = LocalSet::new().run_until(run_plan(&plan)).await?;
    print_summary(&reports);

    let failed = reports
        .iter()
        .filter(|r| matches!(r.outcome, Outcome::Failed { .. }))
        .count();
    if failed > 0 {
        bail!("{failed} of {} task(s) failed", reports.len());
    }
    Ok(())
}

/// Run `plan` to completion (or until Ctrl-C). Must be called inside a
/// `LocalSet`.
pub async fn run_plan(plan: &PlanFile) -> Result<Vec<TaskReport>> {
    let host = Rc::new(TokioHost::new());
    let scheduler = Scheduler::new(*plan.scheduler(), host);
    let run = PlanRun::submit(&scheduler, plan);

    tokio::select! {
        () = run.wait() => {
            info!("all plan tasks finished");
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            warn!("interrupted; cancelling queued tasks");
            for task_type in plan.task_types() {
                let dropped = scheduler.cancel(task_type);
                debug!(task_type, dropped, "queue truncated");
            }
        }
    }

    Ok(run.reports())
}

fn print_summary(reports: &[TaskReport]) {
    println!("tasktree summary");
    for report in reports {
        println!(
            "  [{}] {}: {}",
            report.task_type, report.name, report.outcome
        );
    }
}

/// Print the plan without running it.
fn print_dry_run(plan: &PlanFile) {
    println!("tasktree dry-run");
    println!("  scheduler.max_recursions = {}", plan.scheduler().max_recursions);
    println!("  scheduler.time_slice_ms = {}", plan.scheduler().time_slice_ms);
    println!();

    println!("tasks ({}):", plan.tasks().len());
    for task in plan.tasks() {
        println!("  - {} (type: {})", task.display_name(), task.task_type);
        print_steps(&task.steps, 3);
    }

    debug!("dry-run complete (no execution)");
}

fn print_steps(steps: &[Step], indent: usize) {
    let pad = "  ".repeat(indent);
    for step in steps {
        match step {
            Step::Log(msg) | Step::Fail(msg) | Step::AbortGroup(msg) => {
                println!("{pad}{}: {msg}", step.kind());
            }
            Step::SleepMs(ms) => println!("{pad}sleep_ms: {ms}"),
            Step::Group(children) => {
                println!("{pad}group:");
                print_steps(children, indent + 1);
            }
            Step::Parallel(branches) => {
                println!("{pad}parallel ({} branches):", branches.len());
                for (i, branch) in branches.iter().enumerate() {
                    println!("{pad}  branch {i}:");
                    print_steps(branch, indent + 2);
                }
            }
        }
    }
}
