// tests/lifecycle.rs

use std::cell::Cell;
use std::error::Error;
use std::rc::Rc;

use tasktree::{StartOptions, TaskState, TaskType};
use tasktree_test_utils::{init_tracing, virtual_scheduler, Recorder};

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn stopped_task_resumes_by_rerunning_its_action() -> TestResult {
    init_tracing();
    let (host, scheduler) = virtual_scheduler();
    let rec = Recorder::new();
    let stopped: Rc<std::cell::RefCell<Option<tasktree::Task>>> = Rc::default();

    let r = rec.clone();
    let slot = stopped.clone();
    scheduler.start(StartOptions::new("stoppable", move |task| {
        let runs = Rc::new(Cell::new(0));
        let r1 = r.clone();
        let slot = slot.clone();
        task.next(move |task| {
            runs.set(runs.get() + 1);
            r1.push(format!("run {}", runs.get()));
            if runs.get() == 1 {
                task.stop();
                *slot.borrow_mut() = Some(task.clone());
            }
            Ok(())
        });
        let r2 = r.clone();
        task.next(move |_| {
            r2.push("after");
            Ok(())
        });
        Ok(())
    }));
    host.run_until_idle();

    assert_eq!(rec.events(), vec!["run 1"]);
    let task = stopped.borrow_mut().take().ok_or("subtask never stopped")?;
    assert_eq!(task.state(), TaskState::Ready);

    task.start();
    host.run_until_idle();

    assert_eq!(rec.events(), vec!["run 1", "run 2", "after"]);
    assert!(scheduler.is_idle());
    Ok(())
}

#[test]
fn starting_a_parked_root_does_not_jump_the_queue() -> TestResult {
    init_tracing();
    let (host, scheduler) = virtual_scheduler();
    let rec = Recorder::new();

    let r = rec.clone();
    let head = scheduler.start(StartOptions::new("queue", move |task| {
        r.push("head");
        task.block(1);
        Ok(())
    }));
    let r = rec.clone();
    let parked = scheduler.start(StartOptions::new("queue", move |_| {
        r.push("parked");
        Ok(())
    }));
    host.run_pending();

    parked.start();
    host.run_pending();
    assert_eq!(rec.events(), vec!["head"]);
    assert_eq!(parked.state(), TaskState::Ready);

    head.unblock(1);
    host.run_until_idle();
    assert_eq!(rec.events(), vec!["head", "parked"]);
    Ok(())
}

#[test]
fn root_stopped_before_its_first_run_starts_later() -> TestResult {
    init_tracing();
    let (host, scheduler) = virtual_scheduler();
    let rec = Recorder::new();

    let r = rec.clone();
    let root = scheduler.start(StartOptions::new("late", move |_| {
        r.push("ran");
        Ok(())
    }));
    root.stop();
    host.run_until_idle();

    assert!(rec.events().is_empty());
    assert_eq!(root.state(), TaskState::Ready);

    root.start();
    host.run_until_idle();

    assert_eq!(rec.events(), vec!["ran"]);
    assert_eq!(root.state(), TaskState::Done);
    assert!(scheduler.is_idle());
    Ok(())
}

#[test]
fn schedulers_are_independent() -> TestResult {
    init_tracing();
    let (host_a, scheduler_a) = virtual_scheduler();
    let (host_b, scheduler_b) = virtual_scheduler();

    let a = scheduler_a.start(StartOptions::new("same", |task| {
        task.block(1);
        Ok(())
    }));
    let b = scheduler_b.start(StartOptions::new("same", |_| Ok(())));

    // Ids are per scheduler, and type queues are not shared.
    assert_eq!(a.id(), b.id());
    host_a.run_pending();
    host_b.run_pending();

    assert_eq!(a.state(), TaskState::Blocked);
    assert_eq!(b.state(), TaskState::Done);
    assert_eq!(scheduler_a.queue_len(&TaskType::named("same")), 1);
    assert_eq!(scheduler_b.queue_len(&TaskType::named("same")), 0);
    Ok(())
}

#[test]
fn ids_increase_in_creation_order() -> TestResult {
    init_tracing();
    let (host, scheduler) = virtual_scheduler();

    let first = scheduler.start(StartOptions::new("ids", |task| {
        task.next(|_| Ok(()));
        Ok(())
    }));
    let second = scheduler.start(StartOptions::new("other", |_| Ok(())));
    assert!(first.id() < second.id());

    host.run_pending();
    let third = scheduler.start(StartOptions::new("ids", |_| Ok(())));
    // The subtask created by `first` took the id in between.
    assert_eq!(third.id().get(), second.id().get() + 2);
    Ok(())
}

#[test]
fn snapshots_describe_live_tasks() -> TestResult {
    init_tracing();
    let (host, scheduler) = virtual_scheduler();

    let root = scheduler.start(
        StartOptions::new("snap", |task| {
            task.next_named("child", |task| {
                task.block(2);
                Ok(())
            });
            task.next(|_| Ok(()));
            Ok(())
        })
        .name("parent"),
    );
    host.run_pending();

    let tasks = scheduler.tasks();
    assert_eq!(tasks.len(), 3);
    assert_eq!(tasks[0].id, root.id());
    assert!(tasks[0].root);
    assert_eq!(tasks[0].pending_subtasks, 1);

    let child = tasks
        .iter()
        .find(|t| t.name == "child")
        .ok_or("child missing from snapshot")?;
    assert_eq!(child.state, TaskState::Blocked);
    assert_eq!(child.blocks, 2);
    assert!(!child.root);
    assert_eq!(child.task_type, TaskType::named("snap"));
    Ok(())
}

#[test]
fn operations_after_the_scheduler_is_gone_are_ignored() -> TestResult {
    init_tracing();
    let (host, scheduler) = virtual_scheduler();

    let root = scheduler.start(StartOptions::new("gone", |_| Ok(())));
    host.run_until_idle();
    drop(scheduler);

    assert!(root.scheduler().is_err());
    root.next(|_| panic!("must never run"));
    assert_eq!(root.pending_subtasks(), 0);
    host.run_until_idle();
    Ok(())
}
