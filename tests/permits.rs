// tests/permits.rs

use std::error::Error;
use std::time::Duration;

use proptest::prelude::*;
use tasktree::{Host, StartOptions, Task, TaskState};
use tasktree_test_utils::{init_tracing, virtual_scheduler, Recorder};

type TestResult = Result<(), Box<dyn Error>>;

/// Root that takes `permits` and records "resumed" once it continues.
fn blocking_root(permits: u32, rec: &Recorder) -> StartOptions {
    let rec = rec.clone();
    StartOptions::new("permits", move |task| {
        let r = rec.clone();
        task.next(move |_| {
            r.push("resumed");
            Ok(())
        });
        task.block(permits);
        Ok(())
    })
}

#[test]
fn resumes_only_after_the_last_of_two_releases() -> TestResult {
    init_tracing();
    let (host, scheduler) = virtual_scheduler();
    let rec = Recorder::new();

    let cb = rec.clone();
    let root = scheduler.start(blocking_root(2, &rec).on_success(move |_| cb.push("success")));
    host.run_pending();

    assert_eq!(root.state(), TaskState::Blocked);
    assert_eq!(root.blocks(), 2);

    let first = root.clone();
    host.set_timer(
        Duration::from_millis(5),
        Box::new(move || {
            first.unblock(1);
        }),
    );
    let second = root.clone();
    host.set_timer(
        Duration::from_millis(10),
        Box::new(move || {
            second.unblock(1);
        }),
    );

    host.advance(Duration::from_millis(5));
    assert!(!rec.contains("resumed"));
    assert_eq!(root.blocks(), 1);
    assert_eq!(root.state(), TaskState::Blocked);

    host.advance(Duration::from_millis(5));
    assert_eq!(rec.events(), vec!["resumed", "success"]);

    // Extra releases are tolerated and change nothing.
    assert_eq!(root.unblock(1), 0);
    assert_eq!(rec.count("resumed"), 1);
    Ok(())
}

#[test]
fn one_release_may_cover_several_permits() -> TestResult {
    init_tracing();
    let (host, scheduler) = virtual_scheduler();
    let rec = Recorder::new();

    let root = scheduler.start(blocking_root(3, &rec));
    host.run_pending();

    assert_eq!(root.unblock(5), 0);
    assert_eq!(rec.events(), vec!["resumed"]);
    Ok(())
}

#[test]
fn release_inside_own_action_does_not_advance_twice() -> TestResult {
    init_tracing();
    let (host, scheduler) = virtual_scheduler();
    let rec = Recorder::new();

    let r = rec.clone();
    let cb = rec.clone();
    scheduler.start(
        StartOptions::new("inline", move |task| {
            let r = r.clone();
            task.next(move |_| {
                r.push("next");
                Ok(())
            });
            task.block(1);
            task.unblock(1);
            assert_eq!(task.state(), TaskState::Running);
            Ok(())
        })
        .on_success(move |_| cb.push("success")),
    );
    host.run_until_idle();

    assert_eq!(rec.events(), vec!["next", "success"]);
    Ok(())
}

#[test]
fn block_zero_does_not_suspend() -> TestResult {
    init_tracing();
    let (host, scheduler) = virtual_scheduler();
    let rec = Recorder::new();

    let root = scheduler.start(blocking_root(0, &rec));
    host.run_until_idle();

    assert_eq!(rec.events(), vec!["resumed"]);
    assert_eq!(root.state(), TaskState::Done);
    Ok(())
}

#[test]
fn blocked_subtask_holds_back_its_siblings() -> TestResult {
    init_tracing();
    let (host, scheduler) = virtual_scheduler();
    let rec = Recorder::new();
    let slot: std::rc::Rc<std::cell::RefCell<Option<Task>>> = Default::default();

    let r = rec.clone();
    let s = slot.clone();
    scheduler.start(StartOptions::new("siblings", move |task| {
        let s = s.clone();
        task.next(move |task| {
            task.block(1);
            *s.borrow_mut() = Some(task.clone());
            Ok(())
        });
        let r = r.clone();
        task.next(move |_| {
            r.push("sibling");
            Ok(())
        });
        Ok(())
    }));
    host.run_until_idle();
    assert!(rec.events().is_empty());

    let blocked = slot.borrow_mut().take().ok_or("subtask never ran")?;
    assert_eq!(blocked.state(), TaskState::Blocked);
    blocked.unblock(1);

    assert_eq!(rec.events(), vec!["sibling"]);
    assert!(scheduler.is_idle());
    Ok(())
}

/// Root that records its action and one subtask, for permits taken
/// before the action runs.
fn recording_root(label: &'static str, rec: &Recorder) -> StartOptions {
    let rec = rec.clone();
    StartOptions::new("permits", move |task| {
        rec.push(format!("{label}:action"));
        let r = rec.clone();
        task.next(move |_| {
            r.push(format!("{label}:subtask"));
            Ok(())
        });
        Ok(())
    })
}

#[test]
fn permits_taken_while_parked_hold_the_task_after_launch() -> TestResult {
    init_tracing();
    let (host, scheduler) = virtual_scheduler();
    let rec = Recorder::new();

    let head = scheduler.start(StartOptions::new("permits", |task| {
        task.block(1);
        Ok(())
    }));
    let parked = scheduler.start(recording_root("parked", &rec));
    host.run_until_idle();

    parked.block(1);
    assert_eq!(parked.state(), TaskState::Ready);
    assert_eq!(parked.blocks(), 1);

    head.unblock(1);
    host.run_until_idle();

    assert_eq!(rec.events(), vec!["parked:action"]);
    assert_eq!(parked.state(), TaskState::Blocked);
    assert_eq!(parked.blocks(), 1);

    parked.unblock(1);
    host.run_until_idle();

    assert_eq!(rec.events(), vec!["parked:action", "parked:subtask"]);
    assert_eq!(parked.state(), TaskState::Done);
    assert!(scheduler.is_idle());
    Ok(())
}

#[test]
fn block_before_first_run_still_runs_the_action_once() -> TestResult {
    init_tracing();
    let (host, scheduler) = virtual_scheduler();
    let rec = Recorder::new();

    let root = scheduler.start(recording_root("early", &rec));
    root.block(1);
    assert_eq!(root.state(), TaskState::Blocked);

    host.run_until_idle();
    assert_eq!(rec.events(), vec!["early:action"]);
    assert_eq!(root.state(), TaskState::Blocked);

    root.unblock(1);
    host.run_until_idle();

    assert_eq!(rec.events(), vec!["early:action", "early:subtask"]);
    assert!(scheduler.is_idle());
    Ok(())
}

proptest! {
    #[test]
    fn resumes_exactly_once_when_releases_cover_permits(
        permits in 1u32..8,
        releases in proptest::collection::vec(0u32..4, 1..16),
    ) {
        let (host, scheduler) = virtual_scheduler();
        let rec = Recorder::new();

        let root = scheduler.start(blocking_root(permits, &rec));
        host.run_pending();
        prop_assert_eq!(root.state(), TaskState::Blocked);

        let mut released = 0u32;
        for k in releases {
            let remaining = root.unblock(k);
            released = released.saturating_add(k);

            prop_assert_eq!(remaining, permits.saturating_sub(released));
            let expected = usize::from(released >= permits);
            prop_assert_eq!(rec.count("resumed"), expected);
        }
    }
}
