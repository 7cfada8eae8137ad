// tests/ordering.rs

use std::error::Error;

use tasktree::{StartOptions, TaskState};
use tasktree_test_utils::{init_tracing, virtual_scheduler, virtual_scheduler_with, Recorder};

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn subtasks_run_in_append_order_and_drain_depth_first() -> TestResult {
    init_tracing();
    let (host, scheduler) = virtual_scheduler();
    let rec = Recorder::new();

    let run_rec = rec.clone();
    let done_rec = rec.clone();
    let root = scheduler.start(
        StartOptions::new("ordering", move |task| {
            run_rec.push("root");

            let r = run_rec.clone();
            task.next(move |task| {
                r.push("s1");
                let a = r.clone();
                task.next(move |_| {
                    a.push("s1.a");
                    Ok(())
                });
                let b = r.clone();
                task.next(move |_| {
                    b.push("s1.b");
                    Ok(())
                });
                Ok(())
            });

            let r = run_rec.clone();
            task.next(move |_| {
                r.push("s2");
                Ok(())
            });

            let r = run_rec.clone();
            task.next(move |_| {
                r.push("s3");
                Ok(())
            });
            Ok(())
        })
        .on_success(move |_| done_rec.push("done")),
    );

    // `start` only schedules the root; nothing runs until the host does.
    assert!(rec.events().is_empty());
    assert_eq!(root.state(), TaskState::Running);

    host.run_until_idle();

    assert_eq!(
        rec.events(),
        vec!["root", "s1", "s1.a", "s1.b", "s2", "s3", "done"]
    );
    assert_eq!(root.state(), TaskState::Done);
    assert!(scheduler.is_idle());
    Ok(())
}

#[test]
fn subtasks_inherit_name_unless_named() -> TestResult {
    init_tracing();
    let (host, scheduler) = virtual_scheduler();
    let rec = Recorder::new();

    let r = rec.clone();
    scheduler.start(
        StartOptions::new("names", move |task| {
            let a = r.clone();
            task.next(move |task| {
                a.push(task.name().to_string());
                Ok(())
            });
            let b = r.clone();
            task.next_named("custom", move |task| {
                b.push(task.name().to_string());
                Ok(())
            });
            Ok(())
        })
        .name("outer"),
    );
    host.run_until_idle();

    assert_eq!(rec.events(), vec!["outer", "custom"]);
    Ok(())
}

#[test]
fn long_synchronous_chain_yields_to_host_and_keeps_order() -> TestResult {
    init_tracing();
    let (host, scheduler) = virtual_scheduler();
    let rec = Recorder::new();

    let r = rec.clone();
    scheduler.start(StartOptions::new("chain", move |task| {
        for i in 0..200 {
            let r = r.clone();
            task.next(move |_| {
                r.push(i.to_string());
                Ok(())
            });
        }
        Ok(())
    }));

    let ran = host.run_until_idle();

    let expected: Vec<String> = (0..200).map(|i| i.to_string()).collect();
    assert_eq!(rec.events(), expected);
    // One callback for the launch, plus one per recursion-limit yield.
    assert!(ran > 5, "expected the chain to yield, host ran {ran} callbacks");
    assert!(scheduler.is_idle());
    Ok(())
}

#[test]
fn deep_nesting_completes_without_host_recursion() -> TestResult {
    use tasktree::{SchedulerConfig, Task};

    init_tracing();
    let (host, scheduler) = virtual_scheduler_with(SchedulerConfig::default().with_max_recursions(8));
    let rec = Recorder::new();

    fn nest(task: &Task, level: u32, rec: Recorder) {
        if level == 0 {
            rec.push("leaf");
            return;
        }
        task.next(move |task| {
            nest(task, level - 1, rec.clone());
            Ok(())
        });
    }

    let r = rec.clone();
    let done = rec.clone();
    scheduler.start(
        StartOptions::new("deep", move |task| {
            nest(task, 500, r.clone());
            Ok(())
        })
        .on_success(move |_| done.push("done")),
    );
    host.run_until_idle();

    assert_eq!(rec.events(), vec!["leaf", "done"]);
    assert_eq!(scheduler.task_count(), 0);
    Ok(())
}

#[test]
fn user_data_flows_to_subtasks() -> TestResult {
    init_tracing();
    let (host, scheduler) = virtual_scheduler();
    let rec = Recorder::new();

    let r = rec.clone();
    scheduler.start(StartOptions::new("data", move |task| {
        task.set_user_data(41_u32);
        let r1 = r.clone();
        task.next(move |task| {
            let value = task.user_data::<u32>().map(|v| *v).unwrap_or_default();
            r1.push(format!("first saw {value}"));
            task.set_user_data(value + 1);
            Ok(())
        });
        let r2 = r.clone();
        task.next(move |task| {
            let value = task.user_data::<u32>().map(|v| *v).unwrap_or_default();
            r2.push(format!("second saw {value}"));
            assert!(task.user_data::<String>().is_none());
            Ok(())
        });
        Ok(())
    }));
    host.run_until_idle();

    assert_eq!(rec.events(), vec!["first saw 41", "second saw 42"]);
    Ok(())
}

#[test]
fn cleared_user_data_is_not_passed_on() -> TestResult {
    init_tracing();
    let (host, scheduler) = virtual_scheduler();
    let rec = Recorder::new();

    let r = rec.clone();
    scheduler.start(StartOptions::new("data", move |task| {
        task.set_user_data(String::from("session"));
        task.clear_user_data();
        let r = r.clone();
        task.next(move |task| {
            r.push(format!("has data: {}", task.user_data::<String>().is_some()));
            Ok(())
        });
        Ok(())
    }));
    host.run_until_idle();

    assert_eq!(rec.events(), vec!["has data: false"]);
    Ok(())
}
