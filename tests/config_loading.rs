// tests/config_loading.rs

use std::error::Error;
use std::io::Write;

use tasktree::config::{load_and_validate, load_from_path, PlanFile, Step};
use tasktree::errors::TasktreeError;
use tasktree_test_utils::builders::{PlanBuilder, PlanTaskBuilder};
use tempfile::NamedTempFile;

type TestResult = Result<(), Box<dyn Error>>;

fn plan_file(contents: &str) -> Result<NamedTempFile, Box<dyn Error>> {
    let mut file = NamedTempFile::new()?;
    write!(file, "{contents}")?;
    Ok(file)
}

fn expect_config_error(contents: &str, needle: &str) -> TestResult {
    let file = plan_file(contents)?;
    match load_and_validate(file.path()) {
        Err(TasktreeError::ConfigError(msg)) => {
            assert!(msg.contains(needle), "unexpected message: {msg}");
            Ok(())
        }
        Err(e) => Err(format!("expected ConfigError, got: {e:?}").into()),
        Ok(_) => Err("expected error, got Ok".into()),
    }
}

#[test]
fn full_plan_parses_with_every_step_kind() -> TestResult {
    let file = plan_file(
        r#"
[scheduler]
max_recursions = 10
time_slice_ms = 5

[[task]]
type = "sync"
name = "fetch"
steps = [
  { log = "fetching" },
  { sleep_ms = 50 },
  { group = [{ log = "inner" }, { abort_group = "give up" }] },
  { parallel = [[{ log = "a" }], [{ sleep_ms = 5 }, { log = "b" }]] },
  { fail = "boom" },
]

[[task]]
type = "sync"
"#,
    )?;

    let plan = load_and_validate(file.path())?;

    assert_eq!(plan.scheduler().max_recursions, 10);
    assert_eq!(plan.scheduler().time_slice_ms, 5);
    assert_eq!(plan.tasks().len(), 2);

    let fetch = &plan.tasks()[0];
    assert_eq!(fetch.task_type, "sync");
    assert_eq!(fetch.display_name(), "fetch");
    let kinds: Vec<&str> = fetch.steps.iter().map(Step::kind).collect();
    assert_eq!(kinds, vec!["log", "sleep_ms", "group", "parallel", "fail"]);
    assert_eq!(
        fetch.steps[2],
        Step::Group(vec![
            Step::Log("inner".to_string()),
            Step::AbortGroup("give up".to_string()),
        ])
    );

    let bare = &plan.tasks()[1];
    assert_eq!(bare.display_name(), "sync");
    assert!(bare.steps.is_empty());
    assert_eq!(plan.task_types(), vec!["sync"]);
    Ok(())
}

#[test]
fn scheduler_section_is_optional() -> TestResult {
    let file = plan_file(
        r#"
[[task]]
type = "only"
steps = [{ log = "hi" }]
"#,
    )?;

    let raw = load_from_path(file.path())?;
    assert_eq!(raw.scheduler.max_recursions, 30);
    assert_eq!(raw.scheduler.time_slice_ms, 20);

    let plan = PlanFile::try_from(raw)?;
    assert_eq!(plan.tasks().len(), 1);
    Ok(())
}

#[test]
fn empty_plan_is_rejected() -> TestResult {
    expect_config_error("", "at least one [[task]]")
}

#[test]
fn empty_type_is_rejected() -> TestResult {
    expect_config_error(
        r#"
[[task]]
type = "  "
"#,
        "empty `type`",
    )
}

#[test]
fn zero_tuning_values_are_rejected() -> TestResult {
    expect_config_error(
        r#"
[scheduler]
max_recursions = 0

[[task]]
type = "t"
"#,
        "max_recursions",
    )?;
    expect_config_error(
        r#"
[scheduler]
time_slice_ms = 0

[[task]]
type = "t"
"#,
        "time_slice_ms",
    )
}

#[test]
fn abort_group_outside_a_group_is_rejected() -> TestResult {
    expect_config_error(
        r#"
[[task]]
type = "t"
steps = [{ abort_group = "nowhere to go" }]
"#,
        "only allowed inside a `group`",
    )?;

    // A parallel branch is its own root, even inside a group.
    expect_config_error(
        r#"
[[task]]
type = "t"
steps = [{ group = [{ parallel = [[{ abort_group = "x" }]] }] }]
"#,
        "only allowed inside a `group`",
    )
}

#[test]
fn empty_group_and_parallel_are_rejected() -> TestResult {
    expect_config_error(
        r#"
[[task]]
type = "t"
steps = [{ group = [] }]
"#,
        "`group` must contain",
    )?;
    expect_config_error(
        r#"
[[task]]
type = "t"
steps = [{ parallel = [] }]
"#,
        "`parallel` must contain",
    )
}

#[test]
fn unknown_step_is_a_toml_error() -> TestResult {
    let file = plan_file(
        r#"
[[task]]
type = "t"
steps = [{ shell = "rm -rf /" }]
"#,
    )?;

    match load_and_validate(file.path()) {
        Err(TasktreeError::TomlError(_)) => Ok(()),
        other => Err(format!("expected TomlError, got: {other:?}").into()),
    }
}

#[test]
fn missing_file_is_an_io_error() -> TestResult {
    let dir = tempfile::tempdir()?;
    match load_and_validate(dir.path().join("missing.toml")) {
        Err(TasktreeError::IoError(_)) => Ok(()),
        other => Err(format!("expected IoError, got: {other:?}").into()),
    }
}

#[test]
fn builders_produce_valid_plans() -> TestResult {
    let plan = PlanBuilder::new()
        .time_slice_ms(7)
        .with_task(PlanTaskBuilder::new("a").name("first").log("hello").build())
        .with_task(PlanTaskBuilder::new("b").sleep_ms(1).build())
        .build();

    assert_eq!(plan.scheduler().time_slice_ms, 7);
    assert_eq!(plan.task_types(), vec!["a", "b"]);

    let invalid = PlanBuilder::new().max_recursions(0).raw();
    assert!(PlanFile::try_from(invalid).is_err());
    Ok(())
}
