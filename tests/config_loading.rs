// tests/config_loading.rs

use std::io::Write;

use chrono::{TimeZone, Utc};
use tempfile::NamedTempFile;

use taskdag::config::{DEFAULT_JOB_MODEL, load_and_validate};
use taskdag::dag::TargetState;
use taskdag::errors::TaskdagError;

fn workflow_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", contents).unwrap();
    file
}

#[test]
fn loads_full_workflow() {
    let file = workflow_file(
        r#"
[workflow]
name = "nightly"
job_queue = true
parallel_jobs = 3
start_time = "2030-01-01T06:00:00Z"
interval_secs = 86400

[[job]]
name = "extract"
partitions = ["p0", "p1"]
timeout_secs = 600

[[job]]
name = "transform"
after = ["extract"]
job_model = "fixed-target"
max_tasks_per_instance = 2

[[job]]
name = "load"
after = ["transform"]
ignore_dependent_job_failure = true
"#,
    );

    let wf = load_and_validate(file.path()).unwrap();

    assert_eq!(wf.name, "nightly");
    assert!(wf.config.job_queue);
    assert_eq!(wf.config.parallel_jobs, 3);
    assert_eq!(
        wf.config.start_time,
        Some(Utc.with_ymd_and_hms(2030, 1, 1, 6, 0, 0).unwrap())
    );
    assert_eq!(wf.config.interval_secs, Some(86400));
    assert_eq!(wf.config.target_state, TargetState::Start);

    let order: Vec<&str> = wf.dag.all_nodes().collect();
    assert_eq!(order, vec!["extract", "transform", "load"]);
    assert_eq!(wf.dag.direct_parents("load"), vec!["transform"]);

    let extract = &wf.jobs["extract"];
    assert_eq!(extract.partitions, vec!["p0", "p1"]);
    assert_eq!(extract.job_model, DEFAULT_JOB_MODEL);
    assert_eq!(extract.timeout_secs, Some(600));
    assert_eq!(wf.jobs["transform"].job_model, "fixed-target");
    assert_eq!(wf.jobs["transform"].max_tasks_per_instance, Some(2));
    assert!(wf.jobs["load"].ignore_dependent_job_failure);
    assert_eq!(wf.resource_name("load"), "nightly_load");
}

#[test]
fn defaults_apply_to_minimal_workflow() {
    let file = workflow_file(
        r#"
[workflow]
name = "tiny"
target_state = "stop"

[[job]]
name = "only"
"#,
    );

    let wf = load_and_validate(file.path()).unwrap();
    assert!(!wf.config.job_queue);
    assert_eq!(wf.config.parallel_jobs, 1);
    assert_eq!(wf.config.start_time, None);
    assert_eq!(wf.config.target_state, TargetState::Stop);
    assert!(wf.jobs["only"].partitions.is_empty());
}

#[test]
fn start_time_accepts_native_toml_datetime() {
    let file = workflow_file(
        r#"
[workflow]
name = "dated"
start_time = 2030-01-01T06:00:00+02:00

[[job]]
name = "only"
"#,
    );

    let wf = load_and_validate(file.path()).unwrap();
    assert_eq!(
        wf.config.start_time,
        Some(Utc.with_ymd_and_hms(2030, 1, 1, 4, 0, 0).unwrap())
    );
}

#[test]
fn start_time_without_offset_is_rejected() {
    let file = workflow_file(
        r#"
[workflow]
name = "dated"
start_time = "2030-01-01 06:00"

[[job]]
name = "only"
"#,
    );

    let err = load_and_validate(file.path()).unwrap_err();
    assert!(matches!(err, TaskdagError::TomlError(_)), "got {err:?}");
}

#[test]
fn dag_cycle_returns_structured_error() {
    let file = workflow_file(
        r#"
[workflow]
name = "loop"

[[job]]
name = "A"
after = ["B"]

[[job]]
name = "B"
after = ["A"]
"#,
    );

    match load_and_validate(file.path()) {
        Err(TaskdagError::CyclicDependency(msg)) => {
            assert!(msg.contains("cycle detected"));
            assert!(msg.contains("A") || msg.contains("B"));
        }
        Err(e) => panic!("Expected CyclicDependency error, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn self_dependency_is_a_cycle() {
    let file = workflow_file(
        r#"
[workflow]
name = "selfish"

[[job]]
name = "A"
after = ["A"]
"#,
    );

    assert!(matches!(
        load_and_validate(file.path()),
        Err(TaskdagError::CyclicDependency(_))
    ));
}

#[test]
fn unknown_dependency_is_reported() {
    let file = workflow_file(
        r#"
[workflow]
name = "wf"

[[job]]
name = "A"
after = ["NonExistent"]
"#,
    );

    match load_and_validate(file.path()) {
        Err(TaskdagError::UnknownDependency { job, parent }) => {
            assert_eq!(job, "A");
            assert_eq!(parent, "NonExistent");
        }
        Err(e) => panic!("Expected UnknownDependency, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn zero_parallel_jobs_is_rejected() {
    let file = workflow_file(
        r#"
[workflow]
name = "wf"
job_queue = true
parallel_jobs = 0

[[job]]
name = "A"
"#,
    );

    match load_and_validate(file.path()) {
        Err(TaskdagError::ConfigError(msg)) => assert!(msg.contains("parallel_jobs")),
        other => panic!("Expected ConfigError, got: {:?}", other),
    }
}

#[test]
fn duplicate_job_is_rejected() {
    let file = workflow_file(
        r#"
[workflow]
name = "wf"

[[job]]
name = "A"

[[job]]
name = "A"
"#,
    );

    match load_and_validate(file.path()) {
        Err(TaskdagError::ConfigError(msg)) => assert!(msg.contains("more than once")),
        other => panic!("Expected ConfigError, got: {:?}", other),
    }
}

#[test]
fn workflow_without_jobs_is_rejected() {
    let file = workflow_file(
        r#"
[workflow]
name = "empty"
"#,
    );

    assert!(matches!(
        load_and_validate(file.path()),
        Err(TaskdagError::ConfigError(_))
    ));
}

#[test]
fn malformed_toml_is_a_toml_error() {
    let file = workflow_file("[workflow\nname = ");
    assert!(matches!(
        load_and_validate(file.path()),
        Err(TaskdagError::TomlError(_))
    ));
}

#[test]
fn missing_file_is_an_io_error() {
    assert!(matches!(
        load_and_validate("/definitely/not/here.toml"),
        Err(TaskdagError::IoError(_))
    ));
}
