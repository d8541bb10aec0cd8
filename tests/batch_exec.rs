// tests/batch_exec.rs

//! Batch backend against a queue faked with shell commands: the submit
//! template runs the job inline and prints a queue id, the status template
//! prints a terminal state.

#![cfg(unix)]

use std::path::Path;

use dagrun::cli::CliArgs;
use dagrun::report::{RunOutcome, RunReport};
use dagrun_test_utils::{init_tracing, with_timeout};

async fn run(config: &Path, targets: &[String]) -> dagrun::errors::Result<RunReport> {
    let args = CliArgs {
        targets: targets.to_vec(),
        config: config.to_str().unwrap().to_string(),
        max_jobs: None,
        dry_run: false,
        log_level: None,
    };
    let report = with_timeout(dagrun::run(args)).await?;
    Ok(report.expect("not a dry run"))
}

fn write_config(dir: &Path, contents: &str) -> std::path::PathBuf {
    let path = dir.join("Dagrun.toml");
    std::fs::write(&path, contents).unwrap();
    path
}

#[tokio::test]
async fn submitted_chain_completes_through_status_polling() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_str().unwrap();

    let config = write_config(
        dir.path(),
        &format!(
            r#"
[config]
backend = "batch"

[batch]
submit_cmd = "{{cmd}} && echo q1"
status_cmd = "echo COMPLETED"
poll_interval_ms = 10

[rule.gen]
output = ["{root}/a.txt"]
cmd = "printf hello > {{output}}"

[rule.copy]
input = ["{root}/a.txt"]
output = ["{root}/b.txt"]
cmd = "cp {{input}} {{output}}"
"#
        ),
    );

    let target = format!("{root}/b.txt");
    let report = run(&config, &[target.clone()]).await.unwrap();

    assert_eq!(report.outcome(), RunOutcome::Success);
    assert_eq!(report.done.len(), 2);
    assert_eq!(std::fs::read_to_string(&target).unwrap(), "hello");
}

#[tokio::test]
async fn unreachable_queue_surfaces_a_submission_error() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_str().unwrap();

    let config = write_config(
        dir.path(),
        &format!(
            r#"
[config]
backend = "batch"
retries = 3

[batch]
submit_cmd = "exit 1"
status_cmd = "echo COMPLETED"
max_submit_attempts = 2
submit_backoff_ms = 5
poll_interval_ms = 10

[rule.gen]
output = ["{root}/a.txt"]
cmd = "true"
"#
        ),
    );

    let report = run(&config, &[format!("{root}/a.txt")]).await.unwrap();
    assert_eq!(report.outcome(), RunOutcome::PartialFailure);
    assert_eq!(report.failed.len(), 1);

    // The backend retried internally; the job itself was attempted once.
    assert_eq!(report.failed[0].attempts, 1);
    let error = report.failed[0].error.as_deref().unwrap();
    assert!(error.contains("submission failed"), "got: {error}");
}

#[tokio::test]
async fn queue_reported_failure_is_a_job_failure() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_str().unwrap();

    let config = write_config(
        dir.path(),
        &format!(
            r#"
[config]
backend = "batch"

[batch]
submit_cmd = "echo q7"
status_cmd = "echo FAILED"
poll_interval_ms = 10

[rule.gen]
output = ["{root}/a.txt"]
cmd = "true"
"#
        ),
    );

    let report = run(&config, &[format!("{root}/a.txt")]).await.unwrap();
    assert_eq!(report.outcome(), RunOutcome::PartialFailure);
    assert_eq!(report.failed.len(), 1);
    let error = report.failed[0].error.as_deref().unwrap();
    assert!(error.contains("exit code 1"), "got: {error}");
}
