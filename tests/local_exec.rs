// tests/local_exec.rs

//! End-to-end runs through `dagrun::run`: real config files, real shell
//! commands, real output files.

#![cfg(unix)]

use std::path::Path;

use dagrun::cli::CliArgs;
use dagrun::report::{RunOutcome, RunReport};
use dagrun_test_utils::{init_tracing, with_timeout};

fn args(config: &Path, targets: &[String]) -> CliArgs {
    CliArgs {
        targets: targets.to_vec(),
        config: config.to_str().unwrap().to_string(),
        max_jobs: None,
        dry_run: false,
        log_level: None,
    }
}

async fn run(config: &Path, targets: &[String]) -> dagrun::errors::Result<RunReport> {
    let report = with_timeout(dagrun::run(args(config, targets))).await?;
    Ok(report.expect("not a dry run"))
}

fn write_config(dir: &Path, contents: &str) -> std::path::PathBuf {
    let path = dir.join("Dagrun.toml");
    std::fs::write(&path, contents).unwrap();
    path
}

#[tokio::test]
async fn chain_of_shell_commands_produces_the_target() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_str().unwrap();

    let config = write_config(
        dir.path(),
        &format!(
            r#"
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

    // Everything is fresh now; a second run does no work.
    let report = run(&config, &[target]).await.unwrap();
    assert_eq!(report.outcome(), RunOutcome::Success);
    assert_eq!(report.skipped.len(), 2);
    assert!(report.done.is_empty());
}

#[tokio::test]
async fn failing_command_surfaces_its_exit_code() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_str().unwrap();

    let config = write_config(
        dir.path(),
        &format!(
            r#"
[rule.boom]
output = ["{root}/boom.txt"]
cmd = "exit 7"
"#
        ),
    );

    let report = run(&config, &[format!("{root}/boom.txt")]).await.unwrap();
    assert_eq!(report.outcome(), RunOutcome::PartialFailure);
    assert_eq!(report.failed.len(), 1);
    let error = report.failed[0].error.as_deref().unwrap();
    assert!(error.contains("exit code 7"), "got: {error}");
}

#[tokio::test]
async fn zero_exit_without_declared_output_is_reported_missing() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_str().unwrap();

    // The command succeeds but never writes its declared output. Zero wait
    // keeps the test fast.
    let config = write_config(
        dir.path(),
        &format!(
            r#"
[config]
output_wait_secs = 0

[rule.ghost]
output = ["{root}/ghost.txt"]
cmd = "true"
"#
        ),
    );

    let report = run(&config, &[format!("{root}/ghost.txt")]).await.unwrap();
    assert_eq!(report.outcome(), RunOutcome::PartialFailure);
    let error = report.failed[0].error.as_deref().unwrap();
    assert!(error.contains("missing"), "got: {error}");
    assert!(error.contains("ghost.txt"), "got: {error}");
}

#[tokio::test]
async fn dry_run_plans_but_executes_nothing() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_str().unwrap();

    let config = write_config(
        dir.path(),
        &format!(
            r#"
[rule.gen]
output = ["{root}/a.txt"]
cmd = "printf hello > {{output}}"
"#
        ),
    );

    let mut cli = args(&config, &[format!("{root}/a.txt")]);
    cli.dry_run = true;
    let report = with_timeout(dagrun::run(cli)).await.unwrap();

    // No report on a dry run: nothing executed, so there is nothing to print.
    assert!(report.is_none());
    assert!(!dir.path().join("a.txt").exists());
}

#[tokio::test]
async fn hash_staleness_reruns_on_content_change_only() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_str().unwrap();
    let input = dir.path().join("in.txt");
    std::fs::write(&input, "v1").unwrap();

    let config = write_config(
        dir.path(),
        &format!(
            r#"
[config]
staleness = "hash"

[rule.copy]
input = ["{root}/in.txt"]
output = ["{root}/out.txt"]
cmd = "cp {{input}} {{output}}"
"#
        ),
    );
    let target = format!("{root}/out.txt");

    let report = run(&config, &[target.clone()]).await.unwrap();
    assert_eq!(report.done.len(), 1);
    // The input hash was recorded next to the workflow file.
    assert!(dir.path().join(".dagrun/hashes").is_file());

    // Same content: skipped, regardless of timestamps.
    let report = run(&config, &[target.clone()]).await.unwrap();
    assert_eq!(report.skipped.len(), 1);

    // Changed content: reruns and propagates it.
    std::fs::write(&input, "v2").unwrap();
    let report = run(&config, &[target.clone()]).await.unwrap();
    assert_eq!(report.done.len(), 1);
    assert_eq!(std::fs::read_to_string(&target).unwrap(), "v2");
}

#[tokio::test]
async fn max_jobs_override_applies() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_str().unwrap();

    let config = write_config(
        dir.path(),
        &format!(
            r#"
[config]
max_jobs = 4

[rule.one]
output = ["{root}/one.txt"]
cmd = "printf 1 > {{output}}"

[rule.two]
output = ["{root}/two.txt"]
cmd = "printf 2 > {{output}}"
"#
        ),
    );

    let mut cli = args(
        &config,
        &[format!("{root}/one.txt"), format!("{root}/two.txt")],
    );
    cli.max_jobs = Some(1);
    let report = with_timeout(dagrun::run(cli)).await.unwrap().unwrap();
    assert_eq!(report.done.len(), 2);
}
