// tests/cancel_exec.rs

//! Abort behaviour against the real backends: a running local process must
//! actually die, and a submitted batch job must be cancelled through the
//! configured `cancel_cmd`.

#![cfg(unix)]

use std::path::Path;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;

use dagrun::config::{BackendKind, BatchSection, Workflow};
use dagrun::dag::Scheduler;
use dagrun::engine::{CoreRuntime, Runtime, RuntimeEvent, RuntimeOptions};
use dagrun::exec::{BatchExecutor, BatchOptions, LocalExecutor};
use dagrun::ledger::ResourceLedger;
use dagrun::plan::{build_plan, RuleSet};
use dagrun::report::{RunOutcome, RunReport};
use dagrun_test_utils::{init_tracing, with_timeout, RuleBuilder, WorkflowBuilder};

fn make_core(workflow: &Workflow, targets: &[String]) -> CoreRuntime {
    let rules = RuleSet::from_workflow(workflow).unwrap();
    let table = build_plan(&rules, &workflow.params, targets).unwrap();
    let ledger = ResourceLedger::from_profile(&workflow.profile, workflow.config.max_jobs);
    let options = RuntimeOptions {
        retry_delay: Duration::from_millis(workflow.config.retry_delay_ms),
        record_hashes: false,
    };
    CoreRuntime::new(Scheduler::new(table), ledger, options)
}

/// Poll until `path` exists; panics if it never shows up.
async fn wait_for(path: &Path) {
    for _ in 0..500 {
        if path.exists() {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("file never appeared: {}", path.display());
}

fn process_alive(pid: i32) -> bool {
    std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[tokio::test]
async fn abort_kills_a_running_local_process() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_str().unwrap();
    let pid_file = dir.path().join("pid");

    // The job records its shell pid and then hangs far past the test timeout.
    let workflow = WorkflowBuilder::new()
        .rule(
            RuleBuilder::new("slow")
                .output(&format!("{root}/never.txt"))
                .cmd(&format!("echo $$ > {root}/pid; sleep 30")),
        )
        .build();

    let targets = vec![format!("{root}/never.txt")];
    let core = make_core(&workflow, &targets);

    let (tx, rx) = mpsc::channel::<RuntimeEvent>(64);
    let executor = LocalExecutor::new(tx.clone(), Duration::ZERO);

    // Abort as soon as the process has provably started.
    let abort_tx = tx.clone();
    let watched = pid_file.clone();
    tokio::spawn(async move {
        wait_for(&watched).await;
        let _ = abort_tx.send(RuntimeEvent::AbortRequested).await;
    });

    let report: RunReport = with_timeout(Runtime::new(core, rx, tx, executor, None).run())
        .await
        .unwrap();

    assert_eq!(report.outcome(), RunOutcome::PartialFailure);
    assert_eq!(report.cancelled.len(), 1);
    assert!(report.done.is_empty());
    assert!(!dir.path().join("never.txt").exists());

    let pid: i32 = std::fs::read_to_string(&pid_file)
        .unwrap()
        .trim()
        .parse()
        .unwrap();

    // The kill runs on a background task; give it a moment, then the process
    // must be gone rather than merely forgotten by the scheduler.
    let mut alive = true;
    for _ in 0..200 {
        alive = process_alive(pid);
        if !alive {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }
    assert!(!alive, "process {pid} survived the abort");
}

#[tokio::test]
async fn abort_invokes_the_queue_cancel_command() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_str().unwrap();
    let submitted = dir.path().join("submitted");
    let cancel_marker = dir.path().join("cancelled");

    // Submission drops a marker and reports queue id q9; the status command
    // never reaches a terminal state, so only an abort can end the run.
    let batch = BatchSection {
        submit_cmd: format!("touch {root}/submitted && echo q9"),
        status_cmd: "echo RUNNING".to_string(),
        cancel_cmd: Some(format!("echo {{queue_id}} > {root}/cancelled")),
        poll_interval_ms: 10,
        max_submit_attempts: 2,
        submit_backoff_ms: 5,
        queue: None,
        account: None,
    };

    let workflow = WorkflowBuilder::new()
        .backend(BackendKind::Batch)
        .batch(batch.clone())
        .rule(RuleBuilder::new("slow").output(&format!("{root}/never.txt")))
        .build();

    let targets = vec![format!("{root}/never.txt")];
    let core = make_core(&workflow, &targets);

    let (tx, rx) = mpsc::channel::<RuntimeEvent>(64);
    let executor = BatchExecutor::new(tx.clone(), BatchOptions::from_config(&batch, Duration::ZERO));

    let abort_tx = tx.clone();
    let watched = submitted.clone();
    tokio::spawn(async move {
        wait_for(&watched).await;
        let _ = abort_tx.send(RuntimeEvent::AbortRequested).await;
    });

    let report = with_timeout(Runtime::new(core, rx, tx, executor, None).run())
        .await
        .unwrap();

    assert_eq!(report.outcome(), RunOutcome::PartialFailure);
    assert_eq!(report.cancelled.len(), 1);

    // cancel_cmd runs on the job's own task, possibly after the runtime has
    // already returned; the queue id must be substituted into the template.
    wait_for(&cancel_marker).await;
    assert_eq!(
        std::fs::read_to_string(&cancel_marker).unwrap().trim(),
        "q9"
    );
}
