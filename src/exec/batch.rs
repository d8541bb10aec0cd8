// src/exec/batch.rs

//! Batch-queue executor backend.
//!
//! Jobs are handed to an external batch queue through a configured submit
//! command template; the queue's job id is read from the submit command's
//! stdout, and outcome is obtained by polling a status command. Submission
//! and completion are decoupled from local process lifetime.
//!
//! Submission-layer transient failures (queue temporarily unavailable) are
//! retried here with backoff and never consume the job's own retry budget;
//! only after `max_submit_attempts` is the job reported as
//! `SubmissionError`. Failures of the submitted command itself surface as
//! ordinary `Failed` outcomes.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::model::BatchSection;
use crate::dag::{DispatchedJob, JobId};
use crate::engine::{JobOutcome, RuntimeEvent};
use crate::errors::{Error, Result};
use crate::exec::backend::ExecutorBackend;
use crate::exec::local::shell_command;
use crate::exec::outputs::verify_outputs;
use crate::plan::pattern::{expand_template, Bindings};

/// Settings for talking to the batch queue, resolved from `[batch]`.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub submit_cmd: String,
    pub status_cmd: String,
    pub cancel_cmd: Option<String>,
    pub poll_interval: Duration,
    pub max_submit_attempts: u32,
    pub submit_backoff: Duration,
    pub queue: Option<String>,
    pub account: Option<String>,
    pub output_wait: Duration,
}

impl BatchOptions {
    pub fn from_config(batch: &BatchSection, output_wait: Duration) -> Self {
        Self {
            submit_cmd: batch.submit_cmd.clone(),
            status_cmd: batch.status_cmd.clone(),
            cancel_cmd: batch.cancel_cmd.clone(),
            poll_interval: Duration::from_millis(batch.poll_interval_ms),
            max_submit_attempts: batch.max_submit_attempts,
            submit_backoff: Duration::from_millis(batch.submit_backoff_ms),
            queue: batch.queue.clone(),
            account: batch.account.clone(),
            output_wait,
        }
    }
}

#[derive(Debug)]
enum ExecRequest {
    Dispatch(DispatchedJob),
    CancelAll,
}

struct ActiveJob {
    cancel: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<()>,
}

/// Batch-submission executor backend.
pub struct BatchExecutor {
    tx: mpsc::Sender<ExecRequest>,
}

impl BatchExecutor {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>, options: BatchOptions) -> Self {
        let tx = spawn_batch_executor(runtime_tx, options);
        Self { tx }
    }
}

impl ExecutorBackend for BatchExecutor {
    fn spawn_ready_jobs(
        &mut self,
        jobs: Vec<DispatchedJob>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.tx.clone();

        Box::pin(async move {
            for job in jobs {
                tx.send(ExecRequest::Dispatch(job))
                    .await
                    .map_err(|e| Error::from(anyhow::anyhow!("batch executor loop gone: {e}")))?;
            }
            Ok(())
        })
    }

    fn cancel_all(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        let tx = self.tx.clone();

        Box::pin(async move {
            let _ = tx.send(ExecRequest::CancelAll).await;
        })
    }
}

fn spawn_batch_executor(
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    options: BatchOptions,
) -> mpsc::Sender<ExecRequest> {
    let (tx, mut rx) = mpsc::channel::<ExecRequest>(32);

    tokio::spawn(async move {
        info!("batch executor loop started");

        let mut active: HashMap<JobId, ActiveJob> = HashMap::new();

        while let Some(request) = rx.recv().await {
            match request {
                ExecRequest::Dispatch(job) => {
                    active.retain(|_, a| !a.handle.is_finished());

                    let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
                    let rt_tx = runtime_tx.clone();
                    let opts = options.clone();
                    let id = job.id;

                    let handle = tokio::spawn(async move {
                        run_batch_job(job, rt_tx, cancel_rx, opts).await;
                    });

                    active.insert(
                        id,
                        ActiveJob {
                            cancel: Some(cancel_tx),
                            handle,
                        },
                    );
                }
                ExecRequest::CancelAll => {
                    for (id, job) in active.iter_mut() {
                        if job.handle.is_finished() {
                            continue;
                        }
                        if let Some(cancel) = job.cancel.take() {
                            if cancel.send(()).is_err() {
                                debug!(job = %id, "submission finished while cancelling");
                            }
                        }
                    }
                    info!("cancelled outstanding batch submissions");
                }
            }
        }

        info!("batch executor loop finished (channel closed)");
    });

    tx
}

/// Submit one job, poll for its outcome, and emit a `JobCompleted` event.
async fn run_batch_job(
    job: DispatchedJob,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    mut cancel_rx: oneshot::Receiver<()>,
    options: BatchOptions,
) {
    let bindings = submit_bindings(&job, &options);

    let queue_id = tokio::select! {
        res = submit_with_backoff(&job, &bindings, &options) => {
            match res {
                Ok(id) => id,
                Err(msg) => {
                    let _ = runtime_tx
                        .send(RuntimeEvent::JobCompleted {
                            job: job.id,
                            outcome: JobOutcome::SubmissionError(msg),
                        })
                        .await;
                    return;
                }
            }
        }
        _ = &mut cancel_rx => {
            debug!(job = %job.id, "cancelled before submission succeeded");
            return;
        }
    };

    info!(job = %job.id, key = %job.key, queue_id = %queue_id, "submitted to batch queue");

    let outcome = tokio::select! {
        outcome = poll_until_terminal(&job, &queue_id, &bindings, &options) => outcome,
        _ = &mut cancel_rx => {
            cancel_queue_job(&queue_id, &bindings, &options).await;
            return;
        }
    };

    let _ = runtime_tx
        .send(RuntimeEvent::JobCompleted {
            job: job.id,
            outcome,
        })
        .await;
}

/// Placeholders available to the submit/status/cancel templates: the job
/// command and identity, thread count, queue directives, and every named
/// resource amount (e.g. `{mem_mb}`).
fn submit_bindings(job: &DispatchedJob, options: &BatchOptions) -> Bindings {
    let mut bindings = Bindings::new();
    bindings.insert("cmd".to_string(), job.cmd.clone());
    bindings.insert("key".to_string(), job.key.clone());
    bindings.insert("rule".to_string(), job.rule.clone());
    bindings.insert("threads".to_string(), job.threads.to_string());
    bindings.insert(
        "queue".to_string(),
        options.queue.clone().unwrap_or_default(),
    );
    bindings.insert(
        "account".to_string(),
        options.account.clone().unwrap_or_default(),
    );
    for (name, amount) in job.resources.iter() {
        bindings.insert(name.to_string(), amount.to_string());
    }
    bindings
}

/// Run the submit command, retrying transient failures with backoff.
///
/// Success means a zero exit with a non-empty stdout; the trimmed stdout is
/// the queue's job identifier.
async fn submit_with_backoff(
    job: &DispatchedJob,
    bindings: &Bindings,
    options: &BatchOptions,
) -> core::result::Result<String, String> {
    let submit_line = match expand_template(&options.submit_cmd, bindings) {
        Ok(line) => line,
        Err(e) => return Err(format!("bad submit_cmd template: {e}")),
    };

    let mut last_error = String::new();

    for attempt in 1..=options.max_submit_attempts {
        match shell_command(&submit_line).output().await {
            Ok(output) if output.status.success() => {
                let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !id.is_empty() {
                    return Ok(id);
                }
                last_error = "submit command printed no job id".to_string();
            }
            Ok(output) => {
                last_error = format!(
                    "submit command exited {}: {}",
                    output.status.code().unwrap_or(-1),
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }
            Err(e) => {
                last_error = format!("running submit command: {e}");
            }
        }

        warn!(
            job = %job.id,
            key = %job.key,
            attempt,
            max = options.max_submit_attempts,
            error = %last_error,
            "submission attempt failed"
        );

        if attempt < options.max_submit_attempts {
            sleep(options.submit_backoff * attempt).await;
        }
    }

    Err(last_error)
}

/// Poll the status command until the queue reports a terminal state.
async fn poll_until_terminal(
    job: &DispatchedJob,
    queue_id: &str,
    bindings: &Bindings,
    options: &BatchOptions,
) -> JobOutcome {
    let mut bindings = bindings.clone();
    bindings.insert("queue_id".to_string(), queue_id.to_string());

    let status_line = match expand_template(&options.status_cmd, &bindings) {
        Ok(line) => line,
        Err(e) => return JobOutcome::SubmissionError(format!("bad status_cmd template: {e}")),
    };

    let mut consecutive_errors = 0u32;

    loop {
        sleep(options.poll_interval).await;

        let word = match shell_command(&status_line).output().await {
            Ok(output) if output.status.success() => String::from_utf8_lossy(&output.stdout)
                .split_whitespace()
                .next()
                .unwrap_or("")
                .to_ascii_uppercase(),
            Ok(output) => {
                consecutive_errors += 1;
                debug!(
                    job = %job.id,
                    queue_id,
                    code = output.status.code().unwrap_or(-1),
                    "status query failed"
                );
                if consecutive_errors >= options.max_submit_attempts {
                    return JobOutcome::SubmissionError(
                        "status command keeps failing".to_string(),
                    );
                }
                continue;
            }
            Err(e) => {
                consecutive_errors += 1;
                debug!(job = %job.id, queue_id, error = %e, "running status query failed");
                if consecutive_errors >= options.max_submit_attempts {
                    return JobOutcome::SubmissionError(format!("running status command: {e}"));
                }
                continue;
            }
        };

        consecutive_errors = 0;

        match word.as_str() {
            "COMPLETED" | "DONE" | "CD" => {
                return match verify_outputs(&job.outputs, options.output_wait).await {
                    Ok(()) => JobOutcome::Success,
                    Err(missing) => {
                        warn!(
                            job = %job.id,
                            key = %job.key,
                            ?missing,
                            "queue reports completion but declared outputs are missing"
                        );
                        JobOutcome::OutputMissing(missing)
                    }
                };
            }
            "FAILED" | "F" | "TIMEOUT" | "TO" | "CANCELLED" | "CA" | "NODE_FAIL"
            | "OUT_OF_MEMORY" | "OOM" => {
                return JobOutcome::Failed(1);
            }
            "" => {
                debug!(job = %job.id, queue_id, "empty status; still waiting");
            }
            other => {
                debug!(job = %job.id, queue_id, status = other, "job not terminal yet");
            }
        }
    }
}

/// Best-effort active termination of a submitted job on abort.
async fn cancel_queue_job(queue_id: &str, bindings: &Bindings, options: &BatchOptions) {
    let Some(template) = &options.cancel_cmd else {
        debug!(queue_id, "no cancel_cmd configured; leaving queue job to run out");
        return;
    };

    let mut bindings = bindings.clone();
    bindings.insert("queue_id".to_string(), queue_id.to_string());

    match expand_template(template, &bindings) {
        Ok(line) => {
            if let Err(e) = shell_command(&line).output().await {
                warn!(queue_id, error = %e, "cancel command failed");
            } else {
                info!(queue_id, "requested cancellation from batch queue");
            }
        }
        Err(e) => warn!(queue_id, error = %e, "bad cancel_cmd template"),
    }
}
