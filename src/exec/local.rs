// src/exec/local.rs

//! Local-process executor backend.
//!
//! Each dispatched job runs as its own OS process via `tokio::process`. The
//! backend enforces no resource isolation itself; it trusts the ledger's
//! admission decision. Completion events are reported back to the runtime
//! over the shared event channel.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result as AnyResult};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::dag::{DispatchedJob, JobId};
use crate::engine::{JobOutcome, RuntimeEvent};
use crate::errors::{Error, Result};
use crate::exec::backend::ExecutorBackend;
use crate::exec::outputs::verify_outputs;

/// Requests flowing from the runtime into the background executor loop.
#[derive(Debug)]
enum ExecRequest {
    Dispatch(DispatchedJob),
    CancelAll,
}

/// Internal handle for a currently-running job process.
struct ActiveJob {
    cancel: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<()>,
}

/// Local executor backend used in production.
///
/// Internally this wraps a background loop; `spawn_ready_jobs` just forwards
/// admitted jobs over an mpsc channel.
pub struct LocalExecutor {
    tx: mpsc::Sender<ExecRequest>,
}

impl LocalExecutor {
    /// Create the backend and start its background loop immediately.
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>, output_wait: Duration) -> Self {
        let tx = spawn_local_executor(runtime_tx, output_wait);
        Self { tx }
    }
}

impl ExecutorBackend for LocalExecutor {
    fn spawn_ready_jobs(
        &mut self,
        jobs: Vec<DispatchedJob>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.tx.clone();

        Box::pin(async move {
            for job in jobs {
                tx.send(ExecRequest::Dispatch(job))
                    .await
                    .map_err(|e| Error::from(anyhow::anyhow!("executor loop gone: {e}")))?;
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

/// Spawn the background executor loop.
///
/// Each dispatched job is executed in its own Tokio task. The scheduler never
/// dispatches the same job twice concurrently, so at most one process per job
/// id is alive at a time.
fn spawn_local_executor(
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    output_wait: Duration,
) -> mpsc::Sender<ExecRequest> {
    let (tx, mut rx) = mpsc::channel::<ExecRequest>(32);

    tokio::spawn(async move {
        info!("local executor loop started");

        let mut active: HashMap<JobId, ActiveJob> = HashMap::new();

        while let Some(request) = rx.recv().await {
            match request {
                ExecRequest::Dispatch(job) => {
                    active.retain(|_, a| !a.handle.is_finished());

                    let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
                    let rt_tx = runtime_tx.clone();
                    let id = job.id;

                    let handle = tokio::spawn(async move {
                        run_job(job, rt_tx, cancel_rx, output_wait).await;
                        debug!(job = %id, "job runner future finished");
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
                    let mut killed = 0usize;
                    for (id, job) in active.iter_mut() {
                        if job.handle.is_finished() {
                            continue;
                        }
                        if let Some(cancel) = job.cancel.take() {
                            if cancel.send(()).is_ok() {
                                killed += 1;
                            } else {
                                debug!(job = %id, "process finished while cancelling");
                            }
                        }
                    }
                    info!(killed, "cancelled running local jobs");
                }
            }
        }

        info!("local executor loop finished (channel closed)");
    });

    tx
}

/// Run a single job process, verify its declared outputs, and emit a
/// `JobCompleted` event.
///
/// If the cancel channel fires, the child is killed and **no** event is sent
/// for that instance; the scheduler has already recorded the cancellation.
async fn run_job(
    job: DispatchedJob,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    cancel_rx: oneshot::Receiver<()>,
    output_wait: Duration,
) {
    let id = job.id;
    let key = job.key.clone();
    if let Err(err) = run_job_inner(job, &runtime_tx, cancel_rx, output_wait).await {
        error!(job = %id, key = %key, error = %err, "job execution error");
        let _ = runtime_tx
            .send(RuntimeEvent::JobCompleted {
                job: id,
                outcome: JobOutcome::Failed(-1),
            })
            .await;
    }
}

async fn run_job_inner(
    job: DispatchedJob,
    runtime_tx: &mpsc::Sender<RuntimeEvent>,
    mut cancel_rx: oneshot::Receiver<()>,
    output_wait: Duration,
) -> AnyResult<()> {
    info!(
        job = %job.id,
        key = %job.key,
        rule = %job.rule,
        attempt = job.attempt,
        cmd = %job.cmd,
        "starting job process"
    );

    let mut cmd = shell_command(&job.cmd);
    cmd.stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning process for job '{}'", job.key))?;

    // Drain both pipes so buffers don't fill; log at debug.
    if let Some(stdout) = child.stdout.take() {
        let key = job.key.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(job = %key, "stdout: {}", line);
            }
        });
    }
    if let Some(stderr) = child.stderr.take() {
        let key = job.key.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(job = %key, "stderr: {}", line);
            }
        });
    }

    tokio::select! {
        status_res = child.wait() => {
            let status = status_res
                .with_context(|| format!("waiting for process of job '{}'", job.key))?;

            let code = status.code().unwrap_or(-1);
            let outcome = if status.success() {
                match verify_outputs(&job.outputs, output_wait).await {
                    Ok(()) => JobOutcome::Success,
                    Err(missing) => {
                        warn!(
                            job = %job.id,
                            key = %job.key,
                            ?missing,
                            "process exited zero but declared outputs are missing"
                        );
                        JobOutcome::OutputMissing(missing)
                    }
                }
            } else {
                JobOutcome::Failed(code)
            };

            info!(
                job = %job.id,
                key = %job.key,
                exit_code = code,
                success = status.success(),
                "job process exited"
            );

            runtime_tx
                .send(RuntimeEvent::JobCompleted { job: job.id, outcome })
                .await
                .with_context(|| {
                    format!("sending JobCompleted event for job '{}' to runtime", job.key)
                })?;
        }

        cancel = &mut cancel_rx => {
            match cancel {
                Ok(()) => {
                    info!(job = %job.id, key = %job.key, "cancellation requested; killing process");
                    if let Err(e) = child.kill().await {
                        warn!(job = %job.id, error = %e, "failed to kill child process");
                    }
                    // No JobCompleted for a cancelled instance.
                }
                Err(e) => {
                    debug!(job = %job.id, error = %e, "cancel channel closed without cancellation");
                    // Child will be killed on drop due to kill_on_drop(true).
                }
            }
        }
    }

    Ok(())
}

/// Build a shell command appropriate for the platform.
pub(crate) fn shell_command(cmdline: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmdline);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmdline);
        c
    }
}
