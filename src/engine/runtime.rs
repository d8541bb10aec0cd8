// src/engine/runtime.rs

use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::exec::ExecutorBackend;
use crate::plan::hashes::{compute_hash_for_paths, HashStore};
use crate::report::RunReport;

use super::core::CoreRuntime;
use super::{CoreCommand, RuntimeEvent};

/// Drives the DAG scheduler in response to `RuntimeEvent`s, and delegates
/// actual job execution to an `ExecutorBackend`.
///
/// This is a pure IO shell around `CoreRuntime`, which contains all the
/// scheduling semantics. This struct handles async IO: reading events from
/// the channel, dispatching jobs to the executor, arming retry timers and
/// persisting input hashes.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    /// Clone of the event sender, used to feed `RetryDue` back in after the
    /// cooling-off delay so every state change flows through the one channel.
    event_tx: mpsc::Sender<RuntimeEvent>,
    executor: E,
    hash_store: Option<Box<dyn HashStore>>,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(
        core: CoreRuntime,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        event_tx: mpsc::Sender<RuntimeEvent>,
        executor: E,
        hash_store: Option<Box<dyn HashStore>>,
    ) -> Self {
        Self {
            core,
            event_rx,
            event_tx,
            executor,
            hash_store,
        }
    }

    /// Main event loop.
    ///
    /// - Runs the core's startup dispatch pass.
    /// - Consumes `RuntimeEvent`s from `event_rx`, feeding them into the pure
    ///   core and executing the commands it returns.
    /// - Exits when the core reports the run finished (or aborted), returning
    ///   the final per-job report.
    pub async fn run(mut self) -> Result<RunReport> {
        info!("dagrun runtime started");

        let step = self.core.startup();
        let mut keep_running = step.keep_running;
        for command in step.commands {
            self.execute_command(command).await?;
        }

        while keep_running {
            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    info!("runtime event channel closed; exiting");
                    break;
                }
            };

            debug!(?event, "runtime received event");

            let step = self.core.step(event);
            keep_running = step.keep_running;

            for command in step.commands {
                self.execute_command(command).await?;
            }
        }

        info!("runtime exiting");
        Ok(self.core.into_report())
    }

    /// Execute a single command from the core.
    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::DispatchJobs(jobs) => {
                let keys: Vec<_> = jobs.iter().map(|j| j.key.as_str()).collect();
                debug!(?keys, "dispatching admitted jobs");
                self.executor.spawn_ready_jobs(jobs).await?;
            }
            CoreCommand::ScheduleRetry { job, delay } => {
                let tx = self.event_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(RuntimeEvent::RetryDue { job }).await;
                });
            }
            CoreCommand::RecordHashes { key, inputs } => {
                if let Some(store) = self.hash_store.as_mut() {
                    match compute_hash_for_paths(&inputs) {
                        Ok(hash) => {
                            if let Err(e) = store.save(&key, &hash) {
                                warn!(job = %key, error = %e, "failed to store input hash");
                            }
                        }
                        Err(e) => {
                            warn!(job = %key, error = %e, "failed to hash inputs");
                        }
                    }
                }
            }
            CoreCommand::CancelRunning => {
                self.executor.cancel_all().await;
            }
            CoreCommand::RequestExit => {
                info!("core requested exit");
            }
        }
        Ok(())
    }
}
