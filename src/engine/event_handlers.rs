// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use std::path::PathBuf;
use std::time::Duration;

use tracing::debug;

use crate::dag::{DispatchedJob, JobId, JobState, Scheduler};
use crate::engine::{JobOutcome, RuntimeOptions};
use crate::errors::DagrunError;
use crate::ledger::ResourceLedger;

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Send these jobs to the executor.
    DispatchJobs(Vec<DispatchedJob>),
    /// Feed a `RetryDue` event back through the channel after the delay.
    ScheduleRetry { job: JobId, delay: Duration },
    /// Persist the aggregate input hash for a successfully completed job.
    RecordHashes { key: String, inputs: Vec<PathBuf> },
    /// Actively terminate everything the executor is still running.
    CancelRunning,
    /// The run is complete; the event loop should exit.
    RequestExit,
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute (dispatch jobs, arm timers, exit).
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

/// Handle a job completion reported by the executor.
pub fn handle_job_completion(
    scheduler: &mut Scheduler,
    ledger: &mut ResourceLedger,
    options: &RuntimeOptions,
    id: JobId,
    outcome: JobOutcome,
) -> CoreStep {
    let mut commands = Vec::new();

    // Resources were committed at admission; give them back exactly once,
    // before anything downstream is considered for dispatch.
    if scheduler.job(id).state == JobState::Running {
        ledger.release(&scheduler.job(id).resources.clone());
    }

    if options.record_hashes && outcome == JobOutcome::Success {
        let job = scheduler.job(id);
        commands.push(CoreCommand::RecordHashes {
            key: job.key.clone(),
            inputs: job.inputs.clone(),
        });
    }

    let step = scheduler.handle_completion(id, outcome);

    if let Some(job) = step.retry {
        commands.push(CoreCommand::ScheduleRetry {
            job,
            delay: options.retry_delay,
        });
    }

    commands.extend(dispatch_pass(scheduler, ledger));
    finish_check(scheduler, commands)
}

/// Handle a retry cooling-off expiry.
pub fn handle_retry_due(
    scheduler: &mut Scheduler,
    ledger: &mut ResourceLedger,
    id: JobId,
) -> CoreStep {
    let mut commands = Vec::new();

    if scheduler.handle_retry_due(id) {
        commands.extend(dispatch_pass(scheduler, ledger));
    }

    finish_check(scheduler, commands)
}

/// Handle an external abort request.
pub fn handle_abort(scheduler: &mut Scheduler) -> CoreStep {
    let was_running = scheduler.cancel_all_active();
    debug!(killing = was_running.len(), "abort: cancelling active jobs");

    CoreStep {
        commands: vec![CoreCommand::CancelRunning, CoreCommand::RequestExit],
        keep_running: false,
    }
}

/// One admission pass over the ready jobs, in the stable dispatch order.
///
/// A denial ends the pass (head-of-line fairness: the denied job keeps its
/// place and nothing behind it can overtake). A request that exceeds total
/// capacity can never be admitted and fails the job on the spot.
pub fn dispatch_pass(
    scheduler: &mut Scheduler,
    ledger: &mut ResourceLedger,
) -> Vec<CoreCommand> {
    let mut dispatched = Vec::new();

    for id in scheduler.ready_in_order() {
        let job = scheduler.job(id);

        if let Some((resource, requested, capacity)) = ledger.exceeds_capacity(&job.resources) {
            let error = DagrunError::AdmissionDeadlock {
                job: job.key.clone(),
                resource,
                requested,
                capacity,
            };
            scheduler.fail_unadmittable(id, error.to_string());
            continue;
        }

        if ledger.try_admit(&job.resources.clone()) {
            dispatched.push(scheduler.mark_dispatched(id));
        } else {
            debug!(job = %id, "admission denied; ending dispatch pass");
            break;
        }
    }

    if dispatched.is_empty() {
        Vec::new()
    } else {
        vec![CoreCommand::DispatchJobs(dispatched)]
    }
}

/// Append `RequestExit` when every job is terminal with no retry pending.
pub fn finish_check(scheduler: &Scheduler, mut commands: Vec<CoreCommand>) -> CoreStep {
    if scheduler.is_finished() {
        commands.push(CoreCommand::RequestExit);
        CoreStep {
            commands,
            keep_running: false,
        }
    } else {
        CoreStep {
            commands,
            keep_running: true,
        }
    }
}
