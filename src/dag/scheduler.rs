// src/dag/scheduler.rs

//! Per-job state machine over the annotated DAG.
//!
//! The scheduler owns the job table and is the only place job states change:
//! readiness promotion, failure propagation to transitive successors, retry
//! accounting and cancellation all happen here, driven by the engine core.

use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::dag::job::{Job, JobId, JobState, JobTable};
use crate::dag::scheduler_step::SchedulerStep;
use crate::engine::JobOutcome;
use crate::ledger::ResourceRequest;

/// Description of a job the engine wants the executor to run now.
#[derive(Debug, Clone)]
pub struct DispatchedJob {
    pub id: JobId,
    pub rule: String,
    pub key: String,
    pub cmd: String,
    pub outputs: Vec<PathBuf>,
    pub threads: u32,
    /// Carried along for batch backends that translate the request into
    /// queue directives.
    pub resources: ResourceRequest,
    /// 1-based dispatch attempt for this job.
    pub attempt: u32,
}

impl DispatchedJob {
    pub fn from_job(job: &Job) -> Self {
        Self {
            id: job.id,
            rule: job.rule.clone(),
            key: job.key.clone(),
            cmd: job.cmd.clone(),
            outputs: job.outputs.clone(),
            threads: job.threads,
            resources: job.resources.clone(),
            attempt: job.attempts,
        }
    }
}

#[derive(Debug)]
pub struct Scheduler {
    table: JobTable,
}

impl Scheduler {
    /// Take ownership of a staleness-annotated job table and promote the
    /// initially runnable jobs to `Ready`.
    pub fn new(table: JobTable) -> Self {
        let mut scheduler = Self { table };

        let ids: Vec<_> = scheduler.table.topo_order().to_vec();
        for id in ids {
            if scheduler.table.get(id).state == JobState::Pending
                && scheduler.deps_satisfied(id)
            {
                scheduler.table.get_mut(id).state = JobState::Ready;
                debug!(job = %id, "initially ready");
            }
        }

        scheduler
    }

    pub fn table(&self) -> &JobTable {
        &self.table
    }

    pub fn into_table(self) -> JobTable {
        self.table
    }

    pub fn job(&self, id: JobId) -> &Job {
        self.table.get(id)
    }

    /// Ready jobs in the stable dispatch order. Admission is attempted in
    /// exactly this order and never reordered on denial, so a large request
    /// cannot be starved by a stream of smaller ones.
    pub fn ready_in_order(&self) -> Vec<JobId> {
        self.table
            .topo_order()
            .iter()
            .copied()
            .filter(|id| self.table.get(*id).state == JobState::Ready)
            .collect()
    }

    /// Whether all predecessors of a job are satisfied (`Done` or `Skipped`).
    pub fn deps_satisfied(&self, id: JobId) -> bool {
        self.table
            .get(id)
            .preds
            .iter()
            .all(|p| matches!(self.table.get(*p).state, JobState::Done | JobState::Skipped))
    }

    /// Transition a `Ready` job to `Running` and count the attempt.
    pub fn mark_dispatched(&mut self, id: JobId) -> DispatchedJob {
        let job = self.table.get_mut(id);
        debug_assert_eq!(job.state, JobState::Ready);
        job.state = JobState::Running;
        job.attempts += 1;

        let is_retry = job.attempts > 1;
        if is_retry {
            info!(job = %id, key = %job.key, attempt = job.attempts, "re-dispatching job");
        } else {
            info!(job = %id, key = %job.key, rule = %job.rule, "dispatching job");
        }

        DispatchedJob::from_job(job)
    }

    /// Fail a job whose resource request exceeds total ledger capacity.
    ///
    /// The job can never be admitted, so it fails immediately and its
    /// transitive successors become `Blocked`; unrelated jobs are unaffected.
    pub fn fail_unadmittable(&mut self, id: JobId, error: String) -> Vec<JobId> {
        let job = self.table.get_mut(id);
        warn!(job = %id, key = %job.key, error = %error, "job can never be admitted");
        job.state = JobState::Failed;
        job.last_error = Some(error);
        self.block_downstream(id)
    }

    /// Process a completion outcome reported by the executor.
    pub fn handle_completion(&mut self, id: JobId, outcome: JobOutcome) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        let state = self.table.get(id).state;
        if state != JobState::Running {
            // Completions for cancelled instances are dropped by the
            // executor, so this indicates an event-ordering bug.
            warn!(job = %id, ?state, "completion for job that is not running; ignoring");
            step.finished = self.is_finished();
            return step;
        }

        match outcome {
            JobOutcome::Success => {
                let job = self.table.get_mut(id);
                job.state = JobState::Done;
                job.last_error = None;
                info!(job = %id, key = %job.key, "job done");
                step.newly_ready = self.promote_successors(id);
            }
            JobOutcome::Failed(code) => {
                self.fail_or_retry(id, format!("exit code {code}"), &mut step);
            }
            JobOutcome::OutputMissing(missing) => {
                let listed = missing
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                self.fail_or_retry(
                    id,
                    format!("declared outputs missing after wait: {listed}"),
                    &mut step,
                );
            }
            JobOutcome::SubmissionError(msg) => {
                // Infrastructure fault, already retried with backoff inside
                // the backend; it never consumed the job's own retry budget.
                let job = self.table.get_mut(id);
                job.state = JobState::Failed;
                job.last_error = Some(format!("submission failed: {msg}"));
                warn!(job = %id, key = %job.key, error = %msg, "giving up on submission");
                step.newly_blocked = self.block_downstream(id);
            }
        }

        step.finished = self.is_finished();
        step
    }

    /// A cooling-off delay elapsed; move the job back to `Ready`.
    ///
    /// Returns `false` when the retry is no longer applicable (e.g. the run
    /// was aborted while the job was cooling off).
    pub fn handle_retry_due(&mut self, id: JobId) -> bool {
        let job = self.table.get_mut(id);
        if job.state != JobState::Failed || !job.retry_queued {
            debug!(job = %id, state = ?job.state, "stale retry event; ignoring");
            return false;
        }

        job.retry_queued = false;
        job.state = JobState::Ready;
        info!(job = %id, key = %job.key, attempt = job.attempts + 1, "retrying job");
        true
    }

    /// Abort: move every non-terminal job (and jobs awaiting retry) to
    /// `Cancelled`. Returns the jobs that were `Running`, whose processes the
    /// executor must actively terminate.
    pub fn cancel_all_active(&mut self) -> Vec<JobId> {
        let mut was_running = Vec::new();

        for idx in 0..self.table.len() {
            let job = self.table.get_mut(JobId(idx));
            match job.state {
                JobState::Running => {
                    was_running.push(job.id);
                    job.state = JobState::Cancelled;
                }
                JobState::Pending | JobState::Ready => {
                    job.state = JobState::Cancelled;
                }
                JobState::Failed if job.retry_queued => {
                    job.retry_queued = false;
                    job.state = JobState::Cancelled;
                }
                _ => {}
            }
        }

        info!(killed = was_running.len(), "cancelled all active jobs");
        was_running
    }

    /// Whether every job is terminal and no retry is outstanding.
    pub fn is_finished(&self) -> bool {
        self.table
            .iter()
            .all(|job| job.state.is_terminal() && !job.retry_queued)
    }

    fn fail_or_retry(&mut self, id: JobId, error: String, step: &mut SchedulerStep) {
        let job = self.table.get_mut(id);
        job.state = JobState::Failed;
        job.last_error = Some(error.clone());

        if job.attempts <= job.retry_ceiling {
            job.retry_queued = true;
            warn!(
                job = %id,
                key = %job.key,
                attempt = job.attempts,
                ceiling = job.retry_ceiling + 1,
                error = %error,
                "job failed; will retry after cooling off"
            );
            step.retry = Some(id);
        } else {
            warn!(
                job = %id,
                key = %job.key,
                attempts = job.attempts,
                error = %error,
                "job failed permanently; blocking dependents"
            );
            step.newly_blocked = self.block_downstream(id);
        }
    }

    /// Promote `Pending` successors whose dependencies just became satisfied.
    fn promote_successors(&mut self, id: JobId) -> Vec<JobId> {
        let succs = self.table.get(id).succs.clone();
        let mut newly_ready = Vec::new();

        for succ in succs {
            if self.table.get(succ).state == JobState::Pending && self.deps_satisfied(succ) {
                self.table.get_mut(succ).state = JobState::Ready;
                debug!(job = %succ, "dependencies satisfied; ready");
                newly_ready.push(succ);
            }
        }

        newly_ready
    }

    /// Mark all transitive successors of a permanently failed job `Blocked`.
    fn block_downstream(&mut self, failed: JobId) -> Vec<JobId> {
        let mut stack = self.table.get(failed).succs.clone();
        let mut newly_blocked = Vec::new();

        while let Some(id) = stack.pop() {
            let job = self.table.get_mut(id);
            match job.state {
                JobState::Pending | JobState::Ready => {
                    job.state = JobState::Blocked;
                    debug!(job = %id, key = %job.key, "blocked by upstream failure");
                    newly_blocked.push(id);
                    stack.extend(self.table.get(id).succs.iter().copied());
                }
                // Already terminal, or running on behalf of an unrelated
                // satisfied path; nothing to do.
                _ => {}
            }
        }

        newly_blocked
    }
}
