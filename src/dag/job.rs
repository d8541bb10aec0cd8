// src/dag/job.rs

//! Flat job table: concrete jobs addressed by integer id, edges as id lists.
//!
//! Representing the DAG as a flat table rather than pointer-linked nodes
//! keeps shared dependencies (two jobs needing the same producer) trivially
//! expressible and sidesteps ownership cycles.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::ledger::ResourceRequest;

/// Index into the [`JobTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub usize);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of a job.
///
/// `Failed` together with `retry_queued` on the job means a retry is pending
/// and the run is not finished yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Stale, waiting on predecessors.
    Pending,
    /// All predecessors satisfied; waiting for resource admission.
    Ready,
    /// Resources committed and dispatched to the executor.
    Running,
    Done,
    Failed,
    /// Outputs were already fresh; never dispatched.
    Skipped,
    /// A transitive predecessor failed permanently; never dispatched.
    Blocked,
    /// The run was aborted before this job reached a terminal state.
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Done
                | JobState::Failed
                | JobState::Skipped
                | JobState::Blocked
                | JobState::Cancelled
        )
    }
}

/// One concrete instantiation of a rule for specific resolved paths.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub rule: String,
    /// Unique key: the first declared output path.
    pub key: String,
    /// All resolved concrete inputs (produced by predecessors or sources).
    pub inputs: Vec<PathBuf>,
    pub outputs: Vec<PathBuf>,
    /// Fully expanded command line.
    pub cmd: String,
    pub threads: u32,
    pub resources: ResourceRequest,
    pub retry_ceiling: u32,
    pub preds: Vec<JobId>,
    pub succs: Vec<JobId>,

    pub state: JobState,
    /// Number of times this job has been dispatched.
    pub attempts: u32,
    /// A cooling-off retry has been scheduled and not yet come due.
    pub retry_queued: bool,
    pub last_error: Option<String>,
}

/// The DAG: all jobs plus the output-path index used for memoized resolution.
#[derive(Debug, Default)]
pub struct JobTable {
    jobs: Vec<Job>,
    by_output: HashMap<PathBuf, JobId>,
    /// Pre-existing files consumed as inputs with no producing rule.
    sources: Vec<PathBuf>,
    /// Stable dispatch order: topological, following discovery order.
    topo_order: Vec<JobId>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn get(&self, id: JobId) -> &Job {
        &self.jobs[id.0]
    }

    pub fn get_mut(&mut self, id: JobId) -> &mut Job {
        &mut self.jobs[id.0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = JobId> {
        (0..self.jobs.len()).map(JobId)
    }

    /// The producer of a concrete output path, if any.
    pub fn producer_of(&self, path: &PathBuf) -> Option<JobId> {
        self.by_output.get(path).copied()
    }

    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    pub fn topo_order(&self) -> &[JobId] {
        &self.topo_order
    }

    pub(crate) fn push_job(&mut self, job: Job) -> JobId {
        let id = job.id;
        debug_assert_eq!(id.0, self.jobs.len());
        for out in &job.outputs {
            self.by_output.insert(out.clone(), id);
        }
        self.jobs.push(job);
        id
    }

    pub(crate) fn next_id(&self) -> JobId {
        JobId(self.jobs.len())
    }

    pub(crate) fn claim_output(&self, path: &PathBuf) -> Option<JobId> {
        self.by_output.get(path).copied()
    }

    pub(crate) fn record_source(&mut self, path: PathBuf) {
        if !self.sources.contains(&path) {
            self.sources.push(path);
        }
    }

    pub(crate) fn set_topo_order(&mut self, order: Vec<JobId>) {
        self.topo_order = order;
    }

    /// Populate successor lists from the predecessor lists.
    pub(crate) fn link_successors(&mut self) {
        let edges: Vec<(JobId, JobId)> = self
            .jobs
            .iter()
            .flat_map(|job| job.preds.iter().map(move |p| (*p, job.id)))
            .collect();

        for (pred, succ) in edges {
            let succs = &mut self.jobs[pred.0].succs;
            if !succs.contains(&succ) {
                succs.push(succ);
            }
        }
    }
}
