// src/dag/scheduler_step.rs

//! Structured result of a single scheduler transition.

use crate::dag::job::JobId;

/// What changed when the scheduler processed one completion or retry event.
///
/// This is useful for tests that want to manually step the DAG and make
/// assertions about what changed.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Jobs whose dependencies became satisfied in this step.
    pub newly_ready: Vec<JobId>,
    /// Jobs newly blocked because an upstream job failed permanently.
    pub newly_blocked: Vec<JobId>,
    /// A retryable failure: this job should re-enter `Ready` after the
    /// configured cooling-off delay.
    pub retry: Option<JobId>,
    /// Whether every job is now terminal with no retries outstanding.
    pub finished: bool,
}
