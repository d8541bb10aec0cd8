// src/report.rs

//! Final run report: every job, grouped by terminal state.
//!
//! No job is ever dropped from the report; a reader can account for the
//! complete DAG from this alone.

use crate::dag::{JobState, JobTable};

/// One job in the final report.
#[derive(Debug, Clone)]
pub struct JobSummary {
    pub key: String,
    pub rule: String,
    pub attempts: u32,
    pub error: Option<String>,
}

/// Overall run result, as reflected in the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every job is `Done` or `Skipped`.
    Success,
    /// At least one job is `Failed`, `Blocked` or `Cancelled`.
    PartialFailure,
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub done: Vec<JobSummary>,
    pub skipped: Vec<JobSummary>,
    pub failed: Vec<JobSummary>,
    pub blocked: Vec<JobSummary>,
    pub cancelled: Vec<JobSummary>,
}

impl RunReport {
    pub fn from_table(table: &JobTable) -> Self {
        let mut report = RunReport::default();

        for job in table.iter() {
            let summary = JobSummary {
                key: job.key.clone(),
                rule: job.rule.clone(),
                attempts: job.attempts,
                error: job.last_error.clone(),
            };

            match job.state {
                JobState::Done => report.done.push(summary),
                JobState::Skipped => report.skipped.push(summary),
                JobState::Failed => report.failed.push(summary),
                JobState::Blocked => report.blocked.push(summary),
                JobState::Cancelled => report.cancelled.push(summary),
                // Non-terminal states should not survive to reporting; keep
                // them visible as cancelled rather than losing them.
                JobState::Pending | JobState::Ready | JobState::Running => {
                    report.cancelled.push(summary)
                }
            }
        }

        report
    }

    pub fn outcome(&self) -> RunOutcome {
        if self.failed.is_empty() && self.blocked.is_empty() && self.cancelled.is_empty() {
            RunOutcome::Success
        } else {
            RunOutcome::PartialFailure
        }
    }

    /// Human-readable summary on stdout.
    pub fn print(&self) {
        println!("dagrun report");
        print_group("done", &self.done);
        print_group("skipped", &self.skipped);
        print_group("failed", &self.failed);
        print_group("blocked", &self.blocked);
        print_group("cancelled", &self.cancelled);
    }
}

fn print_group(label: &str, jobs: &[JobSummary]) {
    if jobs.is_empty() {
        return;
    }

    println!("  {label} ({}):", jobs.len());
    for job in jobs {
        match &job.error {
            Some(err) => println!("    - {} [{}] after {} attempt(s): {err}", job.key, job.rule, job.attempts),
            None => println!("    - {} [{}]", job.key, job.rule),
        }
    }
}
