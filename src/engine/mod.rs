// src/engine/mod.rs

//! Orchestration engine for dagrun.
//!
//! This module ties together:
//! - the DAG scheduler
//! - the resource ledger (admission control before dispatch)
//! - the main runtime event loop that reacts to:
//!   - job completion events from the executor
//!   - retry cooling-off expirations
//!   - abort signals
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`]. All job-state and ledger mutation happens
//! inside the core's single-threaded decision points; executors only feed
//! events through one ordered channel.

use std::path::PathBuf;
use std::time::Duration;

use crate::dag::JobId;

/// Outcome of one dispatched job instance, as reported by an executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Success,
    /// The command exited non-zero.
    Failed(i32),
    /// The command exited zero but declared outputs never appeared within the
    /// bounded visibility wait. Distinct from `Failed` because on shared
    /// filesystems output visibility may lag process exit.
    OutputMissing(Vec<PathBuf>),
    /// The batch queue rejected the submission even after backend-level
    /// backoff retries. An infrastructure fault, not a job fault.
    SubmissionError(String),
}

/// Events flowing into the runtime from executors, timers and signals.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A dispatched job finished with a concrete outcome.
    JobCompleted { job: JobId, outcome: JobOutcome },
    /// A failed job's cooling-off delay elapsed; it may be redispatched.
    RetryDue { job: JobId },
    /// External abort (e.g. Ctrl-C): stop dispatching, kill running jobs,
    /// mark everything non-terminal as cancelled.
    AbortRequested,
}

/// Runtime options used by both the core and the async shell.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeOptions {
    /// Cooling-off delay before a failed job is resubmitted.
    pub retry_delay: Duration,
    /// Whether input hashes are recorded after successful jobs (hash-based
    /// staleness modes).
    pub record_hashes: bool,
}

pub mod core;
pub mod event_handlers;
pub mod runtime;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use runtime::Runtime;
