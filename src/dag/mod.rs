// src/dag/mod.rs

//! DAG representation and scheduling.
//!
//! - [`job`] holds the flat job table: jobs addressed by integer id, with
//!   dependency edges as id lists.
//! - [`scheduler`] contains the per-job state machine that decides when jobs
//!   become ready, how failures propagate, and when the run is finished.
//! - [`scheduler_step`] defines the result type for scheduler transitions.

pub mod job;
pub mod scheduler;
pub mod scheduler_step;

pub use job::{Job, JobId, JobState, JobTable};
pub use scheduler::{DispatchedJob, Scheduler};
pub use scheduler_step::SchedulerStep;
