// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of a raw mpsc sender.
//! This makes it easy to swap in a fake executor in tests while keeping the
//! real process-spawning and queue-submitting implementations in [`local`]
//! and [`batch`].
//!
//! Callers depend only on this capability interface: `spawn_ready_jobs` to
//! launch work, `cancel_all` to actively terminate it on abort. Outcomes are
//! never returned from these calls; they arrive asynchronously as
//! `RuntimeEvent::JobCompleted` on the runtime channel.

use std::future::Future;
use std::pin::Pin;

use crate::dag::DispatchedJob;
use crate::errors::Result;

/// Trait abstracting how admitted jobs are executed.
///
/// Production code uses [`super::LocalExecutor`] or [`super::BatchExecutor`];
/// tests can provide their own implementation that doesn't spawn real
/// processes.
pub trait ExecutorBackend: Send {
    /// Dispatch the given jobs for execution.
    ///
    /// The implementation is free to:
    /// - spawn OS processes (local backend)
    /// - submit to an external batch queue and poll it (batch backend)
    /// - simulate completion and emit `RuntimeEvent`s (tests)
    fn spawn_ready_jobs(
        &mut self,
        jobs: Vec<DispatchedJob>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Actively terminate every job this backend is still running.
    ///
    /// No `JobCompleted` events may be emitted for terminated instances; the
    /// scheduler has already marked them cancelled.
    fn cancel_all(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}
