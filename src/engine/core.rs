// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! A synchronous, deterministic "core runtime" that consumes
//! [`RuntimeEvent`]s and produces:
//! - an updated core state (scheduler + ledger)
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible for
//! reading events from the channel, sending `DispatchedJob`s to the executor,
//! arming retry timers, and handling Ctrl-C.
//!
//! The core has **no** channels, no Tokio types, and performs no IO, so the
//! full scheduling semantics (admission fairness, retry ceilings, failure
//! propagation, cancellation) can be unit tested without processes or timers.

use crate::dag::Scheduler;
use crate::engine::event_handlers::{
    dispatch_pass, finish_check, handle_abort, handle_job_completion, handle_retry_due, CoreStep,
};
use crate::engine::{RuntimeEvent, RuntimeOptions};
use crate::ledger::ResourceLedger;
use crate::report::RunReport;

#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
    ledger: ResourceLedger,
    options: RuntimeOptions,
}

impl CoreRuntime {
    pub fn new(scheduler: Scheduler, ledger: ResourceLedger, options: RuntimeOptions) -> Self {
        Self {
            scheduler,
            ledger,
            options,
        }
    }

    /// Initial dispatch pass before any event has arrived.
    ///
    /// When every job was skipped by the staleness analysis (or the plan is
    /// empty), this immediately requests exit.
    pub fn startup(&mut self) -> CoreStep {
        let commands = dispatch_pass(&mut self.scheduler, &mut self.ledger);
        finish_check(&self.scheduler, commands)
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::JobCompleted { job, outcome } => handle_job_completion(
                &mut self.scheduler,
                &mut self.ledger,
                &self.options,
                job,
                outcome,
            ),
            RuntimeEvent::RetryDue { job } => {
                handle_retry_due(&mut self.scheduler, &mut self.ledger, job)
            }
            RuntimeEvent::AbortRequested => handle_abort(&mut self.scheduler),
        }
    }

    /// Expose whether the run is complete (for tests).
    pub fn is_finished(&self) -> bool {
        self.scheduler.is_finished()
    }

    /// Read access to the scheduler (for tests and diagnostics).
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Consume the core and produce the final per-job report.
    pub fn into_report(self) -> RunReport {
        RunReport::from_table(self.scheduler.table())
    }
}
