// src/exec/mod.rs

//! Job execution layer.
//!
//! - [`backend`] provides the `ExecutorBackend` trait the runtime depends on,
//!   which tests can replace with a fake implementation.
//! - [`local`] runs jobs as local OS processes via `tokio::process`.
//! - [`batch`] submits jobs to an external batch queue and polls for their
//!   outcome.
//! - [`outputs`] verifies declared outputs exist (with a bounded visibility
//!   wait) before success is reported.

pub mod backend;
pub mod batch;
pub mod local;
pub mod outputs;

pub use backend::ExecutorBackend;
pub use batch::{BatchExecutor, BatchOptions};
pub use local::LocalExecutor;
