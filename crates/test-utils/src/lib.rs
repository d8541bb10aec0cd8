// crates/test-utils/src/lib.rs

//! Shared helpers for dagrun's test suites: tracing setup, timeouts, workflow
//! builders and a scripted fake executor.

pub mod builders;
pub mod fake_executor;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

pub use builders::{RuleBuilder, WorkflowBuilder};
pub use fake_executor::{DispatchLog, FakeExecutor};

static INIT: Once = Once::new();

/// Initialize tracing once for the whole test binary.
///
/// Respects `DAGRUN_LOG` so a single test can be debugged with
/// `DAGRUN_LOG=debug cargo test -- name_of_test`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_env("DAGRUN_LOG")
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .init();
    });
}

/// Run a future under a generous timeout so a scheduling bug shows up as a
/// test failure instead of a hung test binary.
pub async fn with_timeout<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(20), fut)
        .await
        .expect("test future timed out")
}
