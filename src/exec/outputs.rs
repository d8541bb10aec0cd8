// src/exec/outputs.rs

//! Bounded-wait verification that declared outputs actually exist.
//!
//! A zero exit code with a missing declared output is a distinct failure
//! (`OutputMissing`) from a non-zero exit, because on shared filesystems
//! output visibility may lag process exit. Both backends funnel through this
//! check before reporting success.

use std::path::PathBuf;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Wait up to `wait` for all `outputs` to appear.
///
/// Returns `Ok(())` once every path exists, or the list of still-missing
/// paths after the window elapses. A zero `wait` checks exactly once.
pub async fn verify_outputs(outputs: &[PathBuf], wait: Duration) -> Result<(), Vec<PathBuf>> {
    let deadline = Instant::now() + wait;

    loop {
        let missing: Vec<PathBuf> = outputs
            .iter()
            .filter(|p| !p.is_file())
            .cloned()
            .collect();

        if missing.is_empty() {
            return Ok(());
        }

        if Instant::now() >= deadline {
            return Err(missing);
        }

        debug!(missing = missing.len(), "outputs not yet visible; waiting");
        sleep(POLL_INTERVAL.min(wait)).await;
    }
}
