// src/plan/staleness.rs

//! Staleness analysis: decide which jobs must run and which can be skipped.
//!
//! A job must run if any declared output is missing, any output is out of
//! date relative to its inputs (by mtime, stored content hash, or both,
//! depending on the configured mode), or any predecessor must itself run.
//! Fresh jobs are marked `Skipped` before scheduling begins.

use std::path::Path;
use std::time::SystemTime;

use anyhow::Context;
use tracing::debug;

use crate::config::model::StalenessMode;
use crate::dag::job::{JobState, JobTable};
use crate::errors::Result;
use crate::plan::hashes::{compute_hash_for_paths, HashStore};

/// Annotate every job in the table as `Pending` (must run) or `Skipped`.
///
/// Walks jobs in topological order so that downstream transitivity falls out
/// of a single pass: by the time a job is examined, all its predecessors have
/// already been decided.
pub fn annotate(
    table: &mut JobTable,
    mode: StalenessMode,
    store: Option<&dyn HashStore>,
) -> Result<()> {
    let order: Vec<_> = table.topo_order().to_vec();

    for id in order {
        let stale_pred = table
            .get(id)
            .preds
            .iter()
            .any(|p| table.get(*p).state == JobState::Pending);

        let job = table.get(id);
        let must_run = stale_pred || job_is_stale(table, id, mode, store)?;

        let job = table.get_mut(id);
        job.state = if must_run {
            JobState::Pending
        } else {
            JobState::Skipped
        };

        debug!(
            job = %id,
            key = %job.key,
            stale = must_run,
            upstream_stale = stale_pred,
            "staleness decided"
        );
    }

    Ok(())
}

fn job_is_stale(
    table: &JobTable,
    id: crate::dag::job::JobId,
    mode: StalenessMode,
    store: Option<&dyn HashStore>,
) -> Result<bool> {
    let job = table.get(id);

    // Missing outputs always mean stale; this also gives zero-input jobs
    // their first-run semantics (stale unless all outputs already exist).
    if job.outputs.iter().any(|o| !o.is_file()) {
        return Ok(true);
    }

    if job.inputs.is_empty() {
        return Ok(false);
    }

    if mode.uses_mtime() && outputs_older_than_inputs(job)? {
        return Ok(true);
    }

    if mode.uses_hash() {
        let Some(store) = store else {
            // No stored history to compare against: be conservative.
            return Ok(true);
        };
        let current = compute_hash_for_paths(&job.inputs)?;
        match store.load(&job.key)? {
            Some(stored) if stored == current => {}
            _ => return Ok(true),
        }
    }

    Ok(false)
}

/// Whether any input is newer (by modification time) than any output.
fn outputs_older_than_inputs(job: &crate::dag::job::Job) -> Result<bool> {
    let newest_input = job
        .inputs
        .iter()
        .map(|p| mtime(p))
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .max();

    let oldest_output = job
        .outputs
        .iter()
        .map(|p| mtime(p))
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .min();

    match (newest_input, oldest_output) {
        (Some(input), Some(output)) => Ok(input > output),
        _ => Ok(false),
    }
}

fn mtime(path: &Path) -> Result<SystemTime> {
    let meta = std::fs::metadata(path)
        .with_context(|| format!("reading metadata for {:?}", path))?;
    let mtime = meta
        .modified()
        .with_context(|| format!("reading mtime for {:?}", path))?;
    Ok(mtime)
}
