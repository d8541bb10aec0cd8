// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod ledger;
pub mod logging;
pub mod plan;
pub mod report;

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::info;

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::BackendKind;
use crate::dag::{JobState, JobTable, Scheduler};
use crate::engine::{CoreRuntime, Runtime, RuntimeEvent, RuntimeOptions};
use crate::errors::{DagrunError, Result};
use crate::exec::{BatchExecutor, BatchOptions, LocalExecutor};
use crate::ledger::ResourceLedger;
use crate::plan::hashes::{FileHashStore, HashStore};
use crate::plan::{build_plan, RuleSet};
use crate::report::RunReport;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - workflow loading and validation
/// - DAG construction and staleness analysis
/// - ledger / scheduler / core runtime
/// - the executor backend
/// - Ctrl-C handling
///
/// Returns `None` on a dry run: the plan listing is printed and nothing
/// executes, so there is no per-job report.
pub async fn run(args: CliArgs) -> Result<Option<RunReport>> {
    let config_path = PathBuf::from(&args.config);
    let mut workflow = load_and_validate(&config_path)?;

    if let Some(n) = args.max_jobs {
        if n == 0 {
            return Err(DagrunError::Config(
                "--max-jobs must be >= 1 (got 0)".to_string(),
            ));
        }
        workflow.config.max_jobs = n;
    }

    // Plan: rules + targets -> annotated job DAG. Any error here is a
    // planning error and aborts before a single job is dispatched.
    let rules = RuleSet::from_workflow(&workflow)?;
    let mut table = build_plan(&rules, &workflow.params, &args.targets)?;

    let mode = workflow.config.staleness;
    let hash_store: Option<Box<dyn HashStore>> = if mode.uses_hash() {
        Some(Box::new(FileHashStore::new(workflow_root_dir(&config_path))))
    } else {
        None
    };

    plan::staleness::annotate(&mut table, mode, hash_store.as_deref())?;

    info!(
        jobs = table.len(),
        stale = table.iter().filter(|j| j.state == JobState::Pending).count(),
        sources = table.sources().len(),
        "plan ready"
    );

    if args.dry_run {
        print_dry_run(&table);
        return Ok(None);
    }

    let ledger = ResourceLedger::from_profile(&workflow.profile, workflow.config.max_jobs);
    let scheduler = Scheduler::new(table);

    // Runtime event channel: the single ordered funnel for all completion,
    // retry and abort events.
    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);

    // Ctrl-C → graceful abort.
    {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(RuntimeEvent::AbortRequested).await;
        });
    }

    let output_wait = Duration::from_secs(workflow.config.output_wait_secs);
    let options = RuntimeOptions {
        retry_delay: Duration::from_millis(workflow.config.retry_delay_ms),
        record_hashes: mode.uses_hash(),
    };

    // Construct the pure core runtime (single source of truth for semantics).
    let core = CoreRuntime::new(scheduler, ledger, options);

    match workflow.config.backend {
        BackendKind::Local => {
            let executor = LocalExecutor::new(rt_tx.clone(), output_wait);
            Runtime::new(core, rt_rx, rt_tx, executor, hash_store)
                .run()
                .await
                .map(Some)
        }
        BackendKind::Batch => {
            let batch = workflow.batch.as_ref().ok_or_else(|| {
                DagrunError::Config("batch backend selected without [batch] section".to_string())
            })?;
            let executor =
                BatchExecutor::new(rt_tx.clone(), BatchOptions::from_config(batch, output_wait));
            Runtime::new(core, rt_rx, rt_tx, executor, hash_store)
                .run()
                .await
                .map(Some)
        }
    }
}

/// Directory the hash store lives under.
///
/// - If the workflow path has a non-empty parent (e.g. "configs/Dagrun.toml"),
///   we use that directory.
/// - If it's just a bare filename like "Dagrun.toml" (parent = ""),
///   we fall back to the current working directory "."
fn workflow_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

/// Dry-run output: the planned DAG with staleness annotations.
fn print_dry_run(table: &JobTable) {
    println!("dagrun dry-run");
    println!("jobs ({}):", table.len());

    for id in table.topo_order() {
        let job = table.get(*id);
        let verdict = match job.state {
            JobState::Pending => "run",
            JobState::Skipped => "skip (outputs fresh)",
            _ => "unknown",
        };

        println!("  - {} [{}]: {verdict}", job.key, job.rule);
        println!("      cmd: {}", job.cmd);
        if !job.preds.is_empty() {
            let deps: Vec<_> = job
                .preds
                .iter()
                .map(|p| table.get(*p).key.as_str())
                .collect();
            println!("      after: {deps:?}");
        }
        if !job.inputs.is_empty() {
            let inputs: Vec<_> = job.inputs.iter().map(|p| p.display().to_string()).collect();
            println!("      input: {inputs:?}");
        }
    }

    if !table.sources().is_empty() {
        let sources: Vec<_> = table
            .sources()
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        println!("sources (pre-existing, no producing rule): {sources:?}");
    }
}
