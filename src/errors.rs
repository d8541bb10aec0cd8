// src/errors.rs

//! Crate-wide error taxonomy and `Result` alias.
//!
//! Planning errors (`UnresolvableTarget`, `AmbiguousRule`, `CyclicDependency`)
//! are fatal and abort the run before anything is dispatched. Job-level
//! failures are not represented here; they live in the scheduler as job
//! outcomes so that one failing job never aborts unrelated parts of the DAG.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DagrunError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("no rule produces '{}' and it does not exist on disk", .0.display())]
    UnresolvableTarget(PathBuf),

    #[error("output '{}' is claimed by more than one rule: {rules:?}", path.display())]
    AmbiguousRule { path: PathBuf, rules: Vec<String> },

    #[error("cyclic dependency: {}", join_cycle(.0))]
    CyclicDependency(Vec<PathBuf>),

    #[error(
        "job '{job}' requests {requested} of '{resource}' but total capacity is {capacity}"
    )]
    AdmissionDeadlock {
        job: String,
        resource: String,
        requested: u64,
        capacity: u64,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DagrunError {
    /// Whether this error belongs to the planning phase (exit code 2) rather
    /// than being a partial execution failure (exit code 1).
    pub fn is_planning(&self) -> bool {
        matches!(
            self,
            DagrunError::Config(_)
                | DagrunError::UnresolvableTarget(_)
                | DagrunError::AmbiguousRule { .. }
                | DagrunError::CyclicDependency(_)
                | DagrunError::Toml(_)
        )
    }

    /// Process exit code when this error aborts the run: planning errors
    /// exit 2, anything surfacing mid-run shares the partial-failure code.
    pub fn exit_code(&self) -> u8 {
        if self.is_planning() {
            2
        } else {
            1
        }
    }
}

fn join_cycle(cycle: &[PathBuf]) -> String {
    cycle
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, DagrunError>;
