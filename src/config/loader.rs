// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{RawWorkflow, Workflow};
use crate::errors::Result;

/// Load a workflow file from a given path and return the raw `RawWorkflow`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation (pattern correctness, duplicate outputs, etc.). Use
/// [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawWorkflow> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let workflow: RawWorkflow = toml::from_str(&contents)?;

    Ok(workflow)
}

/// Load a workflow file from path and run semantic validation.
///
/// This is the recommended entry point for the rest of the application:
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks for:
///   - at least one rule,
///   - compilable output patterns, unique across rules,
///   - input wildcards bound by the same rule's outputs,
///   - command templates referencing only known placeholders,
///   - a `[batch]` section when the batch backend is selected.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<Workflow> {
    let raw = load_from_path(&path)?;
    let workflow = Workflow::try_from(raw)?;
    Ok(workflow)
}

/// Helper to resolve a default workflow path.
///
/// Currently this just returns `Dagrun.toml` in the current working
/// directory.
pub fn default_workflow_path() -> PathBuf {
    PathBuf::from("Dagrun.toml")
}
