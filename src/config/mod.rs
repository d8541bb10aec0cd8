// src/config/mod.rs

//! Workflow file handling.
//!
//! - [`model`] is the serde data model for the TOML workflow file.
//! - [`loader`] reads a file and produces a validated [`Workflow`].
//! - [`validate`] holds the semantic checks behind `TryFrom<RawWorkflow>`.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_workflow_path, load_and_validate, load_from_path};
pub use model::{
    BackendKind, BatchSection, ConfigSection, RawWorkflow, RuleConfig, StalenessMode, Workflow,
};
