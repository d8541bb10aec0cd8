// src/plan/mod.rs

//! Planning: from declarative rules to an annotated job DAG.
//!
//! - [`pattern`] implements `{wildcard}` path patterns and template expansion.
//! - [`rules`] holds the compiled rule registry.
//! - [`builder`] resolves requested targets into a concrete job table.
//! - [`staleness`] marks each job as must-run or skippable.
//! - [`hashes`] provides content hashing and the stored-hash backend for
//!   hash-based staleness.

pub mod builder;
pub mod hashes;
pub mod pattern;
pub mod rules;
pub mod staleness;

pub use builder::build_plan;
pub use rules::{Rule, RuleSet};
