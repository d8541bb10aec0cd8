// src/plan/rules.rs

//! The rule registry: compiled, immutable rule templates.

use std::collections::BTreeMap;

use crate::config::model::Workflow;
use crate::errors::{DagrunError, Result};
use crate::plan::pattern::{Bindings, WildcardPattern};

/// One compiled rule template. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct Rule {
    pub name: String,
    /// Input path templates (may reference wildcards bound by `outputs`).
    pub inputs: Vec<String>,
    pub outputs: Vec<WildcardPattern>,
    pub cmd: String,
    pub threads: u32,
    pub retries: u32,
    pub resources: BTreeMap<String, u64>,
}

/// All rules of a workflow, in declaration order. Static after load.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Compile the rules of a validated [`Workflow`].
    pub fn from_workflow(workflow: &Workflow) -> Result<Self> {
        let default_retries = workflow.config.retries;
        let mut rules = Vec::with_capacity(workflow.rule.len());

        for (name, rc) in workflow.rule.iter() {
            let outputs = rc
                .output
                .iter()
                .map(|o| {
                    WildcardPattern::compile(o).map_err(|e| {
                        DagrunError::Config(format!("rule '{name}' output '{o}': {e}"))
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            rules.push(Rule {
                name: name.clone(),
                inputs: rc.input.clone(),
                outputs,
                cmd: rc.cmd.clone(),
                threads: rc.threads,
                retries: rc.effective_retries(default_retries),
                resources: rc.resources.clone(),
            });
        }

        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// All rules whose output patterns match the given concrete path, with
    /// the wildcard bindings of the first matching output per rule.
    ///
    /// More than one entry means the path is ambiguous (a planning error);
    /// zero means the path must already exist on disk or is unresolvable.
    pub fn matching(&self, path: &str) -> Vec<(&Rule, Bindings)> {
        let mut matches = Vec::new();

        for rule in &self.rules {
            for pattern in &rule.outputs {
                if let Some(bindings) = pattern.match_path(path) {
                    matches.push((rule, bindings));
                    break;
                }
            }
        }

        matches
    }
}
