// src/config/validate.rs

use std::collections::{BTreeSet, HashMap};

use crate::config::model::{BackendKind, RawWorkflow, RuleConfig, Workflow};
use crate::errors::{DagrunError, Result};
use crate::plan::pattern::{placeholder_names, WildcardPattern};

impl TryFrom<RawWorkflow> for Workflow {
    type Error = DagrunError;

    fn try_from(raw: RawWorkflow) -> std::result::Result<Self, Self::Error> {
        validate_raw_workflow(&raw)?;
        Ok(Workflow::new_unchecked(raw))
    }
}

fn validate_raw_workflow(raw: &RawWorkflow) -> Result<()> {
    ensure_has_rules(raw)?;
    validate_global_config(raw)?;
    for (name, rule) in raw.rule.iter() {
        validate_rule(raw, name, rule)?;
    }
    validate_unique_output_patterns(raw)?;
    Ok(())
}

fn ensure_has_rules(raw: &RawWorkflow) -> Result<()> {
    if raw.rule.is_empty() {
        return Err(DagrunError::Config(
            "workflow must contain at least one [rule.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(raw: &RawWorkflow) -> Result<()> {
    if raw.config.max_jobs == 0 {
        return Err(DagrunError::Config(
            "[config].max_jobs must be >= 1 (got 0)".to_string(),
        ));
    }

    if raw.config.backend == BackendKind::Batch && raw.batch.is_none() {
        return Err(DagrunError::Config(
            "[config].backend = \"batch\" requires a [batch] section".to_string(),
        ));
    }

    if let Some(batch) = &raw.batch {
        if batch.max_submit_attempts == 0 {
            return Err(DagrunError::Config(
                "[batch].max_submit_attempts must be >= 1 (got 0)".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_rule(raw: &RawWorkflow, name: &str, rule: &RuleConfig) -> Result<()> {
    if rule.output.is_empty() {
        return Err(DagrunError::Config(format!(
            "rule '{name}' must declare at least one output"
        )));
    }

    if rule.threads == 0 {
        return Err(DagrunError::Config(format!(
            "rule '{name}' must request at least one thread"
        )));
    }

    // Compile all patterns up front so pattern errors surface at load time,
    // not in the middle of DAG construction.
    let mut output_wildcards: BTreeSet<String> = BTreeSet::new();
    for out in rule.output.iter() {
        let pattern = WildcardPattern::compile(out).map_err(|e| {
            DagrunError::Config(format!("rule '{name}' output '{out}': {e}"))
        })?;
        output_wildcards.extend(pattern.wildcards().iter().cloned());
    }

    // Every wildcard referenced by an input must be bound by an output of the
    // same rule, otherwise it can never be resolved for a concrete target.
    for input in rule.input.iter() {
        for wc in placeholder_names(input) {
            if !output_wildcards.contains(&wc) {
                return Err(DagrunError::Config(format!(
                    "rule '{name}' input '{input}' references wildcard '{{{wc}}}' \
                     which is not bound by any of the rule's outputs"
                )));
            }
        }
    }

    // The command template may reference inputs/outputs/threads, the rule's
    // wildcards, and declared params; anything else is a typo.
    for ph in placeholder_names(&rule.cmd) {
        let known = ph == "input"
            || ph == "output"
            || ph == "threads"
            || output_wildcards.contains(&ph)
            || ph
                .strip_prefix("params.")
                .is_some_and(|p| raw.params.contains_key(p));
        if !known {
            return Err(DagrunError::Config(format!(
                "rule '{name}' cmd references unknown placeholder '{{{ph}}}'"
            )));
        }
    }

    Ok(())
}

/// No two rules may declare the same output pattern: a concrete path matching
/// both would always be an `AmbiguousRule` planning error, so reject the
/// workflow up front when the ambiguity is literal.
fn validate_unique_output_patterns(raw: &RawWorkflow) -> Result<()> {
    let mut seen: HashMap<&str, &str> = HashMap::new();

    for (name, rule) in raw.rule.iter() {
        for out in rule.output.iter() {
            if let Some(first) = seen.insert(out.as_str(), name.as_str()) {
                return Err(DagrunError::Config(format!(
                    "output pattern '{out}' is declared by both rule '{first}' and rule '{name}'"
                )));
            }
        }
    }

    Ok(())
}
