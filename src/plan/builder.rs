// src/plan/builder.rs

//! DAG construction: resolve requested targets to concrete jobs.
//!
//! Resolution is recursive with memoization keyed by concrete output path, so
//! resolving the same output twice yields the same job and the result is a
//! proper graph, not a tree. A resolution stack detects cycles and names the
//! offending path sequence.

use std::collections::BTreeMap;
use std::path::PathBuf;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::dag::job::{Job, JobId, JobState, JobTable};
use crate::errors::{DagrunError, Result};
use crate::ledger::ResourceRequest;
use crate::plan::pattern::{expand_template, Bindings};
use crate::plan::rules::{Rule, RuleSet};

/// Result of resolving one concrete path.
enum Resolved {
    /// Produced by a job in the table.
    Produced(JobId),
    /// A pre-existing file with no producing rule.
    Source,
}

/// Build the job DAG covering all transitively required work for `targets`.
pub fn build_plan(
    rules: &RuleSet,
    params: &BTreeMap<String, String>,
    targets: &[String],
) -> Result<JobTable> {
    let mut builder = PlanBuilder {
        rules,
        params,
        table: JobTable::new(),
        stack: Vec::new(),
    };

    for target in targets {
        let path = PathBuf::from(target);
        match builder.resolve(&path)? {
            Resolved::Produced(id) => {
                debug!(target = %path.display(), job = %id, "target resolved to job");
            }
            Resolved::Source => {
                debug!(
                    target = %path.display(),
                    "target already exists with no producing rule; treating as source"
                );
            }
        }
    }

    let mut table = builder.table;
    table.link_successors();
    let order = stable_topo_order(&table)?;
    table.set_topo_order(order);

    Ok(table)
}

struct PlanBuilder<'a> {
    rules: &'a RuleSet,
    params: &'a BTreeMap<String, String>,
    table: JobTable,
    /// Paths currently being resolved, for cycle detection.
    stack: Vec<PathBuf>,
}

impl<'a> PlanBuilder<'a> {
    fn resolve(&mut self, path: &PathBuf) -> Result<Resolved> {
        if let Some(id) = self.table.producer_of(path) {
            return Ok(Resolved::Produced(id));
        }

        if let Some(pos) = self.stack.iter().position(|p| p == path) {
            let mut cycle: Vec<PathBuf> = self.stack[pos..].to_vec();
            cycle.push(path.clone());
            return Err(DagrunError::CyclicDependency(cycle));
        }

        let path_str = path.to_string_lossy();
        let matches = self.rules.matching(&path_str);

        match matches.len() {
            0 => {
                if path.is_file() {
                    self.table.record_source(path.clone());
                    Ok(Resolved::Source)
                } else {
                    Err(DagrunError::UnresolvableTarget(path.clone()))
                }
            }
            1 => {
                let (rule, bindings) = matches.into_iter().next().unwrap();
                // Clone out of the registry borrow before recursing.
                let rule = rule.clone();
                self.instantiate(path, &rule, bindings)
            }
            _ => Err(DagrunError::AmbiguousRule {
                path: path.clone(),
                rules: matches.iter().map(|(r, _)| r.name.clone()).collect(),
            }),
        }
    }

    /// Create the concrete job for `rule` with the given wildcard bindings,
    /// recursively resolving its inputs first.
    fn instantiate(
        &mut self,
        path: &PathBuf,
        rule: &Rule,
        bindings: Bindings,
    ) -> Result<Resolved> {
        self.stack.push(path.clone());

        let outputs = rule
            .outputs
            .iter()
            .map(|p| p.expand(&bindings).map(PathBuf::from))
            .collect::<anyhow::Result<Vec<_>>>()?;

        let inputs = rule
            .inputs
            .iter()
            .map(|t| expand_template(t, &bindings).map(PathBuf::from))
            .collect::<anyhow::Result<Vec<_>>>()?;

        let mut preds = Vec::new();
        for input in &inputs {
            if let Resolved::Produced(id) = self.resolve(input)? {
                if !preds.contains(&id) {
                    preds.push(id);
                }
            }
        }

        self.stack.pop();

        // Another job may have claimed one of our outputs while inputs were
        // being resolved (e.g. a wildcard-free log output shared between two
        // instantiations of the same rule).
        for out in &outputs {
            if let Some(existing) = self.table.claim_output(out) {
                return Err(DagrunError::AmbiguousRule {
                    path: out.clone(),
                    rules: vec![self.table.get(existing).rule.clone(), rule.name.clone()],
                });
            }
        }

        let cmd = self.expand_cmd(rule, &bindings, &inputs, &outputs)?;
        let key = outputs[0].to_string_lossy().into_owned();
        let id = self.table.next_id();

        debug!(
            job = %id,
            rule = %rule.name,
            key = %key,
            preds = preds.len(),
            "instantiated job"
        );

        self.table.push_job(Job {
            id,
            rule: rule.name.clone(),
            key,
            inputs,
            outputs,
            cmd,
            threads: rule.threads,
            resources: job_resources(rule),
            retry_ceiling: rule.retries,
            preds,
            succs: Vec::new(),
            state: JobState::Pending,
            attempts: 0,
            retry_queued: false,
            last_error: None,
        });

        Ok(Resolved::Produced(id))
    }

    fn expand_cmd(
        &self,
        rule: &Rule,
        bindings: &Bindings,
        inputs: &[PathBuf],
        outputs: &[PathBuf],
    ) -> Result<String> {
        let mut cmd_bindings = bindings.clone();
        cmd_bindings.insert("input".to_string(), join_paths(inputs));
        cmd_bindings.insert("output".to_string(), join_paths(outputs));
        cmd_bindings.insert("threads".to_string(), rule.threads.to_string());
        for (k, v) in self.params.iter() {
            cmd_bindings.insert(format!("params.{k}"), v.clone());
        }

        Ok(expand_template(&rule.cmd, &cmd_bindings)?)
    }
}

/// Per-job ledger request: declared resources plus `cpus` for the thread
/// count and one unit of the implicit `jobs` concurrency resource.
fn job_resources(rule: &Rule) -> ResourceRequest {
    let mut request = ResourceRequest::new();
    for (name, amount) in rule.resources.iter() {
        request = request.with(name.clone(), *amount);
    }
    request = request.with("cpus", rule.threads as u64);
    request.with("jobs", 1)
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Stable dispatch order: topological over the job graph, following job
/// discovery order. Also a second line of defence against cycles that the
/// resolution stack should already have caught.
fn stable_topo_order(table: &JobTable) -> Result<Vec<JobId>> {
    let mut graph: DiGraphMap<usize, ()> = DiGraphMap::new();

    for id in table.ids() {
        graph.add_node(id.0);
    }
    for job in table.iter() {
        for pred in &job.preds {
            graph.add_edge(pred.0, job.id.0, ());
        }
    }

    if let Err(cycle) = toposort(&graph, None) {
        let job = table.get(JobId(cycle.node_id()));
        return Err(DagrunError::CyclicDependency(vec![job.outputs[0].clone()]));
    }

    // Producers are always instantiated before their consumers, so id order
    // is itself topological and matches discovery order exactly.
    Ok(table.ids().collect())
}
