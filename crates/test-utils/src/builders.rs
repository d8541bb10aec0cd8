// crates/test-utils/src/builders.rs

//! Fluent builders for workflows and rules.
//!
//! Tests that need a workflow construct it here instead of writing a TOML
//! string per test. `build()` goes through the real validation so a builder
//! misuse fails loudly.

use std::collections::BTreeMap;

use dagrun::config::{
    BackendKind, BatchSection, ConfigSection, RawWorkflow, RuleConfig, StalenessMode, Workflow,
};
use dagrun::errors::DagrunError;

#[derive(Debug, Clone)]
pub struct WorkflowBuilder {
    config: ConfigSection,
    params: BTreeMap<String, String>,
    profile: BTreeMap<String, u64>,
    batch: Option<BatchSection>,
    rules: BTreeMap<String, RuleConfig>,
}

impl Default for WorkflowBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowBuilder {
    pub fn new() -> Self {
        Self {
            config: ConfigSection::default(),
            params: BTreeMap::new(),
            profile: BTreeMap::new(),
            batch: None,
            rules: BTreeMap::new(),
        }
    }

    pub fn max_jobs(mut self, n: usize) -> Self {
        self.config.max_jobs = n;
        self
    }

    pub fn retries(mut self, n: u32) -> Self {
        self.config.retries = n;
        self
    }

    pub fn retry_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry_delay_ms = ms;
        self
    }

    pub fn staleness(mut self, mode: StalenessMode) -> Self {
        self.config.staleness = mode;
        self
    }

    pub fn output_wait_secs(mut self, secs: u64) -> Self {
        self.config.output_wait_secs = secs;
        self
    }

    pub fn backend(mut self, kind: BackendKind) -> Self {
        self.config.backend = kind;
        self
    }

    pub fn param(mut self, key: &str, value: &str) -> Self {
        self.params.insert(key.to_string(), value.to_string());
        self
    }

    pub fn capacity(mut self, resource: &str, total: u64) -> Self {
        self.profile.insert(resource.to_string(), total);
        self
    }

    pub fn batch(mut self, section: BatchSection) -> Self {
        self.batch = Some(section);
        self
    }

    pub fn rule(mut self, rule: RuleBuilder) -> Self {
        let (name, config) = rule.into_parts();
        self.rules.insert(name, config);
        self
    }

    fn into_raw(self) -> RawWorkflow {
        RawWorkflow {
            config: self.config,
            params: self.params,
            profile: self.profile,
            batch: self.batch,
            rule: self.rules,
        }
    }

    /// Validate and build; panics on an invalid workflow.
    pub fn build(self) -> Workflow {
        self.try_build().expect("builder produced invalid workflow")
    }

    /// Validate and build, surfacing the validation error. Used by tests that
    /// assert on validation failures.
    pub fn try_build(self) -> Result<Workflow, DagrunError> {
        Workflow::try_from(self.into_raw())
    }
}

#[derive(Debug, Clone)]
pub struct RuleBuilder {
    name: String,
    input: Vec<String>,
    output: Vec<String>,
    cmd: String,
    threads: u32,
    retries: Option<u32>,
    resources: BTreeMap<String, u64>,
}

impl RuleBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            input: Vec::new(),
            output: Vec::new(),
            // Harmless default so tests that only care about the DAG shape
            // don't have to spell out a command.
            cmd: "true".to_string(),
            threads: 1,
            retries: None,
            resources: BTreeMap::new(),
        }
    }

    pub fn input(mut self, pattern: &str) -> Self {
        self.input.push(pattern.to_string());
        self
    }

    pub fn output(mut self, pattern: &str) -> Self {
        self.output.push(pattern.to_string());
        self
    }

    pub fn cmd(mut self, template: &str) -> Self {
        self.cmd = template.to_string();
        self
    }

    pub fn threads(mut self, n: u32) -> Self {
        self.threads = n;
        self
    }

    pub fn retries(mut self, n: u32) -> Self {
        self.retries = Some(n);
        self
    }

    pub fn resource(mut self, name: &str, amount: u64) -> Self {
        self.resources.insert(name.to_string(), amount);
        self
    }

    fn into_parts(self) -> (String, RuleConfig) {
        (
            self.name,
            RuleConfig {
                input: self.input,
                output: self.output,
                cmd: self.cmd,
                threads: self.threads,
                retries: self.retries,
                resources: self.resources,
            },
        )
    }
}
