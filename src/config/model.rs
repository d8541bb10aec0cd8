// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

/// Top-level workflow file as read from TOML, before semantic validation.
///
/// ```toml
/// [config]
/// max_jobs = 4
/// retries = 2
/// staleness = "mtime"
///
/// [params]
/// delimiter = ","
///
/// [profile]
/// mem_mb = 16000
/// cpus = 8
///
/// [rule.preprocess]
/// input = ["data/raw.csv"]
/// output = ["results/processed.csv"]
/// cmd = "python scripts/helpers.py preprocess {input} {output} {params.delimiter}"
///
/// [rule.preprocess.resources]
/// mem_mb = 2000
/// ```
///
/// All sections except `[rule.*]` are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct RawWorkflow {
    /// Global engine behaviour from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// Named workflow parameters from `[params]`, usable in command templates
    /// as `{params.<name>}`.
    #[serde(default)]
    pub params: BTreeMap<String, String>,

    /// Resource capacities from `[profile]` (resource name -> total units).
    #[serde(default)]
    pub profile: BTreeMap<String, u64>,

    /// Batch-queue settings from `[batch]`; required when
    /// `config.backend = "batch"`.
    #[serde(default)]
    pub batch: Option<BatchSection>,

    /// All rules from `[rule.<name>]`. Keys are the rule names.
    #[serde(default)]
    pub rule: BTreeMap<String, RuleConfig>,
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Maximum number of concurrently running jobs. Modeled as an implicit
    /// `jobs` ledger resource with this capacity; every job requests one unit.
    #[serde(default = "default_max_jobs")]
    pub max_jobs: usize,

    /// Default retry ceiling per job: a job that keeps failing is attempted
    /// `retries + 1` times in total. Rules may override via `retries`.
    #[serde(default)]
    pub retries: u32,

    /// Cooling-off delay before a failed job is resubmitted.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// How staleness is decided: file modification times, stored content
    /// hashes of inputs, or both.
    #[serde(default)]
    pub staleness: StalenessMode,

    /// Bounded wait (seconds) for declared outputs to become visible after a
    /// job exits, before the run declares them missing. On shared filesystems
    /// output visibility may lag process exit.
    #[serde(default = "default_output_wait_secs")]
    pub output_wait_secs: u64,

    /// Which executor backend runs the jobs.
    #[serde(default)]
    pub backend: BackendKind,
}

fn default_max_jobs() -> usize {
    4
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_output_wait_secs() -> u64 {
    5
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            max_jobs: default_max_jobs(),
            retries: 0,
            retry_delay_ms: default_retry_delay_ms(),
            staleness: StalenessMode::default(),
            output_wait_secs: default_output_wait_secs(),
            backend: BackendKind::default(),
        }
    }
}

/// Basis for deciding whether a job's outputs are out of date.
///
/// Timestamp-only staleness is unreliable under shared-filesystem clock skew;
/// `Both` treats a job as stale if either signal says so.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StalenessMode {
    #[default]
    Mtime,
    Hash,
    Both,
}

impl StalenessMode {
    pub fn uses_mtime(self) -> bool {
        matches!(self, StalenessMode::Mtime | StalenessMode::Both)
    }

    pub fn uses_hash(self) -> bool {
        matches!(self, StalenessMode::Hash | StalenessMode::Both)
    }
}

/// Executor backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Local,
    Batch,
}

/// `[batch]` section: how jobs are handed to an external batch queue.
///
/// `submit_cmd` and `status_cmd` are shell templates. `submit_cmd` must print
/// the queue's job identifier on stdout; `status_cmd` is given `{queue_id}`
/// and must print a status word (PENDING / RUNNING / COMPLETED / FAILED ...).
#[derive(Debug, Clone, Deserialize)]
pub struct BatchSection {
    pub submit_cmd: String,
    pub status_cmd: String,

    /// Optional template run with `{queue_id}` when a submitted job must be
    /// actively terminated on abort.
    #[serde(default)]
    pub cancel_cmd: Option<String>,

    /// How often the queue is polled for job status.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Submission-layer faults (queue temporarily unavailable) are retried
    /// this many times with backoff before the job is given up on. These
    /// retries never consume the job's own retry budget.
    #[serde(default = "default_max_submit_attempts")]
    pub max_submit_attempts: u32,

    #[serde(default = "default_submit_backoff_ms")]
    pub submit_backoff_ms: u64,

    /// Optional queue / partition directive, exposed to `submit_cmd` as
    /// `{queue}`.
    #[serde(default)]
    pub queue: Option<String>,

    /// Optional accounting identifier, exposed to `submit_cmd` as `{account}`.
    #[serde(default)]
    pub account: Option<String>,
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_max_submit_attempts() -> u32 {
    5
}

fn default_submit_backoff_ms() -> u64 {
    500
}

/// `[rule.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleConfig {
    /// Input path patterns; may reference wildcards bound by `output`.
    #[serde(default)]
    pub input: Vec<String>,

    /// Output path patterns. Wildcards are written `{name}`. Output patterns
    /// must be unique across rules.
    pub output: Vec<String>,

    /// Command template, parameterized by `{input}`, `{output}`, `{threads}`,
    /// wildcard bindings and `{params.<name>}`.
    pub cmd: String,

    /// Thread / core count, requested from the `cpus` ledger resource and
    /// exposed to the command as `{threads}`.
    #[serde(default = "default_threads")]
    pub threads: u32,

    /// Optional per-rule retry ceiling override.
    #[serde(default)]
    pub retries: Option<u32>,

    /// Named resource request (e.g. `mem_mb = 2000`), admitted against
    /// `[profile]` capacities before dispatch.
    #[serde(default)]
    pub resources: BTreeMap<String, u64>,
}

fn default_threads() -> u32 {
    1
}

impl RuleConfig {
    /// Effective retry ceiling given the workflow-wide default.
    pub fn effective_retries(&self, default_retries: u32) -> u32 {
        self.retries.unwrap_or(default_retries)
    }
}

/// A semantically validated workflow.
///
/// Constructed only via `TryFrom<RawWorkflow>` (see `config::validate`), so
/// holding one implies the rule set passed all structural checks.
#[derive(Debug, Clone)]
pub struct Workflow {
    pub config: ConfigSection,
    pub params: BTreeMap<String, String>,
    pub profile: BTreeMap<String, u64>,
    pub batch: Option<BatchSection>,
    pub rule: BTreeMap<String, RuleConfig>,
}

impl Workflow {
    /// Internal constructor used by validation; does not re-check invariants.
    pub(crate) fn new_unchecked(raw: RawWorkflow) -> Self {
        Self {
            config: raw.config,
            params: raw.params,
            profile: raw.profile,
            batch: raw.batch,
            rule: raw.rule,
        }
    }
}
