// tests/config.rs

//! Workflow file loading and semantic validation.

use dagrun::config::{load_and_validate, BackendKind};
use dagrun::errors::DagrunError;
use dagrun_test_utils::{init_tracing, RuleBuilder, WorkflowBuilder};

fn expect_config_error(result: Result<dagrun::config::Workflow, DagrunError>, needle: &str) {
    match result {
        Err(DagrunError::Config(msg)) => {
            assert!(msg.contains(needle), "expected '{needle}' in: {msg}")
        }
        Err(other) => panic!("expected Config error, got {other:?}"),
        Ok(_) => panic!("expected Config error mentioning '{needle}', got Ok"),
    }
}

#[test]
fn workflow_without_rules_is_rejected() {
    init_tracing();
    expect_config_error(WorkflowBuilder::new().try_build(), "at least one [rule");
}

#[test]
fn zero_max_jobs_is_rejected() {
    init_tracing();
    let result = WorkflowBuilder::new()
        .max_jobs(0)
        .rule(RuleBuilder::new("a").output("a.txt"))
        .try_build();
    expect_config_error(result, "max_jobs");
}

#[test]
fn batch_backend_requires_batch_section() {
    init_tracing();
    let result = WorkflowBuilder::new()
        .backend(BackendKind::Batch)
        .rule(RuleBuilder::new("a").output("a.txt"))
        .try_build();
    expect_config_error(result, "[batch] section");
}

#[test]
fn rule_without_output_is_rejected() {
    init_tracing();
    let result = WorkflowBuilder::new()
        .rule(RuleBuilder::new("a").input("in.txt").cmd("wc {input}"))
        .try_build();
    expect_config_error(result, "at least one output");
}

#[test]
fn input_wildcard_unbound_by_outputs_is_rejected() {
    init_tracing();
    let result = WorkflowBuilder::new()
        .rule(
            RuleBuilder::new("a")
                .input("data/{sample}.fq")
                .output("out/fixed.txt"),
        )
        .try_build();
    expect_config_error(result, "wildcard '{sample}'");
}

#[test]
fn unknown_cmd_placeholder_is_rejected() {
    init_tracing();
    let result = WorkflowBuilder::new()
        .rule(
            RuleBuilder::new("a")
                .output("a.txt")
                .cmd("run {typo} > {output}"),
        )
        .try_build();
    expect_config_error(result, "unknown placeholder '{typo}'");
}

#[test]
fn undeclared_param_in_cmd_is_rejected() {
    init_tracing();
    let result = WorkflowBuilder::new()
        .param("present", "x")
        .rule(
            RuleBuilder::new("a")
                .output("a.txt")
                .cmd("run {params.absent} > {output}"),
        )
        .try_build();
    expect_config_error(result, "params.absent");
}

#[test]
fn duplicate_output_pattern_across_rules_is_rejected() {
    init_tracing();
    let result = WorkflowBuilder::new()
        .rule(RuleBuilder::new("a").output("shared/{x}.txt"))
        .rule(RuleBuilder::new("b").output("shared/{x}.txt"))
        .try_build();
    expect_config_error(result, "shared/{x}.txt");
}

#[test]
fn zero_threads_is_rejected() {
    init_tracing();
    let result = WorkflowBuilder::new()
        .rule(RuleBuilder::new("a").output("a.txt").threads(0))
        .try_build();
    expect_config_error(result, "at least one thread");
}

#[test]
fn toml_file_round_trips_with_defaults() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Dagrun.toml");
    std::fs::write(
        &path,
        r#"
[config]
max_jobs = 3
retries = 2
staleness = "both"

[params]
delimiter = ","

[profile]
mem_mb = 16000

[rule.gen]
output = ["out/{sample}.txt"]
cmd = "gen {output} {params.delimiter}"
threads = 2

[rule.gen.resources]
mem_mb = 2000
"#,
    )
    .unwrap();

    let workflow = load_and_validate(&path).unwrap();
    assert_eq!(workflow.config.max_jobs, 3);
    assert_eq!(workflow.config.retries, 2);
    assert!(workflow.config.staleness.uses_mtime());
    assert!(workflow.config.staleness.uses_hash());
    // Unset fields take their documented defaults.
    assert_eq!(workflow.config.retry_delay_ms, 1000);
    assert_eq!(workflow.config.backend, BackendKind::Local);

    let rule = &workflow.rule["gen"];
    assert_eq!(rule.threads, 2);
    assert_eq!(rule.resources["mem_mb"], 2000);
    assert_eq!(rule.effective_retries(workflow.config.retries), 2);
}

#[test]
fn per_rule_retries_override_the_default() {
    init_tracing();
    let workflow = WorkflowBuilder::new()
        .retries(2)
        .rule(RuleBuilder::new("default").output("d.txt"))
        .rule(RuleBuilder::new("custom").output("c.txt").retries(5))
        .build();

    assert_eq!(workflow.rule["default"].effective_retries(workflow.config.retries), 2);
    assert_eq!(workflow.rule["custom"].effective_retries(workflow.config.retries), 5);
}

#[test]
fn missing_file_is_an_io_error() {
    init_tracing();
    let err = load_and_validate("/nonexistent/Dagrun.toml").unwrap_err();
    assert!(matches!(err, DagrunError::Io(_)));
}

#[test]
fn malformed_toml_is_a_planning_error() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Dagrun.toml");
    std::fs::write(&path, "this is not toml [").unwrap();

    let err = load_and_validate(&path).unwrap_err();
    assert!(matches!(err, DagrunError::Toml(_)));
    assert!(err.is_planning());
}

#[test]
fn planning_and_runtime_errors_take_distinct_exit_codes() {
    init_tracing();
    let planning = DagrunError::Config("no rules defined".to_string());
    assert!(planning.is_planning());
    assert_eq!(planning.exit_code(), 2);

    // A fault surfacing mid-run (e.g. the executor loop going away) is not a
    // planning error and shares the partial-failure exit code.
    let runtime = DagrunError::Other(anyhow::anyhow!("executor loop gone"));
    assert!(!runtime.is_planning());
    assert_eq!(runtime.exit_code(), 1);
}
