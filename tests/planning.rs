// tests/planning.rs

//! DAG construction: target resolution, wildcard binding, memoization and the
//! planning error taxonomy.

use std::path::PathBuf;

use dagrun::config::Workflow;
use dagrun::dag::JobTable;
use dagrun::errors::DagrunError;
use dagrun::plan::{build_plan, RuleSet};
use dagrun_test_utils::{init_tracing, RuleBuilder, WorkflowBuilder};

fn plan(workflow: &Workflow, targets: &[&str]) -> Result<JobTable, DagrunError> {
    let rules = RuleSet::from_workflow(workflow)?;
    let targets: Vec<String> = targets.iter().map(|t| t.to_string()).collect();
    build_plan(&rules, &workflow.params, &targets)
}

#[test]
fn chain_resolves_transitively_with_wildcards() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_str().unwrap().to_string();
    std::fs::create_dir(dir.path().join("data")).unwrap();
    std::fs::write(dir.path().join("data/s1.fq"), "reads").unwrap();

    let workflow = WorkflowBuilder::new()
        .rule(
            RuleBuilder::new("align")
                .input(&format!("{root}/data/{{sample}}.fq"))
                .output(&format!("{root}/out/{{sample}}.bam"))
                .cmd("align -t {threads} {input} {output}")
                .threads(2),
        )
        .rule(
            RuleBuilder::new("index")
                .input(&format!("{root}/out/{{sample}}.bam"))
                .output(&format!("{root}/out/{{sample}}.bam.bai"))
                .cmd("index {input} {output}"),
        )
        .build();

    let target = format!("{root}/out/s1.bam.bai");
    let table = plan(&workflow, &[&target]).unwrap();

    assert_eq!(table.len(), 2);
    assert_eq!(table.sources(), &[PathBuf::from(format!("{root}/data/s1.fq"))]);

    let index = table
        .iter()
        .find(|j| j.rule == "index")
        .expect("index job planned");
    let align = table
        .iter()
        .find(|j| j.rule == "align")
        .expect("align job planned");

    // Wildcard {sample} bound from the target flows back through the chain.
    assert_eq!(align.key, format!("{root}/out/s1.bam"));
    assert_eq!(
        align.cmd,
        format!("align -t 2 {root}/data/s1.fq {root}/out/s1.bam")
    );
    assert_eq!(index.preds, vec![align.id]);
    assert_eq!(align.succs, vec![index.id]);

    // Producers precede consumers in the dispatch order.
    let order = table.topo_order();
    let pos = |id| order.iter().position(|x| *x == id).unwrap();
    assert!(pos(align.id) < pos(index.id));
}

#[test]
fn diamond_instantiates_shared_producer_once() {
    init_tracing();
    let workflow = WorkflowBuilder::new()
        .rule(RuleBuilder::new("a").output("a.txt"))
        .rule(RuleBuilder::new("b").input("a.txt").output("b.txt"))
        .rule(RuleBuilder::new("c").input("a.txt").output("c.txt"))
        .rule(
            RuleBuilder::new("d")
                .input("b.txt")
                .input("c.txt")
                .output("d.txt"),
        )
        .build();

    let table = plan(&workflow, &["d.txt"]).unwrap();

    // a.txt resolved twice (from b and c) but instantiated once.
    assert_eq!(table.len(), 4);

    let job = |rule: &str| table.iter().find(|j| j.rule == rule).unwrap();
    let (a, b, c, d) = (job("a"), job("b"), job("c"), job("d"));

    assert_eq!(b.preds, vec![a.id]);
    assert_eq!(c.preds, vec![a.id]);
    assert_eq!(d.preds, vec![b.id, c.id]);
    assert_eq!(a.succs.len(), 2);
}

#[test]
fn requesting_same_target_twice_is_idempotent() {
    init_tracing();
    let workflow = WorkflowBuilder::new()
        .rule(RuleBuilder::new("a").output("a.txt"))
        .build();

    let table = plan(&workflow, &["a.txt", "a.txt"]).unwrap();
    assert_eq!(table.len(), 1);
}

#[test]
fn cyclic_rules_are_rejected_with_the_cycle_named() {
    init_tracing();
    let workflow = WorkflowBuilder::new()
        .rule(RuleBuilder::new("x").input("b.txt").output("a.txt"))
        .rule(RuleBuilder::new("y").input("a.txt").output("b.txt"))
        .build();

    let err = plan(&workflow, &["a.txt"]).unwrap_err();
    match err {
        DagrunError::CyclicDependency(cycle) => {
            assert!(cycle.contains(&PathBuf::from("a.txt")));
            assert!(cycle.contains(&PathBuf::from("b.txt")));
        }
        other => panic!("expected CyclicDependency, got {other:?}"),
    }
}

#[test]
fn overlapping_patterns_make_a_target_ambiguous() {
    init_tracing();
    // Distinct literal patterns, so validation accepts them; the concrete
    // path "out/special.txt" matches both.
    let workflow = WorkflowBuilder::new()
        .rule(RuleBuilder::new("wide").output("out/{x}.txt"))
        .rule(RuleBuilder::new("narrow").output("{y}/special.txt"))
        .build();

    let err = plan(&workflow, &["out/special.txt"]).unwrap_err();
    match err {
        DagrunError::AmbiguousRule { path, rules } => {
            assert_eq!(path, PathBuf::from("out/special.txt"));
            assert_eq!(rules.len(), 2);
        }
        other => panic!("expected AmbiguousRule, got {other:?}"),
    }
}

#[test]
fn unknown_target_with_no_file_is_unresolvable() {
    init_tracing();
    let workflow = WorkflowBuilder::new()
        .rule(RuleBuilder::new("a").output("a.txt"))
        .build();

    let err = plan(&workflow, &["missing.txt"]).unwrap_err();
    assert!(matches!(err, DagrunError::UnresolvableTarget(ref p) if *p == PathBuf::from("missing.txt")));
    assert!(err.is_planning());
}

#[test]
fn existing_file_with_no_rule_is_a_source() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let raw = dir.path().join("raw.csv");
    std::fs::write(&raw, "1,2\n").unwrap();

    let workflow = WorkflowBuilder::new()
        .rule(RuleBuilder::new("a").output("a.txt"))
        .build();

    // Target is the raw file itself: nothing to do, zero jobs.
    let table = plan(&workflow, &[raw.to_str().unwrap()]).unwrap();
    assert!(table.is_empty());
    assert_eq!(table.sources(), &[raw]);
}

#[test]
fn repeated_wildcard_must_bind_consistently() {
    init_tracing();
    let workflow = WorkflowBuilder::new()
        .rule(RuleBuilder::new("dup").output("dup/{a}/{a}.txt"))
        .build();

    let table = plan(&workflow, &["dup/x/x.txt"]).unwrap();
    assert_eq!(table.len(), 1);

    // Inconsistent bindings: the pattern does not match, so the target is
    // unresolvable rather than silently mis-bound.
    let err = plan(&workflow, &["dup/x/y.txt"]).unwrap_err();
    assert!(matches!(err, DagrunError::UnresolvableTarget(_)));
}

#[test]
fn cmd_expands_params_inputs_outputs_and_threads() {
    init_tracing();
    let workflow = WorkflowBuilder::new()
        .param("delimiter", ";")
        .rule(
            RuleBuilder::new("merge")
                .input("x.txt")
                .input("y.txt")
                .output("merged.txt")
                .cmd("merge -d {params.delimiter} -j {threads} {input} > {output}")
                .threads(3),
        )
        .rule(RuleBuilder::new("x").output("x.txt"))
        .rule(RuleBuilder::new("y").output("y.txt"))
        .build();

    let table = plan(&workflow, &["merged.txt"]).unwrap();
    let merge = table.iter().find(|j| j.rule == "merge").unwrap();
    assert_eq!(merge.cmd, "merge -d ; -j 3 x.txt y.txt > merged.txt");
}

#[test]
fn job_resources_include_cpus_and_implicit_jobs_unit() {
    init_tracing();
    let workflow = WorkflowBuilder::new()
        .rule(
            RuleBuilder::new("big")
                .output("big.txt")
                .threads(4)
                .resource("mem_mb", 2000),
        )
        .build();

    let table = plan(&workflow, &["big.txt"]).unwrap();
    let job = table.iter().next().unwrap();
    let req: Vec<_> = job.resources.iter().collect();
    assert_eq!(
        req,
        vec![("cpus", 4), ("jobs", 1), ("mem_mb", 2000)]
    );
}
