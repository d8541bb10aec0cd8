// tests/ledger.rs

//! Resource ledger admission semantics.

use std::collections::BTreeMap;

use dagrun::ledger::{ResourceLedger, ResourceRequest};

fn ledger(caps: &[(&str, u64)], max_jobs: usize) -> ResourceLedger {
    let profile: BTreeMap<String, u64> = caps
        .iter()
        .map(|(name, total)| (name.to_string(), *total))
        .collect();
    ResourceLedger::from_profile(&profile, max_jobs)
}

#[test]
fn implicit_jobs_resource_bounds_concurrency() {
    let mut ledger = ledger(&[], 2);
    let one_job = ResourceRequest::new().with("jobs", 1);

    assert!(ledger.try_admit(&one_job));
    assert!(ledger.try_admit(&one_job));
    assert!(!ledger.try_admit(&one_job));

    ledger.release(&one_job);
    assert!(ledger.try_admit(&one_job));
}

#[test]
fn admission_is_all_or_nothing() {
    let mut ledger = ledger(&[("mem_mb", 1000), ("gpus", 1)], 8);
    let hog = ResourceRequest::new().with("mem_mb", 600).with("gpus", 1);

    assert!(ledger.try_admit(&hog));

    // Second request fits on mem_mb but not gpus; nothing may be committed.
    let denied = ResourceRequest::new().with("mem_mb", 200).with("gpus", 1);
    assert!(!ledger.try_admit(&denied));
    assert_eq!(ledger.committed("mem_mb"), 600);
    assert_eq!(ledger.committed("gpus"), 1);
}

#[test]
fn release_restores_exactly_what_was_admitted() {
    let mut ledger = ledger(&[("mem_mb", 1000)], 8);
    let requests: Vec<ResourceRequest> = (1..=4)
        .map(|i| ResourceRequest::new().with("mem_mb", i * 100).with("jobs", 1))
        .collect();

    for req in &requests {
        assert!(ledger.try_admit(req));
    }
    assert_eq!(ledger.committed("mem_mb"), 1000);
    assert_eq!(ledger.committed("jobs"), 4);

    for req in &requests {
        ledger.release(req);
    }
    assert_eq!(ledger.committed("mem_mb"), 0);
    assert_eq!(ledger.committed("jobs"), 0);
}

#[test]
fn untracked_resources_are_unconstrained() {
    let mut ledger = ledger(&[], 1);
    let req = ResourceRequest::new().with("scratch_gb", 10_000);

    assert!(ledger.exceeds_capacity(&req).is_none());
    assert!(ledger.try_admit(&req));
    assert!(ledger.try_admit(&req));
    assert_eq!(ledger.committed("scratch_gb"), 0);
}

#[test]
fn exceeds_capacity_flags_impossible_requests() {
    let ledger = ledger(&[("mem_mb", 1000)], 8);

    let impossible = ResourceRequest::new().with("mem_mb", 2000);
    assert_eq!(
        ledger.exceeds_capacity(&impossible),
        Some(("mem_mb".to_string(), 2000, 1000))
    );

    // Exactly at capacity is admissible, just not alongside anything else.
    let exact = ResourceRequest::new().with("mem_mb", 1000);
    assert!(ledger.exceeds_capacity(&exact).is_none());
}

#[test]
fn capacity_reports_profile_and_implicit_entries() {
    let ledger = ledger(&[("mem_mb", 1000)], 3);
    assert_eq!(ledger.capacity("mem_mb"), Some(1000));
    assert_eq!(ledger.capacity("jobs"), Some(3));
    assert_eq!(ledger.capacity("gpus"), None);
}
