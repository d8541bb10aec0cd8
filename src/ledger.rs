// src/ledger.rs

//! Resource ledger: available vs. committed units of named resources.
//!
//! Admission is all-or-nothing across every resource in a request; partial
//! holds would allow deadlock between large jobs. Resources a request names
//! that the ledger has no capacity entry for are unconstrained and always
//! granted.

use std::collections::BTreeMap;

use tracing::debug;

/// Named resource quantities requested by one job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceRequest(pub BTreeMap<String, u64>);

impl ResourceRequest {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn with(mut self, name: impl Into<String>, amount: u64) -> Self {
        self.0.insert(name.into(), amount);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

#[derive(Debug, Clone, Copy)]
struct LedgerEntry {
    total: u64,
    committed: u64,
}

/// Tracks capacity and commitments for every named resource.
///
/// `try_admit` / `release` must be paired exactly once per admitted request;
/// double release is a programming error and panics in debug builds.
#[derive(Debug)]
pub struct ResourceLedger {
    entries: BTreeMap<String, LedgerEntry>,
}

impl ResourceLedger {
    /// Build a ledger from `[profile]` capacities plus the implicit `jobs`
    /// resource bounding global concurrency.
    pub fn from_profile(profile: &BTreeMap<String, u64>, max_jobs: usize) -> Self {
        let mut entries: BTreeMap<String, LedgerEntry> = profile
            .iter()
            .map(|(name, total)| {
                (
                    name.clone(),
                    LedgerEntry {
                        total: *total,
                        committed: 0,
                    },
                )
            })
            .collect();

        entries.insert(
            "jobs".to_string(),
            LedgerEntry {
                total: max_jobs as u64,
                committed: 0,
            },
        );

        Self { entries }
    }

    /// First resource (if any) whose requested amount exceeds total capacity.
    ///
    /// Such a request can never be admitted no matter how long it waits; the
    /// scheduler fails the job immediately instead of stalling the run.
    pub fn exceeds_capacity(&self, request: &ResourceRequest) -> Option<(String, u64, u64)> {
        for (name, amount) in request.iter() {
            if let Some(entry) = self.entries.get(name) {
                if amount > entry.total {
                    return Some((name.to_string(), amount, entry.total));
                }
            }
        }
        None
    }

    /// Atomic check-and-commit across all named resources in the request.
    ///
    /// Denies (committing nothing) if any single resource would exceed
    /// capacity.
    pub fn try_admit(&mut self, request: &ResourceRequest) -> bool {
        for (name, amount) in request.iter() {
            if let Some(entry) = self.entries.get(name) {
                if entry.committed + amount > entry.total {
                    debug!(
                        resource = name,
                        requested = amount,
                        committed = entry.committed,
                        total = entry.total,
                        "admission denied"
                    );
                    return false;
                }
            }
        }

        for (name, amount) in request.iter() {
            if let Some(entry) = self.entries.get_mut(name) {
                entry.committed += amount;
            }
        }

        true
    }

    /// Return the committed amounts of a previously admitted request.
    pub fn release(&mut self, request: &ResourceRequest) {
        for (name, amount) in request.iter() {
            if let Some(entry) = self.entries.get_mut(name) {
                debug_assert!(
                    entry.committed >= amount,
                    "release of '{name}' ({amount}) exceeds committed ({})",
                    entry.committed
                );
                entry.committed = entry.committed.saturating_sub(amount);
            }
        }
    }

    /// Currently committed amount for a resource (0 if untracked).
    pub fn committed(&self, name: &str) -> u64 {
        self.entries.get(name).map(|e| e.committed).unwrap_or(0)
    }

    /// Total capacity for a resource, if tracked.
    pub fn capacity(&self, name: &str) -> Option<u64> {
        self.entries.get(name).map(|e| e.total)
    }
}
