//! Per-identity free-usage counter.

use std::collections::HashSet;

use {dashmap::DashMap, tracing::debug};

use parley_config::QuotaConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    Allowed,
    Denied,
}

/// Counts conversation turns per identity and denies them past the free limit.
///
/// Counts live for the whole process and are never reset.
#[derive(Debug)]
pub struct QuotaGuard {
    counts: DashMap<String, u32>,
    free_limit: u32,
    allowlist: HashSet<String>,
}

impl QuotaGuard {
    pub fn new(free_limit: u32, allowlist: impl IntoIterator<Item = String>) -> Self {
        Self {
            counts: DashMap::new(),
            free_limit,
            allowlist: allowlist.into_iter().collect(),
        }
    }

    pub fn from_config(config: &QuotaConfig) -> Self {
        Self::new(config.free_limit, config.allowlist.iter().cloned())
    }

    #[must_use]
    pub fn free_limit(&self) -> u32 {
        self.free_limit
    }

    /// Atomically check and consume one unit for `identity_id`.
    pub fn check_and_increment(&self, identity_id: &str) -> QuotaDecision {
        if self.allowlist.contains(identity_id) {
            return QuotaDecision::Allowed;
        }

        let mut count = self.counts.entry(identity_id.to_string()).or_insert(0);
        if *count >= self.free_limit {
            debug!(identity_id, used = *count, "quota exhausted");
            return QuotaDecision::Denied;
        }
        *count += 1;
        QuotaDecision::Allowed
    }

    /// Units consumed so far by `identity_id`.
    pub fn usage(&self, identity_id: &str) -> u32 {
        self.counts.get(identity_id).map_or(0, |count| *count)
    }
}
