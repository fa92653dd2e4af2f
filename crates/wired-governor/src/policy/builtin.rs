//! Built-in limit policies.

use std::sync::Arc;

use super::{AdmissionSnapshot, GroupKey, LimitPolicy, ReservationAccounting};

/// Sums running active demand on top of the baseline.
///
/// `limit = baseline + Σ active_sizes`. Identity is declared explicitly, so
/// independently constructed instances with the same name govern one group.
#[derive(Debug, Clone)]
pub struct SumDemandPolicy {
    key: GroupKey,
    accounting: ReservationAccounting,
}

impl SumDemandPolicy {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            key: GroupKey::named(name),
            accounting: ReservationAccounting::Separate,
        }
    }

    /// Same policy with a different reservation folding mode.
    pub fn with_reservation_accounting(mut self, accounting: ReservationAccounting) -> Self {
        self.accounting = accounting;
        self
    }
}

impl LimitPolicy for SumDemandPolicy {
    fn group_key(&self) -> GroupKey {
        self.key.clone()
    }

    fn limit(&self, baseline: u64, active_sizes: &[u64]) -> u64 {
        active_sizes
            .iter()
            .fold(baseline, |acc, size| acc.saturating_add(*size))
    }

    fn reservation_accounting(&self) -> ReservationAccounting {
        self.accounting
    }
}

/// Keeps a fixed margin above the baseline while any member is running.
///
/// A hashable value policy: identity is derived structurally, so any two
/// instances with equal margins collapse into one group without an explicit
/// name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedMarginPolicy {
    /// Bytes held above the baseline.
    pub margin: u64,
}

impl FixedMarginPolicy {
    pub fn new(margin: u64) -> Self {
        Self { margin }
    }
}

impl LimitPolicy for FixedMarginPolicy {
    fn group_key(&self) -> GroupKey {
        GroupKey::derived(self)
    }

    fn limit(&self, baseline: u64, active_sizes: &[u64]) -> u64 {
        if active_sizes.is_empty() {
            baseline
        } else {
            baseline.saturating_add(self.margin)
        }
    }
}

/// Sum policy with a hard admission cap on concurrently running demand.
///
/// Admission of a ticket is deferred while running demand (active plus
/// reservations) plus the candidate would exceed `cap`; the ticket stays
/// suspended until releases elsewhere free capacity.
#[derive(Debug, Clone)]
pub struct CappedSumPolicy {
    key: GroupKey,
    /// Maximum concurrently running demand in bytes.
    pub cap: u64,
}

impl CappedSumPolicy {
    pub fn new(name: impl Into<Arc<str>>, cap: u64) -> Self {
        Self {
            key: GroupKey::named(name),
            cap,
        }
    }
}

impl LimitPolicy for CappedSumPolicy {
    fn group_key(&self) -> GroupKey {
        self.key.clone()
    }

    fn limit(&self, baseline: u64, active_sizes: &[u64]) -> u64 {
        active_sizes
            .iter()
            .fold(baseline, |acc, size| acc.saturating_add(*size))
    }

    fn can_admit(&self, candidate: u64, snapshot: &AdmissionSnapshot) -> bool {
        let running = snapshot
            .active_total()
            .saturating_add(snapshot.reservation_total());
        running.saturating_add(candidate) <= self.cap
    }
}
