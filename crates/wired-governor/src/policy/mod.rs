//! Limit policy protocol.
//!
//! A [`LimitPolicy`] is a caller-supplied strategy: a pure function from
//! `(baseline, active demand sizes)` to a desired wired limit, plus an
//! optional admission predicate. The coordinator groups all live tickets that
//! share a policy identity ([`GroupKey`]) into one governance domain and asks
//! each group for a single candidate limit per recomputation.
//!
//! # Determinism contract
//!
//! `limit` and `can_admit` are invoked while the coordinator holds its state
//! lock. They must be pure, must return a stable answer for the same snapshot,
//! and must not call back into the coordinator.

mod builtin;

pub use builtin::{CappedSumPolicy, FixedMarginPolicy, SumDemandPolicy};

use std::any::TypeId;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Stable grouping identity for a policy.
///
/// Two policy instances with equal keys are treated as the same governance
/// domain even if they are different objects. The key is computed once at
/// ticket-creation time.
///
/// # Example
///
/// ```
/// use wired_governor::GroupKey;
///
/// // Reference-style policies declare a name explicitly.
/// assert_eq!(GroupKey::named("weights"), GroupKey::named("weights"));
///
/// // Hashable value policies derive identity structurally.
/// #[derive(Hash)]
/// struct Margin(u64);
/// assert_eq!(GroupKey::derived(&Margin(64)), GroupKey::derived(&Margin(64)));
/// assert_ne!(GroupKey::derived(&Margin(64)), GroupKey::derived(&Margin(65)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupKey {
    /// Explicitly declared identity.
    Named(Arc<str>),
    /// Structural identity derived from a hashable value policy.
    Derived(u64),
}

impl GroupKey {
    /// Key from an explicit name.
    pub fn named(id: impl Into<Arc<str>>) -> Self {
        GroupKey::Named(id.into())
    }

    /// Key derived from a hashable value policy.
    ///
    /// The hash covers the concrete type as well as the value, so equal
    /// values of distinct policy types never collapse into one group. The
    /// identity is only meaningful within the current process.
    pub fn derived<P: Hash + 'static>(policy: &P) -> Self {
        let mut hasher = DefaultHasher::new();
        TypeId::of::<P>().hash(&mut hasher);
        policy.hash(&mut hasher);
        GroupKey::Derived(hasher.finish())
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKey::Named(name) => write!(f, "{name}"),
            GroupKey::Derived(hash) => write!(f, "derived:{hash:016x}"),
        }
    }
}

/// How a group folds reservation-ticket sizes into the `active_sizes`
/// argument passed to [`LimitPolicy::limit`].
///
/// Reservation sizes are always visible through
/// [`AdmissionSnapshot::reservation_sizes`]; this mode only controls the
/// `limit` input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReservationAccounting {
    /// Reservations are exposed exclusively through the separate channel.
    #[default]
    Separate,
    /// Reservations count while at least one active ticket in the group is
    /// running, and drop out of the limit input when the group goes idle.
    IncludedWhileActive,
    /// Reservations always count toward the limit input.
    AlwaysIncluded,
}

/// Immutable view of coordinator state handed to [`LimitPolicy::can_admit`].
#[derive(Debug, Clone)]
pub struct AdmissionSnapshot {
    /// Resolved baseline for the current recomputation.
    pub baseline: u64,
    /// Limit currently in effect.
    pub applied_limit: u64,
    /// Sizes of running active tickets in the candidate's group.
    pub active_sizes: Vec<u64>,
    /// Sizes of running reservation tickets in the candidate's group.
    pub reservation_sizes: Vec<u64>,
}

impl AdmissionSnapshot {
    /// Total running active demand in the group, saturating at `u64::MAX`.
    pub fn active_total(&self) -> u64 {
        self.active_sizes
            .iter()
            .fold(0, |acc, size| acc.saturating_add(*size))
    }

    /// Total running reservation demand in the group, saturating at
    /// `u64::MAX`.
    pub fn reservation_total(&self) -> u64 {
        self.reservation_sizes
            .iter()
            .fold(0, |acc, size| acc.saturating_add(*size))
    }
}

/// A wired-limit strategy.
///
/// Implementations are shared across tickets via `Arc<dyn LimitPolicy>`; the
/// coordinator treats them as opaque. See the module docs for the determinism
/// contract.
pub trait LimitPolicy: Send + Sync + 'static {
    /// Stable grouping identity. Must not change for the policy's lifetime.
    fn group_key(&self) -> GroupKey;

    /// Desired limit for the given baseline and demand snapshot. Pure.
    fn limit(&self, baseline: u64, active_sizes: &[u64]) -> u64;

    /// Whether a ticket of `candidate` bytes may be admitted right now.
    ///
    /// The default admits unconditionally. A denial suspends the caller until
    /// a later recomputation re-evaluates it; it is not an error.
    fn can_admit(&self, candidate: u64, snapshot: &AdmissionSnapshot) -> bool {
        let _ = (candidate, snapshot);
        true
    }

    /// Reservation folding mode for this group's `limit` input.
    fn reservation_accounting(&self) -> ReservationAccounting {
        ReservationAccounting::Separate
    }
}
