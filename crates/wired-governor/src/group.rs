//! Policy groups: aggregation of live tickets sharing one policy identity.
//!
//! A group is pure bookkeeping. It exposes demand snapshots and computes one
//! candidate limit on demand, always synchronously within the coordinator's
//! serialized update; it never recomputes proactively.

use std::collections::HashMap;
use std::sync::Arc;

use crate::policy::{LimitPolicy, ReservationAccounting};
use crate::ticket::{TicketId, TicketKind};

#[derive(Debug, Clone, Copy)]
struct Member {
    size: u64,
    kind: TicketKind,
    /// False while the ticket is admitted but still waiting in the FIFO
    /// queue; waiting demand does not count toward limits or admission math.
    running: bool,
}

/// All live tickets governed by one policy identity.
pub(crate) struct PolicyGroup {
    policy: Arc<dyn LimitPolicy>,
    members: HashMap<TicketId, Member>,
}

impl PolicyGroup {
    /// Create a group around the first policy instance seen for its key.
    /// Later instances with an equal key join this group; their policy
    /// objects are not retained.
    pub(crate) fn new(policy: Arc<dyn LimitPolicy>) -> Self {
        Self {
            policy,
            members: HashMap::new(),
        }
    }

    pub(crate) fn policy(&self) -> &dyn LimitPolicy {
        self.policy.as_ref()
    }

    pub(crate) fn insert(&mut self, id: TicketId, size: u64, kind: TicketKind) {
        self.members.insert(
            id,
            Member {
                size,
                kind,
                running: false,
            },
        );
    }

    pub(crate) fn mark_running(&mut self, id: TicketId) {
        if let Some(member) = self.members.get_mut(&id) {
            member.running = true;
        }
    }

    pub(crate) fn remove(&mut self, id: TicketId) {
        self.members.remove(&id);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub(crate) fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Sizes of running active tickets.
    pub(crate) fn active_sizes(&self) -> Vec<u64> {
        self.members
            .values()
            .filter(|m| m.running && m.kind == TicketKind::Active)
            .map(|m| m.size)
            .collect()
    }

    /// Sizes of running reservation tickets.
    pub(crate) fn reservation_sizes(&self) -> Vec<u64> {
        self.members
            .values()
            .filter(|m| m.running && m.kind == TicketKind::Reservation)
            .map(|m| m.size)
            .collect()
    }

    /// This group's candidate limit, folding reservations into the `limit`
    /// input according to the policy's accounting mode.
    pub(crate) fn candidate_limit(&self, baseline: u64) -> u64 {
        let mut sizes = self.active_sizes();
        match self.policy.reservation_accounting() {
            ReservationAccounting::Separate => {}
            ReservationAccounting::IncludedWhileActive => {
                if !sizes.is_empty() {
                    sizes.extend(self.reservation_sizes());
                }
            }
            ReservationAccounting::AlwaysIncluded => {
                sizes.extend(self.reservation_sizes());
            }
        }
        self.policy.limit(baseline, &sizes)
    }
}
