//! The process-wide wired-limit coordinator.
//!
//! One serialized decision point arbitrates the platform wired-memory limit
//! between all policy groups. Every state mutation (ticket start, release,
//! config update) runs a recomputation while holding the state mutex:
//! baseline refresh, FIFO admission, then limit update through the hysteresis
//! gate and at most one platform setter call. Admissions can free capacity
//! for the next waiter only indirectly (via the applied limit), so the loop
//! repeats until a pass admits nobody.
//!
//! Lock order: coordinator state, then ticket state. Never the reverse.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::baseline::resolve_baseline;
use crate::config::GovernorConfig;
use crate::error::{GovernorError, GovernorResult};
use crate::events::{EventSink, EventStream, GovernorEvent};
use crate::group::PolicyGroup;
use crate::hysteresis::{HysteresisGuard, Verdict};
use crate::platform::{UnsupportedPlatform, WiredPlatform};
use crate::policy::{AdmissionSnapshot, GroupKey, LimitPolicy};
use crate::ticket::{Ticket, TicketId, TicketKind, TicketShared, TicketState};

static SHARED: OnceLock<Coordinator> = OnceLock::new();

/// Result of registering a ticket start with the coordinator.
pub(crate) enum StartOutcome {
    /// Already running or released, or admitted on the fast path.
    Settled,
    /// Queued; the caller awaits this handle until the ticket settles.
    Wait(Arc<Notify>),
}

struct Waiter {
    ticket: Arc<TicketShared>,
    /// One handle per suspended `start()` caller. Concurrent starts on the
    /// same ticket each register their own, so settling wakes every caller
    /// with `notify_one` permit semantics (a caller that has not reached its
    /// await yet still observes the stored permit).
    wakers: Vec<Arc<Notify>>,
}

impl Waiter {
    fn wake_all(&self) {
        for waker in &self.wakers {
            waker.notify_one();
        }
    }
}

struct State {
    config: GovernorConfig,
    baseline: u64,
    applied_limit: u64,
    guard: HysteresisGuard,
    groups: HashMap<GroupKey, PolicyGroup>,
    /// Strict FIFO: a denied head blocks everything behind it.
    waiters: VecDeque<Waiter>,
}

impl State {
    fn refresh_baseline(&mut self, platform: &dyn WiredPlatform) {
        self.baseline = resolve_baseline(&self.config, platform);
    }

    fn register(&mut self, ticket: &TicketShared) {
        self.groups
            .entry(ticket.key.clone())
            .or_insert_with(|| PolicyGroup::new(ticket.policy.clone()))
            .insert(ticket.id, ticket.size, ticket.kind);
    }

    fn set_running(&mut self, ticket: &TicketShared) {
        if let Some(group) = self.groups.get_mut(&ticket.key) {
            group.mark_running(ticket.id);
        }
        *ticket.state.lock() = TicketState::Running;
    }

    fn remove_member(&mut self, key: &GroupKey, id: TicketId) {
        if let Some(group) = self.groups.get_mut(key) {
            group.remove(id);
            if group.is_empty() {
                self.groups.remove(key);
                tracing::debug!(group = %key, "policy group dropped");
            }
        }
    }

    fn snapshot_for(&self, key: &GroupKey) -> Option<AdmissionSnapshot> {
        let group = self.groups.get(key)?;
        Some(AdmissionSnapshot {
            baseline: self.baseline,
            applied_limit: self.applied_limit,
            active_sizes: group.active_sizes(),
            reservation_sizes: group.reservation_sizes(),
        })
    }

    fn admits(&self, ticket: &TicketShared) -> bool {
        match (self.groups.get(&ticket.key), self.snapshot_for(&ticket.key)) {
            (Some(group), Some(snapshot)) => group.policy().can_admit(ticket.size, &snapshot),
            _ => false,
        }
    }

    /// Maximum over all group candidates, floored at the baseline. With no
    /// live groups the limit settles at the baseline.
    fn candidate_limit(&self) -> u64 {
        self.groups
            .values()
            .map(|group| group.candidate_limit(self.baseline))
            .max()
            .unwrap_or(self.baseline)
            .max(self.baseline)
    }

    fn policy_only(&self, platform: &dyn WiredPlatform) -> bool {
        self.config.policy_only_when_unsupported && !platform.supports_wired_limit()
    }
}

struct Inner {
    state: Mutex<State>,
    platform: Arc<dyn WiredPlatform>,
    events: EventSink,
}

/// Point-in-time counters for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct GovernorStats {
    /// Baseline at the last recomputation.
    pub baseline: u64,
    /// Limit currently in effect (or tracked, in policy-only mode).
    pub applied_limit: u64,
    /// Live policy groups.
    pub group_count: usize,
    /// Live tickets across all groups, running or waiting.
    pub ticket_count: usize,
    /// Tickets suspended in the admission queue.
    pub waiting_tickets: usize,
    /// Whether recomputations skip the platform setter.
    pub policy_only: bool,
}

/// Handle to the process-wide wired-memory arbiter.
///
/// Cheap to clone; all clones share one state. Most hosts use
/// [`Coordinator::shared`]; tests and embedders construct isolated instances
/// with [`Coordinator::new`].
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl Coordinator {
    /// Build an isolated coordinator over the given platform.
    ///
    /// The initial applied limit equals the resolved baseline; no setter call
    /// is made until the first recomputation changes the limit.
    pub fn new(platform: Arc<dyn WiredPlatform>, config: GovernorConfig) -> GovernorResult<Self> {
        config.validate()?;
        let baseline = resolve_baseline(&config, platform.as_ref());
        let state = State {
            config,
            baseline,
            applied_limit: baseline,
            guard: HysteresisGuard::default(),
            groups: HashMap::new(),
            waiters: VecDeque::new(),
        };
        Ok(Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                platform,
                events: EventSink::new(),
            }),
        })
    }

    /// The process-wide shared coordinator.
    ///
    /// First access without a prior [`try_init_shared`] installs
    /// [`UnsupportedPlatform`] with the default configuration, which runs in
    /// policy-only mode.
    ///
    /// [`try_init_shared`]: Coordinator::try_init_shared
    pub fn shared() -> &'static Coordinator {
        SHARED.get_or_init(|| {
            Coordinator::new(Arc::new(UnsupportedPlatform), GovernorConfig::default())
                .expect("default configuration is valid")
        })
    }

    /// Install the shared coordinator's platform and configuration.
    ///
    /// Must happen before the first [`Coordinator::shared`] access; afterwards
    /// (or on a second call) this fails with
    /// [`GovernorError::SharedAlreadyInitialized`].
    pub fn try_init_shared(
        platform: Arc<dyn WiredPlatform>,
        config: GovernorConfig,
    ) -> GovernorResult<()> {
        let coordinator = Coordinator::new(platform, config)?;
        SHARED
            .set(coordinator)
            .map_err(|_| GovernorError::SharedAlreadyInitialized)
    }

    /// Create a ticket governed by `policy`.
    ///
    /// Creation touches no shared state; the ticket joins its group when
    /// started.
    pub fn ticket(
        &self,
        policy: Arc<dyn LimitPolicy>,
        size: u64,
        kind: TicketKind,
    ) -> Ticket {
        let shared = Arc::new(TicketShared {
            id: Uuid::new_v4(),
            key: policy.group_key(),
            policy,
            size,
            kind,
            state: Mutex::new(TicketState::Created),
        });
        Ticket {
            shared,
            coordinator: self.clone(),
        }
    }

    /// Mutate the configuration and recompute under the new values.
    ///
    /// The mutation is validated before taking effect; on rejection the
    /// previous configuration stays in place and no recomputation runs.
    pub fn update_config<F>(&self, mutate: F) -> GovernorResult<()>
    where
        F: FnOnce(&mut GovernorConfig),
    {
        let mut state = self.inner.state.lock();
        let mut next = state.config.clone();
        mutate(&mut next);
        next.validate()?;
        tracing::debug!(config = ?next, "governor configuration updated");
        state.config = next;
        self.recompute_locked(&mut state);
        Ok(())
    }

    /// Snapshot of the coordinator's counters.
    pub fn stats(&self) -> GovernorStats {
        let state = self.inner.state.lock();
        GovernorStats {
            baseline: state.baseline,
            applied_limit: state.applied_limit,
            group_count: state.groups.len(),
            ticket_count: state.groups.values().map(|g| g.member_count()).sum(),
            waiting_tickets: state.waiters.len(),
            policy_only: state.policy_only(self.inner.platform.as_ref()),
        }
    }

    /// Subscribe to admission and limit-change events from this point on.
    pub fn events(&self) -> EventStream {
        self.inner.events.subscribe()
    }

    /// Register a start attempt. Fast-path admission applies only when the
    /// queue is empty; otherwise the ticket takes its FIFO place.
    pub(crate) fn begin_start(&self, shared: &Arc<TicketShared>) -> StartOutcome {
        let mut state = self.inner.state.lock();

        let newly_registered = {
            let mut ticket_state = shared.state.lock();
            match *ticket_state {
                TicketState::Running | TicketState::Released => return StartOutcome::Settled,
                TicketState::Admitted => false,
                TicketState::Created => {
                    *ticket_state = TicketState::Admitted;
                    true
                }
            }
        };

        if newly_registered {
            state.register(shared);
        } else {
            // A concurrent start already queued this ticket; register a
            // dedicated wakeup for this caller alongside the queued waiter.
            if let Some(waiter) = state.waiters.iter_mut().find(|w| w.ticket.id == shared.id) {
                let notify = Arc::new(Notify::new());
                waiter.wakers.push(notify.clone());
                return StartOutcome::Wait(notify);
            }
            return StartOutcome::Settled;
        }

        state.refresh_baseline(self.inner.platform.as_ref());
        if state.waiters.is_empty() && state.admits(shared) {
            state.set_running(shared);
            tracing::debug!(
                ticket = %shared.id,
                group = %shared.key,
                size = shared.size,
                "ticket admitted"
            );
            self.inner.events.emit(GovernorEvent::TicketAdmitted {
                ticket: shared.id,
                group: shared.key.clone(),
                size: shared.size,
            });
            self.recompute_locked(&mut state);
            return StartOutcome::Settled;
        }

        let notify = Arc::new(Notify::new());
        state.waiters.push_back(Waiter {
            ticket: shared.clone(),
            wakers: vec![notify.clone()],
        });
        tracing::debug!(
            ticket = %shared.id,
            group = %shared.key,
            size = shared.size,
            queue_depth = state.waiters.len(),
            "ticket deferred"
        );
        self.inner.events.emit(GovernorEvent::TicketDeferred {
            ticket: shared.id,
            group: shared.key.clone(),
            size: shared.size,
        });
        StartOutcome::Wait(notify)
    }

    /// Whether the ticket has left the admission queue (admitted or released).
    pub(crate) fn ticket_settled(&self, shared: &TicketShared) -> bool {
        matches!(
            *shared.state.lock(),
            TicketState::Running | TicketState::Released
        )
    }

    /// Release a ticket: idempotent, synchronous, recomputes on every first
    /// release regardless of the prior state.
    pub(crate) fn release_ticket(&self, shared: &TicketShared) {
        let mut state = self.inner.state.lock();

        {
            let mut ticket_state = shared.state.lock();
            if *ticket_state == TicketState::Released {
                return;
            }
            *ticket_state = TicketState::Released;
        }

        if let Some(position) = state.waiters.iter().position(|w| w.ticket.id == shared.id) {
            // Wake every suspended start() so they can observe the release.
            if let Some(waiter) = state.waiters.remove(position) {
                waiter.wake_all();
            }
        }
        state.remove_member(&shared.key, shared.id);
        tracing::debug!(ticket = %shared.id, group = %shared.key, "ticket released");
        self.inner.events.emit(GovernorEvent::TicketReleased {
            ticket: shared.id,
            group: shared.key.clone(),
        });
        self.recompute_locked(&mut state);
    }

    /// Full recomputation: admit, update the limit, repeat until stable.
    fn recompute_locked(&self, state: &mut State) {
        loop {
            state.refresh_baseline(self.inner.platform.as_ref());
            let admitted = self.admit_waiters_locked(state);
            self.update_limit_locked(state);
            if admitted == 0 {
                break;
            }
        }
    }

    /// Admit from the queue head until the first denial.
    fn admit_waiters_locked(&self, state: &mut State) -> usize {
        let mut admitted = 0;
        loop {
            let Some(front) = state.waiters.front() else {
                break;
            };
            let shared = front.ticket.clone();
            if !state.admits(&shared) {
                break;
            }
            let waiter = state.waiters.pop_front().expect("front was just observed");
            state.set_running(&shared);
            waiter.wake_all();
            tracing::debug!(
                ticket = %shared.id,
                group = %shared.key,
                size = shared.size,
                "ticket admitted"
            );
            self.inner.events.emit(GovernorEvent::TicketAdmitted {
                ticket: shared.id,
                group: shared.key.clone(),
                size: shared.size,
            });
            admitted += 1;
        }
        admitted
    }

    /// Evaluate the candidate limit through the hysteresis gate and push an
    /// approved change to the platform. A platform refusal is contained: the
    /// previous limit stays in effect and only the event stream sees it.
    fn update_limit_locked(&self, state: &mut State) {
        let proposed = state.candidate_limit();
        let current = state.applied_limit;
        if proposed == current {
            return;
        }

        let now = Instant::now();
        let verdict = state.guard.evaluate_at(
            proposed,
            current,
            state.config.shrink_threshold_fraction,
            state.config.shrink_cooldown(),
            now,
        );
        match verdict {
            Verdict::Apply => {
                if !state.policy_only(self.inner.platform.as_ref()) {
                    if let Err(err) = self.inner.platform.set_wired_limit(proposed) {
                        tracing::warn!(
                            attempted = proposed,
                            retained = current,
                            error = %err,
                            "platform rejected wired limit"
                        );
                        self.inner.events.emit(GovernorEvent::PlatformSetRejected {
                            attempted: proposed,
                            retained: current,
                            reason: err.to_string(),
                        });
                        return;
                    }
                }
                state.applied_limit = proposed;
                state.guard.note_applied(now);
                tracing::debug!(previous = current, applied = proposed, "wired limit applied");
                self.inner.events.emit(GovernorEvent::LimitApplied {
                    previous: current,
                    applied: proposed,
                });
            }
            Verdict::Defer { drop_fraction } => {
                tracing::debug!(
                    current,
                    proposed,
                    drop_fraction,
                    "shrink deferred by hysteresis"
                );
                self.inner.events.emit(GovernorEvent::ShrinkDeferred {
                    current,
                    proposed,
                    drop_fraction,
                });
            }
        }
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("Coordinator")
            .field("baseline", &stats.baseline)
            .field("applied_limit", &stats.applied_limit)
            .field("group_count", &stats.group_count)
            .field("waiting_tickets", &stats.waiting_tickets)
            .field("policy_only", &stats.policy_only)
            .finish()
    }
}
