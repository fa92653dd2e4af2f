//! Tickets: units of wired-memory demand.
//!
//! A ticket owns an immutable size and kind and a state machine
//! `Created → Admitted → Running → Released`. Starting a ticket registers it
//! with its policy group and suspends the caller until admission; releasing
//! is idempotent and triggers recomputation. [`Ticket::with_wired_limit`]
//! provides the scoped-acquisition form that guarantees release on every exit
//! path, including cancellation.

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::coordinator::{Coordinator, StartOutcome};
use crate::policy::{GroupKey, LimitPolicy};

/// Unique, opaque ticket identifier.
pub type TicketId = Uuid;

/// What a ticket's demand represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketKind {
    /// Demand tied to in-flight work; directly drives limit growth.
    Active,
    /// Long-lived demand (resident weights) that participates in budgeting
    /// without single-handedly keeping the limit elevated while idle.
    Reservation,
}

/// Ticket lifecycle states. `Released` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketState {
    /// Constructed; no shared state touched yet.
    Created,
    /// Registered with its policy group, possibly waiting for admission.
    Admitted,
    /// Admitted and counting toward limit and admission math.
    Running,
    /// Deregistered. Terminal.
    Released,
}

pub(crate) struct TicketShared {
    pub(crate) id: TicketId,
    pub(crate) key: GroupKey,
    pub(crate) policy: Arc<dyn LimitPolicy>,
    pub(crate) size: u64,
    pub(crate) kind: TicketKind,
    pub(crate) state: Mutex<TicketState>,
}

/// A handle to one unit of memory demand.
///
/// Cloning yields another handle to the same ticket; releasing through any
/// handle releases the ticket.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use wired_governor::{Coordinator, SumDemandPolicy, TicketKind};
///
/// # async fn load_weights() {}
/// # async fn demo() {
/// let policy = Arc::new(SumDemandPolicy::new("weights"));
/// let ticket = Coordinator::shared().ticket(policy, 512 << 20, TicketKind::Active);
/// ticket
///     .with_wired_limit(|| async {
///         load_weights().await;
///     })
///     .await;
/// # }
/// ```
#[derive(Clone)]
pub struct Ticket {
    pub(crate) shared: Arc<TicketShared>,
    pub(crate) coordinator: Coordinator,
}

impl Ticket {
    /// Unique identifier of this ticket.
    pub fn id(&self) -> TicketId {
        self.shared.id
    }

    /// Grouping identity of the owning policy, computed at creation.
    pub fn group_key(&self) -> &GroupKey {
        &self.shared.key
    }

    /// Demand in bytes. Immutable after creation.
    pub fn size(&self) -> u64 {
        self.shared.size
    }

    /// Demand kind. Immutable after creation.
    pub fn kind(&self) -> TicketKind {
        self.shared.kind
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TicketState {
        *self.shared.state.lock()
    }

    /// Start the ticket, suspending until it is admitted.
    ///
    /// Registration happens immediately; if the policy denies admission the
    /// call suspends (wake-on-recomputation, no polling) until releases
    /// elsewhere free capacity. Starting an already-running or released
    /// ticket returns immediately.
    ///
    /// # Cancellation
    ///
    /// Dropping the returned future before admission releases the ticket: it
    /// never reaches `Running` and leaves no trace in the coordinator.
    pub async fn start(&self) {
        let notify = match self.coordinator.begin_start(&self.shared) {
            StartOutcome::Settled => return,
            StartOutcome::Wait(notify) => notify,
        };

        let mut guard = CancelGuard {
            ticket: self,
            armed: true,
        };
        loop {
            notify.notified().await;
            if self.coordinator.ticket_settled(&self.shared) {
                break;
            }
        }
        guard.armed = false;
    }

    /// Release the ticket. Idempotent: any non-terminal state moves to
    /// `Released`, the ticket is deregistered, and recomputation is
    /// triggered; further calls are no-ops.
    pub fn release(&self) {
        self.coordinator.release_ticket(&self.shared);
    }

    /// Run `body` within this ticket's admission.
    ///
    /// Calls [`start`], executes `body`, and guarantees [`release`] on every
    /// exit path of `body`: normal return, panic unwind, and cancellation.
    ///
    /// [`start`]: Ticket::start
    /// [`release`]: Ticket::release
    pub async fn with_wired_limit<F, Fut, T>(&self, body: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.start().await;
        let _guard = ReleaseGuard { ticket: self };
        body().await
    }
}

impl std::fmt::Debug for Ticket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ticket")
            .field("id", &self.shared.id)
            .field("group", &self.shared.key)
            .field("size", &self.shared.size)
            .field("kind", &self.shared.kind)
            .field("state", &self.state())
            .finish()
    }
}

/// Releases the ticket if `start()` is cancelled before admission.
struct CancelGuard<'a> {
    ticket: &'a Ticket,
    armed: bool,
}

impl Drop for CancelGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.ticket.release();
        }
    }
}

/// Releases the ticket when a `with_wired_limit` body exits by any path.
struct ReleaseGuard<'a> {
    ticket: &'a Ticket,
}

impl Drop for ReleaseGuard<'_> {
    fn drop(&mut self) {
        self.ticket.release();
    }
}
