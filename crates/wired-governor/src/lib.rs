//! # wired-governor
//!
//! Process-wide arbitration of the platform wired (pinned) memory limit for
//! tensor-compute workloads.
//!
//! Wired memory is a scarce, global OS resource: the platform accepts exactly
//! one limit value for the whole process, while many independent consumers
//! (inference passes, training steps, resident weight sets) have concurrent,
//! conflicting demands on it. This crate provides the single decision point
//! that mediates those demands:
//!
//! - [`Coordinator`] — the serialized arbiter. Recomputes the limit on every
//!   state change: ticket start, ticket release, configuration update.
//! - [`LimitPolicy`] — caller-supplied strategy mapping demand to a desired
//!   limit, with an optional admission predicate. Tickets sharing a policy
//!   identity ([`GroupKey`]) form one governance domain.
//! - [`Ticket`] — one unit of demand with a
//!   `Created → Admitted → Running → Released` lifecycle. Starting may
//!   suspend until the policy admits the demand; releasing is idempotent.
//! - Shrink hysteresis — growth applies immediately, shrinks wait for a
//!   minimum relative drop and a cooldown, so churning workloads do not
//!   thrash the platform setter.
//!
//! The final limit is the maximum of all group candidates, floored at a
//! baseline (explicit override, or the platform's recommended working set).
//! On platforms without wired-limit control the coordinator runs in
//! policy-only mode: all bookkeeping and admission gating still applies, the
//! setter is simply never called.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use wired_governor::{Coordinator, SumDemandPolicy, TicketKind};
//!
//! # async fn run_inference() {}
//! # async fn demo() {
//! let policy = Arc::new(SumDemandPolicy::new("inference"));
//! let ticket = Coordinator::shared().ticket(policy, 256 << 20, TicketKind::Active);
//! ticket
//!     .with_wired_limit(|| async {
//!         run_inference().await;
//!     })
//!     .await;
//! # }
//! ```
//!
//! Hosts with real platform control install it once at startup with
//! [`Coordinator::try_init_shared`]; tests construct isolated coordinators
//! with [`Coordinator::new`].

mod baseline;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
mod group;
mod hysteresis;
pub mod platform;
pub mod policy;
pub mod ticket;

pub use config::GovernorConfig;
pub use coordinator::{Coordinator, GovernorStats};
pub use error::{GovernorError, GovernorResult};
pub use events::{EventStream, GovernorEvent};
pub use platform::{PlatformError, UnsupportedPlatform, WiredPlatform};
pub use policy::{
    AdmissionSnapshot, CappedSumPolicy, FixedMarginPolicy, GroupKey, LimitPolicy,
    ReservationAccounting, SumDemandPolicy,
};
pub use ticket::{Ticket, TicketId, TicketKind, TicketState};
