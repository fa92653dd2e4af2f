//! Observability event stream.
//!
//! Every admission and limit decision is mirrored onto a broadcast channel in
//! the order it was applied. With the `events` cargo feature disabled the sink
//! compiles to a no-op and [`EventStream::recv`] completes immediately with
//! `None`; consumers must tolerate either build.

use serde::{Deserialize, Serialize};

use crate::policy::GroupKey;
use crate::ticket::TicketId;

#[cfg(feature = "events")]
use tokio::sync::broadcast;

#[cfg(feature = "events")]
const EVENT_BUFFER: usize = 256;

/// Admission and limit-change decisions, in applied order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GovernorEvent {
    /// A ticket moved to `Running`.
    TicketAdmitted {
        ticket: TicketId,
        group: GroupKey,
        size: u64,
    },
    /// A ticket's admission was denied; its caller is suspended.
    TicketDeferred {
        ticket: TicketId,
        group: GroupKey,
        size: u64,
    },
    /// A ticket was released (explicitly or through cancellation).
    TicketReleased { ticket: TicketId, group: GroupKey },
    /// The applied limit changed.
    LimitApplied { previous: u64, applied: u64 },
    /// A proposed shrink was retained by the hysteresis gate.
    ShrinkDeferred {
        current: u64,
        proposed: u64,
        drop_fraction: f64,
    },
    /// The platform refused a limit change; the previous value stays in
    /// effect.
    PlatformSetRejected {
        attempted: u64,
        retained: u64,
        reason: String,
    },
}

/// Lazily-consumed, restartable stream of [`GovernorEvent`]s.
///
/// Obtained from `Coordinator::events()`. Each call yields an independent
/// stream starting at the current point in time. A slow consumer that falls
/// more than the internal buffer behind skips the overwritten events and
/// keeps receiving.
pub struct EventStream {
    #[cfg(feature = "events")]
    rx: Option<broadcast::Receiver<GovernorEvent>>,
}

impl EventStream {
    /// Next event, or `None` once the stream is finished.
    ///
    /// In observability-disabled builds this returns `None` immediately.
    #[cfg(feature = "events")]
    pub async fn recv(&mut self) -> Option<GovernorEvent> {
        let rx = self.rx.as_mut()?;
        loop {
            match rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "governor event stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.rx = None;
                    return None;
                }
            }
        }
    }

    /// Next event, or `None` once the stream is finished.
    ///
    /// In observability-disabled builds this returns `None` immediately.
    #[cfg(not(feature = "events"))]
    pub async fn recv(&mut self) -> Option<GovernorEvent> {
        None
    }
}

/// Emission side owned by the coordinator.
#[cfg(feature = "events")]
pub(crate) struct EventSink {
    tx: broadcast::Sender<GovernorEvent>,
}

#[cfg(feature = "events")]
impl EventSink {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER);
        Self { tx }
    }

    pub(crate) fn emit(&self, event: GovernorEvent) {
        tracing::trace!(event = ?event, "governor event");
        // No receivers is fine; emission is fire-and-forget.
        let _ = self.tx.send(event);
    }

    pub(crate) fn subscribe(&self) -> EventStream {
        EventStream {
            rx: Some(self.tx.subscribe()),
        }
    }
}

#[cfg(not(feature = "events"))]
pub(crate) struct EventSink;

#[cfg(not(feature = "events"))]
impl EventSink {
    pub(crate) fn new() -> Self {
        Self
    }

    pub(crate) fn emit(&self, event: GovernorEvent) {
        tracing::trace!(event = ?event, "governor event");
    }

    pub(crate) fn subscribe(&self) -> EventStream {
        EventStream {}
    }
}
