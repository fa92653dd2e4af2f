//! Shrink hysteresis for the applied wired limit.
//!
//! Growth is never delayed. A proposed decrease is adopted only when the drop
//! is large enough relative to the current limit and enough time has passed
//! since the last applied change. Deferred shrinks are re-evaluated on the
//! next recomputation trigger; there is no background polling.

use std::time::{Duration, Instant};

/// Outcome of a hysteresis evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Verdict {
    /// Adopt the proposed limit now.
    Apply,
    /// Retain the current limit; the shrink did not clear the gate.
    Defer {
        /// Relative drop `(current - proposed) / current`.
        drop_fraction: f64,
    },
}

/// Gate deciding when a proposed limit may replace the current one.
///
/// The clock is passed in explicitly so decisions are deterministic under
/// test.
#[derive(Debug, Default)]
pub(crate) struct HysteresisGuard {
    /// When the applied limit last changed (grow or shrink). Growth resets
    /// the cooldown clock, so a shrink right after a burst of growth waits
    /// out the full cooldown.
    last_change: Option<Instant>,
}

impl HysteresisGuard {
    /// Evaluate `proposed` against `current` at time `now`.
    ///
    /// The caller records an adopted change with [`note_applied`].
    ///
    /// [`note_applied`]: HysteresisGuard::note_applied
    pub(crate) fn evaluate_at(
        &self,
        proposed: u64,
        current: u64,
        shrink_threshold_fraction: f64,
        shrink_cooldown: Duration,
        now: Instant,
    ) -> Verdict {
        if proposed >= current {
            return Verdict::Apply;
        }

        // current > proposed >= 0, so current > 0 and the division is safe.
        let drop_fraction = (current - proposed) as f64 / current as f64;
        let cooled = self
            .last_change
            .map(|at| now.saturating_duration_since(at) >= shrink_cooldown)
            .unwrap_or(true);

        if drop_fraction >= shrink_threshold_fraction && cooled {
            Verdict::Apply
        } else {
            Verdict::Defer { drop_fraction }
        }
    }

    /// Record that a limit change was applied at `now`.
    pub(crate) fn note_applied(&mut self, now: Instant) {
        self.last_change = Some(now);
    }
}
