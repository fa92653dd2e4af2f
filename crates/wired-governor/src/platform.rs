//! The seam to the underlying tensor-compute platform.
//!
//! The coordinator consumes exactly two things from the platform: a query for
//! the recommended working-set size (baseline arithmetic) and a setter for the
//! wired-memory limit. Both are behind [`WiredPlatform`] so hosts can install
//! the real engine hookup while tests install doubles.
//!
//! # Hazard
//!
//! The wired limit is an external resource with a single writer: the
//! coordinator. Code that mutates the platform limit behind the coordinator's
//! back desynchronizes its cache of the applied value; this is out of
//! contract and is neither detected nor recovered from.

use thiserror::Error;

/// Failure reported by the platform when a wired-limit change is refused.
///
/// Contained by the coordinator: the previously applied limit stays in effect
/// and the rejection is surfaced through the event stream only.
#[derive(Debug, Clone, Error)]
#[error("{reason}")]
pub struct PlatformError {
    /// Platform-supplied description of the refusal.
    pub reason: String,
}

impl PlatformError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Host-side control surface for the platform wired-memory limit.
///
/// Implementations must be cheap: the coordinator calls these while holding
/// its state lock.
pub trait WiredPlatform: Send + Sync + 'static {
    /// Whether this platform can control the wired limit at all.
    ///
    /// When `false` and the configuration allows it, the coordinator runs in
    /// policy-only mode: budgets are tracked and admission is gated, but no
    /// setter call is ever made.
    fn supports_wired_limit(&self) -> bool;

    /// The platform's recommended working-set size in bytes, if it exposes
    /// one. Consumed only by baseline resolution.
    fn recommended_working_set(&self) -> Option<u64>;

    /// Set the platform wired-memory limit, returning the previous value.
    ///
    /// Called at most once per approved recomputation, and only from inside
    /// the coordinator's serialized update.
    fn set_wired_limit(&self, bytes: u64) -> Result<u64, PlatformError>;
}

/// Platform without wired-limit control.
///
/// The default for the shared coordinator until a host installs a real
/// hookup; with `policy_only_when_unsupported` set (the default) every
/// recomputation is bookkeeping only.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedPlatform;

impl WiredPlatform for UnsupportedPlatform {
    fn supports_wired_limit(&self) -> bool {
        false
    }

    fn recommended_working_set(&self) -> Option<u64> {
        None
    }

    fn set_wired_limit(&self, bytes: u64) -> Result<u64, PlatformError> {
        let _ = bytes;
        Err(PlatformError::new("wired limit not supported on this platform"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_platform_refuses_sets() {
        let platform = UnsupportedPlatform;
        assert!(!platform.supports_wired_limit());
        assert!(platform.recommended_working_set().is_none());
        assert!(platform.set_wired_limit(4_096).is_err());
    }

    #[test]
    fn test_platform_error_display() {
        let err = PlatformError::new("kernel refused");
        assert_eq!(err.to_string(), "kernel refused");
    }
}
