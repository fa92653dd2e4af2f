//! Coordinator configuration.
//!
//! All fields are reachable at runtime through `Coordinator::update_config`,
//! which validates the mutated configuration before adopting it. A change
//! takes effect on the next recomputation (which `update_config` itself
//! triggers).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GovernorError, GovernorResult};

/// Configuration for the wired-memory coordinator.
///
/// # Example
///
/// ```
/// use wired_governor::GovernorConfig;
///
/// let config = GovernorConfig::default();
/// assert!(config.validate().is_ok());
/// assert_eq!(config.shrink_threshold_fraction, 0.1);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernorConfig {
    /// Minimum relative drop `(current - proposed) / current` required before
    /// a shrink of the applied limit is adopted. Default: `0.1`.
    pub shrink_threshold_fraction: f64,

    /// Minimum time since the last applied limit change before a shrink is
    /// adopted, in milliseconds. Default: `2000`.
    pub shrink_cooldown_ms: u64,

    /// When the platform cannot control the wired limit, track budgets and
    /// gate admission without attempting any platform call. Default: `true`.
    ///
    /// With this set to `false` on an unsupported platform, the coordinator
    /// still attempts the setter; each rejection is contained and the
    /// previously applied value stays in force.
    pub policy_only_when_unsupported: bool,

    /// Explicit baseline, overriding the platform's recommended working-set
    /// query. Default: `None`.
    pub baseline_override: Option<u64>,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            shrink_threshold_fraction: 0.1,
            shrink_cooldown_ms: 2_000,
            policy_only_when_unsupported: true,
            baseline_override: None,
        }
    }
}

impl GovernorConfig {
    /// Shrink cooldown as a [`Duration`].
    #[inline]
    pub fn shrink_cooldown(&self) -> Duration {
        Duration::from_millis(self.shrink_cooldown_ms)
    }

    /// Validate configuration values.
    ///
    /// Rejects a non-finite or out-of-range threshold fraction. Called by
    /// `Coordinator::update_config` before adopting a mutation, so malformed
    /// configuration is rejected synchronously rather than deferred.
    pub fn validate(&self) -> GovernorResult<()> {
        if !self.shrink_threshold_fraction.is_finite() {
            return Err(GovernorError::InvalidConfig {
                field: "shrink_threshold_fraction".into(),
                reason: "must be a finite number".into(),
            });
        }
        if !(0.0..=1.0).contains(&self.shrink_threshold_fraction) {
            return Err(GovernorError::InvalidConfig {
                field: "shrink_threshold_fraction".into(),
                reason: format!(
                    "must be within [0.0, 1.0], got {}",
                    self.shrink_threshold_fraction
                ),
            });
        }
        Ok(())
    }
}
