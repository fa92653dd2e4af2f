//! Baseline resolution.
//!
//! The baseline is the floor below which the applied limit never drops. It is
//! resolved once per recomputation, in priority order: explicit override,
//! platform recommended working set, zero. Resolution is pure arithmetic
//! input; it never triggers a platform setter call.

use crate::config::GovernorConfig;
use crate::platform::WiredPlatform;

pub(crate) fn resolve_baseline(config: &GovernorConfig, platform: &dyn WiredPlatform) -> u64 {
    if let Some(override_bytes) = config.baseline_override {
        return override_bytes;
    }
    platform.recommended_working_set().unwrap_or(0)
}
