//! Error types for wired-governor.
//!
//! This module defines the central error type [`GovernorError`] used throughout
//! the crate, along with the [`GovernorResult<T>`] type alias.
//!
//! Governance failures are deliberately contained: a ticket caller never
//! receives a distinct "memory limit" error. A rejected platform call degrades
//! to operating within the previous limit and is surfaced only through the
//! event stream and `tracing` output.

use thiserror::Error;

/// Top-level error type for wired-governor operations.
///
/// # Examples
///
/// ```rust
/// use wired_governor::GovernorError;
///
/// let err = GovernorError::InvalidConfig {
///     field: "shrink_threshold_fraction".into(),
///     reason: "must be within [0.0, 1.0]".into(),
/// };
/// assert!(err.to_string().contains("shrink_threshold_fraction"));
/// ```
#[derive(Debug, Error)]
pub enum GovernorError {
    /// A configuration mutation failed validation.
    ///
    /// Returned by `Coordinator::update_config`; the previous configuration
    /// stays in force.
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig {
        /// Name of the offending field.
        field: String,
        /// Description of the validation failure.
        reason: String,
    },

    /// The platform refused a wired-limit change.
    ///
    /// Never propagated to ticket callers; the coordinator retains the
    /// previously applied limit and reports the rejection through the event
    /// stream. This variant exists for platform implementations and
    /// diagnostics.
    #[error("Platform rejected wired limit of {attempted} bytes: {reason}")]
    PlatformRejected {
        /// The limit value the coordinator attempted to apply.
        attempted: u64,
        /// Platform-supplied failure description.
        reason: String,
    },

    /// `Coordinator::try_init_shared` was called after the shared instance
    /// had already been constructed.
    #[error("Shared coordinator already initialized")]
    SharedAlreadyInitialized,
}

/// Result type alias for governor operations.
pub type GovernorResult<T> = Result<T, GovernorError>;
