//! This module defines the error types used by the `strafe-navigation` crate.

use strafe_kinematics::KinematicsError;

/// Error type for navigation operations.
///
/// Only construction-time problems surface as errors. Bad telemetry, saturated
/// actuation and superseded commands are all recovered inside the control
/// tick and never reach the caller as an `Err`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NavigationError {
    /// The path source has no trajectory under this name.
    #[error("Path not found: {0}")]
    PathNotFound(String),
    /// A trajectory failed validation (empty, non-finite or out-of-order samples).
    #[error("Invalid trajectory: {0}")]
    InvalidTrajectory(&'static str),
    /// A configuration value is out of range.
    #[error("Invalid configuration: {field} {reason}")]
    InvalidConfig {
        /// Dotted path of the offending setting.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
    /// The chassis geometry was rejected by the kinematics model.
    #[error(transparent)]
    Kinematics(#[from] KinematicsError),
}
