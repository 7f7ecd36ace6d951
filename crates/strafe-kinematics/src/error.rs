#![warn(missing_docs)]

//! Error types for the kinematics library.
//!
//! This module defines error types that can occur while building a swerve
//! geometry or converting chassis velocities into module states.

use core::fmt;

/// Errors that can occur in kinematic calculations.
#[derive(Debug, Clone, PartialEq)]
pub enum KinematicsError {
    /// Error for invalid wheelbase.
    /// This variant is returned when a wheelbase (front-to-back module spacing) is not positive.
    InvalidWheelbase(&'static str),
    /// Error for invalid track width.
    /// This variant is returned when a track width (left-to-right module spacing) is not positive.
    InvalidTrackWidth(&'static str),
    /// Error for a module layout that cannot observe rotation (all modules on the chassis center).
    DegenerateGeometry(&'static str),
    /// Error for a velocity expressed in the wrong frame.
    /// Inverse kinematics only accepts robot-relative chassis velocities.
    FrameMismatch(&'static str),
}

impl core::fmt::Display for KinematicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KinematicsError::InvalidWheelbase(msg) => write!(f, "Invalid wheelbase: {}", msg),
            KinematicsError::InvalidTrackWidth(msg) => write!(f, "Invalid track width: {}", msg),
            KinematicsError::DegenerateGeometry(msg) => write!(f, "Degenerate module geometry: {}", msg),
            KinematicsError::FrameMismatch(msg) => write!(f, "Chassis velocity frame mismatch: {}", msg),
        }
    }
}

impl core::error::Error for KinematicsError {}
