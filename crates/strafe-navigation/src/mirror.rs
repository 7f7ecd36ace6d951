//! Alliance mirroring of path geometry.
//!
//! Paths are authored for one alliance. For the other alliance the sampled
//! geometry is reflected across a field midline while the coordinate origin
//! stays where it is, so pose estimates and vision corrections keep using one
//! fixed field frame.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use core::f64::consts::PI;

use strafe_kinematics::Pose;

use crate::trajectory::TrajectoryState;

/// Which midline the geometry is reflected across.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MirrorAxis {
    /// Reflect across the longitudinal midline `y = W / 2`: `y' = W - y`, `θ' = -θ`.
    #[default]
    AcrossWidth,
    /// Reflect across the lateral midline `x = L / 2`: `x' = L - x`, `θ' = π - θ`.
    AcrossLength,
}

/// A mirroring convention together with the field dimensions it needs.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldMirror {
    /// Reflection axis.
    pub axis: MirrorAxis,
    /// Field extent along x (m).
    pub field_length_m: f64,
    /// Field extent along y (m).
    pub field_width_m: f64,
}

impl Default for FieldMirror {
    fn default() -> Self {
        FieldMirror {
            axis: MirrorAxis::AcrossWidth,
            field_length_m: 16.54,
            field_width_m: 8.21,
        }
    }
}

impl FieldMirror {
    /// Mirror a field point.
    pub fn point(&self, x: f64, y: f64) -> (f64, f64) {
        match self.axis {
            MirrorAxis::AcrossWidth => (x, self.field_width_m - y),
            MirrorAxis::AcrossLength => (self.field_length_m - x, y),
        }
    }

    /// Mirror a field heading.
    pub fn heading(&self, theta: f64) -> f64 {
        match self.axis {
            MirrorAxis::AcrossWidth => Pose::normalize_angle(-theta),
            MirrorAxis::AcrossLength => Pose::normalize_angle(PI - theta),
        }
    }

    /// Mirror a field-frame velocity `(vx, vy, ω)`.
    ///
    /// A reflection reverses handedness, so rotation always changes sign.
    pub fn velocity(&self, vx: f64, vy: f64, omega: f64) -> (f64, f64, f64) {
        match self.axis {
            MirrorAxis::AcrossWidth => (vx, -vy, -omega),
            MirrorAxis::AcrossLength => (-vx, vy, -omega),
        }
    }

    /// Mirror a field pose.
    pub fn pose(&self, pose: &Pose) -> Pose {
        let (x, y) = self.point(pose.x, pose.y);
        Pose::new(x, y, self.heading(pose.theta))
    }

    /// Mirror one trajectory sample. Time is unchanged.
    pub fn state(&self, state: &TrajectoryState) -> TrajectoryState {
        let (vx_mps, vy_mps, omega_radps) = self.velocity(state.vx_mps, state.vy_mps, state.omega_radps);
        TrajectoryState {
            time_s: state.time_s,
            pose: self.pose(&state.pose),
            vx_mps,
            vy_mps,
            omega_radps,
        }
    }
}
