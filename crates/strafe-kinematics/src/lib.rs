#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![doc = "A `no_std` library for four-module swerve drive kinematics."]
#![doc = ""]
#![doc = "This crate provides field poses, frame-tagged chassis velocities, module states"]
#![doc = "and the forward and inverse kinematics of an independently steered chassis."]

use core::f64::consts::PI;
use core::fmt;
use libm::{cos, fabs, hypot, sin};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub mod error;
pub mod swerve;

pub use error::KinematicsError;
pub use swerve::{
    ModuleId, ModulePosition, ModuleState, NUM_MODULES, SwerveDrive, desaturate_wheel_speeds,
};

/// Rotate the vector `(x, y)` counter-clockwise by `angle` radians.
pub fn rotate(x: f64, y: f64, angle: f64) -> (f64, f64) {
    let (s, c) = (sin(angle), cos(angle));
    (x * c - y * s, x * s + y * c)
}

/// A 2‑D pose `(x, y, θ)` in meters and radians (θ measured counter‑clockwise
/// from the x‑axis in the field frame).
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose {
    /// Field‑frame x position (m).
    pub x: f64,
    /// Field‑frame y position (m).
    pub y: f64,
    /// Heading (rad), normalized to `[-PI, PI)`.
    pub theta: f64,
}

impl Pose {
    /// Construct a new pose.
    ///
    /// # Arguments
    ///
    /// * `x`: Field-frame x position in meters.
    /// * `y`: Field-frame y position in meters.
    /// * `theta`: Heading in radians.
    pub const fn new(x: f64, y: f64, theta: f64) -> Self {
        Pose { x, y, theta }
    }

    /// Normalize an angle to be within `[-PI, PI)`.
    ///
    /// Angles at `PI` will be normalized to `-PI`.
    ///
    /// # Arguments
    ///
    /// * `angle`: The angle in radians to normalize.
    ///
    /// # Returns
    ///
    /// The normalized angle in radians.
    pub fn normalize_angle(angle: f64) -> f64 {
        let a = angle % (2.0 * PI);
        if a >= PI {
            a - 2.0 * PI
        } else if a < -PI {
            a + 2.0 * PI
        } else {
            a
        }
    }

    /// Whether every component is a finite number.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.theta.is_finite()
    }

    /// Straight-line distance between the translations of two poses (m).
    pub fn distance_to(&self, other: &Pose) -> f64 {
        hypot(other.x - self.x, other.y - self.y)
    }

    /// Shortest signed angle (rad) that rotates this heading onto `other`'s heading.
    pub fn heading_error_to(&self, other: &Pose) -> f64 {
        Pose::normalize_angle(other.theta - self.theta)
    }

    /// Linearly interpolate towards `other`; `t` is clamped to `[0, 1]`.
    ///
    /// Heading follows the shortest arc between the two headings.
    pub fn interpolate(&self, other: &Pose, t: f64) -> Pose {
        let t = t.clamp(0.0, 1.0);
        Pose {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
            theta: Pose::normalize_angle(self.theta + self.heading_error_to(other) * t),
        }
    }

    /// Applies a robot-frame displacement to this pose using the SE(2)
    /// exponential map, so a constant-curvature arc lands exactly where the
    /// wheels went.
    ///
    /// # Arguments
    ///
    /// * `twist`: Displacement measured in the robot frame at the start of the interval.
    ///
    /// # Returns
    ///
    /// The pose after the displacement, heading normalized to `[-PI, PI)`.
    pub fn exp(&self, twist: Twist) -> Pose {
        let dtheta = twist.dtheta;
        let (s, c) = if fabs(dtheta) < 1e-9 {
            (1.0 - dtheta * dtheta / 6.0, 0.5 * dtheta)
        } else {
            (sin(dtheta) / dtheta, (1.0 - cos(dtheta)) / dtheta)
        };
        let local_x = twist.dx * s - twist.dy * c;
        let local_y = twist.dx * c + twist.dy * s;
        let (field_dx, field_dy) = rotate(local_x, local_y, self.theta);

        Pose {
            x: self.x + field_dx,
            y: self.y + field_dy,
            theta: Pose::normalize_angle(self.theta + dtheta),
        }
    }
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(x: {:.2}, y: {:.2}, θ: {:.2} rad)", self.x, self.y, self.theta)
    }
}

/// A displacement expressed in the robot frame over one odometry interval.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Twist {
    /// Forward displacement (m).
    pub dx: f64,
    /// Leftward displacement (m).
    pub dy: f64,
    /// Heading change (rad).
    pub dtheta: f64,
}

impl Twist {
    /// Construct a new twist.
    pub const fn new(dx: f64, dy: f64, dtheta: f64) -> Self {
        Twist { dx, dy, dtheta }
    }
}

impl fmt::Display for Twist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(dx: {:.3} m, dy: {:.3} m, dθ: {:.3} rad)", self.dx, self.dy, self.dtheta)
    }
}

/// The reference frame a chassis velocity is expressed in.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Frame {
    /// Axes fixed to the chassis: +x forward, +y left.
    #[default]
    Robot,
    /// Axes fixed to the field, independent of the robot heading.
    Field,
}

/// Holonomic chassis velocities tagged with the frame they are expressed in.
///
/// The frame tag travels with the value, so a field-relative command can never
/// be fed to inverse kinematics by accident.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChassisSpeeds {
    /// Velocity along the frame's x axis (m/s).
    pub vx: f64,
    /// Velocity along the frame's y axis (m/s).
    pub vy: f64,
    /// Angular velocity, counter-clockwise positive (rad/s).
    pub omega: f64,
    /// Frame the linear components are expressed in.
    pub frame: Frame,
}

impl ChassisSpeeds {
    /// Construct chassis speeds in the given frame.
    pub const fn new(vx: f64, vy: f64, omega: f64, frame: Frame) -> Self {
        ChassisSpeeds { vx, vy, omega, frame }
    }

    /// Construct robot-relative chassis speeds.
    pub const fn robot_relative(vx: f64, vy: f64, omega: f64) -> Self {
        Self::new(vx, vy, omega, Frame::Robot)
    }

    /// Construct field-relative chassis speeds.
    pub const fn field_relative(vx: f64, vy: f64, omega: f64) -> Self {
        Self::new(vx, vy, omega, Frame::Field)
    }

    /// A robot-relative stop command.
    pub const fn zero() -> Self {
        Self::robot_relative(0.0, 0.0, 0.0)
    }

    /// Whether all three components are zero.
    pub fn is_zero(&self) -> bool {
        self.vx == 0.0 && self.vy == 0.0 && self.omega == 0.0
    }

    /// Whether all three components are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.vx.is_finite() && self.vy.is_finite() && self.omega.is_finite()
    }

    /// Magnitude of the translational velocity (m/s).
    pub fn translational_speed(&self) -> f64 {
        hypot(self.vx, self.vy)
    }

    /// Express these speeds in the robot frame.
    ///
    /// Robot-relative speeds are returned unchanged; field-relative speeds are
    /// rotated by `-heading`.
    ///
    /// # Arguments
    ///
    /// * `heading`: The robot's current field heading (rad).
    pub fn to_robot_relative(self, heading: f64) -> Self {
        match self.frame {
            Frame::Robot => self,
            Frame::Field => {
                let (vx, vy) = rotate(self.vx, self.vy, -heading);
                Self::robot_relative(vx, vy, self.omega)
            }
        }
    }

    /// Express these speeds in the field frame.
    ///
    /// Field-relative speeds are returned unchanged; robot-relative speeds are
    /// rotated by `heading`.
    ///
    /// # Arguments
    ///
    /// * `heading`: The robot's current field heading (rad).
    pub fn to_field_relative(self, heading: f64) -> Self {
        match self.frame {
            Frame::Field => self,
            Frame::Robot => {
                let (vx, vy) = rotate(self.vx, self.vy, heading);
                Self::field_relative(vx, vy, self.omega)
            }
        }
    }
}

impl fmt::Display for ChassisSpeeds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.frame {
            Frame::Robot => "robot",
            Frame::Field => "field",
        };
        write!(
            f,
            "({}: vx: {:.2} m/s, vy: {:.2} m/s, ω: {:.2} rad/s)",
            tag, self.vx, self.vy, self.omega
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    const EPSILON: f64 = 1e-6;

    #[test]
    fn test_pose_normalization() {
        assert!((Pose::normalize_angle(0.0) - 0.0).abs() < EPSILON);
        assert!((Pose::normalize_angle(PI) - (-PI)).abs() < EPSILON); // PI maps to -PI for [-PI, PI)
        assert!((Pose::normalize_angle(3.0 * PI) - (-PI)).abs() < EPSILON);
        assert!((Pose::normalize_angle(2.5 * PI) - 0.5 * PI).abs() < EPSILON);
        assert!((Pose::normalize_angle(-2.5 * PI) - -0.5 * PI).abs() < EPSILON);
    }

    #[test]
    fn test_heading_error_takes_short_way() {
        let a = Pose::new(0.0, 0.0, 3.0);
        let b = Pose::new(0.0, 0.0, -3.0);
        // 3.0 -> -3.0 is +0.283 rad across the seam, not -6 rad.
        let err = a.heading_error_to(&b);
        assert!((err - (2.0 * PI - 6.0)).abs() < EPSILON);
    }

    #[test]
    fn test_exp_straight_line() {
        let pose = Pose::new(1.0, 1.0, PI / 2.0);
        let moved = pose.exp(Twist::new(2.0, 0.0, 0.0));
        // Facing +y, moving 2 m forward
        assert!((moved.x - 1.0).abs() < EPSILON);
        assert!((moved.y - 3.0).abs() < EPSILON);
        assert!((moved.theta - PI / 2.0).abs() < EPSILON);
    }

    #[test]
    fn test_exp_quarter_circle() {
        // Arc of radius 1 m through a quarter turn: arc length PI/2.
        let pose = Pose::new(0.0, 0.0, 0.0);
        let moved = pose.exp(Twist::new(PI / 2.0, 0.0, PI / 2.0));
        assert!((moved.x - 1.0).abs() < EPSILON);
        assert!((moved.y - 1.0).abs() < EPSILON);
        assert!((moved.theta - PI / 2.0).abs() < EPSILON);
    }

    #[test]
    fn test_exp_strafe_with_heading() {
        let pose = Pose::new(0.0, 0.0, PI / 2.0);
        let moved = pose.exp(Twist::new(0.0, 1.0, 0.0));
        // Facing +y, strafing left goes towards -x
        assert!((moved.x - (-1.0)).abs() < EPSILON);
        assert!(moved.y.abs() < EPSILON);
    }

    #[test]
    fn test_interpolate_midpoint() {
        let a = Pose::new(0.0, 0.0, 0.0);
        let b = Pose::new(2.0, 4.0, PI / 2.0);
        let mid = a.interpolate(&b, 0.5);
        assert!((mid.x - 1.0).abs() < EPSILON);
        assert!((mid.y - 2.0).abs() < EPSILON);
        assert!((mid.theta - PI / 4.0).abs() < EPSILON);
    }

    #[test]
    fn test_field_to_robot_quarter_turn() {
        // Robot facing +y; moving +x on the field is moving to the robot's right.
        let speeds = ChassisSpeeds::field_relative(1.0, 0.0, 0.5);
        let robot = speeds.to_robot_relative(PI / 2.0);
        assert_eq!(robot.frame, Frame::Robot);
        assert!(robot.vx.abs() < EPSILON);
        assert!((robot.vy - (-1.0)).abs() < EPSILON);
        assert!((robot.omega - 0.5).abs() < EPSILON);
    }

    #[test]
    fn test_conversions_are_idempotent_per_frame() {
        let robot = ChassisSpeeds::robot_relative(1.0, 2.0, 3.0);
        assert_eq!(robot.to_robot_relative(1.234), robot);
        let field = ChassisSpeeds::field_relative(1.0, 2.0, 3.0);
        assert_eq!(field.to_field_relative(1.234), field);
    }

    #[test]
    fn test_frame_round_trip_over_headings() {
        let speeds = ChassisSpeeds::field_relative(1.3, -0.7, 0.9);
        for i in 0..360 {
            let heading = (i as f64) * 2.0 * PI / 360.0;
            let back = speeds.to_robot_relative(heading).to_field_relative(heading);
            assert_eq!(back.frame, Frame::Field);
            assert!((back.vx - speeds.vx).abs() < EPSILON);
            assert!((back.vy - speeds.vy).abs() < EPSILON);
            assert!((back.omega - speeds.omega).abs() < EPSILON);
        }
    }

    #[test]
    fn test_zero_and_finite() {
        assert!(ChassisSpeeds::zero().is_zero());
        assert!(!ChassisSpeeds::robot_relative(f64::NAN, 0.0, 0.0).is_finite());
        assert!(!Pose::new(0.0, f64::INFINITY, 0.0).is_finite());
    }
}
