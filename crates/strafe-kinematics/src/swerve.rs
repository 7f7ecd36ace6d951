//! Four-module swerve kinematics.
//!
//! Module offsets are measured from the chassis center in the robot frame
//! (+x forward, +y left). Module arrays are always ordered front-left,
//! front-right, back-left, back-right.

use core::f64::consts::{FRAC_PI_2, PI};
use core::fmt;
use libm::{atan2, cos, fabs, hypot, sin};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{ChassisSpeeds, Frame, KinematicsError, Pose, Twist};

/// The number of swerve modules on the chassis.
pub const NUM_MODULES: usize = 4;

/// Identifies one physical swerve module.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleId {
    /// Module 0.
    FrontLeft,
    /// Module 1.
    FrontRight,
    /// Module 2.
    BackLeft,
    /// Module 3.
    BackRight,
}

impl ModuleId {
    /// All modules in array order.
    pub const ALL: [ModuleId; NUM_MODULES] = [
        ModuleId::FrontLeft,
        ModuleId::FrontRight,
        ModuleId::BackLeft,
        ModuleId::BackRight,
    ];

    /// Index of this module in per-module arrays.
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Commanded or measured state of one module: wheel speed and steering angle.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ModuleState {
    /// Wheel ground speed (m/s). Negative drives the wheel backwards.
    pub speed_mps: f64,
    /// Steering angle relative to the chassis +x axis (rad).
    pub angle_rad: f64,
}

impl ModuleState {
    /// Construct a module state.
    pub const fn new(speed_mps: f64, angle_rad: f64) -> Self {
        ModuleState { speed_mps, angle_rad }
    }

    /// Wheel velocity vector `(vx, vy)` in the robot frame.
    pub fn velocity(&self) -> (f64, f64) {
        (self.speed_mps * cos(self.angle_rad), self.speed_mps * sin(self.angle_rad))
    }

    /// Minimise steering travel from `current_angle`.
    ///
    /// If the target angle is more than 90° away, steer to the opposite
    /// angle and drive the wheel backwards instead. The wheel velocity vector
    /// is unchanged.
    pub fn optimize(self, current_angle: f64) -> ModuleState {
        let delta = Pose::normalize_angle(self.angle_rad - current_angle);
        if fabs(delta) > FRAC_PI_2 {
            ModuleState {
                speed_mps: -self.speed_mps,
                angle_rad: Pose::normalize_angle(self.angle_rad + PI),
            }
        } else {
            self
        }
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2} m/s @ {:.2} rad)", self.speed_mps, self.angle_rad)
    }
}

/// Accumulated wheel travel and current steering angle of one module.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ModulePosition {
    /// Total distance the wheel has rolled (m).
    pub distance_m: f64,
    /// Steering angle relative to the chassis +x axis (rad).
    pub angle_rad: f64,
}

impl ModulePosition {
    /// Construct a module position.
    pub const fn new(distance_m: f64, angle_rad: f64) -> Self {
        ModulePosition { distance_m, angle_rad }
    }
}

/// Swerve kinematics helper.
///
/// Holds the module offsets and the precomputed inverse of the forward
/// kinematics normal equations, so both directions are a handful of
/// multiplications per tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwerveDrive {
    /// Module offsets `[x, y]` from the chassis center (m).
    offsets: [[f64; 2]; NUM_MODULES],
    /// Inverse of `AᵀA` for the least-squares forward solution.
    normal_inverse: [[f64; 3]; 3],
}

impl SwerveDrive {
    /// Construct a rectangular swerve chassis.
    ///
    /// # Arguments
    ///
    /// * `wheelbase`: Distance between front and back module centers (m).
    /// * `track_width`: Distance between left and right module centers (m).
    ///
    /// # Errors
    ///
    /// Returns `Err(KinematicsError::InvalidWheelbase)` if `wheelbase` is not positive.
    /// Returns `Err(KinematicsError::InvalidTrackWidth)` if `track_width` is not positive.
    pub fn new(wheelbase: f64, track_width: f64) -> Result<Self, KinematicsError> {
        if wheelbase <= 0.0 || !wheelbase.is_finite() {
            return Err(KinematicsError::InvalidWheelbase("must be positive"));
        }
        if track_width <= 0.0 || !track_width.is_finite() {
            return Err(KinematicsError::InvalidTrackWidth("must be positive"));
        }
        let (hx, hy) = (wheelbase / 2.0, track_width / 2.0);
        Self::from_offsets([[hx, hy], [hx, -hy], [-hx, hy], [-hx, -hy]])
    }

    /// Construct from explicit module offsets, ordered FL, FR, BL, BR.
    ///
    /// # Errors
    ///
    /// Returns `Err(KinematicsError::DegenerateGeometry)` if the offsets are
    /// non-finite or cannot distinguish rotation from translation.
    pub fn from_offsets(offsets: [[f64; 2]; NUM_MODULES]) -> Result<Self, KinematicsError> {
        if offsets.iter().flatten().any(|v| !v.is_finite()) {
            return Err(KinematicsError::DegenerateGeometry("offsets must be finite"));
        }

        // AᵀA for rows [1, 0, -y] and [0, 1, x] per module.
        let n = NUM_MODULES as f64;
        let sx: f64 = offsets.iter().map(|o| o[0]).sum();
        let sy: f64 = offsets.iter().map(|o| o[1]).sum();
        let sr: f64 = offsets.iter().map(|o| o[0] * o[0] + o[1] * o[1]).sum();
        let normal = [[n, 0.0, -sy], [0.0, n, sx], [-sy, sx, sr]];

        let normal_inverse = invert3(&normal)
            .ok_or(KinematicsError::DegenerateGeometry("modules cannot observe rotation"))?;

        Ok(SwerveDrive { offsets, normal_inverse })
    }

    /// Returns the module offsets `[x, y]`, ordered FL, FR, BL, BR.
    pub fn offsets(&self) -> &[[f64; 2]; NUM_MODULES] {
        &self.offsets
    }

    /// Distance from the chassis center to the farthest module (m).
    pub fn drive_base_radius(&self) -> f64 {
        self.offsets
            .iter()
            .map(|o| hypot(o[0], o[1]))
            .fold(0.0, f64::max)
    }

    /// Calculates the module states that realise the given chassis speeds.
    /// This is the inverse kinematics problem.
    ///
    /// A stationary module reports an angle of 0 rad; callers that want to
    /// hold the previous steering angle must do so themselves.
    ///
    /// # Errors
    ///
    /// Returns `Err(KinematicsError::FrameMismatch)` if `speeds` is field-relative.
    pub fn to_module_states(
        &self,
        speeds: ChassisSpeeds,
    ) -> Result<[ModuleState; NUM_MODULES], KinematicsError> {
        if speeds.frame != Frame::Robot {
            return Err(KinematicsError::FrameMismatch(
                "inverse kinematics requires robot-relative speeds",
            ));
        }

        let mut states = [ModuleState::default(); NUM_MODULES];
        for (state, offset) in states.iter_mut().zip(self.offsets.iter()) {
            let vx = speeds.vx - speeds.omega * offset[1];
            let vy = speeds.vy + speeds.omega * offset[0];
            *state = ModuleState::new(hypot(vx, vy), atan2(vy, vx));
        }
        Ok(states)
    }

    /// Calculates the robot-relative chassis speeds from measured module
    /// states. This is the forward kinematics problem, solved in the
    /// least-squares sense since four modules over-determine three unknowns.
    pub fn to_chassis_speeds(&self, states: &[ModuleState; NUM_MODULES]) -> ChassisSpeeds {
        let vectors = states.map(|s| s.velocity());
        let [vx, vy, omega] = self.solve(&vectors);
        ChassisSpeeds::robot_relative(vx, vy, omega)
    }

    /// Calculates the robot-frame displacement from per-module travel since
    /// the previous sample.
    ///
    /// # Arguments
    ///
    /// * `deltas`: Distance rolled by each wheel since the last sample, with the
    ///   steering angle at which it rolled.
    pub fn to_twist(&self, deltas: &[ModulePosition; NUM_MODULES]) -> Twist {
        let vectors = deltas.map(|d| (d.distance_m * cos(d.angle_rad), d.distance_m * sin(d.angle_rad)));
        let [dx, dy, dtheta] = self.solve(&vectors);
        Twist::new(dx, dy, dtheta)
    }

    fn solve(&self, vectors: &[(f64, f64); NUM_MODULES]) -> [f64; 3] {
        let mut rhs = [0.0; 3];
        for (offset, (vx, vy)) in self.offsets.iter().zip(vectors.iter()) {
            rhs[0] += vx;
            rhs[1] += vy;
            rhs[2] += -offset[1] * vx + offset[0] * vy;
        }
        let m = &self.normal_inverse;
        [
            m[0][0] * rhs[0] + m[0][1] * rhs[1] + m[0][2] * rhs[2],
            m[1][0] * rhs[0] + m[1][1] * rhs[1] + m[1][2] * rhs[2],
            m[2][0] * rhs[0] + m[2][1] * rhs[1] + m[2][2] * rhs[2],
        ]
    }
}

impl fmt::Display for SwerveDrive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SwerveDrive (radius: {:.3} m)", self.drive_base_radius())
    }
}

/// Scale every module speed down by the same factor if any exceeds `max_speed`.
///
/// Steering angles are untouched, so each wheel velocity keeps its direction
/// and the chassis keeps its direction of travel and its ratio of translation
/// to rotation.
pub fn desaturate_wheel_speeds(states: &mut [ModuleState; NUM_MODULES], max_speed: f64) {
    let real_max = states.iter().map(|s| fabs(s.speed_mps)).fold(0.0, f64::max);
    if real_max > max_speed && real_max > 0.0 {
        let scale = max_speed / real_max;
        for state in states.iter_mut() {
            state.speed_mps *= scale;
        }
    }
}

fn invert3(m: &[[f64; 3]; 3]) -> Option<[[f64; 3]; 3]> {
    let c00 = m[1][1] * m[2][2] - m[1][2] * m[2][1];
    let c01 = m[1][2] * m[2][0] - m[1][0] * m[2][2];
    let c02 = m[1][0] * m[2][1] - m[1][1] * m[2][0];
    let det = m[0][0] * c00 + m[0][1] * c01 + m[0][2] * c02;
    if fabs(det) < 1e-12 || !det.is_finite() {
        return None;
    }
    let inv_det = 1.0 / det;
    Some([
        [
            c00 * inv_det,
            (m[0][2] * m[2][1] - m[0][1] * m[2][2]) * inv_det,
            (m[0][1] * m[1][2] - m[0][2] * m[1][1]) * inv_det,
        ],
        [
            c01 * inv_det,
            (m[0][0] * m[2][2] - m[0][2] * m[2][0]) * inv_det,
            (m[0][2] * m[1][0] - m[0][0] * m[1][2]) * inv_det,
        ],
        [
            c02 * inv_det,
            (m[0][1] * m[2][0] - m[0][0] * m[2][1]) * inv_det,
            (m[0][0] * m[1][1] - m[0][1] * m[1][0]) * inv_det,
        ],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    const EPSILON: f64 = 1e-6;

    fn square_drive() -> SwerveDrive {
        // 0.6 m x 0.6 m: modules at (±0.3, ±0.3)
        SwerveDrive::new(0.6, 0.6).unwrap()
    }

    #[test]
    fn test_constructor_invalid_geometry() {
        assert!(matches!(
            SwerveDrive::new(0.0, 0.5),
            Err(KinematicsError::InvalidWheelbase("must be positive"))
        ));
        assert!(matches!(
            SwerveDrive::new(0.5, -0.1),
            Err(KinematicsError::InvalidTrackWidth("must be positive"))
        ));
        assert!(matches!(
            SwerveDrive::from_offsets([[0.0, 0.0]; NUM_MODULES]),
            Err(KinematicsError::DegenerateGeometry(_))
        ));
    }

    #[test]
    fn test_drive_base_radius() {
        let drive = square_drive();
        assert!((drive.drive_base_radius() - (0.18f64).sqrt()).abs() < EPSILON);
    }

    #[test]
    fn test_module_ordering() {
        let drive = square_drive();
        assert_eq!(drive.offsets()[ModuleId::FrontLeft.index()], [0.3, 0.3]);
        assert_eq!(drive.offsets()[ModuleId::BackRight.index()], [-0.3, -0.3]);
    }

    #[test]
    fn test_inverse_kinematics_straight() {
        let drive = square_drive();
        let states = drive.to_module_states(ChassisSpeeds::robot_relative(2.0, 0.0, 0.0)).unwrap();
        for s in states {
            assert!((s.speed_mps - 2.0).abs() < EPSILON);
            assert!(s.angle_rad.abs() < EPSILON);
        }
    }

    #[test]
    fn test_inverse_kinematics_strafe() {
        let drive = square_drive();
        let states = drive.to_module_states(ChassisSpeeds::robot_relative(0.0, 1.0, 0.0)).unwrap();
        for s in states {
            assert!((s.speed_mps - 1.0).abs() < EPSILON);
            assert!((s.angle_rad - FRAC_PI_2).abs() < EPSILON);
        }
    }

    #[test]
    fn test_inverse_kinematics_spin_in_place() {
        let drive = square_drive();
        let states = drive.to_module_states(ChassisSpeeds::robot_relative(0.0, 0.0, 1.0)).unwrap();
        // Every wheel tangent to the circle through the modules
        // FL at (0.3, 0.3): v = (-0.3, 0.3) -> 135°
        let radius = (0.18f64).sqrt();
        for s in states {
            assert!((s.speed_mps - radius).abs() < EPSILON);
        }
        assert!((states[0].angle_rad - 3.0 * PI / 4.0).abs() < EPSILON);
        assert!((states[3].angle_rad - (-PI / 4.0)).abs() < EPSILON);
    }

    #[test]
    fn test_inverse_kinematics_rejects_field_relative() {
        let drive = square_drive();
        let result = drive.to_module_states(ChassisSpeeds::field_relative(1.0, 0.0, 0.0));
        assert!(matches!(result, Err(KinematicsError::FrameMismatch(_))));
    }

    #[test]
    fn test_forward_inverse_round_trip() {
        let drive = SwerveDrive::new(0.5, 0.7).unwrap();
        let speeds = ChassisSpeeds::robot_relative(1.2, -0.4, 2.1);
        let states = drive.to_module_states(speeds).unwrap();
        let back = drive.to_chassis_speeds(&states);
        assert!((back.vx - speeds.vx).abs() < EPSILON);
        assert!((back.vy - speeds.vy).abs() < EPSILON);
        assert!((back.omega - speeds.omega).abs() < EPSILON);
    }

    #[test]
    fn test_forward_kinematics_off_center_layout() {
        // Modules shifted forward: least squares must still recover the motion.
        let drive = SwerveDrive::from_offsets([[0.5, 0.3], [0.5, -0.3], [0.1, 0.3], [0.1, -0.3]]).unwrap();
        let speeds = ChassisSpeeds::robot_relative(-0.3, 0.8, -1.5);
        let back = drive.to_chassis_speeds(&drive.to_module_states(speeds).unwrap());
        assert!((back.vx - speeds.vx).abs() < EPSILON);
        assert!((back.vy - speeds.vy).abs() < EPSILON);
        assert!((back.omega - speeds.omega).abs() < EPSILON);
    }

    #[test]
    fn test_twist_from_deltas() {
        let drive = square_drive();
        let deltas = [ModulePosition::new(0.1, 0.0); NUM_MODULES];
        let twist = drive.to_twist(&deltas);
        assert!((twist.dx - 0.1).abs() < EPSILON);
        assert!(twist.dy.abs() < EPSILON);
        assert!(twist.dtheta.abs() < EPSILON);
    }

    #[test]
    fn test_desaturate_scales_proportionally() {
        let drive = square_drive();
        let speeds = ChassisSpeeds::robot_relative(4.0, 3.0, 6.0);
        let before = drive.to_module_states(speeds).unwrap();
        let mut after = before;
        desaturate_wheel_speeds(&mut after, 4.5);

        let max = after.iter().map(|s| s.speed_mps.abs()).fold(0.0, f64::max);
        assert!((max - 4.5).abs() < EPSILON);

        // Each wheel vector is a positive multiple of the original one.
        let scale = after[0].speed_mps / before[0].speed_mps;
        assert!(scale > 0.0 && scale < 1.0);
        for (a, b) in after.iter().zip(before.iter()) {
            assert!((a.angle_rad - b.angle_rad).abs() < EPSILON);
            assert!((a.speed_mps - b.speed_mps * scale).abs() < EPSILON);
        }
    }

    #[test]
    fn test_desaturate_leaves_feasible_commands_alone() {
        let drive = square_drive();
        let before = drive.to_module_states(ChassisSpeeds::robot_relative(1.0, 0.5, 0.2)).unwrap();
        let mut after = before;
        desaturate_wheel_speeds(&mut after, 4.5);
        assert_eq!(before, after);
    }

    #[test]
    fn test_optimize_flips_large_turns() {
        let state = ModuleState::new(2.0, PI);
        let optimized = state.optimize(0.1);
        assert!((optimized.speed_mps - (-2.0)).abs() < EPSILON);
        assert!(optimized.angle_rad.abs() < EPSILON);

        // Same wheel velocity either way
        let (ax, ay) = state.velocity();
        let (bx, by) = optimized.velocity();
        assert!((ax - bx).abs() < EPSILON && (ay - by).abs() < EPSILON);
    }

    #[test]
    fn test_optimize_keeps_small_turns() {
        let state = ModuleState::new(1.0, 0.5);
        assert_eq!(state.optimize(0.0), state);
    }
}
