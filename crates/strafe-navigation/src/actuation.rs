//! Chassis velocity to module commands.

use strafe_kinematics::{
    ChassisSpeeds, ModuleState, NUM_MODULES, SwerveDrive, desaturate_wheel_speeds,
};
use tracing::warn;

use crate::config::ChassisConfig;
use crate::error::NavigationError;

/// Turns a frame-tagged chassis velocity into four module commands.
///
/// Field-relative input is rotated into the robot frame with the heading
/// passed in. Module speeds above the configured maximum are scaled down
/// together. A stop command keeps the modules pointed where they were.
#[derive(Debug, Clone)]
pub struct ChassisActuator {
    kinematics: SwerveDrive,
    max_module_speed: f64,
    last_angles: [f64; NUM_MODULES],
}

impl ChassisActuator {
    /// Build the kinematic model from chassis geometry.
    ///
    /// # Errors
    ///
    /// Returns an error if the geometry or speed limit is not positive.
    pub fn new(config: &ChassisConfig) -> Result<Self, NavigationError> {
        let kinematics = SwerveDrive::new(config.wheelbase_m, config.track_width_m)?;
        if config.max_module_speed_mps <= 0.0 || !config.max_module_speed_mps.is_finite() {
            return Err(NavigationError::InvalidConfig {
                field: "chassis.max_module_speed_mps",
                reason: "must be positive",
            });
        }
        Ok(ChassisActuator {
            kinematics,
            max_module_speed: config.max_module_speed_mps,
            last_angles: [0.0; NUM_MODULES],
        })
    }

    /// Module commands for `speeds`.
    ///
    /// # Arguments
    ///
    /// * `speeds`: Desired chassis velocity in either frame.
    /// * `heading`: Current field heading (rad), used for field-relative input.
    pub fn to_module_commands(&mut self, speeds: ChassisSpeeds, heading: f64) -> [ModuleState; NUM_MODULES] {
        let robot = speeds.to_robot_relative(heading);
        if !robot.is_finite() {
            warn!(%speeds, heading, "Non-finite chassis command replaced by stop");
            return self.hold();
        }
        if robot.is_zero() {
            return self.hold();
        }

        let mut states = match self.kinematics.to_module_states(robot) {
            Ok(states) => states,
            Err(e) => {
                warn!(error = %e, "Inverse kinematics rejected command");
                return self.hold();
            }
        };
        desaturate_wheel_speeds(&mut states, self.max_module_speed);
        for (angle, state) in self.last_angles.iter_mut().zip(states.iter()) {
            *angle = state.angle_rad;
        }
        states
    }

    /// Zero speed at the last commanded angles.
    pub fn hold(&self) -> [ModuleState; NUM_MODULES] {
        self.last_angles.map(|angle| ModuleState::new(0.0, angle))
    }

    /// The kinematic model in use.
    pub fn kinematics(&self) -> &SwerveDrive {
        &self.kinematics
    }

    /// Top module speed (m/s).
    pub fn max_module_speed(&self) -> f64 {
        self.max_module_speed
    }
}

/// Minimise steering travel for every module against its measured angle.
pub fn optimize_against(
    commands: &[ModuleState; NUM_MODULES],
    measured_angles: &[f64; NUM_MODULES],
) -> [ModuleState; NUM_MODULES] {
    let mut optimized = *commands;
    for (command, measured) in optimized.iter_mut().zip(measured_angles.iter()) {
        if measured.is_finite() {
            *command = command.optimize(*measured);
        }
    }
    optimized
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::f64::consts::{FRAC_PI_2, PI};
    const EPSILON: f64 = 1e-9;

    fn actuator() -> ChassisActuator {
        ChassisActuator::new(&ChassisConfig::default()).unwrap()
    }

    #[test]
    fn test_rejects_bad_geometry() {
        let config = ChassisConfig { wheelbase_m: 0.0, ..ChassisConfig::default() };
        assert!(ChassisActuator::new(&config).is_err());
        let config = ChassisConfig { max_module_speed_mps: -1.0, ..ChassisConfig::default() };
        assert!(ChassisActuator::new(&config).is_err());
    }

    #[test]
    fn test_field_relative_is_rotated() {
        let mut actuator = actuator();
        // Heading +90°, field +x is robot -y: every module points at -90°.
        let states = actuator.to_module_commands(ChassisSpeeds::field_relative(1.0, 0.0, 0.0), FRAC_PI_2);
        for state in states {
            assert!((state.speed_mps - 1.0).abs() < EPSILON);
            assert!((state.angle_rad - (-FRAC_PI_2)).abs() < EPSILON);
        }
    }

    #[test]
    fn test_stop_holds_angles() {
        let mut actuator = actuator();
        actuator.to_module_commands(ChassisSpeeds::robot_relative(0.0, 1.0, 0.0), 0.0);
        let stopped = actuator.to_module_commands(ChassisSpeeds::zero(), 0.0);
        for state in stopped {
            assert_eq!(state.speed_mps, 0.0);
            assert!((state.angle_rad - FRAC_PI_2).abs() < EPSILON);
        }
    }

    #[test]
    fn test_non_finite_input_stops() {
        let mut actuator = actuator();
        let states = actuator.to_module_commands(ChassisSpeeds::robot_relative(f64::NAN, 0.0, 0.0), 0.0);
        assert!(states.iter().all(|s| s.speed_mps == 0.0));
        let states = actuator.to_module_commands(ChassisSpeeds::field_relative(1.0, 0.0, 0.0), f64::INFINITY);
        assert!(states.iter().all(|s| s.speed_mps == 0.0));
    }

    #[test]
    fn test_desaturation_preserves_direction() {
        let mut actuator = actuator();
        let mut rng = rand::rng();
        for _ in 0..200 {
            let speeds = ChassisSpeeds::robot_relative(
                rng.random_range(-10.0..10.0),
                rng.random_range(-10.0..10.0),
                rng.random_range(-20.0..20.0),
            );
            let naive = actuator.kinematics().to_module_states(speeds).unwrap();
            let limited = actuator.to_module_commands(speeds, 0.0);

            let max = limited.iter().map(|s| s.speed_mps.abs()).fold(0.0, f64::max);
            assert!(max <= actuator.max_module_speed() + EPSILON);

            let naive_max = naive.iter().map(|s| s.speed_mps.abs()).fold(0.0, f64::max);
            let scale = if naive_max > actuator.max_module_speed() {
                actuator.max_module_speed() / naive_max
            } else {
                1.0
            };
            for (before, after) in naive.iter().zip(limited.iter()) {
                // Same angle, speed scaled by one common positive factor
                assert!((before.angle_rad - after.angle_rad).abs() < EPSILON);
                assert!((before.speed_mps * scale - after.speed_mps).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_optimize_against_measured() {
        let commands = [ModuleState::new(1.0, PI - 0.1); NUM_MODULES];
        let optimized = optimize_against(&commands, &[0.0, 0.0, f64::NAN, PI]);
        assert!((optimized[0].speed_mps - (-1.0)).abs() < EPSILON);
        assert!((optimized[0].angle_rad - (-0.1)).abs() < EPSILON);
        // Unknown measurement: left alone
        assert_eq!(optimized[2], commands[2]);
        // Already close
        assert_eq!(optimized[3], commands[3]);
    }
}
