//! Capabilities the control core consumes from the outside world.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use strafe_kinematics::{ModulePosition, ModuleState, NUM_MODULES};

/// One module's encoder snapshot.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ModuleTelemetry {
    /// Accumulated wheel travel (m).
    pub distance_m: f64,
    /// Steering angle relative to the chassis +x axis (rad).
    pub angle_rad: f64,
    /// Wheel ground speed (m/s).
    pub velocity_mps: f64,
}

impl ModuleTelemetry {
    /// Travel and angle, as used for odometry.
    pub fn position(&self) -> ModulePosition {
        ModulePosition::new(self.distance_m, self.angle_rad)
    }

    /// Speed and angle, as used for measured chassis speeds.
    pub fn state(&self) -> ModuleState {
        ModuleState::new(self.velocity_mps, self.angle_rad)
    }

    /// Whether every reading is a finite number.
    pub fn is_finite(&self) -> bool {
        self.distance_m.is_finite() && self.angle_rad.is_finite() && self.velocity_mps.is_finite()
    }
}

/// Hardware access for a four-module swerve chassis.
///
/// Module arrays are ordered front-left, front-right, back-left, back-right.
/// Implementations never fail; bad readings are passed through as-is and
/// dealt with by the pose estimator.
pub trait SwerveIo {
    /// Snapshot of every module's encoders.
    fn read_module_telemetry(&self) -> [ModuleTelemetry; NUM_MODULES];

    /// Raw gyro heading (rad, counter-clockwise positive).
    fn read_heading(&self) -> f64;

    /// Module telemetry and gyro heading taken at the same instant.
    ///
    /// The drivetrain reads sensors only through this. Implementations whose
    /// readings can change between the two calls should override it.
    fn read_sensors(&self) -> ([ModuleTelemetry; NUM_MODULES], f64) {
        (self.read_module_telemetry(), self.read_heading())
    }

    /// Drive every module to the given speed and steering angle.
    fn apply_module_commands(&mut self, commands: &[ModuleState; NUM_MODULES]);
}

/// Which side of the field the robot plays for.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alliance {
    /// Paths are mirrored for this side.
    Red,
    /// Paths are authored for this side.
    Blue,
}

/// Reports the current alliance, or `None` while the match system has not
/// said yet.
pub trait AllianceSource {
    /// The alliance at this moment.
    fn alliance(&self) -> Option<Alliance>;
}

impl AllianceSource for Option<Alliance> {
    fn alliance(&self) -> Option<Alliance> {
        *self
    }
}

impl<F> AllianceSource for F
where
    F: Fn() -> Option<Alliance>,
{
    fn alliance(&self) -> Option<Alliance> {
        self()
    }
}
