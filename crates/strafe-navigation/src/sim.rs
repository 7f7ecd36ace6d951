//! An ideal swerve plant for tests and the demo driver.

use strafe_kinematics::{ModulePosition, ModuleState, NUM_MODULES, Pose, SwerveDrive};

use crate::config::ChassisConfig;
use crate::error::NavigationError;
use crate::io::{ModuleTelemetry, SwerveIo};

/// A chassis whose modules reach every command instantly and never slip.
///
/// The gyro reads the true heading. Faults can be switched on to exercise the
/// estimator's guards.
#[derive(Debug, Clone)]
pub struct SimulatedSwerve {
    kinematics: SwerveDrive,
    modules: [ModuleTelemetry; NUM_MODULES],
    commands: [ModuleState; NUM_MODULES],
    pose: Pose,
    telemetry_fault: bool,
}

impl SimulatedSwerve {
    /// A plant at the field origin with the given geometry.
    pub fn new(kinematics: SwerveDrive) -> Self {
        SimulatedSwerve {
            kinematics,
            modules: [ModuleTelemetry::default(); NUM_MODULES],
            commands: [ModuleState::default(); NUM_MODULES],
            pose: Pose::default(),
            telemetry_fault: false,
        }
    }

    /// A plant built from chassis settings.
    pub fn from_config(config: &ChassisConfig) -> Result<Self, NavigationError> {
        Ok(Self::new(SwerveDrive::new(config.wheelbase_m, config.track_width_m)?))
    }

    /// Advance the plant by `dt` seconds at the last commanded module states.
    pub fn step(&mut self, dt: f64) {
        if !(dt > 0.0) {
            return;
        }
        let mut deltas = [ModulePosition::default(); NUM_MODULES];
        for (delta, module) in deltas.iter_mut().zip(self.modules.iter_mut()) {
            let travel = module.velocity_mps * dt;
            module.distance_m += travel;
            *delta = ModulePosition::new(travel, module.angle_rad);
        }
        self.pose = self.pose.exp(self.kinematics.to_twist(&deltas));
    }

    /// Ground-truth pose.
    pub fn pose(&self) -> Pose {
        self.pose
    }

    /// Move the chassis without rolling the wheels.
    pub fn set_pose(&mut self, pose: Pose) {
        self.pose = pose;
    }

    /// The commands most recently applied.
    pub fn commands(&self) -> &[ModuleState; NUM_MODULES] {
        &self.commands
    }

    /// Make every reading NaN while `fault` is set.
    pub fn set_telemetry_fault(&mut self, fault: bool) {
        self.telemetry_fault = fault;
    }

    /// Zero the wheel distance counters, as a motor controller reboot would.
    pub fn reset_encoders(&mut self) {
        for module in self.modules.iter_mut() {
            module.distance_m = 0.0;
        }
    }
}

impl SwerveIo for SimulatedSwerve {
    fn read_module_telemetry(&self) -> [ModuleTelemetry; NUM_MODULES] {
        if self.telemetry_fault {
            let nan = ModuleTelemetry { distance_m: f64::NAN, angle_rad: f64::NAN, velocity_mps: f64::NAN };
            return [nan; NUM_MODULES];
        }
        self.modules
    }

    fn read_heading(&self) -> f64 {
        if self.telemetry_fault { f64::NAN } else { self.pose.theta }
    }

    fn apply_module_commands(&mut self, commands: &[ModuleState; NUM_MODULES]) {
        self.commands = *commands;
        for (module, command) in self.modules.iter_mut().zip(commands.iter()) {
            module.angle_rad = command.angle_rad;
            module.velocity_mps = command.speed_mps;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strafe_kinematics::ChassisSpeeds;
    const EPSILON: f64 = 1e-9;

    #[test]
    fn test_spins_in_place() {
        let kinematics = SwerveDrive::new(0.5, 0.6).unwrap();
        let mut sim = SimulatedSwerve::new(kinematics);
        let states = kinematics.to_module_states(ChassisSpeeds::robot_relative(0.0, 0.0, 1.0)).unwrap();
        sim.apply_module_commands(&states);
        for _ in 0..50 {
            sim.step(0.01);
        }
        let pose = sim.pose();
        assert!(pose.x.abs() < 1e-6);
        assert!(pose.y.abs() < 1e-6);
        assert!((pose.theta - 0.5).abs() < 1e-6);
        assert!((sim.read_heading() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_distances_accumulate() {
        let mut sim = SimulatedSwerve::from_config(&ChassisConfig::default()).unwrap();
        sim.apply_module_commands(&[ModuleState::new(2.0, 0.0); NUM_MODULES]);
        sim.step(0.5);
        let telemetry = sim.read_module_telemetry();
        assert!(telemetry.iter().all(|m| (m.distance_m - 1.0).abs() < EPSILON));
        assert!((sim.pose().x - 1.0).abs() < EPSILON);

        sim.reset_encoders();
        assert!(sim.read_module_telemetry().iter().all(|m| m.distance_m == 0.0));
    }

    #[test]
    fn test_fault_reads_nan() {
        let mut sim = SimulatedSwerve::from_config(&ChassisConfig::default()).unwrap();
        sim.set_telemetry_fault(true);
        assert!(sim.read_heading().is_nan());
        assert!(!sim.read_module_telemetry()[0].is_finite());
    }
}
