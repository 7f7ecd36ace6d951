//! Drive-to-pose controller.

use strafe_kinematics::{ChassisSpeeds, Frame, Pose};
use tracing::info;

use crate::config::PointConvergenceConfig;
use crate::pid::PidController;

/// Converges the chassis on a fixed target pose with three independent loops
/// (field x, field y, heading).
///
/// The controller is finished when all three loops are inside their own
/// tolerance bands at once.
#[derive(Debug, Clone)]
pub struct PointConvergence {
    target: Pose,
    x: PidController,
    y: PidController,
    heading: PidController,
    output_frame: Frame,
}

impl PointConvergence {
    /// Build fresh loops for `target`.
    pub fn new(target: Pose, config: &PointConvergenceConfig) -> Self {
        info!("Traveling to x: {:.3}, y: {:.3}, θ: {:.3}", target.x, target.y, target.theta);
        PointConvergence {
            target,
            x: PidController::new(&config.x),
            y: PidController::new(&config.y),
            heading: PidController::new_angular(&config.heading),
            output_frame: config.output_frame,
        }
    }

    /// Loop outputs for this tick, tagged with the configured output frame.
    ///
    /// # Arguments
    ///
    /// * `pose`: Current estimated field pose.
    /// * `dt`: Time since the previous tick (s).
    pub fn calculate(&mut self, pose: &Pose, dt: f64) -> ChassisSpeeds {
        let vx = self.x.calculate(pose.x, self.target.x, dt);
        let vy = self.y.calculate(pose.y, self.target.y, dt);
        let omega = self.heading.calculate(pose.theta, self.target.theta, dt);

        let speeds = ChassisSpeeds::field_relative(vx, vy, omega);
        match self.output_frame {
            Frame::Field => speeds,
            Frame::Robot => speeds.to_robot_relative(pose.theta),
        }
    }

    /// Whether every loop is within tolerance.
    pub fn at_target(&self) -> bool {
        self.x.at_setpoint() && self.y.at_setpoint() && self.heading.at_setpoint()
    }

    /// Clear all loop state. Called on completion, cancellation and supersede.
    pub fn release(&mut self) {
        self.x.reset();
        self.y.reset();
        self.heading.reset();
    }

    /// The pose being driven to.
    pub fn target(&self) -> Pose {
        self.target
    }
}
