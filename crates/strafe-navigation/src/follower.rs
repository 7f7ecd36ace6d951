//! Holonomic trajectory follower.
//!
//! Each tick the follower samples the trajectory at the elapsed time, adds PID
//! correction to the sample's feedforward velocity in the field frame, bounds
//! the rotation rate and hands back robot-relative speeds.

use strafe_kinematics::{ChassisSpeeds, Pose};
use tracing::{debug, info};

use crate::config::{PathFollowerConfig, ReplanningConfig};
use crate::mirror::FieldMirror;
use crate::pid::PidController;
use crate::trajectory::{Trajectory, TrajectoryState};

/// State of one path-follow command.
#[derive(Debug, Clone)]
pub struct PathFollower {
    trajectory: Trajectory,
    mirrored: bool,
    elapsed_s: f64,
    x: PidController,
    y: PidController,
    rotation: PidController,
    max_angular_velocity: f64,
    replanning: ReplanningConfig,
    previous_error_m: Option<f64>,
    replans: u32,
}

impl PathFollower {
    /// Begin following `trajectory`.
    ///
    /// The mirror decision is taken here and never revisited. If initial
    /// replanning is enabled and the robot is away from the path start or
    /// already moving, the path is rebuilt from `pose` first.
    ///
    /// # Arguments
    ///
    /// * `trajectory`: The path as authored.
    /// * `mirror`: Reflection to apply for this alliance, if any.
    /// * `pose`: Current estimated field pose.
    /// * `speeds`: Currently measured chassis speeds (either frame).
    /// * `config`: Follower gains, limits and replanning policy.
    pub fn start(
        trajectory: Trajectory,
        mirror: Option<&FieldMirror>,
        pose: &Pose,
        speeds: &ChassisSpeeds,
        config: &PathFollowerConfig,
    ) -> Self {
        let mirrored = mirror.is_some();
        let mut trajectory = match mirror {
            Some(m) => trajectory.mirrored(m),
            None => trajectory,
        };

        let replanning = config.replanning;
        let mut replans = 0;
        if replanning.enable_initial_replanning {
            let offset = pose.distance_to(&trajectory.initial_state().pose);
            let speed = speeds.translational_speed();
            if offset > replanning.initial_distance_threshold_m || speed > replanning.initial_speed_threshold_mps {
                info!(offset, speed, "Replanning path from current pose");
                trajectory = trajectory.replanned(0.0, *pose, replanning.rejoin_time_s);
                replans += 1;
            }
        }

        info!(
            duration = trajectory.total_time(),
            mirrored,
            "Following path"
        );
        PathFollower {
            trajectory,
            mirrored,
            elapsed_s: 0.0,
            x: PidController::new(&config.translation),
            y: PidController::new(&config.translation),
            rotation: PidController::new_angular(&config.rotation),
            max_angular_velocity: config.max_angular_velocity(),
            replanning,
            previous_error_m: None,
            replans,
        }
    }

    /// Robot-relative speeds for this tick; advances the elapsed time by `dt`.
    pub fn calculate(&mut self, pose: &Pose, dt: f64) -> ChassisSpeeds {
        let mut desired = self.trajectory.sample(self.elapsed_s);

        if self.replanning.enable_dynamic_replanning {
            desired = self.replan_if_diverged(pose, desired);
        }
        self.previous_error_m = Some(pose.distance_to(&desired.pose));

        let vx = desired.vx_mps + self.x.calculate(pose.x, desired.pose.x, dt);
        let vy = desired.vy_mps + self.y.calculate(pose.y, desired.pose.y, dt);
        let omega = (desired.omega_radps + self.rotation.calculate(pose.theta, desired.pose.theta, dt))
            .clamp(-self.max_angular_velocity, self.max_angular_velocity);

        debug!(elapsed = self.elapsed_s, target = %desired.pose, "Path sample");
        self.elapsed_s += dt;

        ChassisSpeeds::field_relative(vx, vy, omega).to_robot_relative(pose.theta)
    }

    fn replan_if_diverged(&mut self, pose: &Pose, desired: TrajectoryState) -> TrajectoryState {
        let error = pose.distance_to(&desired.pose);
        let spike = self.previous_error_m.map_or(0.0, |previous| error - previous);
        if error < self.replanning.total_error_threshold_m && spike < self.replanning.error_spike_threshold_m {
            return desired;
        }

        info!(error, spike, "Tracking error too large, replanning");
        self.trajectory = self.trajectory.replanned(self.elapsed_s, *pose, self.replanning.rejoin_time_s);
        self.elapsed_s = 0.0;
        self.replans += 1;
        self.trajectory.sample(0.0)
    }

    /// Whether the elapsed time has reached the end of the trajectory.
    pub fn is_finished(&self) -> bool {
        self.elapsed_s >= self.trajectory.total_time()
    }

    /// Clear all loop state.
    pub fn release(&mut self) {
        self.x.reset();
        self.y.reset();
        self.rotation.reset();
        self.previous_error_m = None;
    }

    /// Whether the path was reflected at start.
    pub fn is_mirrored(&self) -> bool {
        self.mirrored
    }

    /// Time into the current trajectory (s).
    pub fn elapsed(&self) -> f64 {
        self.elapsed_s
    }

    /// Number of times the path has been rebuilt.
    pub fn replan_count(&self) -> u32 {
        self.replans
    }

    /// The trajectory currently being tracked (after mirroring and replanning).
    pub fn trajectory(&self) -> &Trajectory {
        &self.trajectory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;
    use strafe_kinematics::Frame;
    const EPSILON: f64 = 1e-9;

    fn line() -> Trajectory {
        Trajectory::from_timed_poses(&[
            (0.0, Pose::new(1.0, 2.0, 0.0)),
            (1.0, Pose::new(2.0, 2.0, 0.0)),
        ])
        .unwrap()
    }

    fn no_replanning() -> PathFollowerConfig {
        PathFollowerConfig {
            replanning: ReplanningConfig {
                enable_initial_replanning: false,
                enable_dynamic_replanning: false,
                ..ReplanningConfig::default()
            },
            ..PathFollowerConfig::default()
        }
    }

    #[test]
    fn test_on_path_output_is_feedforward() {
        let start = Pose::new(1.0, 2.0, 0.0);
        let mut follower = PathFollower::start(line(), None, &start, &ChassisSpeeds::zero(), &no_replanning());
        let speeds = follower.calculate(&start, 0.02);
        assert_eq!(speeds.frame, Frame::Robot);
        assert!((speeds.vx - 1.0).abs() < EPSILON);
        assert!(speeds.vy.abs() < EPSILON);
        assert!(speeds.omega.abs() < EPSILON);
    }

    #[test]
    fn test_output_is_robot_relative() {
        // Same field situation, robot rotated to face +y.
        let start = Pose::new(1.0, 2.0, PI / 2.0);
        let trajectory = Trajectory::from_timed_poses(&[
            (0.0, Pose::new(1.0, 2.0, PI / 2.0)),
            (1.0, Pose::new(2.0, 2.0, PI / 2.0)),
        ])
        .unwrap();
        let mut follower = PathFollower::start(trajectory, None, &start, &ChassisSpeeds::zero(), &no_replanning());
        let speeds = follower.calculate(&start, 0.02);
        // Field +x is the robot's right.
        assert!(speeds.vx.abs() < EPSILON);
        assert!((speeds.vy - (-1.0)).abs() < EPSILON);
    }

    #[test]
    fn test_rotation_is_bounded() {
        let config = no_replanning();
        let trajectory = Trajectory::from_timed_poses(&[
            (0.0, Pose::new(0.0, 0.0, 3.0)),
            (1.0, Pose::new(0.0, 0.0, 3.0)),
        ])
        .unwrap();
        let pose = Pose::new(0.0, 0.0, 0.0);
        let mut follower = PathFollower::start(trajectory, None, &pose, &ChassisSpeeds::zero(), &config);
        let speeds = follower.calculate(&pose, 0.02);
        // 5.0 * 3.0 = 15 rad/s would exceed 4.5 / 0.4
        assert!((speeds.omega - config.max_angular_velocity()).abs() < EPSILON);
    }

    #[test]
    fn test_finishes_after_total_time() {
        let start = Pose::new(1.0, 2.0, 0.0);
        let mut follower = PathFollower::start(line(), None, &start, &ChassisSpeeds::zero(), &no_replanning());
        let mut ticks = 0;
        while !follower.is_finished() {
            follower.calculate(&start, 0.02);
            ticks += 1;
        }
        // 1.0 s at 20 ms, allowing for float accumulation
        assert!((50..=51).contains(&ticks));
    }

    #[test]
    fn test_mirror_flag_reflects_geometry() {
        let mirror = FieldMirror::default();
        let follower = PathFollower::start(
            line(),
            Some(&mirror),
            &Pose::default(),
            &ChassisSpeeds::zero(),
            &no_replanning(),
        );
        assert!(follower.is_mirrored());
        let start = follower.trajectory().initial_state().pose;
        assert!((start.x - 1.0).abs() < EPSILON);
        assert!((start.y - (mirror.field_width_m - 2.0)).abs() < EPSILON);
    }

    #[test]
    fn test_initial_replanning_when_off_path() {
        let config = PathFollowerConfig::default();
        let pose = Pose::new(0.0, 0.0, 0.0);
        let follower = PathFollower::start(line(), None, &pose, &ChassisSpeeds::zero(), &config);
        assert_eq!(follower.replan_count(), 1);
        assert_eq!(follower.trajectory().initial_state().pose, pose);

        // On the start pose and at rest: no replan.
        let follower = PathFollower::start(line(), None, &Pose::new(1.0, 2.0, 0.0), &ChassisSpeeds::zero(), &config);
        assert_eq!(follower.replan_count(), 0);

        // On the start pose but moving: replan.
        let moving = ChassisSpeeds::robot_relative(1.0, 0.0, 0.0);
        let follower = PathFollower::start(line(), None, &Pose::new(1.0, 2.0, 0.0), &moving, &config);
        assert_eq!(follower.replan_count(), 1);
    }

    #[test]
    fn test_dynamic_replanning_on_large_error() {
        let mut config = no_replanning();
        config.replanning.enable_dynamic_replanning = true;
        let start = Pose::new(1.0, 2.0, 0.0);
        let mut follower = PathFollower::start(line(), None, &start, &ChassisSpeeds::zero(), &config);
        follower.calculate(&start, 0.02);
        assert_eq!(follower.replan_count(), 0);

        // Knocked 1.5 m off the path.
        let knocked = Pose::new(1.0, 3.5, 0.0);
        follower.calculate(&knocked, 0.02);
        assert_eq!(follower.replan_count(), 1);
        assert_eq!(follower.trajectory().initial_state().pose, knocked);
        // Elapsed restarted at zero, then advanced by one tick.
        assert!((follower.elapsed() - 0.02).abs() < EPSILON);
    }

    #[test]
    fn test_release_clears_loops() {
        let mut config = no_replanning();
        config.translation.ki = 1.0;
        let start = Pose::new(1.0, 2.0, 0.0);
        let mut follower = PathFollower::start(line(), None, &start, &ChassisSpeeds::zero(), &config);
        follower.calculate(&Pose::new(0.0, 0.0, 0.0), 0.02);
        follower.release();
        assert_eq!(follower.x.integral(), 0.0);
        assert_eq!(follower.y.integral(), 0.0);
    }
}
