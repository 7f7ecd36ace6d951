#![doc = "Closed-loop motion control for a swerve chassis."]
#![doc = ""]
#![doc = "Pose estimation from wheel odometry and vision, drive-to-pose and"]
#![doc = "trajectory-following controllers, and the single-owner motion command"]
#![doc = "state machine that turns their output into module commands each tick."]

pub mod actuation;
pub mod command;
pub mod config;
pub mod drivetrain;
pub mod error;
pub mod estimator;
pub mod follower;
pub mod io;
pub mod mirror;
pub mod pid;
pub mod point;
pub mod sim;
pub mod trajectory;

pub use actuation::ChassisActuator;
pub use command::{CommandHandle, CommandStatus, MotionMode, MotionState};
pub use config::{
    ChassisConfig, DrivetrainConfig, EstimatorConfig, PathFollowerConfig, PidConfig, PointConvergenceConfig,
    ReplanningConfig,
};
pub use drivetrain::{Drivetrain, FollowContext, TickReport};
pub use error::NavigationError;
pub use estimator::{PoseEstimator, VisionMeasurement, VisionRejection};
pub use follower::PathFollower;
pub use io::{Alliance, AllianceSource, ModuleTelemetry, SwerveIo};
pub use mirror::{FieldMirror, MirrorAxis};
pub use pid::PidController;
pub use point::PointConvergence;
pub use sim::SimulatedSwerve;
pub use trajectory::{PathLibrary, PathSource, Trajectory, TrajectoryState};
