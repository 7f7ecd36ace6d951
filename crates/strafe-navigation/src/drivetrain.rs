//! The drivetrain: one owner for estimation, motion commands and actuation.

use strafe_kinematics::{ChassisSpeeds, ModuleState, NUM_MODULES, Pose};
use tracing::{debug, info, warn};

use crate::actuation::{ChassisActuator, optimize_against};
use crate::command::{CommandHandle, CommandLog, CommandStatus, MotionMode, MotionState};
use crate::config::DrivetrainConfig;
use crate::error::NavigationError;
use crate::estimator::{PoseEstimator, VisionMeasurement, VisionRejection};
use crate::follower::PathFollower;
use crate::io::{Alliance, AllianceSource, SwerveIo};
use crate::point::PointConvergence;
use crate::trajectory::{PathSource, Trajectory};

/// How many finished commands are remembered for [`Drivetrain::status`].
const COMMAND_HISTORY: usize = 64;

/// What a path supplier gets to look at when a follow starts.
pub struct FollowContext<'a> {
    /// Alliance at start, `None` if not yet known.
    pub alliance: Option<Alliance>,
    /// Estimated pose at start.
    pub pose: Pose,
    /// The drivetrain's path source.
    pub paths: &'a dyn PathSource,
}

/// Summary of one control tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    /// Timestamp passed to [`Drivetrain::periodic`] (s).
    pub timestamp_s: f64,
    /// Pose estimate after this tick's telemetry.
    pub pose: Pose,
    /// Whether the estimator rejected this tick's telemetry.
    pub pose_stale: bool,
    /// State the tick ran in.
    pub mode: MotionMode,
    /// Command that owned actuation during the tick.
    pub active: Option<CommandHandle>,
    /// Command that finished during the tick.
    pub finished: Option<CommandHandle>,
    /// Chassis velocity chosen this tick, as produced by the controller.
    pub speeds: ChassisSpeeds,
    /// Module commands sent to the hardware.
    pub modules: [ModuleState; NUM_MODULES],
}

/// A swerve drivetrain over some hardware `I`.
///
/// At most one motion command drives the chassis. Starting another releases
/// the current one first. Every call to [`periodic`](Self::periodic) writes
/// exactly one set of module commands.
pub struct Drivetrain<I: SwerveIo> {
    io: I,
    config: DrivetrainConfig,
    actuator: ChassisActuator,
    estimator: PoseEstimator,
    alliance: Box<dyn AllianceSource + Send>,
    paths: Box<dyn PathSource + Send>,
    motion: MotionState,
    outcomes: CommandLog,
    next_id: u64,
    last_timestamp: Option<f64>,
    measured_speeds: ChassisSpeeds,
}

impl<I: SwerveIo> Drivetrain<I> {
    /// Build a drivetrain at the field origin.
    ///
    /// # Errors
    ///
    /// Returns `NavigationError::InvalidConfig` or a wrapped kinematics error
    /// if `config` does not validate.
    pub fn new<A, P>(io: I, config: DrivetrainConfig, alliance: A, paths: P) -> Result<Self, NavigationError>
    where
        A: AllianceSource + Send + 'static,
        P: PathSource + Send + 'static,
    {
        config.validate()?;
        let actuator = ChassisActuator::new(&config.chassis)?;
        let estimator =
            PoseEstimator::new(*actuator.kinematics(), config.chassis.max_module_speed_mps, &config.estimator);
        info!(kinematics = %actuator.kinematics(), period_s = config.period_s, "Drivetrain ready");

        let mut drivetrain = Drivetrain {
            io,
            config,
            actuator,
            estimator,
            alliance: Box::new(alliance),
            paths: Box::new(paths),
            motion: MotionState::Idle,
            outcomes: CommandLog::new(COMMAND_HISTORY),
            next_id: 1,
            last_timestamp: None,
            measured_speeds: ChassisSpeeds::zero(),
        };
        drivetrain.reset_pose(Pose::default());
        Ok(drivetrain)
    }

    /// Start driving to `target`, superseding any running command.
    pub fn go_to_point(&mut self, target: Pose) -> CommandHandle {
        self.supersede();
        let handle = self.next_handle();
        let controller = PointConvergence::new(target, &self.config.point);
        self.motion = MotionState::Converging { handle, controller };
        handle
    }

    /// Start following the path stored under `name`.
    ///
    /// # Errors
    ///
    /// Returns `NavigationError::PathNotFound` if the path source does not
    /// know `name`. The running command, if any, is left untouched.
    pub fn follow_path(&mut self, name: &str) -> Result<CommandHandle, NavigationError> {
        let trajectory = self.paths.load(name)?;
        let alliance = self.alliance.alliance();
        Ok(self.start_follow(trajectory, alliance))
    }

    /// Start following a path chosen at this moment by `supplier`.
    ///
    /// # Errors
    ///
    /// Whatever `supplier` returns. The running command, if any, is left
    /// untouched.
    pub fn follow_path_with<F>(&mut self, supplier: F) -> Result<CommandHandle, NavigationError>
    where
        F: FnOnce(&FollowContext<'_>) -> Result<Trajectory, NavigationError>,
    {
        let alliance = self.alliance.alliance();
        let context = FollowContext { alliance, pose: self.estimator.pose(), paths: self.paths.as_ref() };
        let trajectory = supplier(&context)?;
        Ok(self.start_follow(trajectory, alliance))
    }

    fn start_follow(&mut self, trajectory: Trajectory, alliance: Option<Alliance>) -> CommandHandle {
        let mirror = (alliance == Some(Alliance::Red)).then_some(&self.config.mirror);
        let follower = PathFollower::start(
            trajectory,
            mirror,
            &self.estimator.pose(),
            &self.measured_speeds,
            &self.config.follower,
        );
        self.supersede();
        let handle = self.next_handle();
        self.motion = MotionState::Following { handle, follower: Box::new(follower) };
        handle
    }

    fn next_handle(&mut self) -> CommandHandle {
        let handle = CommandHandle::new(self.next_id);
        self.next_id += 1;
        handle
    }

    fn supersede(&mut self) {
        self.end_active(CommandStatus::Superseded);
    }

    /// Release the active controller and record how it ended.
    fn end_active(&mut self, status: CommandStatus) -> Option<CommandHandle> {
        let mut previous = std::mem::replace(&mut self.motion, MotionState::Idle);
        previous.release();
        match previous {
            MotionState::Converging { handle, .. } | MotionState::Following { handle, .. } => {
                info!(%handle, ?status, "Motion command ended");
                self.outcomes.record(handle, status);
                Some(handle)
            }
            MotionState::Idle | MotionState::Cancelling { .. } => None,
        }
    }

    /// Stop `handle` if it is running.
    ///
    /// Loop state is released before this returns. The next tick commands a
    /// stop. Returns `false` if `handle` was not running.
    pub fn cancel(&mut self, handle: CommandHandle) -> bool {
        let running = matches!(
            self.motion,
            MotionState::Converging { handle: h, .. } | MotionState::Following { handle: h, .. } if h == handle
        );
        if !running {
            return false;
        }
        self.end_active(CommandStatus::Cancelled);
        self.motion = MotionState::Cancelling { handle };
        true
    }

    /// Lifecycle state of `handle`.
    pub fn status(&self, handle: CommandHandle) -> CommandStatus {
        if let Some(status) = self.outcomes.get(handle) {
            return status;
        }
        match self.motion {
            MotionState::Converging { handle: h, .. } | MotionState::Following { handle: h, .. } if h == handle => {
                CommandStatus::Running
            }
            _ => CommandStatus::Unknown,
        }
    }

    /// Run one control tick.
    ///
    /// Reads telemetry, updates the pose estimate, asks the active command for
    /// one chassis velocity and applies the resulting module commands.
    pub fn periodic(&mut self, timestamp_s: f64) -> TickReport {
        let dt = self.tick_period(timestamp_s);

        let (telemetry, gyro) = self.io.read_sensors();
        let pose = self.estimator.update(timestamp_s, gyro, &telemetry.map(|m| m.position()));

        self.measured_speeds = if telemetry.iter().all(|m| m.is_finite()) {
            self.actuator
                .kinematics()
                .to_chassis_speeds(&telemetry.map(|m| m.state()))
                .to_field_relative(pose.theta)
        } else {
            ChassisSpeeds::zero()
        };

        let mode = self.motion.mode();
        let active = self.motion.handle();
        let mut finished = None;
        let speeds = match &mut self.motion {
            MotionState::Idle => ChassisSpeeds::zero(),
            MotionState::Cancelling { .. } => {
                self.motion = MotionState::Idle;
                ChassisSpeeds::zero()
            }
            MotionState::Converging { controller, .. } => {
                let speeds = controller.calculate(&pose, dt);
                if controller.at_target() {
                    finished = self.end_active(CommandStatus::Finished);
                    ChassisSpeeds::zero()
                } else {
                    speeds
                }
            }
            MotionState::Following { follower, .. } => {
                let speeds = follower.calculate(&pose, dt);
                if follower.is_finished() {
                    finished = self.end_active(CommandStatus::Finished);
                    ChassisSpeeds::zero()
                } else {
                    speeds
                }
            }
        };

        let commands = self.actuator.to_module_commands(speeds, pose.theta);
        let modules = optimize_against(&commands, &telemetry.map(|m| m.angle_rad));
        self.io.apply_module_commands(&modules);

        debug!(timestamp_s, %pose, %speeds, ?mode, "Tick");
        TickReport {
            timestamp_s,
            pose,
            pose_stale: self.estimator.is_stale(),
            mode,
            active,
            finished,
            speeds,
            modules,
        }
    }

    fn tick_period(&mut self, timestamp_s: f64) -> f64 {
        if !timestamp_s.is_finite() {
            warn!(timestamp_s, "Tick timestamp not finite, using nominal period");
            return self.config.period_s;
        }
        let dt = match self.last_timestamp {
            Some(last) if timestamp_s > last => timestamp_s - last,
            Some(last) => {
                warn!(timestamp_s, last, "Tick timestamp did not advance, using nominal period");
                self.config.period_s
            }
            None => self.config.period_s,
        };
        self.last_timestamp = Some(timestamp_s);
        dt
    }

    /// Cancel everything and stop the modules.
    pub fn shutdown(&mut self) {
        self.end_active(CommandStatus::Cancelled);
        self.motion = MotionState::Idle;
        let hold = self.actuator.hold();
        self.io.apply_module_commands(&hold);
        info!("Drivetrain stopped");
    }

    /// Re-seed the pose estimate at `pose` using current telemetry as the baseline.
    pub fn reset_pose(&mut self, pose: Pose) {
        let (telemetry, gyro) = self.io.read_sensors();
        self.estimator.reset_pose(gyro, &telemetry.map(|m| m.position()), pose);
        info!(%pose, "Pose reset");
    }

    /// Blend an absolute pose measurement into the estimate.
    ///
    /// # Errors
    ///
    /// Returns why the measurement was discarded; see
    /// [`PoseEstimator::add_vision_measurement`].
    pub fn add_vision_measurement(&mut self, measurement: &VisionMeasurement) -> Result<(), VisionRejection> {
        self.estimator.add_vision_measurement(measurement)
    }

    /// Current pose estimate.
    pub fn pose(&self) -> Pose {
        self.estimator.pose()
    }

    /// Gyro heading rate (rad/s).
    pub fn heading_rate(&self) -> f64 {
        self.estimator.heading_rate()
    }

    /// Whether the latest telemetry was rejected.
    pub fn is_pose_stale(&self) -> bool {
        self.estimator.is_stale()
    }

    /// The active motion state.
    pub fn motion(&self) -> &MotionState {
        &self.motion
    }

    /// Validated configuration in use.
    pub fn config(&self) -> &DrivetrainConfig {
        &self.config
    }

    /// Hardware handle.
    pub fn io(&self) -> &I {
        &self.io
    }

    /// Mutable hardware handle.
    pub fn io_mut(&mut self) -> &mut I {
        &mut self.io
    }
}
