//! Tunable parameters for the drivetrain control core.
//!
//! Every struct has a `Default` matching the robot this core was first tuned
//! on, and (with the `serde` feature) deserialises from a partial table so a
//! config file only needs to mention what it changes.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use strafe_kinematics::Frame;

use crate::error::NavigationError;
use crate::mirror::FieldMirror;

/// Gains and tolerances for one PID loop.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidConfig {
    /// Proportional gain.
    pub kp: f64,
    /// Integral gain.
    pub ki: f64,
    /// Derivative gain.
    pub kd: f64,
    /// The loop is at its setpoint when `|error|` is below this.
    pub tolerance: f64,
    /// ...and when `|d(error)/dt|` is below this.
    pub velocity_tolerance: f64,
    /// Symmetric bound on the integral term's contribution to the output.
    pub integrator_range: f64,
}

impl PidConfig {
    /// Proportional-only gains with the given tolerance.
    pub const fn proportional(kp: f64, tolerance: f64) -> Self {
        PidConfig {
            kp,
            ki: 0.0,
            kd: 0.0,
            tolerance,
            velocity_tolerance: f64::INFINITY,
            integrator_range: 1.0,
        }
    }

    fn validate(&self, field: &'static str) -> Result<(), NavigationError> {
        let gains_ok = [self.kp, self.ki, self.kd].iter().all(|g| g.is_finite());
        if !gains_ok {
            return Err(NavigationError::InvalidConfig { field, reason: "gains must be finite" });
        }
        if !(self.tolerance >= 0.0) || !(self.velocity_tolerance >= 0.0) {
            return Err(NavigationError::InvalidConfig { field, reason: "tolerances must be non-negative" });
        }
        if !(self.integrator_range >= 0.0) {
            return Err(NavigationError::InvalidConfig { field, reason: "integrator range must be non-negative" });
        }
        Ok(())
    }
}

impl Default for PidConfig {
    fn default() -> Self {
        PidConfig::proportional(1.0, 0.05)
    }
}

/// Physical chassis parameters.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChassisConfig {
    /// Front-to-back module spacing (m).
    pub wheelbase_m: f64,
    /// Left-to-right module spacing (m).
    pub track_width_m: f64,
    /// Top ground speed of a single module (m/s).
    pub max_module_speed_mps: f64,
}

impl Default for ChassisConfig {
    fn default() -> Self {
        ChassisConfig {
            wheelbase_m: 0.5,
            track_width_m: 0.6,
            max_module_speed_mps: 4.5,
        }
    }
}

/// Gains for driving to a fixed pose.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointConvergenceConfig {
    /// Field x loop.
    pub x: PidConfig,
    /// Field y loop.
    pub y: PidConfig,
    /// Heading loop (continuous over ±π).
    pub heading: PidConfig,
    /// Frame the controller tags its output with.
    pub output_frame: Frame,
}

impl Default for PointConvergenceConfig {
    fn default() -> Self {
        PointConvergenceConfig {
            x: PidConfig::proportional(1.0, 0.05),
            y: PidConfig::proportional(1.0, 0.05),
            heading: PidConfig::proportional(2.0, 0.035),
            output_frame: Frame::Field,
        }
    }
}

/// When to regenerate the remainder of a path from the current pose.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplanningConfig {
    /// Replan at follow start if the robot is off the path start or moving.
    pub enable_initial_replanning: bool,
    /// Replan mid-path when tracking error is too large or jumps.
    pub enable_dynamic_replanning: bool,
    /// Initial replanning trigger: distance from the path start (m).
    pub initial_distance_threshold_m: f64,
    /// Initial replanning trigger: measured translational speed (m/s).
    pub initial_speed_threshold_mps: f64,
    /// Dynamic replanning trigger: absolute positional error (m).
    pub total_error_threshold_m: f64,
    /// Dynamic replanning trigger: error growth in a single tick (m).
    pub error_spike_threshold_m: f64,
    /// How far along the original path the replanned segment rejoins it (s).
    pub rejoin_time_s: f64,
}

impl Default for ReplanningConfig {
    fn default() -> Self {
        ReplanningConfig {
            enable_initial_replanning: true,
            enable_dynamic_replanning: false,
            initial_distance_threshold_m: 0.25,
            initial_speed_threshold_mps: 0.25,
            total_error_threshold_m: 1.0,
            error_spike_threshold_m: 0.25,
            rejoin_time_s: 0.5,
        }
    }
}

/// Holonomic path-following configuration.
///
/// These gains are independent of [`PointConvergenceConfig`]; the two
/// controllers are tuned separately.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathFollowerConfig {
    /// Gains shared by the x and y correction loops.
    pub translation: PidConfig,
    /// Gains for the heading correction loop.
    pub rotation: PidConfig,
    /// Top module speed assumed by the follower (m/s).
    pub max_module_speed_mps: f64,
    /// Distance from the chassis center to the farthest module (m).
    pub drive_base_radius_m: f64,
    /// Replanning policy.
    pub replanning: ReplanningConfig,
}

impl PathFollowerConfig {
    /// Fastest rotation the follower will command (rad/s).
    pub fn max_angular_velocity(&self) -> f64 {
        self.max_module_speed_mps / self.drive_base_radius_m
    }
}

impl Default for PathFollowerConfig {
    fn default() -> Self {
        PathFollowerConfig {
            translation: PidConfig::proportional(5.0, 0.05),
            rotation: PidConfig::proportional(5.0, 0.035),
            max_module_speed_mps: 4.5,
            drive_base_radius_m: 0.4,
            replanning: ReplanningConfig::default(),
        }
    }
}

/// Pose estimator trust and guard parameters.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimatorConfig {
    /// Odometry standard deviations `[x m, y m, θ rad]`. Larger trusts odometry less.
    pub state_std_devs: [f64; 3],
    /// Default vision standard deviations `[x m, y m, θ rad]`. Larger trusts vision less.
    pub vision_std_devs: [f64; 3],
    /// How far back vision timestamps may reach (s).
    pub history_window_s: f64,
    /// Extra wheel travel tolerated per tick before a reading is treated as an encoder reset (m).
    pub travel_margin_m: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        EstimatorConfig {
            state_std_devs: [0.1, 0.1, 10.0],
            vision_std_devs: [5.0, 5.0, 500.0],
            history_window_s: 1.5,
            travel_margin_m: 0.05,
        }
    }
}

/// Everything the [`Drivetrain`](crate::Drivetrain) needs at construction.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrivetrainConfig {
    /// Nominal control period (s), used when tick timestamps are unusable.
    pub period_s: f64,
    /// Chassis geometry and limits.
    pub chassis: ChassisConfig,
    /// Drive-to-pose gains.
    pub point: PointConvergenceConfig,
    /// Path following gains and policy.
    pub follower: PathFollowerConfig,
    /// Alliance mirroring convention.
    pub mirror: FieldMirror,
    /// Pose estimation parameters.
    pub estimator: EstimatorConfig,
}

impl DrivetrainConfig {
    /// Check every value that would otherwise produce NaNs, division by zero
    /// or an estimator that never moves.
    pub fn validate(&self) -> Result<(), NavigationError> {
        positive("period_s", self.period_s)?;
        positive("chassis.max_module_speed_mps", self.chassis.max_module_speed_mps)?;
        self.point.x.validate("point.x")?;
        self.point.y.validate("point.y")?;
        self.point.heading.validate("point.heading")?;
        self.follower.translation.validate("follower.translation")?;
        self.follower.rotation.validate("follower.rotation")?;
        positive("follower.max_module_speed_mps", self.follower.max_module_speed_mps)?;
        positive("follower.drive_base_radius_m", self.follower.drive_base_radius_m)?;
        positive("follower.replanning.rejoin_time_s", self.follower.replanning.rejoin_time_s)?;
        positive("mirror.field_length_m", self.mirror.field_length_m)?;
        positive("mirror.field_width_m", self.mirror.field_width_m)?;
        let mut stds = self.estimator.state_std_devs.iter().chain(self.estimator.vision_std_devs.iter());
        if stds.any(|s| !(*s >= 0.0) || !s.is_finite()) {
            return Err(NavigationError::InvalidConfig {
                field: "estimator",
                reason: "standard deviations must be finite and non-negative",
            });
        }
        positive("estimator.history_window_s", self.estimator.history_window_s)?;
        non_negative("estimator.travel_margin_m", self.estimator.travel_margin_m)?;
        Ok(())
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), NavigationError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(NavigationError::InvalidConfig { field, reason: "must be finite and positive" })
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), NavigationError> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(NavigationError::InvalidConfig { field, reason: "must be finite and non-negative" })
    }
}

impl Default for DrivetrainConfig {
    fn default() -> Self {
        DrivetrainConfig {
            period_s: 0.02,
            chassis: ChassisConfig::default(),
            point: PointConvergenceConfig::default(),
            follower: PathFollowerConfig::default(),
            mirror: FieldMirror::default(),
            estimator: EstimatorConfig::default(),
        }
    }
}
