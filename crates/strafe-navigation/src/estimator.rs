//! Wheel odometry fused with occasional absolute pose measurements.

use std::collections::VecDeque;

use strafe_kinematics::{ModulePosition, NUM_MODULES, Pose, SwerveDrive};
use tracing::{debug, warn};

use crate::config::EstimatorConfig;

/// An absolute field pose from an external source such as a camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisionMeasurement {
    /// When the pose was observed, on the same clock as the control ticks (s).
    pub timestamp_s: f64,
    /// Observed field pose.
    pub pose: Pose,
    /// Standard deviations `[x m, y m, θ rad]` for this measurement. `None`
    /// uses the configured defaults.
    pub std_devs: Option<[f64; 3]>,
}

/// Why a vision measurement was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisionRejection {
    /// A pose, timestamp or standard deviation was NaN or infinite.
    NonFinite,
    /// A standard deviation was negative.
    NegativeStdDev,
    /// No odometry has been recorded yet.
    NoHistory,
    /// Older than the history window.
    TooOld,
    /// Newer than the latest odometry sample.
    FromFuture,
}

/// Pose estimator for a swerve chassis.
///
/// Heading comes from the gyro plus an offset, translation from integrating
/// module travel. A short timestamped history lets late vision measurements be
/// compared with where the robot thought it was when the image was taken.
#[derive(Debug, Clone)]
pub struct PoseEstimator {
    kinematics: SwerveDrive,
    max_module_speed: f64,
    travel_margin: f64,
    window_s: f64,
    state_variance: [f64; 3],
    vision_std_devs: [f64; 3],

    pose: Pose,
    heading_offset: f64,
    heading_rate: f64,
    baseline: Option<[ModulePosition; NUM_MODULES]>,
    last_gyro: Option<f64>,
    last_timestamp: Option<f64>,
    history: VecDeque<(f64, Pose)>,
    stale: bool,
}

impl PoseEstimator {
    /// Create an estimator at the field origin.
    pub fn new(kinematics: SwerveDrive, max_module_speed: f64, config: &EstimatorConfig) -> Self {
        PoseEstimator {
            kinematics,
            max_module_speed,
            travel_margin: config.travel_margin_m,
            window_s: config.history_window_s,
            state_variance: config.state_std_devs.map(|s| s * s),
            vision_std_devs: config.vision_std_devs,
            pose: Pose::default(),
            heading_offset: 0.0,
            heading_rate: 0.0,
            baseline: None,
            last_gyro: None,
            last_timestamp: None,
            history: VecDeque::new(),
            stale: false,
        }
    }

    /// Re-seed odometry at `pose`.
    ///
    /// The gyro reading and module positions become the new baseline, and the
    /// history is cleared. Non-finite readings leave the baseline unset; it is
    /// then taken from the next good update.
    pub fn reset_pose(&mut self, gyro_heading: f64, positions: &[ModulePosition; NUM_MODULES], pose: Pose) {
        let gyro = if gyro_heading.is_finite() { gyro_heading } else { 0.0 };
        self.heading_offset = Pose::normalize_angle(pose.theta - gyro);
        self.pose = pose;
        self.baseline = positions_finite(positions).then_some(*positions);
        self.last_gyro = gyro_heading.is_finite().then_some(gyro_heading);
        self.last_timestamp = None;
        self.heading_rate = 0.0;
        self.history.clear();
        self.stale = false;
    }

    /// Integrate one telemetry snapshot.
    ///
    /// Non-finite readings hold the pose and set the stale flag. A wheel that
    /// travelled further than the chassis could have in the elapsed time is
    /// taken as an encoder reset: the pose is held and the baseline re-seeded.
    ///
    /// # Returns
    ///
    /// The pose after this update.
    pub fn update(&mut self, timestamp_s: f64, gyro_heading: f64, positions: &[ModulePosition; NUM_MODULES]) -> Pose {
        if !timestamp_s.is_finite() || !gyro_heading.is_finite() || !positions_finite(positions) {
            if !self.stale {
                warn!(timestamp_s, gyro_heading, "Telemetry not finite, holding pose");
            }
            self.stale = true;
            return self.pose;
        }

        let dt = self.last_timestamp.map(|last| timestamp_s - last).filter(|dt| *dt > 0.0);
        let heading = Pose::normalize_angle(gyro_heading + self.heading_offset);
        self.heading_rate = match (self.last_gyro, dt) {
            (Some(last), Some(dt)) => Pose::normalize_angle(gyro_heading - last) / dt,
            _ => 0.0,
        };
        self.last_gyro = Some(gyro_heading);
        self.last_timestamp = Some(timestamp_s);

        let Some(baseline) = self.baseline else {
            self.baseline = Some(*positions);
            self.pose.theta = heading;
            self.stale = false;
            self.record(timestamp_s);
            return self.pose;
        };

        let max_travel = self.max_module_speed * dt.unwrap_or(0.0) + self.travel_margin;
        let mut deltas = [ModulePosition::default(); NUM_MODULES];
        for ((delta, now), before) in deltas.iter_mut().zip(positions.iter()).zip(baseline.iter()) {
            *delta = ModulePosition::new(now.distance_m - before.distance_m, now.angle_rad);
        }
        self.baseline = Some(*positions);

        if deltas.iter().any(|d| d.distance_m.abs() > max_travel) {
            warn!(max_travel, "Implausible wheel travel, treating as encoder reset");
            self.stale = true;
            return self.pose;
        }

        let mut twist = self.kinematics.to_twist(&deltas);
        // The gyro is trusted over wheel slip for rotation.
        twist.dtheta = self.pose.heading_error_to(&Pose::new(0.0, 0.0, heading));
        self.pose = self.pose.exp(twist);
        self.pose.theta = heading;
        self.stale = false;
        self.record(timestamp_s);
        self.pose
    }

    fn record(&mut self, timestamp_s: f64) {
        self.history.push_back((timestamp_s, self.pose));
        while let Some(&(t, _)) = self.history.front() {
            if t < timestamp_s - self.window_s {
                self.history.pop_front();
            } else {
                break;
            }
        }
    }

    /// Blend an absolute pose measurement into the estimate.
    ///
    /// The correction is computed against the estimate at the measurement's
    /// own timestamp and applied to every later estimate. Each axis moves by
    /// `q / (q + sqrt(q * r))` of the discrepancy, so a noisier measurement
    /// moves the estimate less.
    ///
    /// # Errors
    ///
    /// Returns the reason when the measurement is discarded. Nothing in the
    /// estimate changes in that case.
    pub fn add_vision_measurement(&mut self, measurement: &VisionMeasurement) -> Result<(), VisionRejection> {
        let result = self.apply_vision(measurement);
        if let Err(reason) = result {
            warn!(?reason, timestamp_s = measurement.timestamp_s, "Vision measurement rejected");
        }
        result
    }

    fn apply_vision(&mut self, measurement: &VisionMeasurement) -> Result<(), VisionRejection> {
        let std_devs = measurement.std_devs.unwrap_or(self.vision_std_devs);
        if !measurement.timestamp_s.is_finite()
            || !measurement.pose.is_finite()
            || std_devs.iter().any(|s| !s.is_finite())
        {
            return Err(VisionRejection::NonFinite);
        }
        if std_devs.iter().any(|s| *s < 0.0) {
            return Err(VisionRejection::NegativeStdDev);
        }

        let (&(oldest, _), &(newest, _)) = match (self.history.front(), self.history.back()) {
            (Some(front), Some(back)) => (front, back),
            _ => return Err(VisionRejection::NoHistory),
        };
        if measurement.timestamp_s > newest {
            return Err(VisionRejection::FromFuture);
        }
        if measurement.timestamp_s < oldest || measurement.timestamp_s < newest - self.window_s {
            return Err(VisionRejection::TooOld);
        }

        let then = self.pose_at(measurement.timestamp_s);
        let gains = vision_gains(&self.state_variance, &std_devs);
        let dx = gains[0] * (measurement.pose.x - then.x);
        let dy = gains[1] * (measurement.pose.y - then.y);
        let dtheta = gains[2] * then.heading_error_to(&measurement.pose);

        for (t, pose) in self.history.iter_mut() {
            if *t >= measurement.timestamp_s {
                *pose = shifted(pose, dx, dy, dtheta);
            }
        }
        self.pose = shifted(&self.pose, dx, dy, dtheta);
        self.heading_offset = Pose::normalize_angle(self.heading_offset + dtheta);
        debug!(dx, dy, dtheta, "Vision correction applied");
        Ok(())
    }

    /// Interpolated estimate at `timestamp_s`, clamped to the history.
    fn pose_at(&self, timestamp_s: f64) -> Pose {
        let next = self.history.partition_point(|(t, _)| *t <= timestamp_s);
        match (next.checked_sub(1).and_then(|i| self.history.get(i)), self.history.get(next)) {
            (Some((t0, p0)), Some((t1, p1))) => p0.interpolate(p1, (timestamp_s - t0) / (t1 - t0)),
            (Some((_, p)), None) | (None, Some((_, p))) => *p,
            (None, None) => self.pose,
        }
    }

    /// Current estimated field pose.
    pub fn pose(&self) -> Pose {
        self.pose
    }

    /// Heading rate from the last two gyro readings (rad/s).
    pub fn heading_rate(&self) -> f64 {
        self.heading_rate
    }

    /// Whether the last update was rejected.
    pub fn is_stale(&self) -> bool {
        self.stale
    }
}

fn positions_finite(positions: &[ModulePosition; NUM_MODULES]) -> bool {
    positions.iter().all(|p| p.distance_m.is_finite() && p.angle_rad.is_finite())
}

fn shifted(pose: &Pose, dx: f64, dy: f64, dtheta: f64) -> Pose {
    Pose::new(pose.x + dx, pose.y + dy, Pose::normalize_angle(pose.theta + dtheta))
}

/// Per-axis fraction of a vision discrepancy to accept.
fn vision_gains(state_variance: &[f64; 3], vision_std_devs: &[f64; 3]) -> [f64; 3] {
    let mut gains = [0.0; 3];
    for ((gain, q), std) in gains.iter_mut().zip(state_variance.iter()).zip(vision_std_devs.iter()) {
        let r = std * std;
        if *q > 0.0 {
            *gain = q / (q + (q * r).sqrt());
        }
    }
    gains
}
