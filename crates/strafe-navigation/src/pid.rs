//! A single-axis PID loop.

use strafe_kinematics::Pose;

use crate::config::PidConfig;

/// A PID controller with tolerance band, clamped integrator and optional
/// continuous (wrapping) input.
///
/// The controller owns its integrator. Dropping it or calling
/// [`reset`](PidController::reset) is the only way accumulated error goes
/// away, so each motion command builds its own loops.
#[derive(Debug, Clone, PartialEq)]
pub struct PidController {
    kp: f64,
    ki: f64,
    kd: f64,
    tolerance: f64,
    velocity_tolerance: f64,
    integrator_range: f64,
    continuous: bool,

    setpoint: f64,
    position_error: f64,
    velocity_error: f64,
    total_error: f64,
    have_measurement: bool,
}

impl PidController {
    /// Create a controller from its configured gains.
    pub fn new(config: &PidConfig) -> Self {
        PidController {
            kp: config.kp,
            ki: config.ki,
            kd: config.kd,
            tolerance: config.tolerance,
            velocity_tolerance: config.velocity_tolerance,
            integrator_range: config.integrator_range,
            continuous: false,
            setpoint: 0.0,
            position_error: 0.0,
            velocity_error: 0.0,
            total_error: 0.0,
            have_measurement: false,
        }
    }

    /// Create a controller whose input wraps at ±π, for heading loops.
    pub fn new_angular(config: &PidConfig) -> Self {
        PidController {
            continuous: true,
            ..PidController::new(config)
        }
    }

    /// Compute the loop output for one tick.
    ///
    /// # Arguments
    ///
    /// * `measurement`: The current value of the controlled quantity.
    /// * `setpoint`: The value it should reach.
    /// * `dt`: Time since the previous call (s). Non-positive values skip the
    ///   integral and derivative terms for this tick.
    pub fn calculate(&mut self, measurement: f64, setpoint: f64, dt: f64) -> f64 {
        self.setpoint = setpoint;

        let error = if self.continuous {
            Pose::normalize_angle(setpoint - measurement)
        } else {
            setpoint - measurement
        };
        let usable_dt = dt > 0.0 && dt.is_finite();

        // No derivative kick on the first sample.
        self.velocity_error = if self.have_measurement && usable_dt {
            let delta = if self.continuous {
                Pose::normalize_angle(error - self.position_error)
            } else {
                error - self.position_error
            };
            delta / dt
        } else {
            0.0
        };
        self.position_error = error;

        if self.ki != 0.0 && usable_dt {
            let limit = self.integrator_range / self.ki.abs();
            self.total_error = (self.total_error + error * dt).clamp(-limit, limit);
        }
        self.have_measurement = true;

        self.kp * self.position_error + self.ki * self.total_error + self.kd * self.velocity_error
    }

    /// Whether the error and its rate are both inside their tolerance bands.
    ///
    /// Always false before the first [`calculate`](Self::calculate).
    pub fn at_setpoint(&self) -> bool {
        self.have_measurement
            && self.position_error.abs() < self.tolerance
            && self.velocity_error.abs() < self.velocity_tolerance
    }

    /// Clear integrator, errors and the measurement flag.
    pub fn reset(&mut self) {
        self.position_error = 0.0;
        self.velocity_error = 0.0;
        self.total_error = 0.0;
        self.have_measurement = false;
    }

    /// Error from the most recent call.
    pub fn position_error(&self) -> f64 {
        self.position_error
    }

    /// Setpoint from the most recent call.
    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    /// The accumulated integral of the error.
    pub fn integral(&self) -> f64 {
        self.total_error
    }

    /// Whether the input wraps at ±π.
    pub fn is_continuous(&self) -> bool {
        self.continuous
    }
}
