//! Time-indexed holonomic trajectories and the sources that resolve them by name.

use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use strafe_kinematics::{ChassisSpeeds, Pose};

use crate::error::NavigationError;
use crate::mirror::FieldMirror;

/// One sample of a trajectory: where the robot should be at `time_s`, and how
/// fast it should be moving there. Everything is in the field frame.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrajectoryState {
    /// Time since the start of the trajectory (s).
    pub time_s: f64,
    /// Desired field pose.
    pub pose: Pose,
    /// Field-frame x velocity (m/s).
    pub vx_mps: f64,
    /// Field-frame y velocity (m/s).
    pub vy_mps: f64,
    /// Angular velocity (rad/s).
    pub omega_radps: f64,
}

impl TrajectoryState {
    /// The feedforward velocity of this sample.
    pub fn field_speeds(&self) -> ChassisSpeeds {
        ChassisSpeeds::field_relative(self.vx_mps, self.vy_mps, self.omega_radps)
    }

    fn is_finite(&self) -> bool {
        self.time_s.is_finite()
            && self.pose.is_finite()
            && self.vx_mps.is_finite()
            && self.vy_mps.is_finite()
            && self.omega_radps.is_finite()
    }

    /// Pose is interpolated; velocity is held from `self`, the segment
    /// velocity of the interval.
    fn interpolate(&self, other: &TrajectoryState, t: f64) -> TrajectoryState {
        TrajectoryState {
            time_s: self.time_s + (other.time_s - self.time_s) * t,
            pose: self.pose.interpolate(&other.pose, t),
            ..*self
        }
    }
}

/// A validated, non-empty sequence of trajectory states with strictly
/// increasing timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    states: Vec<TrajectoryState>,
}

impl Trajectory {
    /// Build a trajectory from explicit samples.
    ///
    /// # Errors
    ///
    /// Returns `NavigationError::InvalidTrajectory` if `states` is empty,
    /// contains a non-finite value, starts before time zero or is not
    /// strictly increasing in time.
    pub fn new(states: Vec<TrajectoryState>) -> Result<Self, NavigationError> {
        validate(&states)?;
        Ok(Trajectory { states })
    }

    /// Build a trajectory from timestamped waypoints.
    ///
    /// The velocity of each state is the finite difference towards the next
    /// one; the last state is at rest.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Trajectory::new`].
    pub fn from_timed_poses(waypoints: &[(f64, Pose)]) -> Result<Self, NavigationError> {
        let mut states: Vec<TrajectoryState> = waypoints
            .iter()
            .map(|&(time_s, pose)| TrajectoryState { time_s, pose, ..TrajectoryState::default() })
            .collect();
        validate(&states)?;

        for i in 0..states.len() - 1 {
            let (here, next) = (states[i], states[i + 1]);
            let dt = next.time_s - here.time_s;
            states[i].vx_mps = (next.pose.x - here.pose.x) / dt;
            states[i].vy_mps = (next.pose.y - here.pose.y) / dt;
            states[i].omega_radps = here.pose.heading_error_to(&next.pose) / dt;
        }
        Trajectory::new(states)
    }

    /// The desired state at `time_s`, clamped to the ends of the trajectory.
    ///
    /// Between samples the pose is interpolated linearly (heading along the
    /// short arc) and the velocity of the earlier sample is held.
    pub fn sample(&self, time_s: f64) -> TrajectoryState {
        let first = &self.states[0];
        let last = &self.states[self.states.len() - 1];
        if !(time_s > first.time_s) {
            return *first;
        }
        if time_s >= last.time_s {
            return *last;
        }

        // First index whose time is past `time_s`; never 0 or len here.
        let next = self.states.partition_point(|s| s.time_s <= time_s);
        let (a, b) = (&self.states[next - 1], &self.states[next]);
        a.interpolate(b, (time_s - a.time_s) / (b.time_s - a.time_s))
    }

    /// Duration of the trajectory (s).
    pub fn total_time(&self) -> f64 {
        self.end_state().time_s
    }

    /// The first sample.
    pub fn initial_state(&self) -> &TrajectoryState {
        &self.states[0]
    }

    /// The last sample.
    pub fn end_state(&self) -> &TrajectoryState {
        &self.states[self.states.len() - 1]
    }

    /// All samples in time order.
    pub fn states(&self) -> &[TrajectoryState] {
        &self.states
    }

    /// The same trajectory reflected for the opposite alliance.
    pub fn mirrored(&self, mirror: &FieldMirror) -> Trajectory {
        Trajectory { states: self.states.iter().map(|s| mirror.state(s)).collect() }
    }

    /// Regenerate the remainder of this trajectory from `current_pose`.
    ///
    /// The new trajectory starts at `current_pose` at time zero, moves in a
    /// straight line to the state this trajectory would have reached at
    /// `from_time_s + rejoin_time_s`, arrives there after `rejoin_time_s`,
    /// and then continues with the remaining original samples shifted in time.
    pub fn replanned(&self, from_time_s: f64, current_pose: Pose, rejoin_time_s: f64) -> Trajectory {
        let rejoin_at = (from_time_s + rejoin_time_s).min(self.total_time());
        let rejoin = self.sample(rejoin_at);

        let start = TrajectoryState {
            time_s: 0.0,
            pose: current_pose,
            vx_mps: (rejoin.pose.x - current_pose.x) / rejoin_time_s,
            vy_mps: (rejoin.pose.y - current_pose.y) / rejoin_time_s,
            omega_radps: current_pose.heading_error_to(&rejoin.pose) / rejoin_time_s,
        };
        let mut states = Vec::with_capacity(self.states.len() + 2);
        states.push(start);
        states.push(TrajectoryState { time_s: rejoin_time_s, ..rejoin });
        states.extend(
            self.states
                .iter()
                .filter(|s| s.time_s > rejoin_at)
                .map(|s| TrajectoryState { time_s: s.time_s - rejoin_at + rejoin_time_s, ..*s }),
        );
        Trajectory { states }
    }
}

fn validate(states: &[TrajectoryState]) -> Result<(), NavigationError> {
    let first = states.first().ok_or(NavigationError::InvalidTrajectory("no states"))?;
    if !(first.time_s >= 0.0) {
        return Err(NavigationError::InvalidTrajectory("starts before time zero"));
    }
    if !states.iter().all(TrajectoryState::is_finite) {
        return Err(NavigationError::InvalidTrajectory("non-finite state"));
    }
    if states.windows(2).any(|w| w[1].time_s <= w[0].time_s) {
        return Err(NavigationError::InvalidTrajectory("timestamps not strictly increasing"));
    }
    Ok(())
}

/// Resolves path names to trajectories.
///
/// Implementations decide where paths come from (files, generators, an
/// in-memory table). Resolution failure must be reported, never papered over
/// with an empty path.
pub trait PathSource {
    /// Look up the trajectory stored under `name`.
    ///
    /// # Errors
    ///
    /// Returns `NavigationError::PathNotFound` if there is no such path.
    fn load(&self, name: &str) -> Result<Trajectory, NavigationError>;
}

/// An in-memory table of named trajectories.
#[derive(Debug, Clone, Default)]
pub struct PathLibrary {
    paths: HashMap<String, Trajectory>,
}

impl PathLibrary {
    /// An empty library.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `trajectory` under `name`, replacing any previous entry.
    pub fn insert(&mut self, name: impl Into<String>, trajectory: Trajectory) {
        self.paths.insert(name.into(), trajectory);
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with_path(mut self, name: impl Into<String>, trajectory: Trajectory) -> Self {
        self.insert(name, trajectory);
        self
    }

    /// Number of stored paths.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Whether the library holds no paths.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl PathSource for PathLibrary {
    fn load(&self, name: &str) -> Result<Trajectory, NavigationError> {
        self.paths
            .get(name)
            .cloned()
            .ok_or_else(|| NavigationError::PathNotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;
    const EPSILON: f64 = 1e-9;

    fn straight_line() -> Trajectory {
        Trajectory::from_timed_poses(&[
            (0.0, Pose::new(0.0, 0.0, 0.0)),
            (1.0, Pose::new(1.0, 0.0, 0.0)),
            (2.0, Pose::new(2.0, 1.0, PI / 2.0)),
        ])
        .unwrap()
    }

    #[test]
    fn test_rejects_malformed_samples() {
        assert!(matches!(Trajectory::new(vec![]), Err(NavigationError::InvalidTrajectory(_))));
        assert!(Trajectory::from_timed_poses(&[(0.0, Pose::default()), (0.0, Pose::default())]).is_err());
        assert!(Trajectory::from_timed_poses(&[(1.0, Pose::default()), (0.5, Pose::default())]).is_err());
        assert!(Trajectory::from_timed_poses(&[(-1.0, Pose::default())]).is_err());
        assert!(Trajectory::from_timed_poses(&[(0.0, Pose::new(f64::NAN, 0.0, 0.0))]).is_err());
    }

    #[test]
    fn test_finite_difference_velocities() {
        let trajectory = straight_line();
        let states = trajectory.states();
        assert!((states[0].vx_mps - 1.0).abs() < EPSILON);
        assert!(states[0].vy_mps.abs() < EPSILON);
        assert!((states[1].vy_mps - 1.0).abs() < EPSILON);
        assert!((states[1].omega_radps - PI / 2.0).abs() < EPSILON);
        // Last state is at rest
        assert!(states[2].field_speeds().is_zero());
        assert!((trajectory.total_time() - 2.0).abs() < EPSILON);
    }

    #[test]
    fn test_sample_clamps_and_interpolates() {
        let trajectory = straight_line();
        assert_eq!(trajectory.sample(-1.0), *trajectory.initial_state());
        assert_eq!(trajectory.sample(5.0), *trajectory.end_state());

        let mid = trajectory.sample(0.5);
        assert!((mid.pose.x - 0.5).abs() < EPSILON);
        assert!((mid.time_s - 0.5).abs() < EPSILON);
        assert!((mid.vx_mps - 1.0).abs() < EPSILON);

        // Exactly on a knot
        let knot = trajectory.sample(1.0);
        assert!((knot.pose.x - 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_sample_heading_takes_short_arc() {
        let trajectory = Trajectory::from_timed_poses(&[
            (0.0, Pose::new(0.0, 0.0, 3.0)),
            (1.0, Pose::new(0.0, 0.0, -3.0)),
        ])
        .unwrap();
        let mid = trajectory.sample(0.5);
        // Halfway between 3.0 and -3.0 through ±π, not through 0
        assert!(mid.pose.theta.abs() > 3.0);
    }

    #[test]
    fn test_replanned_starts_at_pose_and_rejoins() {
        let trajectory = straight_line();
        let current = Pose::new(0.0, 0.5, 0.0);
        let replanned = trajectory.replanned(0.0, current, 0.5);

        let start = replanned.initial_state();
        assert_eq!(start.time_s, 0.0);
        assert_eq!(start.pose, current);

        // At the rejoin time the replanned path is back on the original one.
        let rejoined = replanned.sample(0.5);
        let original = trajectory.sample(0.5);
        assert!(rejoined.pose.distance_to(&original.pose) < EPSILON);

        // The rest is the original shifted in time; total duration unchanged here.
        assert!((replanned.total_time() - trajectory.total_time()).abs() < EPSILON);
        let late = replanned.sample(1.5);
        assert!(late.pose.distance_to(&trajectory.sample(1.5).pose) < EPSILON);
    }

    #[test]
    fn test_replanned_near_end_rejoins_end_state() {
        let trajectory = straight_line();
        let replanned = trajectory.replanned(1.9, Pose::new(1.5, 1.0, 0.0), 0.5);
        assert_eq!(replanned.states().len(), 2);
        assert!((replanned.total_time() - 0.5).abs() < EPSILON);
        assert_eq!(replanned.end_state().pose, trajectory.end_state().pose);
    }

    #[test]
    fn test_mirrored_trajectory_reflects_samples() {
        let mirror = FieldMirror::default();
        let trajectory = Trajectory::from_timed_poses(&[
            (0.0, Pose::new(1.0, 2.0, 0.0)),
            (1.0, Pose::new(2.0, 2.0, 0.0)),
        ])
        .unwrap();
        let mirrored = trajectory.mirrored(&mirror);
        let start = mirrored.sample(0.0);
        assert!((start.pose.x - 1.0).abs() < EPSILON);
        assert!((start.pose.y - (mirror.field_width_m - 2.0)).abs() < EPSILON);
        let back = mirrored.mirrored(&mirror);
        for (a, b) in back.states().iter().zip(trajectory.states()) {
            assert!(a.pose.distance_to(&b.pose) < EPSILON);
        }
    }

    #[test]
    fn test_library_lookup() {
        let library = PathLibrary::new().with_path("Straight", straight_line());
        assert_eq!(library.len(), 1);
        assert!(library.load("Straight").is_ok());
        assert_eq!(
            library.load("Missing"),
            Err(NavigationError::PathNotFound("Missing".to_string()))
        );
    }
}
