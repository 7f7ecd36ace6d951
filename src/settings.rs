use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use tracing::{error, info};

use strafe_kinematics::Pose;
use strafe_navigation::{Alliance, DrivetrainConfig, NavigationError, PathLibrary, Trajectory};

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Everything the driver reads at start-up.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub drivetrain: DrivetrainConfig,
    /// Alliance reported to the drivetrain. Absent means not yet known.
    pub alliance: Option<Alliance>,
    pub simulation: SimulationSettings,
    pub watchdog: WatchdogSettings,
    pub paths: Vec<PathSettings>,
    pub mission: Vec<MissionStep>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    /// Where the simulated robot starts, and what the estimator is seeded with.
    pub initial_pose: Pose,
    /// Physics integration period (s).
    pub physics_period_s: f64,
    /// How often a simulated camera reports a pose (s). Zero disables vision.
    pub vision_period_s: f64,
    /// Half-width of the uniform translation noise on vision poses (m).
    pub vision_noise_m: f64,
    /// Half-width of the uniform heading noise on vision poses (rad).
    pub vision_noise_rad: f64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        SimulationSettings {
            initial_pose: Pose::default(),
            physics_period_s: 0.005,
            vision_period_s: 0.1,
            vision_noise_m: 0.05,
            vision_noise_rad: 0.02,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatchdogSettings {
    pub check_period_ms: u64,
    /// Raise a fault if no control tick completes within this long.
    pub tick_timeout_ms: u64,
}

impl Default for WatchdogSettings {
    fn default() -> Self {
        WatchdogSettings { check_period_ms: 25, tick_timeout_ms: 100 }
    }
}

/// A named path given as timestamped waypoints.
#[derive(Debug, Clone, Deserialize)]
pub struct PathSettings {
    pub name: String,
    pub waypoints: Vec<Waypoint>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Waypoint {
    pub time_s: f64,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub theta: f64,
}

/// One step of the demo mission, run in order.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MissionStep {
    GoToPoint {
        x: f64,
        y: f64,
        #[serde(default)]
        theta: f64,
        /// Cancel the step if it runs longer than this (s).
        timeout_s: Option<f64>,
    },
    FollowPath {
        name: String,
        timeout_s: Option<f64>,
    },
}

impl MissionStep {
    pub fn timeout_s(&self) -> Option<f64> {
        match self {
            MissionStep::GoToPoint { timeout_s, .. } | MissionStep::FollowPath { timeout_s, .. } => *timeout_s,
        }
    }
}

impl Settings {
    /// Build the in-memory path table from the configured waypoints.
    pub fn path_library(&self) -> Result<PathLibrary, NavigationError> {
        let mut library = PathLibrary::new();
        for path in &self.paths {
            let waypoints: Vec<(f64, Pose)> = path
                .waypoints
                .iter()
                .map(|w| (w.time_s, Pose::new(w.x, w.y, w.theta)))
                .collect();
            let trajectory = Trajectory::from_timed_poses(&waypoints)?;
            info!(name = %path.name, duration = trajectory.total_time(), "Loaded path");
            library.insert(path.name.clone(), trajectory);
        }
        Ok(library)
    }
}

/// Load settings from `path`, then apply `STRAFE__SECTION__KEY` environment
/// overrides.
pub fn load_settings(path: &str) -> Result<Settings, ConfigError> {
    info!("Attempting to load configuration from {}", path);

    let settings = Config::builder()
        .add_source(File::new(path, FileFormat::Toml).required(true))
        .add_source(Environment::with_prefix("STRAFE").prefix_separator("__").separator("__").try_parsing(true))
        .build()
        .and_then(|config| config.try_deserialize::<Settings>());

    match settings {
        Ok(settings) => {
            info!(
                paths = settings.paths.len(),
                steps = settings.mission.len(),
                alliance = ?settings.alliance,
                "Successfully loaded configuration"
            );
            Ok(settings)
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            Err(e)
        }
    }
}
