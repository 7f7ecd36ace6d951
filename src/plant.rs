use parking_lot::Mutex;
use rand::{Rng, SeedableRng, rngs::StdRng};
use spin_sleep::SpinSleeper;
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};
use tracing::info;

use strafe_kinematics::{ModuleState, NUM_MODULES, Pose};
use strafe_navigation::{ModuleTelemetry, SimulatedSwerve, SwerveIo, VisionMeasurement};

pub type SharedPlant = Arc<Mutex<SimulatedSwerve>>;

/// Drivetrain-side handle onto the plant shared with the physics thread.
pub struct PlantIo {
    plant: SharedPlant,
}

impl PlantIo {
    pub fn new(plant: SharedPlant) -> Self {
        PlantIo { plant }
    }
}

impl SwerveIo for PlantIo {
    fn read_module_telemetry(&self) -> [ModuleTelemetry; NUM_MODULES] {
        self.plant.lock().read_module_telemetry()
    }

    fn read_heading(&self) -> f64 {
        self.plant.lock().read_heading()
    }

    fn read_sensors(&self) -> ([ModuleTelemetry; NUM_MODULES], f64) {
        let plant = self.plant.lock();
        (plant.read_module_telemetry(), plant.read_heading())
    }

    fn apply_module_commands(&mut self, commands: &[ModuleState; NUM_MODULES]) {
        self.plant.lock().apply_module_commands(commands);
    }
}

/// Integrate the plant in real time on its own thread until `running` clears.
pub fn spawn_physics(
    plant: SharedPlant,
    period: Duration,
    running: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new().name("physics".into()).spawn(move || {
        info!("Physics thread started.");
        let sleeper = SpinSleeper::new(10_000);
        let mut last = Instant::now();
        while running.load(Ordering::Relaxed) {
            sleeper.sleep(period);
            let now = Instant::now();
            plant.lock().step((now - last).as_secs_f64());
            last = now;
        }
        info!("Physics thread stopped.");
    })
}

/// A pretend camera: the true pose plus bounded uniform noise.
pub struct VisionSim {
    rng: StdRng,
    noise_m: f64,
    noise_rad: f64,
}

impl VisionSim {
    pub fn new(noise_m: f64, noise_rad: f64) -> Self {
        VisionSim { rng: StdRng::from_os_rng(), noise_m, noise_rad }
    }

    pub fn observe(&mut self, truth: Pose, timestamp_s: f64) -> VisionMeasurement {
        let pose = Pose::new(
            truth.x + self.jitter(self.noise_m),
            truth.y + self.jitter(self.noise_m),
            Pose::normalize_angle(truth.theta + self.jitter(self.noise_rad)),
        );
        VisionMeasurement { timestamp_s, pose, std_devs: None }
    }

    fn jitter(&mut self, half_width: f64) -> f64 {
        if half_width > 0.0 { self.rng.random_range(-half_width..half_width) } else { 0.0 }
    }
}
