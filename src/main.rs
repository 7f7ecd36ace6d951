mod blackboard;
mod bus;
mod plant;
mod settings;

use blackboard::{Blackboard, raise_fault, record_tick, snapshot};
use bus::{PoseSample, Topic};
use plant::{PlantIo, SharedPlant, VisionSim};
use settings::{MissionStep, Settings};

use anyhow::Context;
use parking_lot::Mutex;
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};
use strafe_kinematics::Pose;
use strafe_navigation::{CommandHandle, CommandStatus, Drivetrain, NavigationError, SimulatedSwerve};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::{self, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let path = std::env::args().nth(1).unwrap_or_else(|| settings::DEFAULT_CONFIG_PATH.to_string());
    let settings = settings::load_settings(&path).with_context(|| format!("loading {path}"))?;
    settings.drivetrain.validate().context("invalid drivetrain configuration")?;

    info!("Strafe driver started.");
    run(settings).await
}

async fn run(settings: Settings) -> anyhow::Result<()> {
    let plant: SharedPlant = Arc::new(Mutex::new(SimulatedSwerve::from_config(&settings.drivetrain.chassis)?));
    plant.lock().set_pose(settings.simulation.initial_pose);

    let running = Arc::new(AtomicBool::new(true));
    info!("Spawning physics thread...");
    let physics = plant::spawn_physics(
        Arc::clone(&plant),
        Duration::from_secs_f64(settings.simulation.physics_period_s),
        Arc::clone(&running),
    )?;

    let library = settings.path_library()?;
    let io = PlantIo::new(Arc::clone(&plant));
    let mut drivetrain = Drivetrain::new(io, settings.drivetrain, settings.alliance, library)?;
    drivetrain.reset_pose(settings.simulation.initial_pose);

    let bb: Blackboard = Arc::default();
    let pose_topic: Topic<PoseSample> = Topic::new(16);
    let logger = tokio::spawn(pose_logger(pose_topic.clone()));

    let result = tokio::select! {
        res = control_task(&mut drivetrain, &settings, &plant, bb.clone(), pose_topic) => res,
        res = watchdog(bb.clone(), &settings) => res,
    };

    drivetrain.shutdown();
    running.store(false, Ordering::Relaxed);
    if physics.join().is_err() {
        error!("Physics thread panicked.");
    }
    logger.await?;

    let state = snapshot(&bb);
    let truth = plant.lock().pose();
    info!(
        estimate = %state.pose,
        %truth,
        error_m = state.pose.distance_to(&truth),
        ticks = state.ticks,
        faults = ?state.faults,
        "Mission complete."
    );
    result
}

/// Run the mission one step at a time, ticking the drivetrain at its period.
async fn control_task(
    drivetrain: &mut Drivetrain<PlantIo>,
    settings: &Settings,
    plant: &SharedPlant,
    bb: Blackboard,
    pose_topic: Topic<PoseSample>,
) -> anyhow::Result<()> {
    info!("Control task started.");
    let mut tick = tokio::time::interval(Duration::from_secs_f64(settings.drivetrain.period_s));
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut vision = VisionSim::new(settings.simulation.vision_noise_m, settings.simulation.vision_noise_rad);
    let vision_period = settings.simulation.vision_period_s;
    let mut last_vision = f64::NEG_INFINITY;

    let clock = Instant::now();
    let mut steps = settings.mission.iter();
    let mut current: Option<(CommandHandle, &MissionStep, f64)> = None;

    loop {
        tick.tick().await;
        let now = clock.elapsed().as_secs_f64();

        if let Some((handle, step, started)) = current {
            match drivetrain.status(handle) {
                CommandStatus::Running => {
                    if step.timeout_s().is_some_and(|limit| now - started > limit) {
                        warn!(%handle, ?step, "Mission step timed out, cancelling.");
                        drivetrain.cancel(handle);
                    }
                }
                status => {
                    info!(%handle, ?status, "Mission step done.");
                    current = None;
                }
            }
        }

        if current.is_none() {
            match steps.next() {
                Some(step) => match start_step(drivetrain, step) {
                    Ok(handle) => current = Some((handle, step, now)),
                    Err(e) => error!(?step, "Skipping mission step: {}", e),
                },
                None => break,
            }
        }

        let report = drivetrain.periodic(now);
        record_tick(&bb, &report);
        pose_topic.publish(PoseSample { timestamp_s: now, pose: report.pose, stale: report.pose_stale });

        if vision_period > 0.0 && now - last_vision >= vision_period {
            let truth = plant.lock().pose();
            // Rejections are logged by the estimator.
            let _ = drivetrain.add_vision_measurement(&vision.observe(truth, now));
            last_vision = now;
        }
    }

    info!("Control task finished.");
    Ok(())
}

fn start_step(drivetrain: &mut Drivetrain<PlantIo>, step: &MissionStep) -> Result<CommandHandle, NavigationError> {
    match step {
        MissionStep::GoToPoint { x, y, theta, .. } => Ok(drivetrain.go_to_point(Pose::new(*x, *y, *theta))),
        MissionStep::FollowPath { name, .. } => drivetrain.follow_path(name),
    }
}

/// Log the published pose about once a second.
async fn pose_logger(topic: Topic<PoseSample>) {
    let mut rx = topic.subscribe();
    drop(topic);
    let mut next_log = 0.0;
    loop {
        match rx.recv().await {
            Ok(sample) if sample.timestamp_s >= next_log => {
                info!(t = sample.timestamp_s, pose = %sample.pose, stale = sample.stale, "Pose");
                next_log = sample.timestamp_s + 1.0;
            }
            Ok(_) => {}
            Err(RecvError::Lagged(n)) => warn!(skipped = n, "Pose logger lagging."),
            Err(RecvError::Closed) => break,
        }
    }
}

async fn watchdog(bb: Blackboard, settings: &Settings) -> anyhow::Result<()> {
    info!("Watchdog task started.");
    let timeout = Duration::from_millis(settings.watchdog.tick_timeout_ms);
    let mut tick = tokio::time::interval(Duration::from_millis(settings.watchdog.check_period_ms));
    loop {
        tick.tick().await;
        let last_tick_ts = snapshot(&bb).last_tick_ts;
        let age = Instant::now() - last_tick_ts;
        if age > timeout && raise_fault(&bb, "control tick timeout") {
            warn!(?age, "Control tick timeout!");
        }
    }
}
