use parking_lot::RwLock;
use std::{sync::Arc, time::Instant};

use strafe_kinematics::Pose;
use strafe_navigation::{MotionMode, TickReport};

/// Latest driver state, shared between the control task and the watchdog.
#[derive(Clone, Debug)]
pub struct State {
    pub pose: Pose,
    pub pose_stale: bool,
    pub mode: MotionMode,
    pub ticks: u64,
    pub last_tick_ts: Instant,
    pub faults: Vec<String>,
}

impl Default for State {
    fn default() -> Self {
        State {
            pose: Pose::default(),
            pose_stale: false,
            mode: MotionMode::Idle,
            ticks: 0,
            last_tick_ts: Instant::now(),
            faults: Vec::new(),
        }
    }
}

pub type Blackboard = Arc<RwLock<State>>;

pub fn snapshot(bb: &Blackboard) -> State {
    (*bb.read()).clone()
}

/// Record a completed control tick.
pub fn record_tick(bb: &Blackboard, report: &TickReport) {
    let mut g = bb.write();
    g.pose = report.pose;
    g.pose_stale = report.pose_stale;
    g.mode = report.mode;
    g.ticks += 1;
    g.last_tick_ts = Instant::now();
}

/// Add `msg` to the fault list unless it is already there.
pub fn raise_fault(bb: &Blackboard, msg: &str) -> bool {
    let mut g = bb.write();
    if g.faults.iter().any(|s| s == msg) {
        return false;
    }
    g.faults.push(msg.to_string());
    true
}
