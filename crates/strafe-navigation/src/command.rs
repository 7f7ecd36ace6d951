//! Motion command handles and the state machine that owns the active command.

use std::collections::VecDeque;
use std::fmt;

use crate::follower::PathFollower;
use crate::point::PointConvergence;

/// Identifies one motion command for polling and cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandHandle(u64);

impl CommandHandle {
    pub(crate) fn new(id: u64) -> Self {
        CommandHandle(id)
    }

    /// Numeric id, unique per drivetrain.
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CommandHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a command is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    /// Currently driving the chassis.
    Running,
    /// Reached its target or the end of its path.
    Finished,
    /// Stopped by `cancel` or `shutdown`.
    Cancelled,
    /// Replaced by a newer command before finishing.
    Superseded,
    /// Never issued, or too old to still be remembered.
    Unknown,
}

/// Coarse view of [`MotionState`], for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionMode {
    /// No command; the chassis is held still.
    Idle,
    /// Driving to a pose.
    Converging,
    /// Following a trajectory.
    Following,
    /// A command was just cancelled; one stop tick is pending.
    Cancelling,
}

/// The single owner of chassis actuation.
#[derive(Debug)]
pub enum MotionState {
    /// Nothing running.
    Idle,
    /// A point-convergence command.
    Converging {
        /// Handle given to the caller.
        handle: CommandHandle,
        /// The controller and its loop state.
        controller: PointConvergence,
    },
    /// A path-follow command.
    Following {
        /// Handle given to the caller.
        handle: CommandHandle,
        /// The follower and its loop state.
        follower: Box<PathFollower>,
    },
    /// Controller already released; next tick stops the chassis.
    Cancelling {
        /// Handle of the cancelled command.
        handle: CommandHandle,
    },
}

impl MotionState {
    /// Handle of the command that owns actuation, if any.
    pub fn handle(&self) -> Option<CommandHandle> {
        match self {
            MotionState::Idle => None,
            MotionState::Converging { handle, .. }
            | MotionState::Following { handle, .. }
            | MotionState::Cancelling { handle } => Some(*handle),
        }
    }

    /// The state without its payload.
    pub fn mode(&self) -> MotionMode {
        match self {
            MotionState::Idle => MotionMode::Idle,
            MotionState::Converging { .. } => MotionMode::Converging,
            MotionState::Following { .. } => MotionMode::Following,
            MotionState::Cancelling { .. } => MotionMode::Cancelling,
        }
    }

    /// Release any loop state held by the active controller.
    pub(crate) fn release(&mut self) {
        match self {
            MotionState::Converging { controller, .. } => controller.release(),
            MotionState::Following { follower, .. } => follower.release(),
            MotionState::Idle | MotionState::Cancelling { .. } => {}
        }
    }
}

/// Bounded memory of how past commands ended.
#[derive(Debug, Clone)]
pub(crate) struct CommandLog {
    outcomes: VecDeque<(CommandHandle, CommandStatus)>,
    capacity: usize,
}

impl CommandLog {
    pub(crate) fn new(capacity: usize) -> Self {
        CommandLog { outcomes: VecDeque::with_capacity(capacity), capacity }
    }

    pub(crate) fn record(&mut self, handle: CommandHandle, status: CommandStatus) {
        if self.outcomes.len() == self.capacity {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back((handle, status));
    }

    pub(crate) fn get(&self, handle: CommandHandle) -> Option<CommandStatus> {
        self.outcomes.iter().rev().find(|(h, _)| *h == handle).map(|(_, s)| *s)
    }
}
