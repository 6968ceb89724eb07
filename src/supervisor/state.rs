//! Supervisor state machine
//!
//! `Idle -> Running -> Failed -> Restarting -> Running ...` with `Stopped`
//! reachable from anywhere on shutdown. Transitions are computed by a pure
//! function so the lifecycle can be tested without a broker or timers.

use serde::Serialize;
use std::fmt;
use tracing::{error, info, warn};

/// Lifecycle state of the consumer supervisor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "lowercase")]
pub enum SupervisorState {
    /// Created, not yet started
    Idle,
    /// A consumer session is live
    Running,
    /// The last session or connection attempt failed
    Failed(String),
    /// Waiting out the backoff before reconnect attempt `n`
    Restarting(u32),
    /// Shut down on request; absorbing
    Stopped,
}

impl SupervisorState {
    pub fn label(&self) -> &'static str {
        match self {
            SupervisorState::Idle => "idle",
            SupervisorState::Running => "running",
            SupervisorState::Failed(_) => "failed",
            SupervisorState::Restarting(_) => "restarting",
            SupervisorState::Stopped => "stopped",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, SupervisorState::Running)
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupervisorState::Failed(reason) => write!(f, "failed ({reason})"),
            SupervisorState::Restarting(attempt) => write!(f, "restarting (attempt {attempt})"),
            other => f.write_str(other.label()),
        }
    }
}

/// Something that happened to the supervised consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    SessionEstablished,
    SessionLost(String),
    ConnectFailed(String),
    BackoffStarted(u32),
    ShutdownRequested,
}

/// Compute the state after `event` (pure apart from logging)
///
/// Events that make no sense in the current state leave it unchanged.
pub fn next_state(current: &SupervisorState, event: SupervisorEvent) -> SupervisorState {
    use SupervisorEvent as E;
    use SupervisorState as S;

    match (current, event) {
        (S::Stopped, _) => S::Stopped,
        (_, E::ShutdownRequested) => {
            info!("Supervisor stopping on shutdown request");
            S::Stopped
        }
        (S::Idle | S::Restarting(_), E::SessionEstablished) => {
            info!("Consumer session running");
            S::Running
        }
        (S::Idle | S::Restarting(_), E::ConnectFailed(reason)) => {
            error!(reason = %reason, "Broker connection failed");
            S::Failed(reason)
        }
        (S::Running, E::SessionLost(reason)) => {
            error!(reason = %reason, "Consumer session lost");
            S::Failed(reason)
        }
        (S::Failed(_), E::BackoffStarted(attempt)) => {
            info!(attempt, "Scheduling consumer restart");
            S::Restarting(attempt)
        }
        (state, event) => {
            warn!(state = %state, event = ?event, "Ignoring event not valid in current state");
            state.clone()
        }
    }
}

/// Log a state change at a level matching its severity
pub fn log_state_transition(from: &SupervisorState, to: &SupervisorState) {
    if from == to {
        return;
    }
    match to {
        SupervisorState::Failed(_) => {
            warn!(from = from.label(), to = to.label(), "Supervisor state changed")
        }
        _ => info!(from = from.label(), to = to.label(), "Supervisor state changed"),
    }
}
