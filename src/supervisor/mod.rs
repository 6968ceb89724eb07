//! Consumer supervisor
//!
//! Owns the connect/consume/restart loop. Each cycle asks the
//! [`ConnectionManager`] for a fresh session, hands it to the
//! [`QueueConsumer`], and on any connection or session error waits out the
//! backoff before trying again. It never gives up; only a shutdown request
//! ends the loop.
//!
//! The current [`SupervisorState`] is published on a `watch` channel for the
//! health endpoint.

pub mod backoff;
pub mod state;

pub use backoff::BackoffConfig;
pub use state::{log_state_transition, next_state, SupervisorEvent, SupervisorState};

use crate::consumer::{shutdown_requested, QueueConsumer};
use crate::error::sanitize_error_message;
use crate::observability::metrics::metrics;
use crate::supervisor_span;
use crate::transport::ConnectionManager;
use std::sync::Mutex;
use tokio::sync::watch;
use tracing::{info, Instrument};

const STATE_HISTORY_LIMIT: usize = 64;

/// Keeps one consumer running against the broker, restarting it on failure
pub struct ConsumerSupervisor<C: ConnectionManager> {
    manager: C,
    consumer: QueueConsumer,
    backoff: BackoffConfig,
    state_tx: watch::Sender<SupervisorState>,
    history: Mutex<Vec<SupervisorState>>,
}

impl<C: ConnectionManager> ConsumerSupervisor<C> {
    pub fn new(manager: C, consumer: QueueConsumer, backoff: BackoffConfig) -> Self {
        let (state_tx, _) = watch::channel(SupervisorState::Idle);
        Self {
            manager,
            consumer,
            backoff,
            state_tx,
            history: Mutex::new(vec![SupervisorState::Idle]),
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state_tx.borrow().clone()
    }

    /// Receiver that observes every state change
    pub fn subscribe(&self) -> watch::Receiver<SupervisorState> {
        self.state_tx.subscribe()
    }

    /// The most recent states, oldest first
    pub fn recent_states(&self) -> Vec<SupervisorState> {
        self.history
            .lock()
            .map(|history| history.clone())
            .unwrap_or_default()
    }

    pub fn consumer(&self) -> &QueueConsumer {
        &self.consumer
    }

    fn apply(&self, event: SupervisorEvent) {
        let current = self.state();
        let next = next_state(&current, event);
        if next == current {
            return;
        }

        log_state_transition(&current, &next);
        metrics().set_supervisor_state(next.label());
        if let Ok(mut history) = self.history.lock() {
            history.push(next.clone());
            if history.len() > STATE_HISTORY_LIMIT {
                history.remove(0);
            }
        }
        self.state_tx.send_replace(next);
    }

    /// Run until `shutdown` flips to `true` (or its sender is dropped)
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut attempt: u32 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let span = supervisor_span!(attempt);
            let stop = self.cycle(&mut shutdown, &mut attempt).instrument(span).await;
            if stop {
                break;
            }
        }

        self.apply(SupervisorEvent::ShutdownRequested);
        info!("Supervisor stopped");
    }

    /// One connect-consume-backoff cycle. Returns true once shutdown has
    /// been requested.
    async fn cycle(&self, shutdown: &mut watch::Receiver<bool>, attempt: &mut u32) -> bool {
        let connected = tokio::select! {
            biased;
            _ = shutdown_requested(shutdown) => return true,
            result = self.manager.connect() => result,
        };

        let failure = match connected {
            Ok(session) => {
                self.apply(SupervisorEvent::SessionEstablished);
                *attempt = 0;
                match self.consumer.run(session, shutdown).await {
                    Ok(()) => return true,
                    Err(e) => {
                        metrics().record_connection_lost();
                        SupervisorEvent::SessionLost(sanitize_error_message(&e.to_string()))
                    }
                }
            }
            Err(e) => SupervisorEvent::ConnectFailed(sanitize_error_message(&e.to_string())),
        };
        self.apply(failure);

        if *shutdown.borrow() {
            return true;
        }

        *attempt = attempt.saturating_add(1);
        metrics().supervisor_restarted();
        self.apply(SupervisorEvent::BackoffStarted(*attempt));

        let delay = self.backoff.delay_for(*attempt);
        info!(attempt = *attempt, delay_ms = delay.as_millis() as u64, "Waiting before reconnect");
        tokio::select! {
            biased;
            _ = shutdown_requested(shutdown) => true,
            _ = tokio::time::sleep(delay) => false,
        }
    }
}
