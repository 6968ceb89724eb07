//! Health check HTTP server for container orchestration
//!
//! Reports the supervisor state for liveness and readiness probes and
//! exposes the metrics snapshot. The pipeline is ready only while a consumer
//! session is running.

use crate::observability::metrics::metrics;
use crate::supervisor::SupervisorState;
use serde::Serialize;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::watch;
use warp::http::StatusCode;
use warp::Filter;

/// HTTP health check server
pub struct HealthServer {
    port: u16,
    queue: String,
    state: watch::Receiver<SupervisorState>,
}

impl HealthServer {
    pub fn new(port: u16, queue: String, state: watch::Receiver<SupervisorState>) -> Self {
        Self { port, queue, state }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// All routes, without binding a socket
    pub fn routes(
        &self,
    ) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
        let health_state = self.state.clone();
        let ready_state = self.state.clone();
        let live_state = self.state.clone();
        let queue = self.queue.clone();

        // GET /health - supervisor state plus broker connectivity
        let health_route = warp::path("health")
            .and(warp::path::end())
            .and(warp::get())
            .and_then(move || {
                let status = health_status(&health_state.borrow(), &queue);
                async move {
                    let code = if status.status == "healthy" {
                        StatusCode::OK
                    } else {
                        StatusCode::SERVICE_UNAVAILABLE
                    };
                    Ok::<_, Infallible>(warp::reply::with_status(
                        warp::reply::json(&status),
                        code,
                    ))
                }
            });

        // GET /metrics - full metrics snapshot
        let metrics_route = warp::path("metrics")
            .and(warp::path::end())
            .and(warp::get())
            .map(|| warp::reply::json(&metrics().get_metrics()));

        // GET /ready - ready iff a consumer session is running
        let ready_route = warp::path("ready")
            .and(warp::path::end())
            .and(warp::get())
            .map(move || {
                let state = ready_state.borrow().clone();
                let ready = state.is_running();
                let response = ReadinessResponse {
                    ready,
                    state: state.label(),
                    timestamp: current_timestamp(),
                };
                let code = if ready {
                    StatusCode::OK
                } else {
                    StatusCode::SERVICE_UNAVAILABLE
                };
                warp::reply::with_status(warp::reply::json(&response), code)
            });

        // GET /live - alive until the supervisor has stopped
        let live_route = warp::path("live")
            .and(warp::path::end())
            .and(warp::get())
            .map(move || {
                let alive = *live_state.borrow() != SupervisorState::Stopped;
                let response = LivenessResponse {
                    alive,
                    timestamp: current_timestamp(),
                };
                let code = if alive {
                    StatusCode::OK
                } else {
                    StatusCode::SERVICE_UNAVAILABLE
                };
                warp::reply::with_status(warp::reply::json(&response), code)
            });

        // GET / - endpoint index
        let root_route = warp::path::end().and(warp::get()).map(|| {
            let endpoints = BTreeMap::from([
                ("/health", "Supervisor state and broker connectivity"),
                ("/metrics", "Message, broker and supervisor metrics"),
                ("/ready", "Readiness probe: 200 while consuming"),
                ("/live", "Liveness probe"),
            ]);
            warp::reply::json(&endpoints)
        });

        health_route
            .or(metrics_route)
            .or(ready_route)
            .or(live_route)
            .or(root_route)
    }

    /// Serve until the task is dropped
    pub async fn start(self) {
        let port = self.port;
        let routes = self.routes();
        tracing::info!(port, "Starting health server");
        warp::serve(routes).run(([0, 0, 0, 0], port)).await;
    }
}

/// Build the /health body (pure apart from reading metrics)
fn health_status(state: &SupervisorState, queue: &str) -> HealthStatus {
    let snapshot = metrics().get_metrics();
    let now = current_timestamp();

    let mut checks = BTreeMap::new();
    checks.insert(
        "supervisor",
        HealthCheck {
            status: if state.is_running() { "healthy" } else { "unhealthy" },
            message: Some(state.to_string()),
            last_check: now,
        },
    );
    checks.insert(
        "broker",
        HealthCheck {
            status: if snapshot.broker.connected {
                "healthy"
            } else {
                "unhealthy"
            },
            message: Some(format!(
                "{} connection attempts, {} failures",
                snapshot.broker.connection_attempts, snapshot.broker.connection_failures
            )),
            last_check: now,
        },
    );

    HealthStatus {
        status: if state.is_running() { "healthy" } else { "degraded" },
        timestamp: now,
        queue: queue.to_string(),
        supervisor: state.clone(),
        uptime_seconds: snapshot.supervisor.uptime_seconds,
        checks,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub message: Option<String>,
    pub last_check: u64,
}

#[derive(Debug, Serialize)]
struct HealthStatus {
    status: &'static str,
    timestamp: u64,
    queue: String,
    supervisor: SupervisorState,
    uptime_seconds: u64,
    checks: BTreeMap<&'static str, HealthCheck>,
}

#[derive(Debug, Serialize)]
struct ReadinessResponse {
    ready: bool,
    state: &'static str,
    timestamp: u64,
}

#[derive(Debug, Serialize)]
struct LivenessResponse {
    alive: bool,
    timestamp: u64,
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
