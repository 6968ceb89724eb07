//! Thread-safe metrics collection system
//!
//! Atomic counters for message outcomes, broker connections and supervisor
//! restarts, plus a bounded window of mail dispatch latencies.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

const MAX_DISPATCH_SAMPLES: usize = 1000;

/// Global metrics collector instance
pub static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

/// Thread-safe metrics collector using atomics and mutexes
pub struct MetricsCollector {
    // Message outcomes
    messages_received: AtomicU64,
    messages_delivered: AtomicU64,
    transient_failures: AtomicU64,
    permanent_failures: AtomicU64,
    decode_failures: AtomicU64,
    acks: AtomicU64,
    requeues: AtomicU64,
    dead_lettered: AtomicU64,

    // Broker connection
    broker_connected: AtomicBool,
    connection_attempts: AtomicU64,
    connections_established: AtomicU64,
    connection_failures: AtomicU64,
    connection_start_time: AtomicU64,

    // Dispatch latency window, milliseconds
    dispatch_times: Mutex<Vec<u64>>,

    // Supervisor lifecycle
    supervisor_state: Mutex<String>,
    state_transitions: AtomicU64,
    restarts: AtomicU64,
    uptime_start: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            messages_received: AtomicU64::new(0),
            messages_delivered: AtomicU64::new(0),
            transient_failures: AtomicU64::new(0),
            permanent_failures: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            acks: AtomicU64::new(0),
            requeues: AtomicU64::new(0),
            dead_lettered: AtomicU64::new(0),
            broker_connected: AtomicBool::new(false),
            connection_attempts: AtomicU64::new(0),
            connections_established: AtomicU64::new(0),
            connection_failures: AtomicU64::new(0),
            connection_start_time: AtomicU64::new(0),
            dispatch_times: Mutex::new(Vec::new()),
            supervisor_state: Mutex::new("idle".to_string()),
            state_transitions: AtomicU64::new(0),
            restarts: AtomicU64::new(0),
            uptime_start: AtomicU64::new(current_timestamp()),
        }
    }

    // Message metrics
    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_delivered(&self) {
        self.messages_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_transient_failure(&self) {
        self.transient_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_permanent_failure(&self) {
        self.permanent_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_decode_failed(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_acked(&self) {
        self.acks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_requeued(&self) {
        self.requeues.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_dead_lettered(&self) {
        self.dead_lettered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatch_time(&self, elapsed_ms: u64) {
        if let Ok(mut times) = self.dispatch_times.lock() {
            times.push(elapsed_ms);
            if times.len() > MAX_DISPATCH_SAMPLES {
                times.remove(0);
            }
        }
    }

    // Broker metrics
    pub fn record_connection_attempt(&self) {
        self.connection_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_established(&self) {
        self.connections_established.fetch_add(1, Ordering::Relaxed);
        self.broker_connected.store(true, Ordering::Relaxed);
        self.connection_start_time
            .store(current_timestamp(), Ordering::Relaxed);
    }

    pub fn record_connection_failure(&self) {
        self.connection_failures.fetch_add(1, Ordering::Relaxed);
        self.broker_connected.store(false, Ordering::Relaxed);
        self.connection_start_time.store(0, Ordering::Relaxed);
    }

    pub fn record_connection_lost(&self) {
        self.broker_connected.store(false, Ordering::Relaxed);
        self.connection_start_time.store(0, Ordering::Relaxed);
    }

    // Supervisor metrics
    pub fn set_supervisor_state(&self, state: &str) {
        if let Ok(mut current) = self.supervisor_state.lock() {
            if *current != state {
                self.state_transitions.fetch_add(1, Ordering::Relaxed);
                *current = state.to_string();
            }
        }
    }

    pub fn supervisor_restarted(&self) {
        self.restarts.fetch_add(1, Ordering::Relaxed);
    }

    // Reset all metrics (useful for testing)
    pub fn reset(&self) {
        for counter in [
            &self.messages_received,
            &self.messages_delivered,
            &self.transient_failures,
            &self.permanent_failures,
            &self.decode_failures,
            &self.acks,
            &self.requeues,
            &self.dead_lettered,
            &self.connection_attempts,
            &self.connections_established,
            &self.connection_failures,
            &self.connection_start_time,
            &self.state_transitions,
            &self.restarts,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.broker_connected.store(false, Ordering::Relaxed);
        self.uptime_start
            .store(current_timestamp(), Ordering::Relaxed);
        if let Ok(mut times) = self.dispatch_times.lock() {
            times.clear();
        }
        if let Ok(mut state) = self.supervisor_state.lock() {
            *state = "idle".to_string();
        }
    }

    /// Dispatch latency statistics: (avg, p50, p95, p99)
    fn dispatch_time_statistics(&self) -> (f64, f64, f64, f64) {
        let Ok(times) = self.dispatch_times.lock() else {
            return (0.0, 0.0, 0.0, 0.0);
        };
        if times.is_empty() {
            return (0.0, 0.0, 0.0, 0.0);
        }

        let mut sorted = times.clone();
        sorted.sort_unstable();
        let avg = sorted.iter().sum::<u64>() as f64 / sorted.len() as f64;

        (
            avg,
            percentile(&sorted, 50.0),
            percentile(&sorted, 95.0),
            percentile(&sorted, 99.0),
        )
    }

    fn connection_duration(&self, now: u64) -> u64 {
        if !self.broker_connected.load(Ordering::Relaxed) {
            return 0;
        }
        let start = self.connection_start_time.load(Ordering::Relaxed);
        if start > 0 {
            now.saturating_sub(start)
        } else {
            0
        }
    }

    /// Get complete metrics snapshot
    pub fn get_metrics(&self) -> MetricsSnapshot {
        let now = current_timestamp();
        let (avg, p50, p95, p99) = self.dispatch_time_statistics();
        let current_state = self
            .supervisor_state
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|_| "unknown".to_string());

        MetricsSnapshot {
            messages: MessageMetrics {
                received: self.messages_received.load(Ordering::Relaxed),
                delivered: self.messages_delivered.load(Ordering::Relaxed),
                transient_failures: self.transient_failures.load(Ordering::Relaxed),
                permanent_failures: self.permanent_failures.load(Ordering::Relaxed),
                decode_failures: self.decode_failures.load(Ordering::Relaxed),
                acks: self.acks.load(Ordering::Relaxed),
                requeues: self.requeues.load(Ordering::Relaxed),
                dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
                avg_dispatch_time_ms: avg,
                dispatch_time_p50_ms: p50,
                dispatch_time_p95_ms: p95,
                dispatch_time_p99_ms: p99,
            },
            broker: BrokerMetrics {
                connected: self.broker_connected.load(Ordering::Relaxed),
                connection_attempts: self.connection_attempts.load(Ordering::Relaxed),
                connections_established: self.connections_established.load(Ordering::Relaxed),
                connection_failures: self.connection_failures.load(Ordering::Relaxed),
                connection_duration_seconds: self.connection_duration(now),
            },
            supervisor: SupervisorMetrics {
                current_state,
                state_transitions: self.state_transitions.load(Ordering::Relaxed),
                restarts: self.restarts.load(Ordering::Relaxed),
                uptime_seconds: now.saturating_sub(self.uptime_start.load(Ordering::Relaxed)),
            },
            timestamp: now,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub messages: MessageMetrics,
    pub broker: BrokerMetrics,
    pub supervisor: SupervisorMetrics,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageMetrics {
    pub received: u64,
    pub delivered: u64,
    pub transient_failures: u64,
    pub permanent_failures: u64,
    pub decode_failures: u64,
    pub acks: u64,
    pub requeues: u64,
    pub dead_lettered: u64,
    pub avg_dispatch_time_ms: f64,
    pub dispatch_time_p50_ms: f64,
    pub dispatch_time_p95_ms: f64,
    pub dispatch_time_p99_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BrokerMetrics {
    pub connected: bool,
    pub connection_attempts: u64,
    pub connections_established: u64,
    pub connection_failures: u64,
    pub connection_duration_seconds: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SupervisorMetrics {
    pub current_state: String,
    pub state_transitions: u64,
    pub restarts: u64,
    pub uptime_seconds: u64,
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn percentile(sorted_data: &[u64], percentile: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }

    let index = (percentile / 100.0) * (sorted_data.len() - 1) as f64;
    let lower = sorted_data[index.floor() as usize] as f64;
    let upper = sorted_data[index.ceil() as usize] as f64;

    lower + (upper - lower) * index.fract()
}
