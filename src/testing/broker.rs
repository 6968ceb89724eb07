//! In-memory broker with AMQP-like acknowledgment semantics
//!
//! - queues are FIFO; declaring one twice is a no-op
//! - every delivery stays unacknowledged until acked or requeued
//! - closing or severing a session puts its unacknowledged messages back at
//!   the head of their queue, flagged as redelivered

use crate::error::{ConnectionError, SessionError};
use crate::transport::{ConnectionManager, ConsumerSession, Delivery};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(5);
const WAIT_LIMIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
struct ReadyMessage {
    payload: Vec<u8>,
    redelivered: bool,
}

#[derive(Debug)]
struct Unacked {
    session_id: u64,
    queue: String,
    payload: Vec<u8>,
}

#[derive(Debug, Default)]
struct BrokerState {
    queues: HashMap<String, VecDeque<ReadyMessage>>,
    // Ordered by delivery tag so requeues preserve original order
    unacked: BTreeMap<u64, Unacked>,
    acked: Vec<Vec<u8>>,
    next_tag: u64,
    next_session_id: u64,
    generation: u64,
    active_sessions: HashSet<u64>,
    declarations: u64,
    requeues: u64,
    connect_attempts: u64,
    failing_connects: u32,
    failing_dead_letters: bool,
}

impl BrokerState {
    /// Return one session's in-flight messages to the head of their queues
    fn release(&mut self, session_id: Option<u64>) {
        let tags: Vec<u64> = self
            .unacked
            .iter()
            .filter(|(_, m)| session_id.map_or(true, |id| m.session_id == id))
            .map(|(tag, _)| *tag)
            .collect();

        for tag in tags.into_iter().rev() {
            if let Some(message) = self.unacked.remove(&tag) {
                self.queues
                    .entry(message.queue)
                    .or_default()
                    .push_front(ReadyMessage {
                        payload: message.payload,
                        redelivered: true,
                    });
            }
        }
    }
}

#[derive(Debug, Default)]
struct BrokerInner {
    state: Mutex<BrokerState>,
    notify: Notify,
}

/// Shared handle to an in-memory broker
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    inner: Arc<BrokerInner>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, BrokerState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Connection manager that subscribes to `queue`
    pub fn connection_manager(
        &self,
        queue: &str,
        dead_letter_queue: Option<&str>,
    ) -> InMemoryConnectionManager {
        InMemoryConnectionManager {
            broker: self.clone(),
            queue: queue.to_string(),
            dead_letter_queue: dead_letter_queue.map(str::to_string),
        }
    }

    /// Enqueue a message as a producer would
    pub fn publish(&self, queue: &str, payload: &[u8]) {
        self.state()
            .queues
            .entry(queue.to_string())
            .or_default()
            .push_back(ReadyMessage {
                payload: payload.to_vec(),
                redelivered: false,
            });
        self.inner.notify.notify_waiters();
    }

    /// Drop every live session, as a broker restart or network cut would
    pub fn sever_sessions(&self) {
        {
            let mut state = self.state();
            state.generation += 1;
            state.active_sessions.clear();
            state.release(None);
        }
        self.inner.notify.notify_waiters();
    }

    /// Make the next `count` connection attempts fail
    pub fn fail_next_connects(&self, count: u32) {
        self.state().failing_connects = count;
    }

    /// Make every dead-letter publish fail, as an unconfirmed publish would
    pub fn fail_dead_letters(&self, failing: bool) {
        self.state().failing_dead_letters = failing;
    }

    pub fn ack_count(&self) -> usize {
        self.state().acked.len()
    }

    /// Payloads acknowledged so far, in ack order
    pub fn acked_payloads(&self) -> Vec<Vec<u8>> {
        self.state().acked.clone()
    }

    pub fn requeue_count(&self) -> u64 {
        self.state().requeues
    }

    pub fn declaration_count(&self) -> u64 {
        self.state().declarations
    }

    pub fn queue_count(&self) -> usize {
        self.state().queues.len()
    }

    pub fn has_queue(&self, queue: &str) -> bool {
        self.state().queues.contains_key(queue)
    }

    /// Messages waiting in `queue`, not counting in-flight deliveries
    pub fn ready_count(&self, queue: &str) -> usize {
        self.state().queues.get(queue).map_or(0, VecDeque::len)
    }

    /// Payloads waiting in `queue`, head first
    pub fn messages(&self, queue: &str) -> Vec<Vec<u8>> {
        self.state()
            .queues
            .get(queue)
            .map(|q| q.iter().map(|m| m.payload.clone()).collect())
            .unwrap_or_default()
    }

    pub fn unacked_count(&self) -> usize {
        self.state().unacked.len()
    }

    pub fn connect_attempts(&self) -> u64 {
        self.state().connect_attempts
    }

    pub fn active_sessions(&self) -> usize {
        self.state().active_sessions.len()
    }

    /// Poll until `condition` holds; false if it never did within 5 seconds
    pub async fn wait_until<F>(&self, condition: F) -> bool
    where
        F: Fn(&InMemoryBroker) -> bool,
    {
        let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
        while tokio::time::Instant::now() < deadline {
            if condition(self) {
                return true;
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }
        condition(self)
    }
}

/// Connection manager handing out [`InMemorySession`]s
#[derive(Debug, Clone)]
pub struct InMemoryConnectionManager {
    broker: InMemoryBroker,
    queue: String,
    dead_letter_queue: Option<String>,
}

#[async_trait::async_trait]
impl ConnectionManager for InMemoryConnectionManager {
    type Session = InMemorySession;

    async fn connect(&self) -> Result<InMemorySession, ConnectionError> {
        let mut state = self.broker.state();
        state.connect_attempts += 1;

        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(ConnectionError::Unreachable(
                "connection refused (scripted)".to_string(),
            ));
        }

        for queue in std::iter::once(&self.queue).chain(self.dead_letter_queue.as_ref()) {
            state.queues.entry(queue.clone()).or_default();
            state.declarations += 1;
        }

        state.next_session_id += 1;
        let id = state.next_session_id;
        state.active_sessions.insert(id);

        Ok(InMemorySession {
            broker: self.broker.clone(),
            id,
            generation: state.generation,
            queue: self.queue.clone(),
            dead_letter_queue: self.dead_letter_queue.clone(),
            closed: false,
        })
    }
}

/// Session against an [`InMemoryBroker`]
#[derive(Debug)]
pub struct InMemorySession {
    broker: InMemoryBroker,
    id: u64,
    generation: u64,
    queue: String,
    dead_letter_queue: Option<String>,
    closed: bool,
}

impl InMemorySession {
    fn check_open(&self, state: &BrokerState) -> Result<(), SessionError> {
        if self.closed || state.generation != self.generation {
            return Err(SessionError::ChannelClosed("session severed".to_string()));
        }
        Ok(())
    }

    fn release(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        {
            let mut state = self.broker.state();
            if state.generation == self.generation {
                state.active_sessions.remove(&self.id);
                state.release(Some(self.id));
            }
        }
        self.broker.inner.notify.notify_waiters();
    }
}

#[async_trait::async_trait]
impl ConsumerSession for InMemorySession {
    fn queue_name(&self) -> &str {
        &self.queue
    }

    fn dead_letter_queue(&self) -> Option<&str> {
        self.dead_letter_queue.as_deref()
    }

    async fn next_delivery(&mut self) -> Result<Delivery, SessionError> {
        let inner = Arc::clone(&self.broker.inner);
        loop {
            let notified = inner.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a publish in between is not missed
            notified.as_mut().enable();

            {
                let mut state = self.broker.state();
                self.check_open(&state)?;

                let next = state.queues.get_mut(&self.queue).and_then(VecDeque::pop_front);
                if let Some(message) = next {
                    state.next_tag += 1;
                    let delivery_tag = state.next_tag;
                    state.unacked.insert(
                        delivery_tag,
                        Unacked {
                            session_id: self.id,
                            queue: self.queue.clone(),
                            payload: message.payload.clone(),
                        },
                    );
                    return Ok(Delivery {
                        delivery_tag,
                        payload: message.payload,
                        redelivered: message.redelivered,
                    });
                }
            }

            notified.await;
        }
    }

    async fn ack(&mut self, delivery_tag: u64) -> Result<(), SessionError> {
        let mut state = self.broker.state();
        self.check_open(&state)?;

        match state.unacked.remove(&delivery_tag) {
            Some(message) => {
                state.acked.push(message.payload);
                Ok(())
            }
            None => Err(SessionError::AckFailed {
                delivery_tag,
                reason: "unknown delivery tag".to_string(),
            }),
        }
    }

    async fn requeue(&mut self, delivery_tag: u64) -> Result<(), SessionError> {
        {
            let mut state = self.broker.state();
            self.check_open(&state)?;

            let Some(message) = state.unacked.remove(&delivery_tag) else {
                return Err(SessionError::RequeueFailed {
                    delivery_tag,
                    reason: "unknown delivery tag".to_string(),
                });
            };
            state.requeues += 1;
            state
                .queues
                .entry(message.queue)
                .or_default()
                .push_front(ReadyMessage {
                    payload: message.payload,
                    redelivered: true,
                });
        }
        self.broker.inner.notify.notify_waiters();
        Ok(())
    }

    async fn publish_dead_letter(&mut self, payload: &[u8]) -> Result<(), SessionError> {
        let Some(queue) = self.dead_letter_queue.clone() else {
            return Err(SessionError::DeadLetterFailed {
                queue: String::new(),
                reason: "no dead-letter queue configured".to_string(),
            });
        };

        let mut state = self.broker.state();
        self.check_open(&state)?;
        if state.failing_dead_letters {
            return Err(SessionError::DeadLetterFailed {
                queue,
                reason: "publish not confirmed (scripted)".to_string(),
            });
        }
        state.queues.entry(queue).or_default().push_back(ReadyMessage {
            payload: payload.to_vec(),
            redelivered: false,
        });
        Ok(())
    }

    async fn close(&mut self) {
        self.release();
    }
}

impl Drop for InMemorySession {
    fn drop(&mut self) {
        self.release();
    }
}
