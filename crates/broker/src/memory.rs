//! In-process broker for tests and single-process deployments.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::broker::{Broker, Subscription};
use crate::delivery::{Acknowledger, Delivery, MessageProperties};
use crate::error::{BrokerError, Result};

#[derive(Debug, Clone)]
struct Message {
    payload: Vec<u8>,
    properties: MessageProperties,
    redelivered: bool,
    /// Set from the expiration property at publish; kept across requeues.
    expires_at: Option<Instant>,
}

impl Message {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

struct Queue {
    messages: VecDeque<Message>,
    exclusive: bool,
    /// Wakes consumers on publish, requeue and deletion.
    notify: Arc<Notify>,
}

impl Queue {
    fn new(exclusive: bool) -> Self {
        Self {
            messages: VecDeque::new(),
            exclusive,
            notify: Arc::new(Notify::new()),
        }
    }
}

struct Unacked {
    queue: String,
    consumer: u64,
    message: Message,
}

enum Take {
    Message(u64, Message),
    Empty,
    Gone,
    Disconnected,
}

struct BrokerState {
    queues: HashMap<String, Queue>,
    unacked: HashMap<u64, Unacked>,
    next_delivery_tag: u64,
    next_consumer: u64,
    next_queue: u64,
    published: u64,
    dropped: u64,
    expired: u64,
    connected: bool,
    fail_on_publish: bool,
    fail_on_declare: bool,
}

impl Default for BrokerState {
    fn default() -> Self {
        Self {
            queues: HashMap::new(),
            unacked: HashMap::new(),
            next_delivery_tag: 0,
            next_consumer: 0,
            next_queue: 0,
            published: 0,
            dropped: 0,
            expired: 0,
            connected: true,
            fail_on_publish: false,
            fail_on_declare: false,
        }
    }
}

impl BrokerState {
    fn ensure_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(BrokerError::Unavailable("connection closed".to_string()))
        }
    }

    fn take_next(&mut self, queue: &str, consumer: u64, notify: &Arc<Notify>) -> Take {
        if !self.connected {
            return Take::Disconnected;
        }
        let Some(q) = self.queues.get_mut(queue) else {
            return Take::Gone;
        };
        // A queue re-declared under the same name is a different queue.
        if !Arc::ptr_eq(&q.notify, notify) {
            return Take::Gone;
        }

        let now = Instant::now();
        let mut expired = 0;
        let message = loop {
            match q.messages.pop_front() {
                Some(message) if message.is_expired(now) => expired += 1,
                Some(message) => break Some(message),
                None => break None,
            }
        };
        if expired > 0 {
            self.expired += expired;
            tracing::debug!(queue, expired, "expired messages discarded");
        }
        let Some(message) = message else {
            return Take::Empty;
        };

        self.next_delivery_tag += 1;
        let tag = self.next_delivery_tag;
        self.unacked.insert(
            tag,
            Unacked {
                queue: queue.to_string(),
                consumer,
                message: message.clone(),
            },
        );
        Take::Message(tag, message)
    }

    fn requeue(&mut self, queue: &str, mut message: Message) {
        match self.queues.get_mut(queue) {
            Some(q) => {
                message.redelivered = true;
                q.messages.push_front(message);
                q.notify.notify_waiters();
            }
            None => {
                self.dropped += 1;
                tracing::debug!(queue, "requeue target gone, message dropped");
            }
        }
    }
}

fn lock(state: &Mutex<BrokerState>) -> MutexGuard<'_, BrokerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Broker that keeps its queues in process memory.
///
/// Behaves like a single RabbitMQ node seen through the default exchange:
/// - competing consumers on a queue, each message handed to one of them
/// - unacked deliveries return to the head of their queue, flagged as
///   redelivered, when rejected with requeue or when their subscription is
///   dropped
/// - messages published to a missing queue are dropped
/// - deleting a queue ends every subscription attached to it
/// - a message whose expiration passes while it waits in its queue is
///   discarded instead of delivered
///
/// Clones share the same queues.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl InMemoryBroker {
    /// Creates a broker with no queues.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent publish fail until reset.
    pub fn set_fail_on_publish(&self, fail: bool) {
        lock(&self.state).fail_on_publish = fail;
    }

    /// Makes every subsequent queue declaration fail until reset.
    pub fn set_fail_on_declare(&self, fail: bool) {
        lock(&self.state).fail_on_declare = fail;
    }

    /// Simulates losing (or regaining) the connection.
    ///
    /// While disconnected every operation fails with
    /// [`BrokerError::Unavailable`] and waiting subscriptions return that error.
    pub fn set_connected(&self, connected: bool) {
        let mut state = lock(&self.state);
        state.connected = connected;
        for queue in state.queues.values() {
            queue.notify.notify_waiters();
        }
    }

    /// Returns true if the queue currently exists.
    pub fn queue_exists(&self, name: &str) -> bool {
        lock(&self.state).queues.contains_key(name)
    }

    /// Returns the names of all existing queues, sorted.
    pub fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.state).queues.keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the number of exclusive queues still allocated.
    pub fn exclusive_queue_count(&self) -> usize {
        lock(&self.state)
            .queues
            .values()
            .filter(|q| q.exclusive)
            .count()
    }

    /// Returns the number of messages ready for delivery on a queue.
    pub fn message_count(&self, queue: &str) -> usize {
        lock(&self.state)
            .queues
            .get(queue)
            .map(|q| q.messages.len())
            .unwrap_or(0)
    }

    /// Returns the number of deliveries awaiting ack or nack.
    pub fn unacked_count(&self) -> usize {
        lock(&self.state).unacked.len()
    }

    /// Returns the number of messages accepted for publishing.
    pub fn published_count(&self) -> u64 {
        lock(&self.state).published
    }

    /// Returns the number of messages dropped for lack of a target queue.
    pub fn dropped_count(&self) -> u64 {
        lock(&self.state).dropped
    }

    /// Returns the number of messages discarded because they expired.
    pub fn expired_count(&self) -> u64 {
        lock(&self.state).expired
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn declare_queue(&self, name: &str) -> Result<()> {
        let mut state = lock(&self.state);
        state.ensure_connected()?;
        if state.fail_on_declare {
            return Err(BrokerError::Unavailable(format!(
                "declare of queue '{name}' refused"
            )));
        }
        state
            .queues
            .entry(name.to_string())
            .or_insert_with(|| Queue::new(false));
        Ok(())
    }

    async fn declare_exclusive_queue(&self) -> Result<String> {
        let mut state = lock(&self.state);
        state.ensure_connected()?;
        if state.fail_on_declare {
            return Err(BrokerError::Unavailable(
                "declare of exclusive queue refused".to_string(),
            ));
        }
        state.next_queue += 1;
        let name = format!("amq.gen-{:08}", state.next_queue);
        state.queues.insert(name.clone(), Queue::new(true));
        Ok(name)
    }

    async fn publish(
        &self,
        queue: &str,
        payload: Vec<u8>,
        properties: MessageProperties,
    ) -> Result<()> {
        let mut state = lock(&self.state);
        state.ensure_connected()?;
        if state.fail_on_publish {
            return Err(BrokerError::Unavailable(format!(
                "publish to '{queue}' refused"
            )));
        }
        state.published += 1;

        match state.queues.get_mut(queue) {
            Some(q) => {
                let expires_at = properties.expiration.map(|ttl| Instant::now() + ttl);
                q.messages.push_back(Message {
                    payload,
                    properties,
                    redelivered: false,
                    expires_at,
                });
                q.notify.notify_waiters();
            }
            None => {
                state.dropped += 1;
                tracing::debug!(queue, "no such queue, message dropped");
            }
        }
        Ok(())
    }

    async fn consume(&self, queue: &str) -> Result<Box<dyn Subscription>> {
        let mut state = lock(&self.state);
        state.ensure_connected()?;
        let notify = state
            .queues
            .get(queue)
            .map(|q| q.notify.clone())
            .ok_or_else(|| BrokerError::QueueNotFound(queue.to_string()))?;
        state.next_consumer += 1;

        Ok(Box::new(MemorySubscription {
            state: self.state.clone(),
            queue: queue.to_string(),
            consumer: state.next_consumer,
            notify,
        }))
    }

    async fn delete_queue(&self, name: &str) -> Result<()> {
        let removed = {
            let mut state = lock(&self.state);
            state.ensure_connected()?;
            state.queues.remove(name)
        };
        if let Some(queue) = removed {
            queue.notify.notify_waiters();
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }
}

struct MemorySubscription {
    state: Arc<Mutex<BrokerState>>,
    queue: String,
    consumer: u64,
    notify: Arc<Notify>,
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn next(&mut self) -> Result<Option<Delivery>> {
        loop {
            // Register interest before looking at the queue so a publish
            // landing between the check and the await is not missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let taken = lock(&self.state).take_next(&self.queue, self.consumer, &self.notify);
            match taken {
                Take::Message(tag, message) => {
                    let acker = MemoryAcker {
                        state: self.state.clone(),
                        tag,
                    };
                    return Ok(Some(Delivery::new(
                        tag,
                        message.payload,
                        message.properties,
                        message.redelivered,
                        Box::new(acker),
                    )));
                }
                Take::Gone => return Ok(None),
                Take::Disconnected => {
                    return Err(BrokerError::Unavailable("connection closed".to_string()));
                }
                Take::Empty => notified.await,
            }
        }
    }
}

impl Drop for MemorySubscription {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        let mut tags: Vec<u64> = state
            .unacked
            .iter()
            .filter(|(_, u)| u.consumer == self.consumer)
            .map(|(tag, _)| *tag)
            .collect();
        // Pushed to the front one by one, so walk newest first to keep order.
        tags.sort_unstable_by(|a, b| b.cmp(a));

        for tag in tags {
            if let Some(unacked) = state.unacked.remove(&tag) {
                state.requeue(&unacked.queue, unacked.message);
            }
        }
    }
}

struct MemoryAcker {
    state: Arc<Mutex<BrokerState>>,
    tag: u64,
}

#[async_trait]
impl Acknowledger for MemoryAcker {
    async fn ack(&self) -> Result<()> {
        lock(&self.state)
            .unacked
            .remove(&self.tag)
            .map(|_| ())
            .ok_or(BrokerError::UnknownDelivery(self.tag))
    }

    async fn nack(&self, requeue: bool) -> Result<()> {
        let mut state = lock(&self.state);
        let unacked = state
            .unacked
            .remove(&self.tag)
            .ok_or(BrokerError::UnknownDelivery(self.tag))?;
        if requeue {
            state.requeue(&unacked.queue, unacked.message);
        }
        Ok(())
    }
}
