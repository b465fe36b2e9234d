//! # In-Memory Broker
//!
//! Default [`Broker`] for single-process deployments and tests. Each queue
//! is a FIFO buffer paired with a semaphore carrying one permit per ready
//! message; competing consumers block on the semaphore, so closing it is
//! what turns "queue deleted" and "broker closed" into an observable
//! end-of-stream for every waiter.

use crate::broker::{Broker, BrokerError, Subscription, SubscriptionBackend};
use crate::message::{Delivery, DeliveryTag, MessageHeaders};
use crate::queue::{AckMode, QueueSpec};
use crate::ANONYMOUS_QUEUE_PREFIX;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Semaphore, TryAcquireError};
use tracing::{debug, warn};
use uuid::Uuid;

/// One queue: buffered messages, their wakeup semaphore, and ack state.
struct QueueState {
    name: String,
    exclusive: bool,

    /// Ready messages. Invariant: `ready` holds one permit per entry.
    buffer: Mutex<VecDeque<Delivery>>,
    ready: Semaphore,

    /// Deliveries handed out under manual ack and not yet acknowledged.
    unacked: Mutex<HashMap<DeliveryTag, UnackedDelivery>>,

    consumers: AtomicUsize,
    next_tag: AtomicU64,
    next_consumer: AtomicU64,
}

struct UnackedDelivery {
    consumer: u64,
    delivery: Delivery,
}

impl QueueState {
    fn new(name: String, exclusive: bool) -> Self {
        Self {
            name,
            exclusive,
            buffer: Mutex::new(VecDeque::new()),
            ready: Semaphore::new(0),
            unacked: Mutex::new(HashMap::new()),
            consumers: AtomicUsize::new(0),
            next_tag: AtomicU64::new(0),
            next_consumer: AtomicU64::new(0),
        }
    }
}

struct Shared {
    queues: DashMap<String, Arc<QueueState>>,
    closed: AtomicBool,
}

impl Shared {
    fn ensure_open(&self) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::Acquire) {
            Err(BrokerError::Closed)
        } else {
            Ok(())
        }
    }

    fn queue(&self, name: &str) -> Result<Arc<QueueState>, BrokerError> {
        self.queues
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| BrokerError::QueueNotFound(name.to_string()))
    }

    /// Remove a queue only if the map still holds this exact state, so a
    /// stale subscription cannot delete a redeclared namesake.
    fn remove_queue_state(&self, state: &Arc<QueueState>) {
        let removed = self
            .queues
            .remove_if(&state.name, |_, current| Arc::ptr_eq(current, state));
        if removed.is_some() {
            state.ready.close();
            debug!(queue = %state.name, "queue auto-deleted");
        }
    }
}

/// [`Broker`] backed by process memory.
///
/// Queues are unbounded; there is no persistence and no reconnection
/// logic. Fairness between competing consumers follows the semaphore's
/// FIFO wait list.
pub struct InMemoryBroker {
    shared: Arc<Shared>,
}

impl InMemoryBroker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                queues: DashMap::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Number of declared queues.
    #[must_use]
    pub fn queue_count(&self) -> usize {
        self.shared.queues.len()
    }

    /// Ready (not yet received) messages on a queue, if it exists.
    #[must_use]
    pub fn queue_depth(&self, queue: &str) -> Option<usize> {
        self.shared
            .queues
            .get(queue)
            .map(|state| state.buffer.lock().len())
    }

    /// Deliveries handed out under manual ack and not yet acknowledged.
    #[must_use]
    pub fn unacked_count(&self, queue: &str) -> Option<usize> {
        self.shared
            .queues
            .get(queue)
            .map(|state| state.unacked.lock().len())
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn declare_queue(&self, spec: QueueSpec) -> Result<String, BrokerError> {
        self.shared.ensure_open()?;

        let name = match spec.name() {
            Some(name) => name.to_string(),
            None => format!("{ANONYMOUS_QUEUE_PREFIX}{}", Uuid::new_v4().simple()),
        };

        match self.shared.queues.entry(name.clone()) {
            Entry::Occupied(entry) => {
                // Redeclaring a shared queue with the same properties is a
                // no-op; anything else is a conflict.
                if entry.get().exclusive {
                    Err(BrokerError::ExclusiveInUse(name))
                } else if spec.is_exclusive() {
                    Err(BrokerError::DeclareMismatch(name))
                } else {
                    Ok(name)
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(QueueState::new(name.clone(), spec.is_exclusive())));
                debug!(queue = %name, exclusive = spec.is_exclusive(), "queue declared");
                Ok(name)
            }
        }
    }

    async fn publish(
        &self,
        queue: &str,
        body: Vec<u8>,
        headers: MessageHeaders,
    ) -> Result<(), BrokerError> {
        self.shared.ensure_open()?;
        let state = self.shared.queue(queue)?;

        let tag = DeliveryTag(state.next_tag.fetch_add(1, Ordering::Relaxed));
        state.buffer.lock().push_back(Delivery {
            body,
            headers,
            tag,
            redelivered: false,
        });
        state.ready.add_permits(1);

        debug!(queue = %queue, tag = %tag, "message published");
        Ok(())
    }

    async fn subscribe(
        &self,
        queue: &str,
        ack_mode: AckMode,
    ) -> Result<Subscription, BrokerError> {
        self.shared.ensure_open()?;
        let state = self.shared.queue(queue)?;

        let previous = state.consumers.fetch_add(1, Ordering::AcqRel);
        if state.exclusive && previous > 0 {
            state.consumers.fetch_sub(1, Ordering::AcqRel);
            return Err(BrokerError::ExclusiveInUse(queue.to_string()));
        }

        let consumer = state.next_consumer.fetch_add(1, Ordering::Relaxed);
        debug!(queue = %queue, consumer, "consumer joined");

        Ok(Subscription::new(Box::new(MemorySubscription {
            shared: Arc::clone(&self.shared),
            state,
            consumer,
            ack_mode,
        })))
    }

    async fn ack(&self, queue: &str, tag: DeliveryTag) -> Result<(), BrokerError> {
        self.shared.ensure_open()?;
        let state = self.shared.queue(queue)?;

        if state.unacked.lock().remove(&tag).is_some() {
            debug!(queue = %queue, tag = %tag, "delivery acked");
            Ok(())
        } else {
            Err(BrokerError::UnknownDeliveryTag {
                queue: queue.to_string(),
                tag,
            })
        }
    }

    async fn delete_queue(&self, queue: &str) -> Result<(), BrokerError> {
        self.shared.ensure_open()?;
        let (_, state) = self
            .shared
            .queues
            .remove(queue)
            .ok_or_else(|| BrokerError::QueueNotFound(queue.to_string()))?;

        state.ready.close();
        debug!(queue = %queue, "queue deleted");
        Ok(())
    }

    async fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        for entry in self.shared.queues.iter() {
            entry.value().ready.close();
        }
        debug!("broker closed");
    }

    fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

/// One consumer's view of one in-memory queue.
struct MemorySubscription {
    shared: Arc<Shared>,
    state: Arc<QueueState>,
    consumer: u64,
    ack_mode: AckMode,
}

impl MemorySubscription {
    fn take_front(&self) -> Option<Delivery> {
        let delivery = self.state.buffer.lock().pop_front()?;
        if self.ack_mode == AckMode::Manual {
            self.state.unacked.lock().insert(
                delivery.tag,
                UnackedDelivery {
                    consumer: self.consumer,
                    delivery: delivery.clone(),
                },
            );
        }
        Some(delivery)
    }
}

#[async_trait]
impl SubscriptionBackend for MemorySubscription {
    async fn recv(&mut self) -> Option<Delivery> {
        // Closed semaphore = queue deleted or broker closed.
        let permit = self.state.ready.acquire().await.ok()?;
        permit.forget();
        self.take_front()
    }

    fn try_recv(&mut self) -> Result<Option<Delivery>, BrokerError> {
        match self.state.ready.try_acquire() {
            Ok(permit) => permit.forget(),
            Err(TryAcquireError::NoPermits) => return Ok(None),
            Err(TryAcquireError::Closed) => return Err(BrokerError::Closed),
        }
        Ok(self.take_front())
    }

    fn queue(&self) -> &str {
        &self.state.name
    }
}

impl Drop for MemorySubscription {
    fn drop(&mut self) {
        let remaining = self.state.consumers.fetch_sub(1, Ordering::AcqRel) - 1;

        // Requeue whatever this consumer received but never acknowledged,
        // oldest first so the original order is preserved.
        let mut mine: Vec<Delivery> = {
            let mut unacked = self.state.unacked.lock();
            let tags: Vec<DeliveryTag> = unacked
                .iter()
                .filter(|(_, held)| held.consumer == self.consumer)
                .map(|(tag, _)| *tag)
                .collect();
            tags.into_iter()
                .filter_map(|tag| unacked.remove(&tag))
                .map(|held| held.delivery)
                .collect()
        };

        if !mine.is_empty() {
            mine.sort_by_key(|delivery| delivery.tag);
            let requeued = mine.len();
            {
                let mut buffer = self.state.buffer.lock();
                for mut delivery in mine.into_iter().rev() {
                    delivery.redelivered = true;
                    buffer.push_front(delivery);
                }
            }
            self.state.ready.add_permits(requeued);
            warn!(queue = %self.state.name, requeued, "unacked deliveries requeued");
        }

        if self.state.exclusive && remaining == 0 {
            self.shared.remove_queue_state(&self.state);
        }
        debug!(queue = %self.state.name, consumer = self.consumer, "consumer left");
    }
}
