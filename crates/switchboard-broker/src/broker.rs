//! # Broker Trait
//!
//! The capability boundary between this system and whatever actually moves
//! messages. Implementations own their connection; callers hold an
//! `Arc<dyn Broker>` and never reach around it.

use crate::message::{Delivery, DeliveryTag, MessageHeaders};
use crate::queue::{AckMode, QueueSpec};
use async_trait::async_trait;
use std::pin::Pin;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio_stream::Stream;

/// Errors from broker operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// The target queue does not exist (never declared, or deleted).
    #[error("queue not found: {0}")]
    QueueNotFound(String),

    /// A declaration names an existing queue with different properties.
    #[error("queue declaration conflicts with existing queue: {0}")]
    DeclareMismatch(String),

    /// The queue is exclusive and already owned by a consumer.
    #[error("exclusive queue already has a consumer: {0}")]
    ExclusiveInUse(String),

    /// Acknowledgement for a tag the broker is not holding.
    #[error("unknown delivery tag {tag} on queue {queue}")]
    UnknownDeliveryTag { queue: String, tag: DeliveryTag },

    /// The broker connection was closed. Distinguishable from every other
    /// failure so pending work can be failed fast rather than retried.
    #[error("broker is closed")]
    Closed,
}

/// Minimal queue transport the RPC layers are written against.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Declare a queue and return its name (generated for anonymous specs).
    /// Redeclaring a named queue with the same properties is idempotent.
    async fn declare_queue(&self, spec: QueueSpec) -> Result<String, BrokerError>;

    /// Publish a message body with its metadata headers to a queue.
    async fn publish(
        &self,
        queue: &str,
        body: Vec<u8>,
        headers: MessageHeaders,
    ) -> Result<(), BrokerError>;

    /// Join a queue as a competing consumer.
    async fn subscribe(&self, queue: &str, ack_mode: AckMode)
        -> Result<Subscription, BrokerError>;

    /// Acknowledge a delivery received under [`AckMode::Manual`].
    async fn ack(&self, queue: &str, tag: DeliveryTag) -> Result<(), BrokerError>;

    /// Delete a queue. Its consumers see end-of-stream on their next `recv`.
    async fn delete_queue(&self, queue: &str) -> Result<(), BrokerError>;

    /// Close the connection. Fails all later operations with
    /// [`BrokerError::Closed`] and wakes every blocked consumer.
    async fn close(&self);

    /// Whether [`close`](Broker::close) has been called.
    fn is_closed(&self) -> bool;
}

/// Backend half of a [`Subscription`], supplied by the broker impl.
#[async_trait]
pub(crate) trait SubscriptionBackend: Send {
    async fn recv(&mut self) -> Option<Delivery>;
    fn try_recv(&mut self) -> Result<Option<Delivery>, BrokerError>;
    fn queue(&self) -> &str;
}

/// A consumer's membership in one queue.
///
/// Dropping the subscription leaves the queue: unacknowledged deliveries
/// are requeued, and an exclusive queue whose last consumer leaves is
/// deleted.
pub struct Subscription {
    inner: Box<dyn SubscriptionBackend>,
}

impl Subscription {
    pub(crate) fn new(inner: Box<dyn SubscriptionBackend>) -> Self {
        Self { inner }
    }

    /// Receive the next delivery.
    ///
    /// Returns `None` once no delivery can ever arrive again: the queue was
    /// deleted or the broker closed.
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.inner.recv().await
    }

    /// Receive without waiting.
    ///
    /// `Ok(None)` means the queue is currently empty;
    /// `Err(BrokerError::Closed)` means `recv` would return `None`.
    pub fn try_recv(&mut self) -> Result<Option<Delivery>, BrokerError> {
        self.inner.try_recv()
    }

    /// Name of the queue this subscription consumes.
    #[must_use]
    pub fn queue(&self) -> &str {
        self.inner.queue()
    }

    /// Adapt into a [`DeliveryStream`] for use with stream combinators.
    #[must_use]
    pub fn into_stream(self) -> DeliveryStream {
        DeliveryStream::new(self)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("queue", &self.queue())
            .finish()
    }
}

/// A stream wrapper for subscriptions.
///
/// Implements `tokio_stream::Stream`, ending where
/// [`recv`](Subscription::recv) would return `None`.
pub struct DeliveryStream {
    subscription: Subscription,
}

impl DeliveryStream {
    #[must_use]
    pub fn new(subscription: Subscription) -> Self {
        Self { subscription }
    }

    /// Name of the queue this stream consumes.
    #[must_use]
    pub fn queue(&self) -> &str {
        self.subscription.queue()
    }
}

impl Stream for DeliveryStream {
    type Item = Delivery;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        // Use try_recv for a non-blocking check
        match self.subscription.try_recv() {
            Ok(Some(delivery)) => Poll::Ready(Some(delivery)),
            Ok(None) => {
                // No delivery ready; reschedule and return pending
                cx.waker().wake_by_ref();
                Poll::Pending
            }
            Err(_) => Poll::Ready(None),
        }
    }
}
