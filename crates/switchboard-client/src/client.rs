//! # RPC Client
//!
//! `call` suspends only its own task: the request goes out with a fresh
//! correlation token, the caller parks on a oneshot in the pending table,
//! and the reply consumer wakes exactly that caller when the token comes
//! back. At most one reply is ever consumed per call; late ones find no
//! entry and are dropped where they stand.

use crate::config::{ClientConfig, ConfigError, ReplyMode};
use crate::error::CallError;
use crate::pending::{cleanup_task, CallStats, PendingCallStore};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use switchboard_broker::{AckMode, Broker, Delivery, MessageHeaders, QueueSpec, Subscription};
use switchboard_wire::{ActionRequest, ActionResponse, CorrelationId};
use tracing::{debug, warn};

/// Client handle for correlated calls and fire-and-forget casts.
///
/// Cheap to clone; clones share the broker connection, the pending table,
/// and (in [`ReplyMode::Shared`]) the reply queue. Background tasks start
/// with the first shared-mode call and stop when the last clone drops.
#[derive(Clone)]
pub struct RpcClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    broker: Arc<dyn Broker>,
    config: ClientConfig,
    pending: Arc<PendingCallStore>,
    /// Shared-mode reply queue, created on first use.
    reply_queue: tokio::sync::OnceCell<String>,
    tasks: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

impl RpcClient {
    /// Client with default configuration.
    #[must_use]
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        // The default config always validates.
        Self::from_parts(broker, ClientConfig::default())
    }

    /// Client with explicit configuration.
    pub fn with_config(broker: Arc<dyn Broker>, config: ClientConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_parts(broker, config))
    }

    fn from_parts(broker: Arc<dyn Broker>, config: ClientConfig) -> Self {
        let pending = Arc::new(PendingCallStore::new(config.default_timeout));
        Self {
            inner: Arc::new(ClientInner {
                broker,
                config,
                pending,
                reply_queue: tokio::sync::OnceCell::new(),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Invoke an action and wait for its reply under the default timeout.
    pub async fn call(
        &self,
        service: &str,
        controller: &str,
        action: &str,
        args: Vec<Value>,
    ) -> Result<Value, CallError> {
        self.call_with_timeout(service, controller, action, args, None)
            .await
    }

    /// Invoke an action with a per-call deadline override.
    pub async fn call_with_timeout(
        &self,
        service: &str,
        controller: &str,
        action: &str,
        args: Vec<Value>,
        deadline: Option<Duration>,
    ) -> Result<Value, CallError> {
        let request = ActionRequest::new(service, controller, action, args);
        let deadline = deadline.unwrap_or(self.inner.config.default_timeout);

        match self.inner.config.reply_mode {
            ReplyMode::Shared => self.call_shared(request, deadline).await,
            ReplyMode::PerCall => self.call_per_call(request, deadline).await,
        }
    }

    /// Publish an action without reply metadata and return as soon as the
    /// broker has it. Whatever the service does with it is unobservable.
    pub async fn cast(
        &self,
        service: &str,
        controller: &str,
        action: &str,
        args: Vec<Value>,
    ) -> Result<(), CallError> {
        let request = ActionRequest::new(service, controller, action, args);
        self.publish_request(&request, MessageHeaders::default())
            .await?;
        debug!(service, controller, action, "cast published");
        Ok(())
    }

    /// Calls currently awaiting a reply.
    #[must_use]
    pub fn pending_calls(&self) -> usize {
        self.inner.pending.pending_count()
    }

    /// Lifetime call counters.
    #[must_use]
    pub fn stats(&self) -> &CallStats {
        self.inner.pending.stats()
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    async fn call_shared(
        &self,
        request: ActionRequest,
        deadline: Duration,
    ) -> Result<Value, CallError> {
        let reply_queue = self.ensure_reply_consumer().await?;
        let route = format!("{}.{}", request.controller_name, request.action_name);
        let (correlation_id, rx) = self.inner.pending.register(&route, Some(deadline));

        let headers = MessageHeaders::for_call(reply_queue, correlation_id.to_string());
        if let Err(err) = self.publish_request(&request, headers).await {
            self.inner.pending.cancel(&correlation_id);
            return Err(err);
        }

        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(outcome)) => Ok(outcome?.into_result()?),
            Ok(Err(_)) => Err(CallError::ReplyChannelClosed),
            Err(_) => {
                // Remove the entry first so a reply racing the timeout is
                // dropped instead of resolving a vanished waiter.
                self.inner.pending.cancel(&correlation_id);
                debug!(correlation_id = %correlation_id, route, "call timed out");
                Err(CallError::Timeout(deadline))
            }
        }
    }

    async fn call_per_call(
        &self,
        request: ActionRequest,
        deadline: Duration,
    ) -> Result<Value, CallError> {
        let broker = &self.inner.broker;
        let correlation_id = CorrelationId::new();

        let reply_queue = broker
            .declare_queue(QueueSpec::anonymous())
            .await
            .map_err(CallError::from_broker)?;
        let mut subscription = broker
            .subscribe(&reply_queue, AckMode::Auto)
            .await
            .map_err(CallError::from_broker)?;

        let headers = MessageHeaders::for_call(reply_queue, correlation_id.to_string());
        self.publish_request(&request, headers).await?;

        // Dropping `subscription` deletes the queue on every exit path.
        match tokio::time::timeout(deadline, await_direct_reply(&mut subscription, correlation_id))
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                debug!(correlation_id = %correlation_id, "per-call reply timed out");
                Err(CallError::Timeout(deadline))
            }
        }
    }

    /// Encode and publish, declaring the destination queue so requests sent
    /// before the service starts are buffered rather than lost.
    async fn publish_request(
        &self,
        request: &ActionRequest,
        headers: MessageHeaders,
    ) -> Result<(), CallError> {
        let body = request
            .encode()
            .map_err(|err| CallError::Codec(err.to_string()))?;

        let broker = &self.inner.broker;
        broker
            .declare_queue(QueueSpec::named(&request.service_name))
            .await
            .map_err(CallError::from_broker)?;
        broker
            .publish(&request.service_name, body, headers)
            .await
            .map_err(CallError::from_broker)
    }

    /// Lazily set up the shared reply queue, its consumer task, and the
    /// expiry sweeper.
    async fn ensure_reply_consumer(&self) -> Result<String, CallError> {
        let inner = Arc::clone(&self.inner);
        let queue = self
            .inner
            .reply_queue
            .get_or_try_init(|| async move {
                let queue = inner
                    .broker
                    .declare_queue(QueueSpec::anonymous())
                    .await
                    .map_err(CallError::from_broker)?;
                let subscription = inner
                    .broker
                    .subscribe(&queue, AckMode::Auto)
                    .await
                    .map_err(CallError::from_broker)?;
                debug!(reply_queue = %queue, "shared reply consumer starting");

                let consumer =
                    tokio::spawn(reply_consumer(subscription, Arc::clone(&inner.pending)));
                let sweeper = tokio::spawn(cleanup_task(
                    Arc::clone(&inner.pending),
                    inner.config.cleanup_interval,
                ));
                inner.tasks.lock().extend([consumer, sweeper]);

                Ok::<String, CallError>(queue)
            })
            .await?;
        Ok(queue.clone())
    }
}

/// Demultiplex replies from the shared queue into the pending table until
/// the stream ends, then fail whatever is still waiting.
async fn reply_consumer(mut subscription: Subscription, pending: Arc<PendingCallStore>) {
    while let Some(delivery) = subscription.recv().await {
        resolve_reply(&pending, delivery);
    }
    // Queue deleted or broker closed: no reply can arrive anymore.
    let failed = pending.fail_all(&CallError::BrokerUnavailable);
    if failed > 0 {
        warn!(failed, "reply stream ended with calls in flight");
    }
}

fn resolve_reply(pending: &PendingCallStore, delivery: Delivery) {
    let Some(token) = delivery.headers.correlation_id.as_deref() else {
        warn!("reply without correlation token dropped");
        return;
    };
    let Ok(correlation_id) = CorrelationId::parse(token) else {
        warn!(token, "reply with malformed correlation token dropped");
        return;
    };

    let outcome = match ActionResponse::decode(&delivery.body) {
        Ok(response) => Ok(response),
        Err(err) => Err(CallError::Codec(err.to_string())),
    };
    pending.complete(correlation_id, outcome);
}

/// Per-call mode: wait on a throwaway queue for the one expected token.
async fn await_direct_reply(
    subscription: &mut Subscription,
    correlation_id: CorrelationId,
) -> Result<Value, CallError> {
    let expected = correlation_id.to_string();
    while let Some(delivery) = subscription.recv().await {
        match delivery.headers.correlation_id.as_deref() {
            Some(token) if token == expected => {
                let response = ActionResponse::decode(&delivery.body)
                    .map_err(|err| CallError::Codec(err.to_string()))?;
                return Ok(response.into_result()?);
            }
            token => {
                // Only our own replies should ever land here.
                warn!(?token, queue = subscription.queue(), "foreign reply dropped");
            }
        }
    }
    Err(CallError::BrokerUnavailable)
}
