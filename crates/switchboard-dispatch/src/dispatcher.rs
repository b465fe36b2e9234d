//! # Service Dispatcher
//!
//! Owns a service's queue subscription and runs the consume loop. Every
//! delivery is handled on its own task; the loop itself only receives and
//! spawns, so one stuck handler cannot stall the queue or its siblings.

use crate::args::ActionArgs;
use crate::handler::HandlerRegistry;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use switchboard_broker::{AckMode, Broker, BrokerError, Delivery, MessageHeaders, QueueSpec, Subscription};
use switchboard_wire::{ActionError, ActionRequest, ActionResponse};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Startup failures. Once running, the dispatcher converts every problem
/// into an error response instead of failing.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("dispatcher already started")]
    AlreadyStarted,
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),
}

/// Observable lifecycle of a dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    /// Not started, or stopped after its queue ended.
    Stopped,
    /// Declaring and joining the service queue.
    Subscribing,
    /// Waiting for deliveries.
    Listening,
    /// At least one delivery is being processed right now.
    Dispatching,
}

/// Dispatcher tunables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// When deliveries are acknowledged. [`AckMode::Auto`] drops a message
    /// the moment it is received; [`AckMode::Manual`] holds it until the
    /// reply is sent, so an interrupted service redelivers instead of
    /// losing it.
    pub ack_mode: AckMode,
}

const STATE_STOPPED: u8 = 0;
const STATE_SUBSCRIBING: u8 = 1;
const STATE_LISTENING: u8 = 2;

struct DispatcherInner {
    broker: Arc<dyn Broker>,
    service: String,
    registry: Arc<HandlerRegistry>,
    config: DispatcherConfig,
    state: AtomicU8,
    in_flight: AtomicUsize,
}

impl DispatcherInner {
    fn store_state(&self, state: u8) {
        self.state.store(state, Ordering::Release);
    }
}

/// Consume loop of one service.
///
/// Clones share the same dispatcher; [`start`](ServiceDispatcher::start)
/// runs once and returns the loop's join handle. The loop ends when the
/// service queue does (deletion or broker close).
#[derive(Clone)]
pub struct ServiceDispatcher {
    inner: Arc<DispatcherInner>,
}

impl ServiceDispatcher {
    pub fn new(
        broker: Arc<dyn Broker>,
        service: impl Into<String>,
        registry: HandlerRegistry,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                broker,
                service: service.into(),
                registry: Arc::new(registry),
                config,
                state: AtomicU8::new(STATE_STOPPED),
                in_flight: AtomicUsize::new(0),
            }),
        }
    }

    /// Declare the service queue, subscribe, and spawn the consume loop.
    pub async fn start(&self) -> Result<tokio::task::JoinHandle<()>, DispatchError> {
        let inner = &self.inner;
        if inner
            .state
            .compare_exchange(
                STATE_STOPPED,
                STATE_SUBSCRIBING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Err(DispatchError::AlreadyStarted);
        }

        let subscription = match self.join_queue().await {
            Ok(subscription) => subscription,
            Err(err) => {
                inner.store_state(STATE_STOPPED);
                return Err(err);
            }
        };

        inner.store_state(STATE_LISTENING);
        info!(
            service = %inner.service,
            routes = inner.registry.len(),
            ack_mode = ?inner.config.ack_mode,
            "service listening"
        );

        let inner = Arc::clone(inner);
        Ok(tokio::spawn(run_loop(inner, subscription)))
    }

    async fn join_queue(&self) -> Result<Subscription, DispatchError> {
        let inner = &self.inner;
        let queue = inner
            .broker
            .declare_queue(QueueSpec::named(&inner.service))
            .await?;
        Ok(inner.broker.subscribe(&queue, inner.config.ack_mode).await?)
    }

    /// Current lifecycle state; `Dispatching` while any delivery is being
    /// processed.
    #[must_use]
    pub fn state(&self) -> DispatcherState {
        match self.inner.state.load(Ordering::Acquire) {
            STATE_SUBSCRIBING => DispatcherState::Subscribing,
            STATE_LISTENING => {
                if self.inner.in_flight.load(Ordering::Acquire) > 0 {
                    DispatcherState::Dispatching
                } else {
                    DispatcherState::Listening
                }
            }
            _ => DispatcherState::Stopped,
        }
    }

    #[must_use]
    pub fn service(&self) -> &str {
        &self.inner.service
    }
}

/// Decrements `in_flight` even if the processing task panics.
struct InFlightGuard(Arc<DispatcherInner>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

async fn run_loop(inner: Arc<DispatcherInner>, mut subscription: Subscription) {
    while let Some(delivery) = subscription.recv().await {
        inner.in_flight.fetch_add(1, Ordering::AcqRel);
        let inner = Arc::clone(&inner);
        tokio::spawn(async move {
            let _guard = InFlightGuard(Arc::clone(&inner));
            process_delivery(&inner, delivery).await;
        });
    }

    inner.store_state(STATE_STOPPED);
    info!(service = %inner.service, "service stopped");
}

async fn process_delivery(inner: &DispatcherInner, delivery: Delivery) {
    let tag = delivery.tag;
    let reply_to = delivery.headers.reply_to.clone();
    let token = delivery.headers.correlation_id.clone();

    let response = match ActionRequest::decode(&delivery.body) {
        Ok(request) => dispatch_request(inner, request).await,
        Err(err) => {
            warn!(service = %inner.service, error = %err, "undecodable request body");
            ActionResponse::err(ActionError::from(err))
        }
    };

    match reply_to {
        Some(reply_to) => send_reply(inner, &reply_to, token, response).await,
        None => {
            // Cast: the sender cannot observe failure, but the log can.
            if let ActionResponse::Err { error } = &response {
                debug!(service = %inner.service, error = %error, "cast ended in error");
            }
        }
    }

    // Manual mode acks only now, after the reply went out.
    if inner.config.ack_mode == AckMode::Manual {
        if let Err(err) = inner.broker.ack(&inner.service, tag).await {
            warn!(service = %inner.service, tag = %tag, error = %err, "ack failed");
        }
    }
}

async fn dispatch_request(inner: &DispatcherInner, request: ActionRequest) -> ActionResponse {
    let controller = request.controller_name.as_str();
    let action = request.action_name.as_str();

    let Some(handler) = inner.registry.get(controller, action) else {
        warn!(service = %inner.service, controller, action, "action not found");
        return ActionResponse::err(ActionError::not_found(controller, action));
    };

    debug!(
        service = %inner.service,
        controller,
        action,
        handler = handler.name(),
        args = request.args.len(),
        "dispatching"
    );

    // The handler runs on its own task so a panic inside it is contained
    // and still produces an error response.
    let handler = Arc::clone(handler);
    let args = ActionArgs::new(request.args);
    let invocation = tokio::spawn(async move { handler.invoke(args).await });

    match invocation.await {
        Ok(result) => ActionResponse::from(result),
        Err(join_err) if join_err.is_panic() => {
            warn!(service = %inner.service, controller, action, "handler panicked");
            ActionResponse::err(ActionError::internal(format!(
                "handler panicked: {controller}.{action}"
            )))
        }
        Err(_) => ActionResponse::err(ActionError::internal("handler cancelled")),
    }
}

async fn send_reply(
    inner: &DispatcherInner,
    reply_to: &str,
    token: Option<String>,
    response: ActionResponse,
) {
    let headers = match token {
        Some(token) => MessageHeaders::for_reply(token),
        None => MessageHeaders::default(),
    };
    let body = match response.encode() {
        Ok(body) => body,
        Err(err) => {
            warn!(service = %inner.service, error = %err, "unencodable response dropped");
            return;
        }
    };

    if let Err(err) = inner.broker.publish(reply_to, body, headers).await {
        // The caller may have timed out and taken its reply queue with it.
        debug!(service = %inner.service, reply_to, error = %err, "reply not delivered");
    }
}
