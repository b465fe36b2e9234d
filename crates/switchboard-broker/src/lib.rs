//! # Switchboard Broker - Queue Transport Capability
//!
//! The narrow slice of a message broker this system depends on: declare a
//! queue, publish bytes with reply metadata, consume as a competing
//! consumer, acknowledge. Everything above (correlation, dispatch, HTTP)
//! talks to the [`Broker`] trait; everything below is swappable.
//!
//! ## Delivery Model
//!
//! ```text
//! ┌───────────┐ publish()  ┌─────────────┐   recv()   ┌────────────┐
//! │ Producer  │ ─────────► │ named queue │ ─────────► │ Consumer A │
//! └───────────┘            │  FIFO       │ ────┐      └────────────┘
//!                          └─────────────┘     │recv()┌────────────┐
//!                                              └────► │ Consumer B │
//!                                                     └────────────┘
//! ```
//!
//! Each message goes to exactly one consumer of its queue. Anonymous queues
//! are exclusive and disappear when their consumer does; with manual
//! acknowledgement, unacked messages are requeued when the consumer drops.
//!
//! ## Connection Loss
//!
//! [`Broker::close`] is observable: later operations fail with
//! [`BrokerError::Closed`] and blocked `recv` calls resolve to `None`, so
//! callers can fail their in-flight work instead of hanging.
//!
//! The bundled [`InMemoryBroker`] serves single-process deployments and
//! tests; it implements no retry or reconnection logic.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod broker;
pub mod memory;
pub mod message;
pub mod queue;

// Re-export main types
pub use broker::{Broker, BrokerError, DeliveryStream, Subscription};
pub use memory::InMemoryBroker;
pub use message::{Delivery, DeliveryTag, MessageHeaders};
pub use queue::{AckMode, QueueSpec};

/// Prefix of generated names for anonymous queues.
pub const ANONYMOUS_QUEUE_PREFIX: &str = "sbq-";
