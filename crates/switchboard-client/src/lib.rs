//! # Switchboard Client - Correlated RPC over a Broker
//!
//! Turns the broker's one-way queues into request/response calls. A `call`
//! publishes a request with reply metadata, parks the calling task in the
//! pending table, and wakes it when the matching correlation token comes
//! back (or the timeout fires). A `cast` is the same publish without the
//! metadata and without the wait.
//!
//! ## Call Flow (shared reply mode)
//!
//! ```text
//!  call()                        reply consumer task
//!    │ register(token) ────────► PendingCallStore
//!    │ publish(request,                  ▲
//!    │   replyTo, token)                 │ complete(token, response)
//!    │                                   │
//!    └─ await oneshot ◄─── reply queue ──┘
//!       (bounded by timeout)
//! ```
//!
//! One exclusive reply queue serves all of a client's calls; the consumer
//! task demultiplexes by token. [`ReplyMode::PerCall`] instead gives every
//! call its own throwaway queue and skips the shared table entirely.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod client;
pub mod config;
pub mod error;
pub mod pending;

// Re-export main types
pub use client::RpcClient;
pub use config::{ClientConfig, ConfigError, ReplyMode};
pub use error::CallError;
pub use pending::{CallStats, PendingCallStore};
