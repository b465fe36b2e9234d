//! # Switchboard Dispatch - Service-Side Message Routing
//!
//! One dispatcher per service process: it consumes the service's named
//! queue, routes each request to the handler registered for its
//! `(controller, action)` pair, and sends the outcome back when the sender
//! asked for one.
//!
//! ## Dispatch Flow
//!
//! ```text
//! service queue ──► decode ──► registry lookup ──► invoke handler
//!                     │              │                  │
//!                     ▼              ▼                  ▼
//!                  decode         not_found        result / error
//!                  error            error               │
//!                     └──────────────┴───────► ActionResponse ──► replyTo
//!                                              (skipped on casts)
//! ```
//!
//! Nothing on this path crashes the loop: malformed bodies, unknown
//! routes, handler errors, and handler panics all become error responses.
//! Each delivery is processed on its own task, so a slow handler never
//! blocks the queue.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod args;
pub mod dispatcher;
pub mod handler;

// Re-export main types
pub use args::ActionArgs;
pub use dispatcher::{DispatchError, DispatcherConfig, DispatcherState, ServiceDispatcher};
pub use handler::{handler_fn, Handler, HandlerRegistry};
