//! # Switchboard Wire - RPC Protocol Data Model
//!
//! Defines what travels over the broker: JSON request/response envelopes,
//! the service-side error taxonomy, and the correlation ids that pair a
//! reply with its awaiting caller.
//!
//! ## Envelope Flow
//!
//! ```text
//! ┌──────────────┐  ActionRequest (JSON)   ┌──────────────┐
//! │    Caller    │ ──────────────────────► │   Service    │
//! │              │   + replyTo             │              │
//! │              │   + correlationId       │              │
//! │              │ ◄────────────────────── │              │
//! └──────────────┘  ActionResponse (JSON)  └──────────────┘
//!                    same correlationId
//! ```
//!
//! ## Conventions
//!
//! - Bodies are UTF-8 JSON; field names are camelCase on the wire.
//! - A response carries exactly one of `result` or `error`.
//! - Correlation ids are opaque strings to everyone but their creator.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod actions;
pub mod correlation;
pub mod error;
pub mod message;

// Re-export main types
pub use correlation::CorrelationId;
pub use error::{ActionError, ErrorKind};
pub use message::{ActionRequest, ActionResponse};

/// Name of the broker header carrying the reply queue, absent on casts.
pub const HEADER_REPLY_TO: &str = "replyTo";

/// Name of the broker header carrying the correlation token.
pub const HEADER_CORRELATION_ID: &str = "correlationId";
