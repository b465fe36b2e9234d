//! # Switchboard Test Suite
//!
//! Cross-crate tests for the message fabric. Each module drives a whole
//! path through real components over the in-memory broker; nothing here
//! is mocked.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── correlation.rs   # Reply pairing, ordering, timeouts, wire bytes
//!     ├── gateway_http.rs  # REST verb mapping through the full router
//!     └── lifecycle.rs     # Ack modes, redelivery, broker shutdown
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p switchboard-tests
//!
//! # By area
//! cargo test -p switchboard-tests integration::correlation::
//! cargo test -p switchboard-tests integration::gateway_http::
//! cargo test -p switchboard-tests integration::lifecycle::
//! ```

#![allow(unused_variables)]
#![allow(unused_imports)]
#![allow(dead_code)]
