//! Caller-facing failures of `call` and `cast`.

use std::time::Duration;
use switchboard_broker::BrokerError;
use switchboard_wire::ActionError;
use thiserror::Error;

/// Why a call (or cast) did not produce a result.
///
/// [`CallError::Action`] is the remote service saying no; everything else
/// is the plumbing. [`CallError::BrokerUnavailable`] is kept distinct so
/// callers can tell a dead connection from a slow or unhappy service.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CallError {
    /// No reply within the deadline. The pending entry is gone; a reply
    /// arriving later is dropped.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    /// The broker connection closed while the call was in flight.
    #[error("broker unavailable")]
    BrokerUnavailable,

    /// The service replied with an error.
    #[error(transparent)]
    Action(#[from] ActionError),

    /// The request could not be encoded or the reply could not be decoded.
    #[error("codec failure: {0}")]
    Codec(String),

    /// A broker operation failed for a reason other than closure.
    #[error("broker error: {0}")]
    Broker(BrokerError),

    /// The pending entry vanished without a reply (client shut down).
    #[error("reply channel closed before a reply arrived")]
    ReplyChannelClosed,
}

impl CallError {
    /// Fold a broker failure into the call taxonomy: closure means the
    /// connection is gone, anything else stays a broker error.
    pub fn from_broker(err: BrokerError) -> Self {
        match err {
            BrokerError::Closed => Self::BrokerUnavailable,
            other => Self::Broker(other),
        }
    }
}
