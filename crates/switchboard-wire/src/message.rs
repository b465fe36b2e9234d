//! Request and response envelopes.
//!
//! Field names are camelCase on the wire so bodies stay readable to the
//! JavaScript services this protocol grew out of.

use crate::error::ActionError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One invocation of a named action on a named controller of a service.
///
/// `service_name` selects the destination queue; the service's dispatcher
/// routes on `(controller_name, action_name)`. Arguments are positional
/// JSON values, preserved in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    pub service_name: String,
    pub controller_name: String,
    pub action_name: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl ActionRequest {
    pub fn new(
        service: impl Into<String>,
        controller: impl Into<String>,
        action: impl Into<String>,
        args: Vec<Value>,
    ) -> Self {
        Self {
            service_name: service.into(),
            controller_name: controller.into(),
            action_name: action.into(),
            args,
        }
    }

    /// Serialize to the UTF-8 JSON body published to the broker.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize a consumed body.
    pub fn decode(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }
}

/// Reply to an [`ActionRequest`]: exactly one of a result or an error.
///
/// The two shapes are `{"result": ...}` and `{"error": {...}}`; the untagged
/// representation keeps the wire free of an enum discriminant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionResponse {
    Ok { result: Value },
    Err { error: ActionError },
}

impl ActionResponse {
    pub fn ok(result: Value) -> Self {
        Self::Ok { result }
    }

    pub fn err(error: ActionError) -> Self {
        Self::Err { error }
    }

    /// Collapse into the caller-facing result.
    pub fn into_result(self) -> Result<Value, ActionError> {
        match self {
            Self::Ok { result } => Ok(result),
            Self::Err { error } => Err(error),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }
}

impl From<Result<Value, ActionError>> for ActionResponse {
    fn from(res: Result<Value, ActionError>) -> Self {
        match res {
            Ok(result) => Self::Ok { result },
            Err(error) => Self::Err { error },
        }
    }
}
