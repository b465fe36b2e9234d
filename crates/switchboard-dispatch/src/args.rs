//! Positional arguments with typed access.
//!
//! Requests carry ordered JSON values. Handlers pull them out by position
//! and type; a miss is an `invalid_argument` response to the caller, never
//! a panic in the service.

use serde::de::DeserializeOwned;
use serde_json::Value;
use switchboard_wire::ActionError;

/// The argument list of one action invocation.
#[derive(Debug, Clone, Default)]
pub struct ActionArgs {
    values: Vec<Value>,
}

impl ActionArgs {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Required argument at `index`, deserialized into `T`.
    pub fn arg<T: DeserializeOwned>(&self, index: usize) -> Result<T, ActionError> {
        let value = self.values.get(index).ok_or_else(|| {
            ActionError::invalid_argument(format!(
                "missing argument {index} (got {})",
                self.values.len()
            ))
        })?;
        serde_json::from_value(value.clone())
            .map_err(|err| ActionError::invalid_argument(format!("argument {index}: {err}")))
    }

    /// Optional argument: absent and `null` both read as `None`.
    pub fn opt_arg<T: DeserializeOwned>(&self, index: usize) -> Result<Option<T>, ActionError> {
        match self.values.get(index) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|err| {
                    ActionError::invalid_argument(format!("argument {index}: {err}"))
                }),
        }
    }

    /// The raw values, in order.
    pub fn raw(&self) -> &[Value] {
        &self.values
    }

    pub fn into_inner(self) -> Vec<Value> {
        self.values
    }
}

impl From<Vec<Value>> for ActionArgs {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}
