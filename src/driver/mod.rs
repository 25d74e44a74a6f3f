//! Driver delegation
//!
//! A Driver is the host application's implementation of the business operations
//! an embedded widget may ask for. The bridge only forwards calls to it:
//!
//! ```text
//! embedded view ──► EnvelopeViewDriver ──► Channel API proxy ──► wire
//!                                                                 │
//! host Driver ◄── ChannelApiImpl (1:1 adapter) ◄── EnvelopeServer ◄┘
//! ```
//!
//! A Driver error crosses the bridge untouched: the adapter serializes the
//! [`DriverError`] into the response `error`, and the embedded view driver
//! decodes it back.
//!
//! The Driver traits themselves live next to their surfaces in
//! [`crate::process_details`] and [`crate::jobs_management`].

mod memory;

pub use memory::{InMemoryJobsManagementDriver, InMemoryProcessDetailsDriver};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::api::to_result;
use crate::error::BridgeError;

/// Error a Driver rejects with. Passed through the bridge verbatim.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{message}")]
pub struct DriverError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

pub type DriverResult<T> = Result<T, DriverError>;

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Serialized form placed in the response `error` field.
    pub fn to_payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({ "message": self.message }))
    }
}

/// Response for a Driver outcome: the value as `result`, the error verbatim as `error`.
pub fn reply<T: Serialize>(outcome: DriverResult<T>) -> Result<Value, Value> {
    match outcome {
        Ok(value) => to_result(&value),
        Err(e) => Err(e.to_payload()),
    }
}

/// Seen from the embedded side, every bridge failure is a failed Driver call.
///
/// A remote payload that is not a `DriverError` is kept whole in `details`.
impl From<BridgeError> for DriverError {
    fn from(err: BridgeError) -> Self {
        if let Some(driver_error) = err.remote_as::<DriverError>() {
            return driver_error;
        }
        match err {
            BridgeError::Remote(payload) => DriverError::new("Remote error").with_details(payload),
            other => DriverError::new(other.to_string()),
        }
    }
}
