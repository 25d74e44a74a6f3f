//! Error types for envelope-bridge

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    /// Error produced by the remote handler (usually a Driver), passed through verbatim.
    #[error("Remote error: {0}")]
    Remote(Value),

    #[error("Session torn down")]
    TornDown,

    #[error("Session not associated")]
    NotAssociated,

    #[error("Envelope init timed out after {0:?}")]
    HandshakeTimeout(Duration),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid arguments for {method}: {reason}")]
    InvalidArguments { method: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl BridgeError {
    /// Decode the payload of a [`BridgeError::Remote`] into a typed error.
    ///
    /// Returns `None` for every other variant or when the payload has a different shape.
    pub fn remote_as<T: DeserializeOwned>(&self) -> Option<T> {
        match self {
            BridgeError::Remote(value) => serde_json::from_value(value.clone()).ok(),
            _ => None,
        }
    }

    /// True when the call failed because the session went away.
    pub fn is_torn_down(&self) -> bool {
        matches!(self, BridgeError::TornDown)
    }
}
