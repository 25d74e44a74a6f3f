//! Message Transport Layer
//!
//! Single responsibility: Move serialized messages between two execution contexts.
//! No knowledge of requests, responses, sessions or handlers.
//!
//! Transports follow `postMessage` semantics:
//!
//! - `post(data, target_origin)` delivers at most once
//! - the receiver drops anything whose `target_origin` is neither `"*"` nor its own origin
//! - inbound messages arrive on an [`Inbox`], stamped with the sender's origin
//!
//! | Module      | Transport                                          |
//! |-------------|----------------------------------------------------|
//! | `window`    | In-process pair (host page ↔ embedded frame)       |
//! | `websocket` | WebSocket connection to an out-of-process envelope |

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::BridgeError;

pub mod websocket;
pub mod window;

pub use websocket::WebSocketTransport;
pub use window::{window_pair, WindowTransport};

/// Target origin that matches every receiver.
pub const ANY_ORIGIN: &str = "*";

/// A message received from the other context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posted {
    /// Origin of the sender, as reported by the transport
    pub origin: String,
    /// Serialized message
    pub data: String,
}

/// Inbound half of a transport.
pub type Inbox = mpsc::Receiver<Posted>;

/// Outbound half of a transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Post a serialized message to the other context.
    ///
    /// Returns an error only when the other context is gone; an origin
    /// mismatch is a silent drop, as with `postMessage`.
    async fn post(&self, data: String, target_origin: &str) -> Result<(), BridgeError>;
}

/// Whether a receiver with `own_origin` accepts a message posted to `target_origin`.
pub fn target_matches(target_origin: &str, own_origin: &str) -> bool {
    target_origin == ANY_ORIGIN || target_origin == own_origin
}
