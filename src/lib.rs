//! Envelope Bridge - Channel ↔ Envelope messaging for embedded micro-frontends
//!
//! A host application (the **Channel**) mounts an isolated widget (the **Envelope**)
//! that it can only reach by posting messages. This crate provides the protocol
//! both sides speak over that boundary.
//!
//! ## Architecture
//!
//! ```text
//! Host page                                              Embedded widget
//! ┌───────────────────────────┐                         ┌───────────────────────────┐
//! │ Driver (business logic)   │                         │ View                      │
//! │   ▲                       │                         │   │ Driver trait          │
//! │ ChannelApiImpl (adapter)  │                         │ EnvelopeViewDriver        │
//! │   ▲                       │                         │   │                       │
//! │ EnvelopeServer ── bus ────┼─── Transport (post) ────┼── bus ── EnvelopeClient   │
//! │   │ Envelope API proxy    │                         │   ▲ EnvelopeApiImpl       │
//! └───────────────────────────┘                         └───────────────────────────┘
//! ```
//!
//! ## Layers
//!
//! | Layer        | Module                 | Knows about                          |
//! |--------------|------------------------|--------------------------------------|
//! | Transport    | [`transport`]          | opaque strings and origins           |
//! | Wire         | [`protocol`]           | REQUEST / RESPONSE / NOTIFICATION    |
//! | Bus          | [`bus`], [`session`]   | ids, pending calls, admission        |
//! | Surfaces     | [`api`]                | typed calls, proxies, handlers       |
//! | Sides        | [`envelope`]           | client / server, [`handshake`]       |
//! | Embeddings   | [`process_details`], [`jobs_management`] | Drivers and views  |

pub mod api;
pub mod bus;
pub mod config;
pub mod driver;
pub mod envelope;
pub mod error;
pub mod handshake;
pub mod jobs_management;
pub mod models;
pub mod process_details;
pub mod protocol;
pub mod session;
pub mod transport;

// Re-exports
pub use api::{ApiCall, ApiHandler, ApiProxy, CallKind};
pub use bus::{MessageBus, SubscriptionId};
pub use config::BridgeConfig;
pub use driver::{DriverError, DriverResult};
pub use envelope::{EnvelopeClient, EnvelopeServer};
pub use error::BridgeError;
pub use handshake::{Association, InitGuard, InitPolicy};
pub use session::{Session, SessionState};
pub use transport::{window_pair, Inbox, Posted, Transport, WebSocketTransport, WindowTransport};
