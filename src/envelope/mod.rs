//! Envelope Client / Envelope Server
//!
//! The two sides of the bridge. Each wraps a [`MessageBus`](crate::bus::MessageBus)
//! and a [`Session`](crate::session::Session):
//!
//! | Side                 | Runs in         | Proxies           | Implements        |
//! |----------------------|-----------------|-------------------|-------------------|
//! | [`EnvelopeServer`]   | host page       | Envelope API      | Channel API       |
//! | [`EnvelopeClient`]   | embedded widget | Channel API       | Envelope API      |
//!
//! # Usage
//!
//! ```ignore
//! // Host
//! let server = EnvelopeServer::new(Arc::new(host_transport), config);
//! server.register_channel_api::<ProcessDetailsChannelCall, _>(Arc::new(adapter));
//! server.run(host_inbox);
//! let envelope_api = ProcessDetailsEnvelopeApi::new(server.envelope_api());
//! server
//!     .start_init_polling(|association| envelope_api.init(association, init_args.clone()))
//!     .await?;
//!
//! // Embedded widget
//! let client = EnvelopeClient::new(Arc::new(envelope_transport));
//! client.register_envelope_api::<ProcessDetailsEnvelopeCall, _>(Arc::new(envelope_impl));
//! client.run(envelope_inbox);
//! ```

mod client;
mod server;

pub use client::EnvelopeClient;
pub use server::EnvelopeServer;
