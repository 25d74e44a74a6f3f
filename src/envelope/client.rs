//! Envelope Client
//!
//! Runs inside the embedded widget. Exposes the Channel API proxy and serves the
//! Envelope API. Until [`EnvelopeClient::associate`] is called it accepts messages
//! from anyone but cannot originate calls; afterwards it only listens to the
//! associated origin.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::api::{ApiCall, ApiHandler, ApiProxy};
use crate::bus::MessageBus;
use crate::handshake::Association;
use crate::session::{Session, SessionState, SharedSession};
use crate::transport::{Inbox, Transport};

/// Embedded side of one session. Cloning yields another handle to the same client.
#[derive(Clone)]
pub struct EnvelopeClient {
    session: SharedSession,
    bus: MessageBus,
}

impl EnvelopeClient {
    /// Create an unassociated client. Must be called from within a Tokio runtime.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let session = Session::for_client().shared();
        let bus = MessageBus::new("envelope", transport, Arc::clone(&session));
        Self { session, bus }
    }

    /// Start receiving from the transport.
    pub fn run(&self, inbox: Inbox) -> JoinHandle<()> {
        self.bus.run(inbox)
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    /// Bind the session to the host's origin and envelope server id.
    ///
    /// Calls into the host become possible; messages from any other origin
    /// are dropped from now on.
    pub async fn associate(&self, origin: &str, envelope_server_id: &str) {
        self.session.write().await.associate(origin, envelope_server_id);
        info!(
            origin = %origin,
            envelope_server_id = %envelope_server_id,
            "Envelope associated"
        );
    }

    /// The association in effect, if any.
    pub async fn association(&self) -> Option<Association> {
        let session = self.session.read().await;
        if !session.is_associated() {
            return None;
        }
        Some(Association {
            origin: session.origin()?.to_string(),
            envelope_server_id: session.envelope_server_id()?.to_string(),
        })
    }

    pub async fn is_associated(&self) -> bool {
        self.session.read().await.is_associated()
    }

    pub async fn state(&self) -> SessionState {
        self.session.read().await.state()
    }

    /// Proxy for the host's Channel API.
    pub fn channel_api<C: ApiCall>(&self) -> ApiProxy<C> {
        ApiProxy::new(self.bus.clone())
    }

    /// Serve this envelope's API to the host.
    pub fn register_envelope_api<C, H>(&self, handler: Arc<H>)
    where
        C: ApiCall,
        H: ApiHandler<C>,
    {
        self.bus.register_api::<C, H>(handler);
    }

    /// Tear the session down, rejecting all pending Channel API calls.
    pub async fn teardown(&self) {
        self.bus.teardown().await;
    }
}
