//! Envelope Server
//!
//! Runs inside the host page, one per mounted envelope. Exposes the Envelope API
//! proxy, serves the Channel API (usually through a driver adapter) and drives
//! the init handshake.

use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::{ApiCall, ApiHandler, ApiProxy};
use crate::bus::MessageBus;
use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::handshake::{poll_init, Association, InitPolicy};
use crate::session::{Session, SessionState, SharedSession};
use crate::transport::{Inbox, Transport};

/// Host side of one session.
pub struct EnvelopeServer {
    id: String,
    config: BridgeConfig,
    session: SharedSession,
    bus: MessageBus,
}

impl EnvelopeServer {
    /// Create a server with a fresh envelope server id.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(transport: Arc<dyn Transport>, config: BridgeConfig) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), transport, config)
    }

    /// Create a server with a caller-chosen envelope server id.
    pub fn with_id(id: impl Into<String>, transport: Arc<dyn Transport>, config: BridgeConfig) -> Self {
        let id = id.into();
        let session = Session::for_server(
            id.clone(),
            config.host_origin.clone(),
            config.envelope_target_origin.clone(),
        )
        .shared();
        let bus = MessageBus::new("channel", transport, Arc::clone(&session));

        info!(envelope_server_id = %id, host_origin = %config.host_origin, "Envelope server created");

        Self {
            id,
            config,
            session,
            bus,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    /// Start receiving from the transport.
    pub fn run(&self, inbox: Inbox) -> JoinHandle<()> {
        self.bus.run(inbox)
    }

    /// Handshake payload identifying this server.
    pub fn association(&self) -> Association {
        Association {
            origin: self.config.host_origin.clone(),
            envelope_server_id: self.id.clone(),
        }
    }

    pub async fn state(&self) -> SessionState {
        self.session.read().await.state()
    }

    /// Proxy for the envelope's API.
    pub fn envelope_api<C: ApiCall>(&self) -> ApiProxy<C> {
        ApiProxy::new(self.bus.clone())
    }

    /// Serve the Channel API to the envelope.
    pub fn register_channel_api<C, H>(&self, handler: Arc<H>)
    where
        C: ApiCall,
        H: ApiHandler<C>,
    {
        self.bus.register_api::<C, H>(handler);
    }

    /// Run the init handshake.
    ///
    /// `attempt` sends one `init` request for the given association; it is called
    /// once per poll interval until an attempt completes.
    ///
    /// Any failure is terminal: the server is torn down before the error is returned.
    ///
    /// # Errors
    /// - `HandshakeTimeout` when no attempt completes in time
    /// - `TornDown` when the server is torn down while polling
    /// - whatever error the envelope's `init` handler answered with
    pub async fn start_init_polling<F, Fut, T>(&self, mut attempt: F) -> Result<T, BridgeError>
    where
        F: FnMut(Association) -> Fut,
        Fut: Future<Output = Result<T, BridgeError>>,
    {
        self.session.write().await.begin_association();

        let policy = InitPolicy::from(&self.config);
        let association = self.association();

        info!(
            envelope_server_id = %self.id,
            interval = ?policy.interval,
            timeout = ?policy.timeout,
            "Starting envelope init polling"
        );

        match poll_init(&policy, |_| attempt(association.clone())).await {
            Ok(value) => {
                self.session.write().await.mark_associated();
                info!(envelope_server_id = %self.id, "Envelope initialized");
                Ok(value)
            }
            Err(e @ BridgeError::HandshakeTimeout(_)) => {
                warn!(envelope_server_id = %self.id, error = %e, "Envelope init timed out");
                self.teardown().await;
                Err(e)
            }
            Err(e) => {
                warn!(envelope_server_id = %self.id, error = %e, "Envelope init failed");
                self.teardown().await;
                Err(e)
            }
        }
    }

    /// Tear the session down, e.g. when the container unmounts.
    pub async fn teardown(&self) {
        info!(envelope_server_id = %self.id, "Tearing down envelope server");
        self.bus.teardown().await;
    }
}
