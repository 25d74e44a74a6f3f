//! Bridge Session
//!
//! Single responsibility: Track the binding between one envelope instance and its host,
//! and decide which inbound messages that binding admits.
//!
//! A session is owned by one side only. The host creates one per Envelope Server,
//! the embedded widget creates one per Envelope Client; they never share the object,
//! they only agree on `envelope_server_id` and `origin` through the handshake.
//!
//! # State Machine
//!
//! ```text
//! Unassociated ──► Associating ──► Associated
//!       │               │               │
//!       └───────────────┴───────────────┴──► TornDown
//! ```

use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::BridgeError;
use crate::transport::ANY_ORIGIN;

/// Which side of the bridge a session belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Host application (Envelope Server)
    Channel,
    /// Embedded widget (Envelope Client)
    Envelope,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unassociated,
    Associating,
    Associated,
    TornDown,
}

/// Why an inbound message was not admitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    OriginMismatch { expected: String, actual: String },
    EnvelopeServerMismatch { expected: String, actual: Option<String> },
    TornDown,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::OriginMismatch { expected, actual } => {
                write!(f, "origin mismatch (expected {}, got {})", expected, actual)
            }
            Rejection::EnvelopeServerMismatch { expected, actual } => write!(
                f,
                "envelope server mismatch (expected {}, got {:?})",
                expected, actual
            ),
            Rejection::TornDown => write!(f, "session torn down"),
        }
    }
}

/// Where outbound requests and notifications go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub target_origin: String,
    pub envelope_server_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Session {
    side: Side,
    envelope_server_id: Option<String>,
    /// Host origin
    origin: Option<String>,
    /// Target origin the host posts to (host side only)
    envelope_target_origin: Option<String>,
    state: SessionState,
}

/// A session shared within one side.
pub type SharedSession = Arc<RwLock<Session>>;

impl Session {
    /// Session of a freshly constructed Envelope Server.
    pub fn for_server(
        envelope_server_id: impl Into<String>,
        host_origin: impl Into<String>,
        envelope_target_origin: impl Into<String>,
    ) -> Self {
        Self {
            side: Side::Channel,
            envelope_server_id: Some(envelope_server_id.into()),
            origin: Some(host_origin.into()),
            envelope_target_origin: Some(envelope_target_origin.into()),
            state: SessionState::Unassociated,
        }
    }

    /// Session of a freshly booted Envelope Client; nothing is known yet.
    pub fn for_client() -> Self {
        Self {
            side: Side::Envelope,
            envelope_server_id: None,
            origin: None,
            envelope_target_origin: None,
            state: SessionState::Unassociated,
        }
    }

    pub fn shared(self) -> SharedSession {
        Arc::new(RwLock::new(self))
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn envelope_server_id(&self) -> Option<&str> {
        self.envelope_server_id.as_deref()
    }

    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    pub fn is_associated(&self) -> bool {
        self.state == SessionState::Associated
    }

    pub fn is_torn_down(&self) -> bool {
        self.state == SessionState::TornDown
    }

    /// Host side: the init request is on its way.
    pub fn begin_association(&mut self) {
        if self.state == SessionState::Unassociated {
            self.state = SessionState::Associating;
        }
    }

    /// Host side: the envelope answered `init`.
    pub fn mark_associated(&mut self) {
        if self.state != SessionState::TornDown {
            self.state = SessionState::Associated;
        }
    }

    /// Embedded side: bind to the host's origin and envelope server id.
    ///
    /// From now on only messages from `origin` are admitted.
    pub fn associate(&mut self, origin: impl Into<String>, envelope_server_id: impl Into<String>) {
        if self.state == SessionState::TornDown {
            return;
        }
        self.origin = Some(origin.into());
        self.envelope_server_id = Some(envelope_server_id.into());
        self.state = SessionState::Associated;
    }

    pub fn tear_down(&mut self) {
        self.state = SessionState::TornDown;
    }

    /// Decide whether an inbound message may be dispatched.
    ///
    /// * host side: the message must be addressed to this envelope server and, unless
    ///   the host posts to `"*"`, come from the envelope's origin
    /// * embedded side, before association: everything is admitted (the first `init`
    ///   must get through)
    /// * embedded side, once associated: the origin must match and, when the message
    ///   names an envelope server, it must be ours
    pub fn admit(&self, origin: &str, target_envelope_server_id: Option<&str>) -> Result<(), Rejection> {
        if self.state == SessionState::TornDown {
            return Err(Rejection::TornDown);
        }

        match self.side {
            Side::Channel => {
                if let Some(envelope_origin) = self.envelope_target_origin.as_deref() {
                    if envelope_origin != ANY_ORIGIN && origin != envelope_origin {
                        return Err(Rejection::OriginMismatch {
                            expected: envelope_origin.to_string(),
                            actual: origin.to_string(),
                        });
                    }
                }
                let expected = self.envelope_server_id.as_deref().unwrap_or_default();
                if target_envelope_server_id != Some(expected) {
                    return Err(Rejection::EnvelopeServerMismatch {
                        expected: expected.to_string(),
                        actual: target_envelope_server_id.map(str::to_string),
                    });
                }
                Ok(())
            }
            Side::Envelope => {
                if !self.is_associated() {
                    return Ok(());
                }
                let expected = self.origin.as_deref().unwrap_or_default();
                if origin != expected {
                    return Err(Rejection::OriginMismatch {
                        expected: expected.to_string(),
                        actual: origin.to_string(),
                    });
                }
                if let (Some(actual), Some(expected)) =
                    (target_envelope_server_id, self.envelope_server_id.as_deref())
                {
                    if actual != expected {
                        return Err(Rejection::EnvelopeServerMismatch {
                            expected: expected.to_string(),
                            actual: Some(actual.to_string()),
                        });
                    }
                }
                Ok(())
            }
        }
    }

    /// Addressing for requests and notifications originated by this side.
    pub fn outbound(&self) -> Result<Outbound, BridgeError> {
        if self.state == SessionState::TornDown {
            return Err(BridgeError::TornDown);
        }

        match self.side {
            Side::Channel => Ok(Outbound {
                target_origin: self
                    .envelope_target_origin
                    .clone()
                    .unwrap_or_else(|| ANY_ORIGIN.to_string()),
                envelope_server_id: self.envelope_server_id.clone(),
            }),
            Side::Envelope => match (&self.origin, self.is_associated()) {
                (Some(origin), true) => Ok(Outbound {
                    target_origin: origin.clone(),
                    envelope_server_id: self.envelope_server_id.clone(),
                }),
                _ => Err(BridgeError::NotAssociated),
            },
        }
    }
}
