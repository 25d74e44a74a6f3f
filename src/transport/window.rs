//! In-process window transport
//!
//! Two connected endpoints standing in for a host page and the frame it embeds.
//! Each endpoint knows its own origin and delivers into the peer's inbox.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use super::{target_matches, Inbox, Posted, Transport};
use crate::error::BridgeError;

/// Sending half of one window endpoint.
#[derive(Clone)]
pub struct WindowTransport {
    own_origin: String,
    peer_origin: String,
    peer_tx: mpsc::Sender<Posted>,
}

impl WindowTransport {
    pub fn own_origin(&self) -> &str {
        &self.own_origin
    }

    pub fn peer_origin(&self) -> &str {
        &self.peer_origin
    }
}

#[async_trait]
impl Transport for WindowTransport {
    async fn post(&self, data: String, target_origin: &str) -> Result<(), BridgeError> {
        if !target_matches(target_origin, &self.peer_origin) {
            debug!(
                target_origin = %target_origin,
                peer_origin = %self.peer_origin,
                "Dropping message for a different origin"
            );
            return Ok(());
        }

        self.peer_tx
            .send(Posted {
                origin: self.own_origin.clone(),
                data,
            })
            .await
            .map_err(|_| BridgeError::Transport("Peer window closed".into()))
    }
}

/// Create a connected host/envelope window pair.
///
/// Returns `((host_transport, host_inbox), (envelope_transport, envelope_inbox))`.
pub fn window_pair(
    host_origin: &str,
    envelope_origin: &str,
    capacity: usize,
) -> ((WindowTransport, Inbox), (WindowTransport, Inbox)) {
    let (host_tx, host_inbox) = mpsc::channel(capacity);
    let (envelope_tx, envelope_inbox) = mpsc::channel(capacity);

    let host = WindowTransport {
        own_origin: host_origin.to_string(),
        peer_origin: envelope_origin.to_string(),
        peer_tx: envelope_tx,
    };
    let envelope = WindowTransport {
        own_origin: envelope_origin.to_string(),
        peer_origin: host_origin.to_string(),
        peer_tx: host_tx,
    };

    ((host, host_inbox), (envelope, envelope_inbox))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_post_stamps_sender_origin() {
        let ((host, _host_inbox), (_envelope, mut envelope_inbox)) =
            window_pair("https://host", "https://envelope", 8);

        host.post("hello".into(), "https://envelope").await.unwrap();

        let posted = envelope_inbox.recv().await.unwrap();
        assert_eq!(posted.origin, "https://host");
        assert_eq!(posted.data, "hello");
    }

    #[tokio::test]
    async fn test_wildcard_target() {
        let ((_host, mut host_inbox), (envelope, _envelope_inbox)) =
            window_pair("https://host", "https://envelope", 8);

        envelope.post("hi".into(), "*").await.unwrap();
        assert_eq!(host_inbox.recv().await.unwrap().origin, "https://envelope");
    }

    #[tokio::test]
    async fn test_wrong_target_origin_is_dropped() {
        let ((host, _host_inbox), (_envelope, mut envelope_inbox)) =
            window_pair("https://host", "https://envelope", 8);

        host.post("secret".into(), "https://other").await.unwrap();
        host.post("public".into(), "*").await.unwrap();

        // Only the second message arrives
        assert_eq!(envelope_inbox.recv().await.unwrap().data, "public");
        assert!(envelope_inbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_peer_is_an_error() {
        let ((host, _host_inbox), (_envelope, envelope_inbox)) =
            window_pair("https://host", "https://envelope", 8);
        drop(envelope_inbox);

        let result = host.post("late".into(), "*").await;
        assert!(matches!(result, Err(BridgeError::Transport(_))));
    }
}
