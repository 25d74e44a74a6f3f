//! WebSocket transport
//!
//! Carries bridge messages to an envelope running in another process.
//! Each frame is a JSON text message:
//!
//! ```text
//! {
//!     "origin": <string>,        // sender origin
//!     "targetOrigin": <string>,  // "*" or the receiver origin
//!     "payload": <string>        // serialized bridge message
//! }
//! ```
//!
//! The reader task applies the same target-origin rule as `postMessage` and
//! forwards accepted payloads to the [`Inbox`]. When the socket closes the
//! inbox closes with it.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::{target_matches, Inbox, Posted, Transport};
use crate::error::BridgeError;

/// One WebSocket text frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Frame {
    origin: String,
    target_origin: String,
    payload: String,
}

/// Sending half of a WebSocket connection.
pub struct WebSocketTransport<S> {
    own_origin: String,
    sink: Arc<Mutex<SplitSink<WebSocketStream<S>, Message>>>,
}

impl<S> WebSocketTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Wrap an established WebSocket.
    ///
    /// Spawns the reader task and returns it alongside the transport and its inbox.
    pub fn from_stream(
        ws: WebSocketStream<S>,
        own_origin: &str,
        capacity: usize,
    ) -> (Self, Inbox, JoinHandle<()>) {
        let (sink, stream) = ws.split();
        let (tx, inbox) = mpsc::channel(capacity);

        let origin = own_origin.to_string();
        let reader = tokio::spawn(async move {
            reader_loop(stream, origin, tx).await;
        });

        let transport = Self {
            own_origin: own_origin.to_string(),
            sink: Arc::new(Mutex::new(sink)),
        };
        (transport, inbox, reader)
    }

    /// Send a close frame to the peer.
    pub async fn close(&self) -> Result<(), BridgeError> {
        self.sink
            .lock()
            .await
            .close()
            .await
            .map_err(|e| BridgeError::Transport(format!("Failed to close: {}", e)))
    }
}

/// Connect to an envelope WebSocket endpoint.
pub async fn connect(
    url: &str,
    own_origin: &str,
    capacity: usize,
) -> Result<
    (
        WebSocketTransport<MaybeTlsStream<TcpStream>>,
        Inbox,
        JoinHandle<()>,
    ),
    BridgeError,
> {
    debug!(url = %url, "Connecting to WebSocket");

    let (ws, _) = connect_async(url)
        .await
        .map_err(|e| BridgeError::Transport(format!("WebSocket connect failed: {}", e)))?;

    info!(url = %url, "WebSocket connected");
    Ok(WebSocketTransport::from_stream(ws, own_origin, capacity))
}

#[async_trait::async_trait]
impl<S> Transport for WebSocketTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn post(&self, data: String, target_origin: &str) -> Result<(), BridgeError> {
        let frame = Frame {
            origin: self.own_origin.clone(),
            target_origin: target_origin.to_string(),
            payload: data,
        };
        let text = serde_json::to_string(&frame)?;

        self.sink
            .lock()
            .await
            .send(Message::Text(text))
            .await
            .map_err(|e| BridgeError::Transport(format!("Failed to send: {}", e)))
    }
}

/// Reader loop - runs in a spawned task.
async fn reader_loop<S>(
    mut stream: SplitStream<WebSocketStream<S>>,
    own_origin: String,
    tx: mpsc::Sender<Posted>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    debug!("WebSocket reader started");

    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let frame: Frame = match serde_json::from_str(&text) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(error = %e, "Dropping malformed frame");
                        continue;
                    }
                };

                if !target_matches(&frame.target_origin, &own_origin) {
                    debug!(
                        target_origin = %frame.target_origin,
                        "Dropping frame for a different origin"
                    );
                    continue;
                }

                let posted = Posted {
                    origin: frame.origin,
                    data: frame.payload,
                };
                if tx.send(posted).await.is_err() {
                    debug!("Inbox dropped, stopping reader");
                    break;
                }
            }
            Ok(Message::Close(frame)) => {
                info!(frame = ?frame, "Peer closed WebSocket");
                break;
            }
            Ok(_) => {
                // Binary, ping and pong frames carry no bridge traffic
            }
            Err(e) => {
                error!(error = %e, "WebSocket error");
                break;
            }
        }
    }

    debug!("WebSocket reader ended");
}
