//! Init / Handshake Sequence
//!
//! Single responsibility: Get a freshly mounted envelope and its host to agree on
//! `origin` and `envelopeServerId`.
//!
//! # Flow
//!
//! ```text
//! Host (EnvelopeServer)                         Embedded (EnvelopeClient)
//!   │ new(): fresh envelopeServerId                  │
//!   │ start_init_polling()                           │ (bundle still booting)
//!   │── init {origin, envelopeServerId} ───────X     │
//!   │      ... every poll interval ...               │ boots, registers Envelope API
//!   │── init {origin, envelopeServerId} ────────────►│ InitGuard::capture()
//!   │                                                │ associate(origin, id)
//!   │                                                │ view initialize + ready
//!   │◄──────────────────────────────── RESPONSE ─────│
//!   │ session Associated                             │
//! ```
//!
//! A second `init` reaching an associated envelope is answered without
//! re-running anything. If no attempt succeeds before the timeout the host gives up
//! with [`BridgeError::HandshakeTimeout`].

use futures_util::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::debug;

use crate::config::BridgeConfig;
use crate::error::BridgeError;

/// First argument of every `init` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Association {
    pub origin: String,
    pub envelope_server_id: String,
}

/// Lets exactly one `init` through.
#[derive(Debug, Default)]
pub struct InitGuard {
    captured: AtomicBool,
}

impl InitGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true for the first caller only.
    pub fn capture(&self) -> bool {
        !self.captured.swap(true, Ordering::SeqCst)
    }

    pub fn is_captured(&self) -> bool {
        self.captured.load(Ordering::SeqCst)
    }
}

/// How the host retries `init` while the envelope boots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitPolicy {
    pub interval: Duration,
    /// `None` waits forever
    pub timeout: Option<Duration>,
}

impl From<&BridgeConfig> for InitPolicy {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            interval: config.init_poll_interval(),
            timeout: config.init_timeout(),
        }
    }
}

/// Issue `init` attempts every `policy.interval` until one completes.
///
/// The first attempt to finish decides the outcome; the others are dropped,
/// which releases their pending requests. Transport failures and `UnknownMethod`
/// answers are retried on the next tick: the envelope may not be listening yet,
/// or its bus may be running before its Envelope API is registered.
pub async fn poll_init<F, Fut, T>(policy: &InitPolicy, mut attempt: F) -> Result<T, BridgeError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, BridgeError>>,
{
    let mut attempts = FuturesUnordered::new();
    let mut ticker = interval(policy.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let deadline = policy.timeout.map(|timeout| Instant::now() + timeout);
    let expired = async {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(expired);

    let mut sent = 0u32;
    loop {
        tokio::select! {
            _ = &mut expired => {
                let waited = policy.timeout.unwrap_or_default();
                return Err(BridgeError::HandshakeTimeout(waited));
            }
            Some(result) = attempts.next(), if !attempts.is_empty() => {
                match result {
                    Err(BridgeError::Transport(reason)) => {
                        debug!(reason = %reason, "Init attempt could not be delivered");
                    }
                    Err(BridgeError::UnknownMethod(method)) => {
                        debug!(method = %method, "Envelope API not registered yet");
                    }
                    other => return other,
                }
            }
            _ = ticker.tick() => {
                sent += 1;
                debug!(attempt = sent, "Sending init");
                attempts.push(attempt(sent));
            }
        }
    }
}
