//! Configuration for envelope-bridge

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::BridgeError;

/// Bridge configuration, shared by both sides of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Origin of the host page. Sent to the envelope during `init`.
    #[serde(default = "default_host_origin")]
    pub host_origin: String,

    /// Target origin the host uses when posting to the envelope ("*" = any)
    #[serde(default = "default_envelope_target_origin")]
    pub envelope_target_origin: String,

    /// Interval between init attempts while the envelope boots
    #[serde(default = "default_init_poll_interval_ms")]
    pub init_poll_interval_ms: u64,

    /// Give up on the handshake after this long (0 = wait forever)
    #[serde(default = "default_init_timeout_ms")]
    pub init_timeout_ms: u64,

    /// Capacity of the inbound message queue of a transport
    #[serde(default = "default_inbox_capacity")]
    pub inbox_capacity: usize,
}

fn default_host_origin() -> String {
    "http://localhost:8080".to_string()
}

fn default_envelope_target_origin() -> String {
    "*".to_string()
}

fn default_init_poll_interval_ms() -> u64 {
    100
}

fn default_init_timeout_ms() -> u64 {
    10_000
}

fn default_inbox_capacity() -> usize {
    256
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host_origin: default_host_origin(),
            envelope_target_origin: default_envelope_target_origin(),
            init_poll_interval_ms: default_init_poll_interval_ms(),
            init_timeout_ms: default_init_timeout_ms(),
            inbox_capacity: default_inbox_capacity(),
        }
    }
}

impl BridgeConfig {
    /// Load config from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, BridgeError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| BridgeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), BridgeError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| BridgeError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the handshake cannot work with.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.host_origin.is_empty() {
            return Err(BridgeError::Config("host_origin must not be empty".into()));
        }
        if self.init_poll_interval_ms == 0 {
            return Err(BridgeError::Config(
                "init_poll_interval_ms must be greater than zero".into(),
            ));
        }
        if self.inbox_capacity == 0 {
            return Err(BridgeError::Config(
                "inbox_capacity must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn init_poll_interval(&self) -> Duration {
        Duration::from_millis(self.init_poll_interval_ms)
    }

    /// `None` when the handshake is allowed to wait forever.
    pub fn init_timeout(&self) -> Option<Duration> {
        (self.init_timeout_ms > 0).then(|| Duration::from_millis(self.init_timeout_ms))
    }
}
