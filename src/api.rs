//! API Surface Declarations
//!
//! An API surface is the set of methods one side exposes to the other. Each surface
//! is a plain enum with one variant per method, implementing [`ApiCall`]:
//!
//! - the wire stays name-based (`methodName` + positional `args`)
//! - dispatch is an explicit `match` in the surface's `from_wire`
//! - [`ApiProxy`] turns a typed call into `request`/`notify` on the bus
//! - [`ApiHandler`] receives decoded calls on the implementing side
//!
//! ```ignore
//! // Host side: call into the envelope
//! let envelope_api: ApiProxy<ProcessDetailsEnvelopeCall> = server.envelope_api();
//!
//! // Host side: serve the envelope's calls through a driver
//! server.register_channel_api::<ProcessDetailsChannelCall, _>(Arc::new(adapter));
//! ```

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::marker::PhantomData;

use crate::bus::MessageBus;
use crate::error::BridgeError;

/// Whether a method expects a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Request,
    Notification,
}

/// One typed call on an API surface.
pub trait ApiCall: Sized + Send + 'static {
    /// Every method of the surface with its kind.
    const METHODS: &'static [(&'static str, CallKind)];

    /// Wire name of this call.
    fn method(&self) -> &'static str;

    /// Positional wire arguments of this call.
    fn into_args(self) -> Result<Vec<Value>, BridgeError>;

    /// Decode a call received from the wire.
    fn from_wire(method: &str, args: Vec<Value>) -> Result<Self, BridgeError>;

    fn kind_of(method: &str) -> Option<CallKind> {
        Self::METHODS
            .iter()
            .find(|(name, _)| *name == method)
            .map(|(_, kind)| *kind)
    }
}

/// Implementation of a surface on the receiving side.
///
/// `Ok` becomes the response `result`, `Err` the response `error`.
/// For notifications the returned value is discarded.
#[async_trait]
pub trait ApiHandler<C: ApiCall>: Send + Sync + 'static {
    async fn handle(&self, call: C) -> Result<Value, Value>;
}

/// Positional argument reader used by `from_wire` implementations.
pub struct Args {
    method: String,
    values: std::vec::IntoIter<Value>,
    position: usize,
}

impl Args {
    pub fn new(method: &str, values: Vec<Value>) -> Self {
        Self {
            method: method.to_string(),
            values: values.into_iter(),
            position: 0,
        }
    }

    /// Decode the next argument. A missing argument decodes from `null`,
    /// so optional parameters may be omitted by the caller.
    pub fn next<T: DeserializeOwned>(&mut self) -> Result<T, BridgeError> {
        let position = self.position;
        self.position += 1;
        let value = self.values.next().unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(|e| BridgeError::InvalidArguments {
            method: self.method.clone(),
            reason: format!("argument {}: {}", position, e),
        })
    }
}

/// Encode one positional argument.
pub fn arg<T: Serialize>(value: &T) -> Result<Value, BridgeError> {
    Ok(serde_json::to_value(value)?)
}

/// Encode a handler's return value as a response `result`.
pub fn to_result<T: Serialize>(value: &T) -> Result<Value, Value> {
    serde_json::to_value(value).map_err(|e| {
        serde_json::json!({
            "kind": "SerializationError",
            "message": e.to_string(),
        })
    })
}

/// Unknown method name on a typed surface.
pub fn unknown(method: &str) -> BridgeError {
    BridgeError::UnknownMethod(method.to_string())
}

/// Typed client for the other side's surface.
pub struct ApiProxy<C> {
    bus: MessageBus,
    _surface: PhantomData<fn() -> C>,
}

impl<C> Clone for ApiProxy<C> {
    fn clone(&self) -> Self {
        Self {
            bus: self.bus.clone(),
            _surface: PhantomData,
        }
    }
}

impl<C: ApiCall> ApiProxy<C> {
    pub fn new(bus: MessageBus) -> Self {
        Self {
            bus,
            _surface: PhantomData,
        }
    }

    /// Issue a call. Notifications resolve to `null` as soon as they are posted.
    pub async fn call(&self, call: C) -> Result<Value, BridgeError> {
        let method = call.method();
        let kind = C::kind_of(method).ok_or_else(|| unknown(method))?;
        let args = call.into_args()?;

        match kind {
            CallKind::Request => self.bus.request(method, args).await,
            CallKind::Notification => {
                self.bus.notify(method, args).await?;
                Ok(Value::Null)
            }
        }
    }

    /// Issue a request and decode its result.
    pub async fn request<T: DeserializeOwned>(&self, call: C) -> Result<T, BridgeError> {
        let value = self.call(call).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Issue a notification.
    pub async fn notify(&self, call: C) -> Result<(), BridgeError> {
        self.call(call).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_args_decode_in_order() {
        let mut args = Args::new("rescheduleJob", vec![json!("job-1"), json!(30), json!(null)]);
        let id: String = args.next().unwrap();
        let interval: u64 = args.next().unwrap();
        let limit: Option<u32> = args.next().unwrap();
        let missing: Option<String> = args.next().unwrap();

        assert_eq!(id, "job-1");
        assert_eq!(interval, 30);
        assert_eq!(limit, None);
        assert_eq!(missing, None);
    }

    #[test]
    fn test_args_report_position() {
        let mut args = Args::new("jobsQuery", vec![json!(42)]);
        match args.next::<String>() {
            Err(BridgeError::InvalidArguments { method, reason }) => {
                assert_eq!(method, "jobsQuery");
                assert!(reason.starts_with("argument 0"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
