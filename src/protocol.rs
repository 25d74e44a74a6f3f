//! Bridge Wire Protocol
//!
//! Single responsibility: Encode and decode bridge messages in their JSON wire format.
//!
//! # Wire Format
//!
//! ## Request
//! ```text
//! {
//!     "requestId": <u64>,             // Correlates the response
//!     "purpose": "REQUEST",
//!     "methodName": <string>,
//!     "args": [<value>, ...],
//!     "targetEnvelopeServerId": <string>   // optional
//! }
//! ```
//!
//! ## Response
//! ```text
//! {
//!     "requestId": <u64>,             // Matches the request
//!     "purpose": "RESPONSE",
//!     "methodName": <string>,
//!     "args": [],
//!     "result": <value>  |  "error": <value>    // exactly one
//! }
//! ```
//!
//! ## Notification
//! ```text
//! {
//!     "purpose": "NOTIFICATION",      // never carries "requestId"
//!     "methodName": <string>,
//!     "args": [<value>, ...]
//! }
//! ```

use serde_json::{json, Map, Value};

use crate::error::BridgeError;

/// Correlation identifier of a request and its response.
pub type RequestId = u64;

/// Error `kind` used when a request names a method nobody registered.
pub const UNKNOWN_METHOD_KIND: &str = "UnknownMethod";

/// Message discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    Request,
    Response,
    Notification,
}

impl Purpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Purpose::Request => "REQUEST",
            Purpose::Response => "RESPONSE",
            Purpose::Notification => "NOTIFICATION",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "REQUEST" => Some(Purpose::Request),
            "RESPONSE" => Some(Purpose::Response),
            "NOTIFICATION" => Some(Purpose::Notification),
            _ => None,
        }
    }
}

/// One unit exchanged over the transport.
///
/// The variants make the response invariants structural: a response carries
/// exactly one of `result`/`error` (the `outcome`), a notification has no id.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request {
        request_id: RequestId,
        method: String,
        args: Vec<Value>,
    },
    Response {
        request_id: RequestId,
        method: String,
        outcome: Result<Value, Value>,
    },
    Notification {
        method: String,
        args: Vec<Value>,
    },
}

impl Message {
    pub fn purpose(&self) -> Purpose {
        match self {
            Message::Request { .. } => Purpose::Request,
            Message::Response { .. } => Purpose::Response,
            Message::Notification { .. } => Purpose::Notification,
        }
    }

    pub fn method(&self) -> &str {
        match self {
            Message::Request { method, .. }
            | Message::Response { method, .. }
            | Message::Notification { method, .. } => method,
        }
    }

    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            Message::Request { request_id, .. } | Message::Response { request_id, .. } => {
                Some(*request_id)
            }
            Message::Notification { .. } => None,
        }
    }
}

/// A message plus its routing stamp.
#[derive(Debug, Clone, PartialEq)]
pub struct WireMessage {
    pub message: Message,
    /// Envelope server the message is addressed to / comes from, when known.
    pub target_envelope_server_id: Option<String>,
}

impl WireMessage {
    pub fn new(message: Message, target_envelope_server_id: Option<String>) -> Self {
        Self {
            message,
            target_envelope_server_id,
        }
    }
}

/// Encode a message into its JSON text form.
pub fn encode(wire: &WireMessage) -> Result<String, BridgeError> {
    let mut map = Map::new();

    if let Some(id) = wire.message.request_id() {
        map.insert("requestId".into(), json!(id));
    }
    map.insert("purpose".into(), json!(wire.message.purpose().as_str()));
    map.insert("methodName".into(), json!(wire.message.method()));

    match &wire.message {
        Message::Request { args, .. } | Message::Notification { args, .. } => {
            map.insert("args".into(), Value::Array(args.clone()));
        }
        Message::Response { outcome, .. } => {
            map.insert("args".into(), Value::Array(Vec::new()));
            match outcome {
                Ok(result) => map.insert("result".into(), result.clone()),
                Err(error) => map.insert("error".into(), error.clone()),
            };
        }
    }

    if let Some(id) = &wire.target_envelope_server_id {
        map.insert("targetEnvelopeServerId".into(), json!(id));
    }

    Ok(serde_json::to_string(&Value::Object(map))?)
}

/// Decode a message from its JSON text form.
///
/// Rejects anything that violates the wire invariants instead of guessing.
pub fn decode(data: &str) -> Result<WireMessage, BridgeError> {
    let value: Value = serde_json::from_str(data)
        .map_err(|e| BridgeError::Protocol(format!("Failed to decode message: {}", e)))?;

    let mut map = match value {
        Value::Object(map) => map,
        _ => return Err(BridgeError::Protocol("Message is not an object".into())),
    };

    let purpose = map
        .get("purpose")
        .and_then(Value::as_str)
        .ok_or_else(|| BridgeError::Protocol("Message missing 'purpose' field".into()))?;
    let purpose = Purpose::parse(purpose)
        .ok_or_else(|| BridgeError::Protocol(format!("Unknown purpose: {}", purpose)))?;

    let method = map
        .get("methodName")
        .and_then(Value::as_str)
        .ok_or_else(|| BridgeError::Protocol("Message missing 'methodName' field".into()))?
        .to_string();

    let request_id = match map.get("requestId") {
        None | Some(Value::Null) => None,
        Some(v) => Some(v.as_u64().ok_or_else(|| {
            BridgeError::Protocol(format!("Invalid 'requestId' field: {}", v))
        })?),
    };

    let args = match map.remove("args") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(args)) => args,
        Some(other) => {
            return Err(BridgeError::Protocol(format!(
                "'args' must be an array, got {}",
                other
            )))
        }
    };

    let target_envelope_server_id = match map.get("targetEnvelopeServerId") {
        None | Some(Value::Null) => None,
        Some(Value::String(id)) => Some(id.clone()),
        Some(other) => {
            return Err(BridgeError::Protocol(format!(
                "Invalid 'targetEnvelopeServerId' field: {}",
                other
            )))
        }
    };

    let message = match purpose {
        Purpose::Request => Message::Request {
            request_id: request_id
                .ok_or_else(|| BridgeError::Protocol("Request missing 'requestId' field".into()))?,
            method,
            args,
        },
        Purpose::Response => {
            let request_id = request_id.ok_or_else(|| {
                BridgeError::Protocol("Response missing 'requestId' field".into())
            })?;
            let outcome = match (map.remove("result"), map.remove("error")) {
                (Some(result), None) => Ok(result),
                (None, Some(error)) => Err(error),
                (Some(_), Some(_)) => {
                    return Err(BridgeError::Protocol(
                        "Response carries both 'result' and 'error'".into(),
                    ))
                }
                (None, None) => {
                    return Err(BridgeError::Protocol(
                        "Response carries neither 'result' nor 'error'".into(),
                    ))
                }
            };
            Message::Response {
                request_id,
                method,
                outcome,
            }
        }
        Purpose::Notification => {
            if request_id.is_some() {
                return Err(BridgeError::Protocol(
                    "Notification must not carry 'requestId'".into(),
                ));
            }
            if map.contains_key("result") || map.contains_key("error") {
                return Err(BridgeError::Protocol(
                    "Notification must not carry a response".into(),
                ));
            }
            Message::Notification { method, args }
        }
    };

    Ok(WireMessage {
        message,
        target_envelope_server_id,
    })
}

/// Error payload sent back for a request nobody handles.
pub fn unknown_method_error(method: &str) -> Value {
    json!({
        "kind": UNKNOWN_METHOD_KIND,
        "method": method,
        "message": format!("No handler registered for '{}'", method),
    })
}

/// Recognize an error payload produced by [`unknown_method_error`].
pub fn parse_unknown_method(error: &Value) -> Option<String> {
    if error.get("kind").and_then(Value::as_str) != Some(UNKNOWN_METHOD_KIND) {
        return None;
    }
    error
        .get("method")
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(id: RequestId) -> WireMessage {
        WireMessage::new(
            Message::Request {
                request_id: id,
                method: "processDetailsQuery".into(),
                args: vec![json!("id-42")],
            },
            Some("server-1".into()),
        )
    }

    #[test]
    fn test_request_wire_shape() {
        let text = encode(&request(7)).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["requestId"], 7);
        assert_eq!(value["purpose"], "REQUEST");
        assert_eq!(value["methodName"], "processDetailsQuery");
        assert_eq!(value["args"], json!(["id-42"]));
        assert_eq!(value["targetEnvelopeServerId"], "server-1");
        assert!(value.get("result").is_none());
    }

    #[test]
    fn test_decode_request() {
        let decoded = decode(&encode(&request(3)).unwrap()).unwrap();
        assert_eq!(decoded, request(3));
    }

    #[test]
    fn test_null_result_is_a_result() {
        let text = r#"{"requestId":1,"purpose":"RESPONSE","methodName":"handleProcessAbort","args":[],"result":null}"#;
        let decoded = decode(text).unwrap();
        assert_eq!(
            decoded.message,
            Message::Response {
                request_id: 1,
                method: "handleProcessAbort".into(),
                outcome: Ok(Value::Null),
            }
        );
    }

    #[test]
    fn test_error_response() {
        let text = r#"{"requestId":4,"purpose":"RESPONSE","methodName":"cancelJob","error":{"message":"nope"}}"#;
        let decoded = decode(text).unwrap();
        assert_eq!(
            decoded.message,
            Message::Response {
                request_id: 4,
                method: "cancelJob".into(),
                outcome: Err(json!({ "message": "nope" })),
            }
        );
    }

    #[test]
    fn test_response_with_both_result_and_error_rejected() {
        let text = r#"{"requestId":4,"purpose":"RESPONSE","methodName":"x","result":1,"error":2}"#;
        assert!(matches!(decode(text), Err(BridgeError::Protocol(_))));
    }

    #[test]
    fn test_response_with_neither_rejected() {
        let text = r#"{"requestId":4,"purpose":"RESPONSE","methodName":"x"}"#;
        assert!(matches!(decode(text), Err(BridgeError::Protocol(_))));
    }

    #[test]
    fn test_notification_with_request_id_rejected() {
        let text = r#"{"requestId":4,"purpose":"NOTIFICATION","methodName":"x","args":[]}"#;
        assert!(matches!(decode(text), Err(BridgeError::Protocol(_))));
    }

    #[test]
    fn test_request_without_id_rejected() {
        let text = r#"{"purpose":"REQUEST","methodName":"x","args":[]}"#;
        assert!(matches!(decode(text), Err(BridgeError::Protocol(_))));
    }

    #[test]
    fn test_unknown_purpose_rejected() {
        let text = r#"{"requestId":1,"purpose":"PING","methodName":"x"}"#;
        assert!(matches!(decode(text), Err(BridgeError::Protocol(_))));
        assert!(matches!(decode("[1,2]"), Err(BridgeError::Protocol(_))));
        assert!(matches!(decode("not json"), Err(BridgeError::Protocol(_))));
    }

    #[test]
    fn test_unknown_method_payload() {
        let error = unknown_method_error("doesNotExist");
        assert_eq!(parse_unknown_method(&error).as_deref(), Some("doesNotExist"));
        assert_eq!(parse_unknown_method(&json!({ "message": "business" })), None);
    }
}
