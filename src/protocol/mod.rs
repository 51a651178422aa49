//! Wire contract with the detection backend.
//!
//! Outbound frames are detection requests and `ping`/`pong` control
//! messages. Inbound frames are either control messages (carrying a `type`
//! field) or detection responses (no `type` field).

use crate::ppe::{Detection, PpeStatus};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors decoding or encoding wire messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("invalid detection payload: {0}")]
    InvalidDetection(String),

    #[error("failed to encode message: {0}")]
    Encode(String),
}

/// Frame submitted for detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRequest {
    /// `data:image/jpeg;base64,...` URI
    pub image: String,
    /// Minimum confidence the backend should report
    pub confidence: f32,
}

impl DetectionRequest {
    pub fn new(image: String, confidence: f32) -> Self {
        Self { image, confidence }
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }
}

/// Control messages exchanged outside the detection flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlMessage {
    Ping,
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<i64>,
    },
}

impl ControlMessage {
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Heartbeat sent by the client.
    pub fn ping() -> Self {
        ControlMessage::Ping
    }

    /// Reply to a server ping, stamped with unix milliseconds.
    pub fn pong_now() -> Self {
        ControlMessage::Pong {
            timestamp: Some(chrono::Utc::now().timestamp_millis()),
        }
    }
}

/// Detection result for one submitted frame.
///
/// Every field is optional on the wire so that incomplete payloads (and
/// server error objects) still decode; validation happens during
/// reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResponse {
    #[serde(default, alias = "ppeStatus")]
    pub ppe_status: Option<PpeStatus>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub detections: Vec<Detection>,
    #[serde(default, alias = "isCompliant")]
    pub is_compliant: Option<bool>,
    #[serde(default, alias = "hasPerson")]
    pub has_person: Option<bool>,
    /// Backend processing time in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<f64>,
    /// Error reported by the backend instead of a result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DetectionResponse {
    /// Whether a subject was present; absent means yes.
    pub fn has_person(&self) -> bool {
        self.has_person.unwrap_or(true)
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Detection>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<Detection>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Kind of a control message received from the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlKind {
    Connected,
    Processing,
    Ping,
    Pong,
    Other(String),
}

impl ControlKind {
    fn from_type(kind: &str) -> Self {
        match kind {
            "connected" => ControlKind::Connected,
            "processing" => ControlKind::Processing,
            "ping" => ControlKind::Ping,
            "pong" => ControlKind::Pong,
            other => ControlKind::Other(other.to_string()),
        }
    }
}

/// Classified inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Control(ControlKind),
    Detection(Box<DetectionResponse>),
}

/// Classify an inbound text frame.
///
/// A string `type` field marks a control message; anything else is decoded
/// as a detection response.
pub fn parse_inbound(text: &str) -> Result<InboundMessage, ProtocolError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;

    let object = match &value {
        serde_json::Value::Object(map) => map,
        serde_json::Value::Array(_) => return Err(ProtocolError::NotAnObject("array")),
        serde_json::Value::String(_) => return Err(ProtocolError::NotAnObject("string")),
        serde_json::Value::Number(_) => return Err(ProtocolError::NotAnObject("number")),
        serde_json::Value::Bool(_) => return Err(ProtocolError::NotAnObject("bool")),
        serde_json::Value::Null => return Err(ProtocolError::NotAnObject("null")),
    };

    if let Some(kind) = object.get("type").and_then(|t| t.as_str()) {
        return Ok(InboundMessage::Control(ControlKind::from_type(kind)));
    }

    serde_json::from_value::<DetectionResponse>(value)
        .map(|response| InboundMessage::Detection(Box::new(response)))
        .map_err(|e| ProtocolError::InvalidDetection(e.to_string()))
}
