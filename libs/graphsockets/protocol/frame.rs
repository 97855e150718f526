//! Protocol-neutral frames
//!
//! Both frame vocabularies share the same envelope
//! `{"type": ..., "id": ..., "payload": ...}`; codecs map the `type`
//! discriminator onto these enums.

use serde_json::{Map, Value};
use thiserror::Error;

/// Frames the client sends
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    /// Open the handshake
    ConnectionInit { payload: Option<Value> },
    /// Start an operation (`start` / `subscribe`)
    Start { id: String, payload: Value },
    /// Stop an operation (`stop` / `complete`)
    Stop { id: String },
    Ping { payload: Option<Value> },
    Pong { payload: Option<Value> },
    /// Orderly connection shutdown
    ConnectionTerminate,
}

/// Frames the server sends
#[derive(Debug, Clone, PartialEq)]
pub enum ServerFrame {
    ConnectionAck { payload: Option<Value> },
    ConnectionError { payload: Option<Value> },
    KeepAlive,
    Ping { payload: Option<Value> },
    Pong { payload: Option<Value> },
    /// Operation result (`data` / `next`)
    Data { id: String, payload: Value },
    /// Operation failure; payload shape differs per vocabulary
    Error { id: String, payload: Value },
    Complete { id: String },
    /// A well-formed frame this vocabulary does not allow from a server
    Unexpected {
        kind: String,
        id: Option<String>,
        payload: Option<Value>,
    },
}

impl ServerFrame {
    /// Operation identifier, if the frame is scoped to one operation
    pub fn operation_id(&self) -> Option<&str> {
        match self {
            ServerFrame::Data { id, .. }
            | ServerFrame::Error { id, .. }
            | ServerFrame::Complete { id } => Some(id),
            ServerFrame::Unexpected { id, .. } => id.as_deref(),
            _ => None,
        }
    }
}

/// Frame-level decode failure
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame is not a JSON object")]
    NotAnObject,

    #[error("frame has no type discriminator")]
    MissingType,

    #[error("'{0}' frame has no operation id")]
    MissingId(String),
}

/// Envelope shared by both vocabularies
#[derive(Debug)]
pub(crate) struct RawFrame {
    pub kind: String,
    pub id: Option<String>,
    pub payload: Option<Value>,
}

impl RawFrame {
    pub(crate) fn parse(text: &str) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Object(mut object) = value else {
            return Err(DecodeError::NotAnObject);
        };

        let kind = match object.remove("type") {
            Some(Value::String(kind)) => kind,
            _ => return Err(DecodeError::MissingType),
        };

        // Some servers echo numeric ids
        let id = match object.remove("id") {
            Some(Value::String(id)) => Some(id),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };

        let payload = object.remove("payload").filter(|p| !p.is_null());

        Ok(Self { kind, id, payload })
    }

    /// Take the id, failing for operation-scoped kinds that lack one
    pub(crate) fn require_id(&mut self) -> Result<String, DecodeError> {
        self.id
            .take()
            .ok_or_else(|| DecodeError::MissingId(self.kind.clone()))
    }

    pub(crate) fn into_unexpected(self) -> ServerFrame {
        ServerFrame::Unexpected {
            kind: self.kind,
            id: self.id,
            payload: self.payload,
        }
    }
}

/// Render an envelope with keys in `type`, `id`, `payload` order
pub(crate) fn render(kind: &str, id: Option<&str>, payload: Option<&Value>) -> serde_json::Result<String> {
    let mut object = Map::new();
    object.insert("type".to_string(), Value::String(kind.to_string()));
    if let Some(id) = id {
        object.insert("id".to_string(), Value::String(id.to_string()));
    }
    if let Some(payload) = payload {
        object.insert("payload".to_string(), payload.clone());
    }
    serde_json::to_string(&Value::Object(object))
}
