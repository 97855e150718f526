//! GraphQL response types

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A GraphQL error returned by the server
///
/// Keys beyond the standard four are kept in `extra`, so servers that put
/// custom fields next to `message` lose nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLError {
    #[serde(default)]
    pub message: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<Location>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<PathSegment>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GraphQLError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: Vec::new(),
            path: None,
            extensions: None,
            extra: Map::new(),
        }
    }

    /// Parse an error object, falling back to its text for other shapes
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::String(message) => Self::new(message),
            Value::Object(_) => serde_json::from_value(value.clone())
                .unwrap_or_else(|_| Self::new(value.to_string())),
            other => Self::new(other.to_string()),
        }
    }
}

impl fmt::Display for GraphQLError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref path) = self.path {
            write!(f, " (at ")?;
            for (i, segment) in path.iter().enumerate() {
                if i > 0 {
                    write!(f, ".")?;
                }
                match segment {
                    PathSegment::Field(name) => write!(f, "{}", name)?,
                    PathSegment::Index(idx) => write!(f, "[{}]", idx)?,
                }
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl std::error::Error for GraphQLError {}

/// Position in a GraphQL document, 1-indexed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

/// Parsed result carried by DATA and ERROR events and plain queries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphQLResponse {
    #[serde(default)]
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphQLError>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl GraphQLResponse {
    /// Parse a `{data, errors, extensions}` object
    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }

    /// Normalise an error frame payload
    ///
    /// Accepts a bare error list (`graphql-transport-ws`), a full response
    /// object, a single error object (`graphql-ws`), or a plain string.
    pub fn from_error_payload(payload: Value) -> Self {
        let errors = match payload {
            Value::Array(items) => items.into_iter().map(GraphQLError::from_value).collect(),
            Value::Object(ref object) if object.contains_key("errors") => {
                match Self::from_value(payload.clone()) {
                    Ok(response) => return response,
                    Err(_) => vec![GraphQLError::new(payload.to_string())],
                }
            }
            Value::Null => vec![GraphQLError::new("unknown server error")],
            other => vec![GraphQLError::from_value(other)],
        };

        Self {
            data: None,
            errors,
            extensions: None,
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn is_success(&self) -> bool {
        self.data.is_some() && self.errors.is_empty()
    }

    pub fn first_error(&self) -> Option<&GraphQLError> {
        self.errors.first()
    }

    /// All error messages joined by `"; "`
    pub fn error_message(&self) -> Option<String> {
        if self.errors.is_empty() {
            None
        } else {
            Some(
                self.errors
                    .iter()
                    .map(|e| e.message.as_str())
                    .collect::<Vec<_>>()
                    .join("; "),
            )
        }
    }

    /// Deserialize the data object, if any
    pub fn data_as<T: DeserializeOwned>(&self) -> serde_json::Result<Option<T>> {
        match &self.data {
            Some(Value::Null) | None => Ok(None),
            Some(data) => serde_json::from_value(data.clone()).map(Some),
        }
    }

    /// Deserialize one top-level field of the data object
    pub fn field<T: DeserializeOwned>(&self, field: &str) -> serde_json::Result<Option<T>> {
        match self.data.as_ref().and_then(|data| data.get(field)) {
            Some(value) => serde_json::from_value(value.clone()).map(Some),
            None => Ok(None),
        }
    }
}
