//! GraphQL request types
//!
//! A [`GraphQLRequest`] is immutable once built and can be dispatched any
//! number of times. Per-call [`RequestOverrides`] are upserted onto a copy of
//! the request, never onto the request itself.

use crate::traits::{merge_headers, Headers};
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct GraphQLRequest {
    query: String,
    operation: Option<String>,
    variables: Map<String, Value>,
    validate: bool,
    headers: Headers,
}

impl GraphQLRequest {
    /// Create a request; validation is on by default
    ///
    /// # Example
    ///
    /// ```ignore
    /// let request = GraphQLRequest::new("subscription { tick { n } }")
    ///     .with_variable("limit", 10)
    ///     .with_header("Authorization", "Bearer token");
    /// ```
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            operation: None,
            variables: Map::new(),
            validate: true,
            headers: Headers::new(),
        }
    }

    /// Set one variable; values that fail to serialize are skipped
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(value) = serde_json::to_value(value) {
            self.variables.insert(name.into(), value);
        }
        self
    }

    /// Upsert every key of a JSON object into the variables
    pub fn with_variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables.extend(variables);
        self
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn with_validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn operation(&self) -> Option<&str> {
        self.operation.as_deref()
    }

    pub fn variables(&self) -> &Map<String, Value> {
        &self.variables
    }

    pub fn validate(&self) -> bool {
        self.validate
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Copy of this request with call-time overrides applied
    ///
    /// Variables: request then call. Operation: call, else request.
    /// Headers: `fallback_headers`, then request, then call.
    pub fn merged(&self, overrides: &RequestOverrides, fallback_headers: &Headers) -> GraphQLRequest {
        let mut variables = self.variables.clone();
        variables.extend(overrides.variables.clone());

        GraphQLRequest {
            query: self.query.clone(),
            operation: overrides.operation.clone().or_else(|| self.operation.clone()),
            variables,
            validate: self.validate,
            headers: merge_headers([fallback_headers, &self.headers, &overrides.headers]),
        }
    }

    /// Wire payload: `{query, variables, operationName?}`
    pub fn payload(&self) -> Value {
        let mut payload = Map::new();
        payload.insert("query".to_string(), Value::String(self.query.clone()));
        payload.insert("variables".to_string(), Value::Object(self.variables.clone()));
        if let Some(ref operation) = self.operation {
            payload.insert("operationName".to_string(), Value::String(operation.clone()));
        }
        Value::Object(payload)
    }

    /// Payload as URL query parameters for GET requests
    ///
    /// Booleans become `1`/`0`; objects and arrays are JSON-encoded.
    pub fn query_params(&self) -> Vec<(String, String)> {
        let Value::Object(payload) = self.payload() else {
            return Vec::new();
        };
        payload
            .into_iter()
            .map(|(key, value)| (key, coerce_param(&value)))
            .collect()
    }
}

fn coerce_param(value: &Value) -> String {
    match value {
        Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Per-call overrides for a request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOverrides {
    pub variables: Map<String, Value>,
    pub operation: Option<String>,
    pub headers: Headers,
}

impl RequestOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn variable(mut self, name: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(value) = serde_json::to_value(value) {
            self.variables.insert(name.into(), value);
        }
        self
    }

    pub fn operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}
